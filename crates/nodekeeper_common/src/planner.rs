//! Maintenance Planner
//!
//! Maps one [`ServiceSnapshot`] to exactly one [`MaintenanceAction`]. Pure:
//! no I/O, no logging, no errors. Rules are evaluated in a fixed order and a
//! later rule that fires replaces the result of an earlier one:
//!
//! 1. `NoAction`
//! 2. available < latest: `CheckAgainSoon`
//! 3. not running: `Start`
//! 4. running < installed: `Restart`
//! 5. installed >= merge-ready threshold and not merge configured: `Configure`
//! 6. installed < upgrade target: `Upgrade`, or `UpgradeAndConfigure` when the
//!    target reaches the merge-ready threshold and the merge configuration is
//!    still missing
//! 7. unit not found: `Reinstall`
//!
//! Comparisons against an unknown version are false, and an unknown merge
//! configuration never counts as "not configured", so missing data only ever
//! keeps a rule from firing.

use crate::clients::{ManagedService, UpgradeTarget};
use crate::probe::ServiceSnapshot;
use crate::version::VersionInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceAction {
    NoAction,
    Restart,
    Upgrade,
    UpgradeAndConfigure,
    Configure,
    CheckAgainSoon,
    Start,
    Reinstall,
}

impl MaintenanceAction {
    /// Something has to be executed for this action
    pub fn is_actionable(&self) -> bool {
        !matches!(self, MaintenanceAction::NoAction | MaintenanceAction::CheckAgainSoon)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            MaintenanceAction::NoAction => "nothing to do",
            MaintenanceAction::Restart => "restart to pick up the installed version",
            MaintenanceAction::Upgrade => "upgrade",
            MaintenanceAction::UpgradeAndConfigure => "upgrade and add the merge configuration",
            MaintenanceAction::Configure => "add the merge configuration",
            MaintenanceAction::CheckAgainSoon => "newer release not installable yet, check again soon",
            MaintenanceAction::Start => "start",
            MaintenanceAction::Reinstall => "reinstall",
        }
    }
}

impl fmt::Display for MaintenanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MaintenanceAction::NoAction => "no-action",
            MaintenanceAction::Restart => "restart",
            MaintenanceAction::Upgrade => "upgrade",
            MaintenanceAction::UpgradeAndConfigure => "upgrade-and-configure",
            MaintenanceAction::Configure => "configure",
            MaintenanceAction::CheckAgainSoon => "check-again-soon",
            MaintenanceAction::Start => "start",
            MaintenanceAction::Reinstall => "reinstall",
        };
        f.write_str(name)
    }
}

/// Per-client inputs to [`plan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPolicy {
    pub merge_ready_threshold: VersionInfo,
    pub upgrade_target: UpgradeTarget,
}

impl PlanPolicy {
    pub fn for_service(service: &ManagedService) -> Self {
        Self {
            merge_ready_threshold: service.merge_ready_threshold(),
            upgrade_target: service.kind.upgrade_target(),
        }
    }
}

pub fn plan(snapshot: &ServiceSnapshot, policy: &PlanPolicy) -> MaintenanceAction {
    let versions = &snapshot.versions;
    let threshold = &policy.merge_ready_threshold;
    let unconfigured = snapshot.merge_configured == Some(false);

    let mut action = MaintenanceAction::NoAction;

    if versions.available.is_older_than(&versions.latest) {
        action = MaintenanceAction::CheckAgainSoon;
    }

    if !snapshot.lifecycle.running {
        action = MaintenanceAction::Start;
    }

    if versions.running.is_older_than(&versions.installed) {
        action = MaintenanceAction::Restart;
    }

    if versions.installed.is_at_least(threshold) && unconfigured {
        action = MaintenanceAction::Configure;
    }

    let target = match policy.upgrade_target {
        UpgradeTarget::Available => &versions.available,
        UpgradeTarget::Latest => &versions.latest,
    };
    if versions.installed.is_older_than(target) {
        action = if target.is_at_least(threshold) && unconfigured {
            MaintenanceAction::UpgradeAndConfigure
        } else {
            MaintenanceAction::Upgrade
        };
    }

    if !snapshot.service_found {
        action = MaintenanceAction::Reinstall;
    }

    action
}

/// True when any planned action is not `NoAction`
pub fn maintenance_needed<'a>(actions: impl IntoIterator<Item = &'a MaintenanceAction>) -> bool {
    actions.into_iter().any(|a| *a != MaintenanceAction::NoAction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{Lifecycle, Versions};
    use crate::version::Version;

    fn known(s: &str) -> VersionInfo {
        VersionInfo::Known(Version::parse(s).unwrap())
    }

    fn healthy(installed: &str, running: &str, available: &str, latest: &str) -> ServiceSnapshot {
        ServiceSnapshot {
            service_found: true,
            lifecycle: Lifecycle {
                load_state: "loaded".into(),
                active_state: "active".into(),
                sub_state: "running".into(),
                running: true,
            },
            versions: Versions {
                installed: known(installed),
                running: known(running),
                available: known(available),
                latest: known(latest),
            },
            merge_configured: Some(true),
            exec_command_line: None,
        }
    }

    fn execution() -> PlanPolicy {
        PlanPolicy {
            merge_ready_threshold: known("1.10.17"),
            upgrade_target: UpgradeTarget::Available,
        }
    }

    fn consensus() -> PlanPolicy {
        PlanPolicy {
            merge_ready_threshold: known("2.1.0"),
            upgrade_target: UpgradeTarget::Latest,
        }
    }

    #[test]
    fn test_up_to_date_is_no_action() {
        let snap = healthy("1.10.17", "1.10.17", "1.10.17", "1.10.17");
        assert_eq!(plan(&snap, &execution()), MaintenanceAction::NoAction);
    }

    #[test]
    fn test_not_found_always_reinstall() {
        let mut snap = healthy("1.10.10", "1.10.9", "1.10.17", "1.10.18");
        snap.service_found = false;
        snap.lifecycle.running = false;
        snap.merge_configured = Some(false);
        assert_eq!(plan(&snap, &execution()), MaintenanceAction::Reinstall);
        assert_eq!(plan(&ServiceSnapshot::not_found(), &consensus()), MaintenanceAction::Reinstall);
    }

    #[test]
    fn test_stopped_with_unknown_versions_is_start() {
        let snap = ServiceSnapshot {
            service_found: true,
            ..ServiceSnapshot::default()
        };
        assert!(!snap.lifecycle.running);
        assert_eq!(plan(&snap, &execution()), MaintenanceAction::Start);
    }

    #[test]
    fn test_installed_below_available_below_latest_is_upgrade() {
        let snap = healthy("1.10.15", "1.10.15", "1.10.16", "1.10.18");
        assert_eq!(plan(&snap, &execution()), MaintenanceAction::Upgrade);
    }

    #[test]
    fn test_available_behind_latest_is_check_again_soon() {
        let snap = healthy("1.10.17", "1.10.17", "1.10.17", "1.10.18");
        assert_eq!(plan(&snap, &execution()), MaintenanceAction::CheckAgainSoon);
    }

    #[test]
    fn test_later_rules_override_check_again_soon() {
        let snap = healthy("1.10.17", "1.10.16", "1.10.17", "1.10.18");
        assert_eq!(plan(&snap, &execution()), MaintenanceAction::Restart);

        let mut stopped = healthy("1.10.17", "1.10.17", "1.10.17", "1.10.18");
        stopped.lifecycle.running = false;
        assert_eq!(plan(&stopped, &execution()), MaintenanceAction::Start);
    }

    #[test]
    fn test_running_behind_installed_is_restart() {
        let snap = healthy("2.1.5", "2.1.3", "2.1.5", "2.1.5");
        assert_eq!(plan(&snap, &consensus()), MaintenanceAction::Restart);
    }

    #[test]
    fn test_merge_ready_but_unconfigured_is_configure() {
        let mut snap = healthy("2.1.5", "2.1.5", "2.1.5", "2.1.5");
        snap.merge_configured = Some(false);
        assert_eq!(plan(&snap, &consensus()), MaintenanceAction::Configure);
    }

    #[test]
    fn test_unknown_merge_config_does_not_configure() {
        let mut snap = healthy("2.1.5", "2.1.5", "2.1.5", "2.1.5");
        snap.merge_configured = None;
        assert_eq!(plan(&snap, &consensus()), MaintenanceAction::NoAction);
    }

    #[test]
    fn test_upgrade_across_threshold_is_upgrade_and_configure() {
        let mut snap = healthy("2.0.1", "2.0.1", "2.0.1", "2.1.5");
        snap.merge_configured = Some(false);
        assert_eq!(plan(&snap, &consensus()), MaintenanceAction::UpgradeAndConfigure);

        snap.merge_configured = Some(true);
        assert_eq!(plan(&snap, &consensus()), MaintenanceAction::Upgrade);
    }

    #[test]
    fn test_execution_upgrades_to_available_only() {
        // latest is newer but not installable: nothing to upgrade to yet
        let snap = healthy("1.10.17", "1.10.17", "1.10.17", "1.10.20");
        assert_eq!(plan(&snap, &execution()), MaintenanceAction::CheckAgainSoon);

        let snap = healthy("1.10.16", "1.10.16", "1.10.17", "1.10.20");
        assert_eq!(plan(&snap, &execution()), MaintenanceAction::Upgrade);
    }

    #[test]
    fn test_unknown_installed_never_upgrades() {
        let mut snap = healthy("1.0.0", "1.10.17", "1.10.17", "1.10.17");
        snap.versions.installed = VersionInfo::Unknown;
        assert_eq!(plan(&snap, &execution()), MaintenanceAction::NoAction);
    }

    #[test]
    fn test_maintenance_needed() {
        use MaintenanceAction::*;
        assert!(!maintenance_needed(&[NoAction, NoAction]));
        assert!(maintenance_needed(&[NoAction, CheckAgainSoon]));
        assert!(!maintenance_needed(&[]));
    }
}

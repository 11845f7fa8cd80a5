//! Service Probe
//!
//! Reads one managed service's lifecycle, versions and merge configuration
//! into a [`ServiceSnapshot`]. Every query is independent: a failure is
//! logged and turns that field into "unknown", it never aborts the probe.

pub mod sources;

pub use sources::{host_version_queries, AptPackageIndex, GethVersions, LighthouseVersions, MevBoostVersions};

use crate::argv::ExecCommandLine;
use crate::clients::ManagedService;
use crate::error::KeeperResult;
use crate::logging::Logger;
use crate::systemd::UnitManager;
use crate::version::{Version, VersionInfo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a client's versions come from.
///
/// `Ok(None)` means the client has no such source (MEV-Boost has no live
/// version endpoint, release-only clients have no package index); it is not
/// logged as a failure.
pub trait VersionQueries: Send + Sync {
    /// Version of the binary on disk
    fn installed(&self) -> KeeperResult<Option<Version>>;

    /// Version reported by the live service
    fn running(&self) -> KeeperResult<Option<Version>>;

    /// Newest build installable from the local package index
    fn available(&self) -> KeeperResult<Option<Version>>;

    /// Newest upstream release
    fn latest(&self) -> KeeperResult<Option<Version>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    /// Primary and every companion unit loaded, active and running
    pub running: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versions {
    pub installed: VersionInfo,
    pub running: VersionInfo,
    pub available: VersionInfo,
    pub latest: VersionInfo,
}

/// Point-in-time read of one managed service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub service_found: bool,
    pub lifecycle: Lifecycle,
    pub versions: Versions,
    /// `None` when the live command line could not be read
    pub merge_configured: Option<bool>,
    pub exec_command_line: Option<ExecCommandLine>,
}

impl ServiceSnapshot {
    /// What the probe reports for a unit systemd does not know
    pub fn not_found() -> Self {
        Self::default()
    }
}

pub struct ServiceProbe {
    units: Arc<dyn UnitManager>,
    log: Logger,
}

impl ServiceProbe {
    pub fn new(units: Arc<dyn UnitManager>, log: &Logger) -> Self {
        Self {
            units,
            log: log.scoped("probe"),
        }
    }

    /// Probe `service`. Never fails.
    pub fn probe(&self, service: &ManagedService, queries: &dyn VersionQueries) -> ServiceSnapshot {
        let log = self.log.for_service(&service.unit);

        let primary = match self.units.show(&service.unit) {
            Ok(props) if !props.is_found() => {
                warn!(parent: log.span(), "Unit {} not found", service.unit);
                return ServiceSnapshot::not_found();
            }
            Ok(props) => Some(props),
            Err(e) => {
                warn!(parent: log.span(), "Cannot read unit state: {}", e);
                None
            }
        };

        let lifecycle = match &primary {
            Some(props) => Lifecycle {
                load_state: props.load_state.clone(),
                active_state: props.active_state.clone(),
                sub_state: props.sub_state.clone(),
                running: props.is_running() && self.companions_running(service, &log),
            },
            None => Lifecycle::default(),
        };

        let exec_command_line = primary.and_then(|props| props.exec_start);
        let merge_configured = match (service.kind.merge_flag(), &exec_command_line) {
            (None, _) => Some(true),
            (Some(flag), Some(cmd)) => Some(cmd.has_flag(flag)),
            (Some(_), None) => {
                warn!(parent: log.span(), "No ExecStart command line, merge configuration unknown");
                None
            }
        };

        let installed = self.query(&log, "installed", || queries.installed());
        let running = self.query(&log, "running", || queries.running());
        let latest = self.query(&log, "latest", || queries.latest());
        let available = match queries.available() {
            // Release-only clients install straight from the release feed
            Ok(None) => latest.clone(),
            other => self.query(&log, "available", || other),
        };

        debug!(
            parent: log.span(),
            "installed={} running={} available={} latest={}",
            installed, running, available, latest
        );

        ServiceSnapshot {
            service_found: true,
            lifecycle,
            versions: Versions {
                installed,
                running,
                available,
                latest,
            },
            merge_configured,
            exec_command_line,
        }
    }

    fn companions_running(&self, service: &ManagedService, log: &Logger) -> bool {
        service.companions.iter().all(|unit| match self.units.show(unit) {
            Ok(props) => {
                if !props.is_running() {
                    debug!(parent: log.span(), "Companion {} is {}/{}", unit, props.active_state, props.sub_state);
                }
                props.is_running()
            }
            Err(e) => {
                warn!(parent: log.span(), "Cannot read companion {}: {}", unit, e);
                false
            }
        })
    }

    fn query(
        &self,
        log: &Logger,
        what: &str,
        op: impl FnOnce() -> KeeperResult<Option<Version>>,
    ) -> VersionInfo {
        match op() {
            Ok(v) => v.into(),
            Err(e) => {
                warn!(parent: log.span(), "{} version unknown: {}", what, e);
                VersionInfo::Unknown
            }
        }
    }
}

//! Maintenance passes
//!
//! A pass probes every managed service, plans one action per service,
//! executes the actionable ones and verifies the result with the Progress
//! Monitor. `NoAction` and `CheckAgainSoon` execute nothing.

use crate::clients::ManagedService;
use crate::command::CommandRunner;
use crate::config::ServiceConfig;
use crate::error::{KeeperError, KeeperResult};
use crate::logging::Logger;
use crate::planner::{maintenance_needed, plan, MaintenanceAction, PlanPolicy};
use crate::probe::{ServiceProbe, ServiceSnapshot, VersionQueries};
use crate::systemd::UnitManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Result of executing one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Done,
    /// Nothing configured to carry it out; the operator has to
    Manual(String),
    Skipped,
}

pub trait ActionExecutor: Send + Sync {
    fn execute(&self, service: &ManagedService, action: MaintenanceAction) -> KeeperResult<ActionResult>;
}

/// Starts and restarts units itself; upgrade, configure and reinstall run
/// the operator's configured commands
pub struct SystemdActionExecutor {
    units: Arc<dyn UnitManager>,
    runner: Arc<dyn CommandRunner>,
    commands: Box<dyn Fn(&ManagedService) -> ServiceConfig + Send + Sync>,
    log: Logger,
}

impl SystemdActionExecutor {
    pub fn new(
        units: Arc<dyn UnitManager>,
        runner: Arc<dyn CommandRunner>,
        commands: impl Fn(&ManagedService) -> ServiceConfig + Send + Sync + 'static,
        log: &Logger,
    ) -> Self {
        Self {
            units,
            runner,
            commands: Box::new(commands),
            log: log.scoped("executor"),
        }
    }

    fn start_all(&self, service: &ManagedService) -> KeeperResult<()> {
        for unit in service.units() {
            info!(parent: self.log.span(), "Starting {}", unit);
            self.units.start(unit)?;
        }
        Ok(())
    }

    fn restart_all(&self, service: &ManagedService) -> KeeperResult<()> {
        for unit in service.units() {
            info!(parent: self.log.span(), "Restarting {}", unit);
            self.units.restart(unit)?;
        }
        Ok(())
    }

    fn run_hook(&self, what: &str, argv: &[String]) -> KeeperResult<()> {
        info!(parent: self.log.span(), "Running {} command: {}", what, argv.join(" "));
        let output = self.runner.run_argv(argv)?;
        if !output.success() {
            return Err(KeeperError::Action(format!(
                "{} command failed ({}): {}",
                what,
                output
                    .status
                    .map(|c| format!("exit code {}", c))
                    .unwrap_or_else(|| "signal".to_string()),
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    fn manual(service: &ManagedService, what: &str) -> ActionResult {
        ActionResult::Manual(format!(
            "no {} command configured for {}; set services.{}.{} in the config",
            what,
            service.kind,
            service.kind.key(),
            what
        ))
    }
}

impl ActionExecutor for SystemdActionExecutor {
    fn execute(&self, service: &ManagedService, action: MaintenanceAction) -> KeeperResult<ActionResult> {
        let commands = (self.commands)(service);

        match action {
            MaintenanceAction::NoAction | MaintenanceAction::CheckAgainSoon => Ok(ActionResult::Skipped),
            MaintenanceAction::Start => self.start_all(service).map(|_| ActionResult::Done),
            MaintenanceAction::Restart => self.restart_all(service).map(|_| ActionResult::Done),
            MaintenanceAction::Upgrade => {
                if commands.upgrade.is_empty() {
                    return Ok(Self::manual(service, "upgrade"));
                }
                self.run_hook("upgrade", &commands.upgrade)?;
                self.restart_all(service)?;
                Ok(ActionResult::Done)
            }
            MaintenanceAction::Configure => {
                if commands.configure.is_empty() {
                    return Ok(Self::manual(service, "configure"));
                }
                self.run_hook("configure", &commands.configure)?;
                self.restart_all(service)?;
                Ok(ActionResult::Done)
            }
            MaintenanceAction::UpgradeAndConfigure => {
                if commands.upgrade.is_empty() {
                    return Ok(Self::manual(service, "upgrade"));
                }
                if commands.configure.is_empty() {
                    return Ok(Self::manual(service, "configure"));
                }
                self.run_hook("upgrade", &commands.upgrade)?;
                self.run_hook("configure", &commands.configure)?;
                self.restart_all(service)?;
                Ok(ActionResult::Done)
            }
            MaintenanceAction::Reinstall => {
                let argv = if commands.reinstall.is_empty() {
                    &commands.install
                } else {
                    &commands.reinstall
                };
                if argv.is_empty() {
                    return Ok(Self::manual(service, "reinstall"));
                }
                self.run_hook("reinstall", argv)?;
                self.start_all(service)?;
                Ok(ActionResult::Done)
            }
        }
    }
}

/// What the operator decided after watching a service come back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Healthy,
    /// Not healthy, operator chose to carry on
    ProceededUnhealthy,
    /// Operator chose to stop
    Quit,
}

pub trait ServiceVerifier: Send + Sync {
    fn verify(&self, service: &ManagedService) -> KeeperResult<Verification>;
}

/// A managed service and where its versions come from
pub struct MaintainedService {
    pub service: ManagedService,
    pub queries: Box<dyn VersionQueries>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub service: ManagedService,
    pub snapshot: ServiceSnapshot,
    pub action: MaintenanceAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryResult {
    NotExecuted,
    Executed(ActionResult),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassEntry {
    pub planned: PlannedAction,
    pub result: EntryResult,
    pub verification: Option<Verification>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub entries: Vec<PassEntry>,
    /// The operator quit during verification
    pub stopped: bool,
}

impl PassReport {
    pub fn maintenance_needed(&self) -> bool {
        maintenance_needed(self.entries.iter().map(|e| &e.planned.action))
    }

    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.result, EntryResult::Failed(_)))
            .count()
    }
}

pub struct MaintenanceRunner {
    probe: ServiceProbe,
    services: Vec<MaintainedService>,
    executor: Arc<dyn ActionExecutor>,
    verifier: Option<Arc<dyn ServiceVerifier>>,
    log: Logger,
}

impl MaintenanceRunner {
    pub fn new(
        probe: ServiceProbe,
        services: Vec<MaintainedService>,
        executor: Arc<dyn ActionExecutor>,
        log: &Logger,
    ) -> Self {
        Self {
            probe,
            services,
            executor,
            verifier: None,
            log: log.scoped("maintenance"),
        }
    }

    /// Verify each executed action before moving on
    pub fn with_verifier(mut self, verifier: Arc<dyn ServiceVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Probe and plan every service, execute nothing
    pub fn plan_all(&self) -> Vec<PlannedAction> {
        self.services
            .iter()
            .map(|managed| {
                let snapshot = self.probe.probe(&managed.service, managed.queries.as_ref());
                let action = plan(&snapshot, &PlanPolicy::for_service(&managed.service));
                info!(
                    parent: self.log.span(),
                    "{}: {} ({})",
                    managed.service.kind,
                    action,
                    action.describe()
                );
                PlannedAction {
                    service: managed.service.clone(),
                    snapshot,
                    action,
                }
            })
            .collect()
    }

    /// One maintenance pass. Failures of one service do not stop the others;
    /// only the operator quitting a verification does.
    pub fn pass(&self, dry_run: bool) -> KeeperResult<PassReport> {
        let mut report = PassReport::default();
        let mut planned = self.plan_all().into_iter();

        for next in planned.by_ref() {
            if dry_run || !next.action.is_actionable() {
                report.entries.push(PassEntry {
                    planned: next,
                    result: EntryResult::NotExecuted,
                    verification: None,
                });
                continue;
            }

            let result = match self.executor.execute(&next.service, next.action) {
                Ok(result) => EntryResult::Executed(result),
                Err(e) => {
                    error!(parent: self.log.span(), "{} failed for {}: {}", next.action, next.service.kind, e);
                    EntryResult::Failed(e.to_string())
                }
            };
            if let EntryResult::Executed(ActionResult::Manual(reason)) = &result {
                warn!(parent: self.log.span(), "{}", reason);
            }

            let verification = match (&result, &self.verifier) {
                (EntryResult::Executed(ActionResult::Done), Some(verifier)) => {
                    Some(verifier.verify(&next.service)?)
                }
                _ => None,
            };

            let quit = verification == Some(Verification::Quit);
            report.entries.push(PassEntry {
                planned: next,
                result,
                verification,
            });
            if quit {
                info!(parent: self.log.span(), "Operator stopped the maintenance pass");
                report.stopped = true;
                break;
            }
        }

        for rest in planned {
            report.entries.push(PassEntry {
                planned: rest,
                result: EntryResult::NotExecuted,
                verification: None,
            });
        }

        Ok(report)
    }

    /// Repeat passes every `interval` until `keep_going` says stop or the
    /// operator quits a verification
    pub fn watch(
        &self,
        interval: Duration,
        dry_run: bool,
        mut keep_going: impl FnMut(&PassReport) -> bool,
    ) -> KeeperResult<PassReport> {
        loop {
            let report = self.pass(dry_run)?;
            if report.stopped || !keep_going(&report) {
                return Ok(report);
            }
            info!(parent: self.log.span(), "Next maintenance pass in {:?}", interval);
            std::thread::sleep(interval);
        }
    }
}

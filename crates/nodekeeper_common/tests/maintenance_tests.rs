//! Full maintenance passes against fake hosts

use nodekeeper_common::clients::{ClientKind, ManagedService};
use nodekeeper_common::error::KeeperResult;
use nodekeeper_common::logging::Logger;
use nodekeeper_common::maintenance::{
    ActionExecutor, ActionResult, EntryResult, MaintainedService, MaintenanceRunner,
    ServiceVerifier, Verification,
};
use nodekeeper_common::planner::MaintenanceAction;
use nodekeeper_common::probe::{ServiceProbe, VersionQueries};
use nodekeeper_common::systemd::{UnitManager, UnitProperties};
use nodekeeper_common::version::Version;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const RUNNING: &str = "LoadState=loaded\nActiveState=active\nSubState=running\n";
const STOPPED: &str = "LoadState=loaded\nActiveState=inactive\nSubState=dead\n";

#[derive(Default)]
struct FakeUnits {
    states: Mutex<HashMap<String, &'static str>>,
}

impl FakeUnits {
    fn set(&self, unit: &str, state: &'static str) {
        self.states.lock().unwrap().insert(unit.to_string(), state);
    }
}

impl UnitManager for FakeUnits {
    fn show(&self, unit: &str) -> KeeperResult<UnitProperties> {
        let states = self.states.lock().unwrap();
        Ok(UnitProperties::parse(
            states.get(unit).copied().unwrap_or("LoadState=not-found\n"),
        ))
    }
    fn start(&self, unit: &str) -> KeeperResult<()> {
        self.set(unit, RUNNING);
        Ok(())
    }
    fn restart(&self, unit: &str) -> KeeperResult<()> {
        self.set(unit, RUNNING);
        Ok(())
    }
}

/// Same version everywhere
struct Steady(&'static str);

impl VersionQueries for Steady {
    fn installed(&self) -> KeeperResult<Option<Version>> {
        Version::parse(self.0).map(Some)
    }
    fn running(&self) -> KeeperResult<Option<Version>> {
        Version::parse(self.0).map(Some)
    }
    fn available(&self) -> KeeperResult<Option<Version>> {
        Version::parse(self.0).map(Some)
    }
    fn latest(&self) -> KeeperResult<Option<Version>> {
        Version::parse(self.0).map(Some)
    }
}

/// Starts units through the fake systemd, records every call
struct RecordingExecutor {
    units: Arc<FakeUnits>,
    calls: Mutex<Vec<(ClientKind, MaintenanceAction)>>,
}

impl ActionExecutor for RecordingExecutor {
    fn execute(&self, service: &ManagedService, action: MaintenanceAction) -> KeeperResult<ActionResult> {
        self.calls.lock().unwrap().push((service.kind, action));
        match action {
            MaintenanceAction::Start | MaintenanceAction::Restart => {
                for unit in service.units() {
                    self.units.start(unit)?;
                }
                Ok(ActionResult::Done)
            }
            _ => Ok(ActionResult::Manual("not scripted".into())),
        }
    }
}

struct ScriptedVerifier {
    answer: Verification,
    verified: Mutex<Vec<ClientKind>>,
}

impl ServiceVerifier for ScriptedVerifier {
    fn verify(&self, service: &ManagedService) -> KeeperResult<Verification> {
        self.verified.lock().unwrap().push(service.kind);
        Ok(self.answer)
    }
}

fn geth_unit(units: &FakeUnits, state: &'static str) {
    units.set(
        "geth.service",
        if state == RUNNING {
            "LoadState=loaded\nActiveState=active\nSubState=running\nExecStart={ path=/usr/bin/geth ; argv[]=/usr/bin/geth --authrpc.jwtsecret /var/lib/ethereum/jwttoken ; ignore_errors=no }\n"
        } else {
            "LoadState=loaded\nActiveState=inactive\nSubState=dead\nExecStart={ path=/usr/bin/geth ; argv[]=/usr/bin/geth --authrpc.jwtsecret /var/lib/ethereum/jwttoken ; ignore_errors=no }\n"
        },
    );
}

fn setup(answer: Verification) -> (MaintenanceRunner, Arc<FakeUnits>, Arc<RecordingExecutor>, Arc<ScriptedVerifier>) {
    let units = Arc::new(FakeUnits::default());
    let executor = Arc::new(RecordingExecutor {
        units: units.clone(),
        calls: Mutex::default(),
    });
    let verifier = Arc::new(ScriptedVerifier {
        answer,
        verified: Mutex::default(),
    });
    let services = vec![
        MaintainedService {
            service: ManagedService::new(ClientKind::Geth),
            queries: Box::new(Steady("1.10.17")),
        },
        MaintainedService {
            service: ManagedService::new(ClientKind::MevBoost),
            queries: Box::new(Steady("1.4.0")),
        },
    ];
    let runner = MaintenanceRunner::new(
        ServiceProbe::new(units.clone(), &Logger::disabled()),
        services,
        executor.clone(),
        &Logger::disabled(),
    )
    .with_verifier(verifier.clone());
    (runner, units, executor, verifier)
}

#[test]
fn test_healthy_host_needs_nothing() {
    let (runner, units, executor, _) = setup(Verification::Healthy);
    geth_unit(&units, RUNNING);
    units.set("mevboost.service", RUNNING);

    let report = runner.pass(false).unwrap();
    assert!(!report.maintenance_needed());
    assert!(executor.calls.lock().unwrap().is_empty());
    assert!(report
        .entries
        .iter()
        .all(|e| e.result == EntryResult::NotExecuted));
}

#[test]
fn test_stopped_service_is_started_and_verified() {
    let (runner, units, executor, verifier) = setup(Verification::Healthy);
    geth_unit(&units, RUNNING);
    units.set("mevboost.service", STOPPED);

    let report = runner.pass(false).unwrap();
    assert!(report.maintenance_needed());
    assert_eq!(
        *executor.calls.lock().unwrap(),
        vec![(ClientKind::MevBoost, MaintenanceAction::Start)]
    );
    assert_eq!(*verifier.verified.lock().unwrap(), vec![ClientKind::MevBoost]);

    // The next pass sees it running
    let again = runner.pass(false).unwrap();
    assert!(!again.maintenance_needed());
}

#[test]
fn test_missing_unit_reinstall_reported_manual() {
    let (runner, units, _executor, verifier) = setup(Verification::Healthy);
    units.set("mevboost.service", RUNNING);

    let report = runner.pass(false).unwrap();
    let geth = &report.entries[0];
    assert_eq!(geth.planned.action, MaintenanceAction::Reinstall);
    assert!(matches!(geth.result, EntryResult::Executed(ActionResult::Manual(_))));
    assert!(verifier.verified.lock().unwrap().is_empty());
}

#[test]
fn test_dry_run_executes_nothing() {
    let (runner, units, executor, _) = setup(Verification::Healthy);
    geth_unit(&units, STOPPED);
    units.set("mevboost.service", STOPPED);

    let report = runner.pass(true).unwrap();
    assert!(report.maintenance_needed());
    assert!(executor.calls.lock().unwrap().is_empty());
    assert_eq!(report.entries[0].planned.action, MaintenanceAction::Start);
}

#[test]
fn test_quit_during_verification_stops_pass() {
    let (runner, units, executor, _) = setup(Verification::Quit);
    geth_unit(&units, STOPPED);
    units.set("mevboost.service", STOPPED);

    let report = runner.pass(false).unwrap();
    assert!(report.stopped);
    assert_eq!(executor.calls.lock().unwrap().len(), 1);
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.entries[1].result, EntryResult::NotExecuted);

    let watched = runner
        .watch(Duration::from_millis(1), false, |_| true)
        .unwrap();
    assert!(watched.stopped);
}

#[test]
fn test_watch_repeats_until_told_to_stop() {
    let (runner, units, _executor, _) = setup(Verification::Healthy);
    geth_unit(&units, RUNNING);
    units.set("mevboost.service", RUNNING);

    let mut passes = 0;
    runner
        .watch(Duration::from_millis(1), false, |_| {
            passes += 1;
            passes < 3
        })
        .unwrap();
    assert_eq!(passes, 3);
}

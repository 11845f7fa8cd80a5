//! systemd unit queries and control
//!
//! Reads `LoadState`, `ActiveState`, `SubState` and `ExecStart` through
//! `systemctl show`, and starts/restarts units for the maintenance actions.

use crate::argv::ExecCommandLine;
use crate::command::{describe, CommandRunner};
use crate::error::KeeperResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const SHOW_PROPERTIES: &str = "--property=LoadState,ActiveState,SubState,ExecStart";

/// The `systemctl show` properties nodekeeper looks at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitProperties {
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    pub exec_start: Option<ExecCommandLine>,
}

impl UnitProperties {
    /// Parse `Key=Value` lines
    pub fn parse(show_output: &str) -> Self {
        let mut props = UnitProperties::default();
        for line in show_output.lines() {
            if let Some((key, value)) = line.split_once('=') {
                match key.trim() {
                    "LoadState" => props.load_state = value.trim().to_string(),
                    "ActiveState" => props.active_state = value.trim().to_string(),
                    "SubState" => props.sub_state = value.trim().to_string(),
                    "ExecStart" => props.exec_start = ExecCommandLine::from_exec_start(value),
                    _ => {}
                }
            }
        }
        props
    }

    /// systemd knows a unit file for this name
    pub fn is_found(&self) -> bool {
        !self.load_state.is_empty() && self.load_state != "not-found"
    }

    pub fn is_loaded(&self) -> bool {
        self.load_state == "loaded"
    }

    pub fn is_active(&self) -> bool {
        self.active_state == "active"
    }

    /// Loaded, active and running
    pub fn is_running(&self) -> bool {
        self.is_loaded() && self.is_active() && self.sub_state == "running"
    }
}

pub trait UnitManager: Send + Sync {
    fn show(&self, unit: &str) -> KeeperResult<UnitProperties>;
    fn start(&self, unit: &str) -> KeeperResult<()>;
    fn restart(&self, unit: &str) -> KeeperResult<()>;
}

/// [`UnitManager`] backed by `systemctl`
pub struct Systemctl {
    runner: Arc<dyn CommandRunner>,
}

impl Systemctl {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn control(&self, verb: &str, unit: &str) -> KeeperResult<()> {
        let args = [verb, unit];
        self.runner
            .run("systemctl", &args)?
            .into_stdout(&describe("systemctl", &args))
            .map(|_| ())
    }
}

impl UnitManager for Systemctl {
    fn show(&self, unit: &str) -> KeeperResult<UnitProperties> {
        let args = ["show", unit, SHOW_PROPERTIES, "--no-pager"];
        let stdout = self
            .runner
            .run("systemctl", &args)?
            .into_stdout(&describe("systemctl", &args))?;
        Ok(UnitProperties::parse(&stdout))
    }

    fn start(&self, unit: &str) -> KeeperResult<()> {
        self.control("start", unit)
    }

    fn restart(&self, unit: &str) -> KeeperResult<()> {
        self.control("restart", unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_running_unit() {
        let out = "LoadState=loaded\nActiveState=active\nSubState=running\nExecStart={ path=/usr/local/bin/lighthouse ; argv[]=/usr/local/bin/lighthouse bn --network mainnet --execution-jwt /var/lib/ethereum/jwttoken ; ignore_errors=no ; start_time=[n/a] ; stop_time=[n/a] ; pid=0 ; code=(null) ; status=0/0 }\n";
        let props = UnitProperties::parse(out);
        assert!(props.is_found());
        assert!(props.is_running());
        let exec = props.exec_start.unwrap();
        assert_eq!(exec.path, "/usr/local/bin/lighthouse");
        assert!(exec.has_flag("--execution-jwt"));
    }

    #[test]
    fn test_parse_missing_unit() {
        let out = "LoadState=not-found\nActiveState=inactive\nSubState=dead\nExecStart=\n";
        let props = UnitProperties::parse(out);
        assert!(!props.is_found());
        assert!(!props.is_running());
        assert!(props.exec_start.is_none());
    }

    #[test]
    fn test_active_but_exited_is_not_running() {
        let props = UnitProperties::parse("LoadState=loaded\nActiveState=active\nSubState=exited\n");
        assert!(props.is_active());
        assert!(!props.is_running());
    }
}

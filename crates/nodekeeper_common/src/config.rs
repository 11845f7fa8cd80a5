//! Configuration management for nodekeeper.
//!
//! Loads settings from a TOML file or uses defaults. Every field has a serde
//! default, so a partial file only overrides what it names.
//!
//! Search order:
//! 1. `--config <path>` (must exist and parse)
//! 2. `$NODEKEEPER_CONFIG` (must exist and parse)
//! 3. `/etc/nodekeeper/config.toml`
//! 4. `<config_dir>/nodekeeper/config.toml`
//!
//! A discovered file (3, 4) that fails to parse is logged and ignored.

use crate::clients::{ClientKind, ManagedService, Network};
use crate::error::{KeeperError, KeeperResult};
use crate::logging::Logger;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Env var naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "NODEKEEPER_CONFIG";

/// Local endpoints of the managed services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Execution client JSON-RPC
    #[serde(default = "default_execution_rpc")]
    pub execution_rpc: String,

    /// Consensus client REST API
    #[serde(default = "default_beacon_api")]
    pub beacon_api: String,

    /// Booster builder API
    #[serde(default = "default_booster_api")]
    pub booster_api: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_execution_rpc() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_beacon_api() -> String {
    "http://127.0.0.1:5052".to_string()
}

fn default_booster_api() -> String {
    "http://127.0.0.1:18550".to_string()
}

fn default_request_timeout() -> u64 {
    5
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            execution_rpc: default_execution_rpc(),
            beacon_api: default_beacon_api(),
            booster_api: default_booster_api(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl EndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Progress Monitor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Peers an execution client needs before it counts as healthy
    #[serde(default = "default_execution_min_peers")]
    pub execution_min_peers: u32,

    /// Peers a beacon node needs before it counts as healthy
    #[serde(default = "default_consensus_min_peers")]
    pub consensus_min_peers: u32,

    /// Percentage shown as soon as monitoring starts
    #[serde(default = "default_progress_floor")]
    pub progress_floor: u8,

    /// Highest percentage shown before the service is healthy
    #[serde(default = "default_progress_ceiling")]
    pub progress_ceiling: u8,

    /// Log lines fetched on the first poll
    #[serde(default = "default_initial_log_lines")]
    pub initial_log_lines: usize,

    /// How long the operator waits for a service to turn healthy before
    /// being asked to retry, proceed or quit
    #[serde(default = "default_patience")]
    pub patience_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_execution_min_peers() -> u32 {
    3
}

fn default_consensus_min_peers() -> u32 {
    10
}

fn default_progress_floor() -> u8 {
    10
}

fn default_progress_ceiling() -> u8 {
    90
}

fn default_initial_log_lines() -> usize {
    20
}

fn default_patience() -> u64 {
    600
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            execution_min_peers: default_execution_min_peers(),
            consensus_min_peers: default_consensus_min_peers(),
            progress_floor: default_progress_floor(),
            progress_ceiling: default_progress_ceiling(),
            initial_log_lines: default_initial_log_lines(),
            patience_secs: default_patience(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn patience(&self) -> Duration {
        Duration::from_secs(self.patience_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Time between passes in watch mode
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,

    /// Run the Progress Monitor after each executed action
    #[serde(default = "default_true")]
    pub verify_after_action: bool,
}

fn default_watch_interval() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            watch_interval_secs: default_watch_interval(),
            verify_after_action: true,
        }
    }
}

/// Per-client overrides and operator-supplied commands.
///
/// Command vectors are run as-is (no shell); an empty vector means the
/// action has to be done by hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub unit: Option<String>,

    #[serde(default)]
    pub companions: Option<Vec<String>>,

    #[serde(default)]
    pub install: Vec<String>,

    #[serde(default)]
    pub upgrade: Vec<String>,

    #[serde(default)]
    pub configure: Vec<String>,

    #[serde(default)]
    pub reinstall: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Preselected network; the install pipeline asks when unset
    #[serde(default)]
    pub network: Option<Network>,

    /// Override for the state file location
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Also write logs to `<state_dir>/nodekeeper.log`
    #[serde(default)]
    pub log_to_file: bool,

    #[serde(default)]
    pub endpoints: EndpointConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Keyed by client name (`geth`, `lighthouse`, `mev-boost`)
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

impl KeeperConfig {
    pub fn from_toml_str(content: &str) -> KeeperResult<Self> {
        let config: KeeperConfig =
            toml::from_str(content).map_err(|e| KeeperError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> KeeperResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| KeeperError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
            .map_err(|e| KeeperError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve and load the config. Runs before logging is set up, so
    /// nothing is logged here; call [`LoadedConfig::report`] afterwards.
    pub fn load(explicit: Option<&Path>) -> KeeperResult<LoadedConfig> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
        if let Some(path) = explicit {
            let config = Self::load_from(&path)?;
            return Ok(LoadedConfig {
                config,
                path: Some(path),
                ignored: Vec::new(),
            });
        }

        let candidates = std::iter::once(PathBuf::from(paths::SYSTEM_CONFIG_PATH))
            .chain(paths::user_config_file());
        Ok(Self::first_loadable(candidates))
    }

    /// First candidate that exists and parses; broken files are skipped
    /// and remembered
    pub fn first_loadable(candidates: impl IntoIterator<Item = PathBuf>) -> LoadedConfig {
        let mut ignored = Vec::new();
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from(&path) {
                Ok(config) => {
                    return LoadedConfig {
                        config,
                        path: Some(path),
                        ignored,
                    }
                }
                Err(e) => ignored.push(e.to_string()),
            }
        }
        LoadedConfig {
            config: Self::default(),
            path: None,
            ignored,
        }
    }

    fn validate(&self) -> KeeperResult<()> {
        let m = &self.monitor;
        if m.progress_floor >= m.progress_ceiling || m.progress_ceiling >= 100 {
            return Err(KeeperError::Config(format!(
                "monitor progress range {}..{} must satisfy floor < ceiling < 100",
                m.progress_floor, m.progress_ceiling
            )));
        }
        for name in self.services.keys() {
            name.parse::<ClientKind>().map_err(KeeperError::Config)?;
        }
        Ok(())
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(paths::default_state_file)
    }

    pub fn service(&self, kind: ClientKind) -> ServiceConfig {
        self.services.get(kind.key()).cloned().unwrap_or_default()
    }

    /// Catalogue defaults with this machine's unit overrides applied
    pub fn managed_service(&self, kind: ClientKind) -> ManagedService {
        let overrides = self.service(kind);
        let mut service = ManagedService::new(kind);
        if let Some(unit) = overrides.unit {
            service.unit = unit;
        }
        if let Some(companions) = overrides.companions {
            service.companions = companions;
        }
        service
    }

    pub fn to_toml(&self) -> KeeperResult<String> {
        toml::to_string_pretty(self).map_err(|e| KeeperError::Config(e.to_string()))
    }
}

/// Result of config resolution
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: KeeperConfig,
    /// File the config came from, `None` for defaults
    pub path: Option<PathBuf>,
    /// Config files that exist but could not be used
    pub ignored: Vec<String>,
}

impl LoadedConfig {
    /// Log where the config came from and every file that was skipped
    pub fn report(&self, log: &Logger) {
        for reason in &self.ignored {
            warn!(parent: log.span(), "Ignoring config: {}", reason);
        }
        match &self.path {
            Some(path) => info!(parent: log.span(), "Loaded config from {}", path.display()),
            None if !self.ignored.is_empty() => warn!(parent: log.span(), "Using default config"),
            None => info!(parent: log.span(), "No config file found, using defaults"),
        }
    }
}

//! nodekeeper common - orchestration, probing, planning and monitoring for
//! Ethereum node services on one machine.
//!
//! The install pipeline runs as a resumable [`orchestrator::StepSequence`]
//! whose progress lands in a [`store::StateStore`] before every step. Once it
//! has completed, maintenance passes probe each service, plan one action per
//! service and verify the result with the Progress Monitor.

pub mod argv;
pub mod clients;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod monitor;
pub mod orchestrator;
pub mod paths;
pub mod planner;
pub mod probe;
pub mod rpc;
pub mod store;
pub mod systemd;
pub mod version;

pub use clients::{ClientKind, ManagedService, Network, ServiceRole, UpgradeTarget};
pub use config::{KeeperConfig, LoadedConfig};
pub use context::{Context, ContextKey};
pub use error::{KeeperError, KeeperResult};
pub use logging::Logger;
pub use orchestrator::{Orchestrator, RunOutcome, Step, StepOutcome, StepSequence};
pub use planner::{plan, MaintenanceAction, PlanPolicy};
pub use probe::{ServiceProbe, ServiceSnapshot};
pub use store::{FileStateStore, MemoryStateStore, PersistedState, StateStore};
pub use version::{Version, VersionInfo};

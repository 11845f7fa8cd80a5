//! nodekeeperctl - installs and maintains Ethereum node services
//!
//! The binary is a thin `main`; everything lives here so integration tests
//! can drive the install pipeline and maintenance passes with fakes.

pub mod app;
pub mod commands;
pub mod errors;
pub mod keys;
pub mod progress;
pub mod prompt;
pub mod steps;

pub use app::{App, HostVersionSource, VersionSource};
pub use progress::{HostMonitorTargets, InteractiveVerifier, MonitorTargets, ProgressView};
pub use prompt::{ConsolePrompter, FailureChoice, Prompter, ScriptedPrompter, VerificationChoice};

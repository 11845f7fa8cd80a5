//! Context keys of the install pipeline

use nodekeeper_common::{ContextKey, Network};

pub const NETWORK: ContextKey<Network> = ContextKey::new("network");
pub const USE_BOOSTER: ContextKey<bool> = ContextKey::new("useBooster");
pub const EXECUTION_INSTALLED: ContextKey<bool> = ContextKey::new("executionInstalled");
pub const CONSENSUS_INSTALLED: ContextKey<bool> = ContextKey::new("consensusInstalled");
pub const BOOSTER_INSTALLED: ContextKey<bool> = ContextKey::new("boosterInstalled");
pub const SERVICES_STARTED: ContextKey<bool> = ContextKey::new("servicesStarted");
/// Services the operator accepted without seeing them healthy
pub const UNVERIFIED: ContextKey<Vec<String>> = ContextKey::new("unverifiedServices");
pub const COMPLETED_AT: ContextKey<String> = ContextKey::new("completedAt");

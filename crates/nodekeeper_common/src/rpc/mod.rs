//! HTTP clients for the managed services and the release feed
//!
//! All clients are blocking `reqwest` clients with a per-request timeout.
//! Callers decide what a failure means: the probe turns it into "unknown",
//! the monitor logs it and polls again, and lookups that need a definite
//! answer go through [`retry_with_backoff`].

pub mod beacon;
pub mod booster;
pub mod execution;
pub mod release;

pub use beacon::{BeaconApi, NodeSyncing, PeerCount};
pub use booster::BoosterApi;
pub use execution::{ExecutionRpc, SyncStatus};
pub use release::GithubReleaseFeed;

use crate::error::KeeperResult;
use crate::logging::Logger;
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::warn;

pub const USER_AGENT: &str = concat!("nodekeeper/", env!("CARGO_PKG_VERSION"));

/// Blocking client with the given per-request timeout
pub fn http_client(timeout: Duration) -> KeeperResult<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()?)
}

/// Bounded retry with growing delay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Same delay between every attempt
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            initial_delay: delay,
            multiplier: 1,
            max_delay: delay,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempts run out. The last error is returned.
pub fn retry_with_backoff<T>(
    policy: &RetryPolicy,
    log: &Logger,
    what: &str,
    mut op: impl FnMut() -> KeeperResult<T>,
) -> KeeperResult<T> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    parent: log.span(),
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    what, attempt, attempts, e, delay
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Deserialize a `u64` sent either as a JSON number or as a decimal string,
/// as the beacon API does
pub(crate) fn de_u64_flexible<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(D::Error::custom),
    }
}

//! Progress Monitor
//!
//! Polls one service until it is healthy or the operator cancels. Each
//! iteration tails the service log, runs the status queries, recomputes the
//! percentage and pushes everything through [`ProgressUi`]. There is no
//! wall-clock timeout.
//!
//! [`spawn_monitor`] runs the loop on a worker thread. The worker is the only
//! writer of progress, log and result; the UI is the only writer of the
//! cancel flag.

pub mod logs;
pub mod queries;
pub mod shared;

pub use logs::{JournalLogSource, LogBatch, LogCursor, LogSource, MemoryLogSource};
pub use queries::{host_status_queries, BeaconSyncQuery, BoosterStatusQuery, ExecutionSyncQuery};
pub use shared::SharedProgress;

use crate::config::MonitorConfig;
use crate::error::{KeeperError, KeeperResult};
use crate::logging::Logger;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Granularity of the cancellation check while waiting between polls
const CANCEL_CHECK: Duration = Duration::from_millis(100);

/// Callbacks into whatever displays the progress
pub trait ProgressUi: Send + Sync {
    fn report_progress(&self, percentage: u8);
    fn append_log(&self, text: &str);
    fn set_status(&self, text: &str);
    fn set_result(&self, snapshot: &ProgressSnapshot);
    fn is_cancelled(&self) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInfo {
    pub is_syncing: bool,
    /// Current block or slot
    pub head: Option<u64>,
    pub target: Option<u64>,
    pub distance: Option<u64>,
}

/// One status query's answer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReading {
    pub healthy: bool,
    pub peer_count: Option<u64>,
    pub min_peers: Option<u64>,
    pub sync: Option<SyncInfo>,
    pub detail: String,
}

impl StatusReading {
    /// How far toward healthy, in `0.0..=1.0`
    fn readiness(&self) -> f64 {
        if self.healthy {
            return 1.0;
        }
        match (self.peer_count, self.min_peers) {
            (Some(peers), Some(min)) if min > 0 => (peers as f64 / min as f64).min(1.0),
            _ => 0.0,
        }
    }
}

pub trait StatusQuery: Send + Sync {
    fn name(&self) -> &str;
    fn poll(&self) -> KeeperResult<StatusReading>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub percentage: u8,
    pub is_healthy: bool,
    pub peer_count: Option<u64>,
    pub sync: Option<SyncInfo>,
    pub status: String,
    pub log_cursor: Option<LogCursor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorOutcome {
    Healthy,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    pub outcome: MonitorOutcome,
    /// Last computed snapshot
    pub snapshot: ProgressSnapshot,
}

impl MonitorReport {
    pub fn is_healthy(&self) -> bool {
        self.outcome == MonitorOutcome::Healthy
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub progress_floor: u8,
    pub progress_ceiling: u8,
}

impl MonitorSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            progress_floor: config.progress_floor,
            progress_ceiling: config.progress_ceiling,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

/// Snapshot from the latest reading of every query.
///
/// Healthy only when every query has answered healthy; with no queries there
/// is nothing to wait for. Otherwise the percentage moves from the floor to
/// the ceiling with the least ready query.
pub fn compute_snapshot(readings: &[Option<StatusReading>], settings: &MonitorSettings) -> ProgressSnapshot {
    let healthy = readings.iter().all(|r| r.as_ref().map_or(false, |r| r.healthy));

    let percentage = if healthy {
        100
    } else {
        let readiness = readings
            .iter()
            .map(|r| r.as_ref().map_or(0.0, StatusReading::readiness))
            .fold(1.0_f64, f64::min);
        let floor = f64::from(settings.progress_floor);
        let span = f64::from(settings.progress_ceiling.saturating_sub(settings.progress_floor));
        (floor + span * readiness).floor() as u8
    };

    let answered: Vec<&StatusReading> = readings.iter().flatten().collect();
    let status = if answered.is_empty() {
        "waiting for the service to answer".to_string()
    } else {
        answered
            .iter()
            .map(|r| r.detail.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    };

    ProgressSnapshot {
        percentage,
        is_healthy: healthy,
        peer_count: answered.iter().find_map(|r| r.peer_count),
        sync: answered.iter().find_map(|r| r.sync.clone()),
        status,
        log_cursor: None,
    }
}

/// Sleep for `duration` in short slices. Returns true if cancelled meanwhile.
fn sleep_unless_cancelled(duration: Duration, ui: &dyn ProgressUi) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if ui.is_cancelled() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(CANCEL_CHECK.min(deadline - now));
    }
}

/// Poll until healthy or cancelled
pub fn monitor(
    settings: &MonitorSettings,
    queries: &[Box<dyn StatusQuery>],
    logs: &mut dyn LogSource,
    ui: &dyn ProgressUi,
    log: &Logger,
) -> MonitorReport {
    let mut readings: Vec<Option<StatusReading>> = vec![None; queries.len()];
    let mut cursor: Option<LogCursor> = None;
    let mut snapshot = ProgressSnapshot {
        percentage: settings.progress_floor,
        ..ProgressSnapshot::default()
    };
    let mut iteration: u64 = 0;

    loop {
        if ui.is_cancelled() {
            info!(parent: log.span(), "Monitoring cancelled at {}%", snapshot.percentage);
            return MonitorReport {
                outcome: MonitorOutcome::Cancelled,
                snapshot,
            };
        }
        iteration += 1;

        match logs.fetch_since(cursor.as_ref()) {
            Ok(batch) => {
                for line in &batch.lines {
                    ui.append_log(line);
                }
                cursor = batch.cursor;
            }
            Err(e) => {
                warn!(parent: log.span(), "Cannot read service log: {}", e);
                ui.append_log(&format!("[nodekeeper] cannot read service log: {}", e));
            }
        }

        for (query, slot) in queries.iter().zip(readings.iter_mut()) {
            match query.poll() {
                Ok(reading) => *slot = Some(reading),
                Err(e) => {
                    debug!(parent: log.span(), "{} failed: {}", query.name(), e);
                    ui.append_log(&format!("[nodekeeper] {} failed: {}", query.name(), e));
                }
            }
        }

        snapshot = compute_snapshot(&readings, settings);
        snapshot.log_cursor = cursor.clone();

        ui.report_progress(snapshot.percentage);
        ui.set_status(&snapshot.status);
        ui.set_result(&snapshot);

        if snapshot.is_healthy {
            info!(parent: log.span(), "Service healthy after {} polls", iteration);
            return MonitorReport {
                outcome: MonitorOutcome::Healthy,
                snapshot,
            };
        }

        if sleep_unless_cancelled(settings.poll_interval, ui) {
            info!(parent: log.span(), "Monitoring cancelled at {}%", snapshot.percentage);
            return MonitorReport {
                outcome: MonitorOutcome::Cancelled,
                snapshot,
            };
        }
    }
}

/// Run [`monitor`] on a worker thread
pub fn spawn_monitor(
    settings: MonitorSettings,
    queries: Vec<Box<dyn StatusQuery>>,
    mut logs: Box<dyn LogSource>,
    ui: Arc<dyn ProgressUi>,
    log: &Logger,
) -> KeeperResult<JoinHandle<MonitorReport>> {
    let log = log.scoped("monitor");
    std::thread::Builder::new()
        .name("nodekeeper-monitor".to_string())
        .spawn(move || monitor(&settings, &queries, logs.as_mut(), ui.as_ref(), &log))
        .map_err(KeeperError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_millis(10),
            progress_floor: 10,
            progress_ceiling: 90,
        }
    }

    fn reading(peers: u64, min: u64, healthy: bool) -> Option<StatusReading> {
        Some(StatusReading {
            healthy,
            peer_count: Some(peers),
            min_peers: Some(min),
            sync: None,
            detail: format!("{} peers", peers),
        })
    }

    #[test]
    fn test_percentage_scales_with_peers() {
        let s = settings();
        assert_eq!(compute_snapshot(&[None], &s).percentage, 10);
        assert_eq!(compute_snapshot(&[reading(0, 10, false)], &s).percentage, 10);
        assert_eq!(compute_snapshot(&[reading(5, 10, false)], &s).percentage, 50);
        // peers reached but not yet healthy by the query's own rule
        assert_eq!(compute_snapshot(&[reading(20, 10, false)], &s).percentage, 90);
    }

    #[test]
    fn test_healthy_snaps_to_100() {
        let snap = compute_snapshot(&[reading(2, 10, true)], &settings());
        assert!(snap.is_healthy);
        assert_eq!(snap.percentage, 100);
        assert_eq!(snap.peer_count, Some(2));
    }

    #[test]
    fn test_all_queries_must_be_healthy() {
        let snap = compute_snapshot(&[reading(10, 10, true), None], &settings());
        assert!(!snap.is_healthy);
        assert_eq!(snap.percentage, 10);
    }

    #[test]
    fn test_no_queries_is_healthy() {
        assert!(compute_snapshot(&[], &settings()).is_healthy);
    }
}

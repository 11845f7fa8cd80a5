//! Health and sync queries for each service role

use super::{StatusQuery, StatusReading, SyncInfo};
use crate::clients::ClientKind;
use crate::config::{EndpointConfig, MonitorConfig};
use crate::error::KeeperResult;
use crate::rpc::{BeaconApi, BoosterApi, ExecutionRpc, NodeSyncing, SyncStatus};

/// Execution client: healthy once syncing has started or enough peers are
/// connected
pub struct ExecutionSyncQuery {
    rpc: ExecutionRpc,
    min_peers: u64,
}

impl ExecutionSyncQuery {
    pub fn new(rpc: ExecutionRpc, min_peers: u64) -> Self {
        Self { rpc, min_peers }
    }
}

/// Reading for an execution client from its two RPC answers
pub fn execution_reading(status: &SyncStatus, peers: u64, min_peers: u64) -> StatusReading {
    let sync = match status {
        SyncStatus::NotSyncing => SyncInfo {
            is_syncing: false,
            head: None,
            target: None,
            distance: None,
        },
        SyncStatus::Syncing {
            current_block,
            highest_block,
            ..
        } => SyncInfo {
            is_syncing: true,
            head: Some(*current_block),
            target: Some(*highest_block),
            distance: Some(highest_block.saturating_sub(*current_block)),
        },
    };

    let healthy = status.is_syncing() || peers >= min_peers;
    let detail = match status {
        SyncStatus::Syncing {
            current_block,
            highest_block,
            ..
        } => format!(
            "syncing block {}/{} ({:.1}%), {} peers",
            current_block,
            highest_block,
            status.fraction().unwrap_or(0.0) * 100.0,
            peers
        ),
        SyncStatus::NotSyncing => format!("{} peers, waiting for sync to start", peers),
    };

    StatusReading {
        healthy,
        peer_count: Some(peers),
        min_peers: Some(min_peers),
        sync: Some(sync),
        detail,
    }
}

impl StatusQuery for ExecutionSyncQuery {
    fn name(&self) -> &str {
        "execution sync"
    }

    fn poll(&self) -> KeeperResult<StatusReading> {
        let status = self.rpc.sync_status()?;
        let peers = self.rpc.peer_count()?;
        Ok(execution_reading(&status, peers, self.min_peers))
    }
}

/// Beacon node: healthy when syncing, or when it reports a sync distance
/// with enough peers connected
pub struct BeaconSyncQuery {
    api: BeaconApi,
    min_peers: u64,
}

impl BeaconSyncQuery {
    pub fn new(api: BeaconApi, min_peers: u64) -> Self {
        Self { api, min_peers }
    }
}

pub fn beacon_reading(syncing: &NodeSyncing, peers: u64, min_peers: u64) -> StatusReading {
    let healthy = syncing.is_syncing || peers >= min_peers;
    let detail = if syncing.is_syncing {
        format!(
            "syncing slot {} ({} behind), {} peers",
            syncing.head_slot, syncing.sync_distance, peers
        )
    } else {
        format!("head slot {}, {} peers", syncing.head_slot, peers)
    };

    StatusReading {
        healthy,
        peer_count: Some(peers),
        min_peers: Some(min_peers),
        sync: Some(SyncInfo {
            is_syncing: syncing.is_syncing,
            head: Some(syncing.head_slot),
            target: syncing.head_slot.checked_add(syncing.sync_distance),
            distance: Some(syncing.sync_distance),
        }),
        detail,
    }
}

impl StatusQuery for BeaconSyncQuery {
    fn name(&self) -> &str {
        "beacon sync"
    }

    fn poll(&self) -> KeeperResult<StatusReading> {
        let syncing = self.api.syncing()?;
        let peers = self.api.peer_count()?;
        Ok(beacon_reading(&syncing, peers.connected, self.min_peers))
    }
}

/// MEV-Boost: healthy when the builder status endpoint answers 200
pub struct BoosterStatusQuery {
    api: BoosterApi,
}

impl BoosterStatusQuery {
    pub fn new(api: BoosterApi) -> Self {
        Self { api }
    }
}

impl StatusQuery for BoosterStatusQuery {
    fn name(&self) -> &str {
        "booster status"
    }

    fn poll(&self) -> KeeperResult<StatusReading> {
        let healthy = self.api.status()?;
        Ok(StatusReading {
            healthy,
            detail: if healthy {
                "relays reachable".to_string()
            } else {
                "no relay reachable".to_string()
            },
            ..StatusReading::default()
        })
    }
}

/// The status queries that decide when `kind` is healthy
pub fn host_status_queries(
    kind: ClientKind,
    endpoints: &EndpointConfig,
    monitor: &MonitorConfig,
) -> KeeperResult<Vec<Box<dyn StatusQuery>>> {
    let timeout = endpoints.request_timeout();
    let query: Box<dyn StatusQuery> = match kind {
        ClientKind::Geth => Box::new(ExecutionSyncQuery::new(
            ExecutionRpc::new(endpoints.execution_rpc.clone(), timeout)?,
            u64::from(monitor.execution_min_peers),
        )),
        ClientKind::Lighthouse => Box::new(BeaconSyncQuery::new(
            BeaconApi::new(endpoints.beacon_api.clone(), timeout)?,
            u64::from(monitor.consensus_min_peers),
        )),
        ClientKind::MevBoost => Box::new(BoosterStatusQuery::new(BoosterApi::new(
            endpoints.booster_api.clone(),
            timeout,
        )?)),
    };
    Ok(vec![query])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_healthy_when_syncing() {
        let status = SyncStatus::Syncing {
            starting_block: 0,
            current_block: 10,
            highest_block: 100,
        };
        let reading = execution_reading(&status, 0, 3);
        assert!(reading.healthy);
        assert_eq!(reading.detail, "syncing block 10/100 (10.0%), 0 peers");
        assert_eq!(reading.sync.unwrap().distance, Some(90));
    }

    #[test]
    fn test_execution_needs_peers_before_sync() {
        assert!(!execution_reading(&SyncStatus::NotSyncing, 2, 3).healthy);
        assert!(execution_reading(&SyncStatus::NotSyncing, 3, 3).healthy);
    }

    #[test]
    fn test_beacon_reading() {
        let synced = NodeSyncing {
            head_slot: 500,
            sync_distance: 0,
            is_syncing: false,
            ..NodeSyncing::default()
        };
        assert!(!beacon_reading(&synced, 4, 10).healthy);
        assert!(beacon_reading(&synced, 12, 10).healthy);

        let syncing = NodeSyncing {
            is_syncing: true,
            sync_distance: 30,
            ..synced
        };
        let reading = beacon_reading(&syncing, 0, 10);
        assert!(reading.healthy);
        assert_eq!(reading.sync.unwrap().target, Some(530));
    }

    #[test]
    fn test_beacon_reading_with_absurd_distance() {
        let syncing = NodeSyncing {
            head_slot: u64::MAX,
            sync_distance: 1,
            is_syncing: true,
            ..NodeSyncing::default()
        };
        let sync = beacon_reading(&syncing, 0, 10).sync.unwrap();
        assert_eq!(sync.target, None);
        assert_eq!(sync.head, Some(u64::MAX));
    }
}

//! Beacon node REST API (standard `/eth/v1/node/*` endpoints)

use super::{de_u64_flexible, http_client};
use crate::error::{KeeperError, KeeperResult};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every endpoint wraps its payload in `{"data": ...}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct NodeVersion {
    version: String,
}

/// `/eth/v1/node/syncing`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSyncing {
    #[serde(deserialize_with = "de_u64_flexible")]
    pub head_slot: u64,
    #[serde(deserialize_with = "de_u64_flexible")]
    pub sync_distance: u64,
    pub is_syncing: bool,
    #[serde(default)]
    pub is_optimistic: Option<bool>,
    #[serde(default)]
    pub el_offline: Option<bool>,
}

/// `/eth/v1/node/peer_count`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCount {
    #[serde(deserialize_with = "de_u64_flexible")]
    pub connected: u64,
    #[serde(default, deserialize_with = "de_u64_flexible")]
    pub connecting: u64,
    #[serde(default, deserialize_with = "de_u64_flexible")]
    pub disconnected: u64,
}

pub struct BeaconApi {
    client: Client,
    base_url: String,
}

impl BeaconApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> KeeperResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> KeeperResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(KeeperError::Rpc(format!("GET {} returned HTTP {}", path, response.status())));
        }
        let envelope: Envelope<T> = response.json()?;
        Ok(envelope.data)
    }

    /// Raw version string, e.g. `Lighthouse/v2.1.5-2a7ec3f/x86_64-linux`
    pub fn node_version(&self) -> KeeperResult<String> {
        self.get::<NodeVersion>("/eth/v1/node/version").map(|v| v.version)
    }

    pub fn syncing(&self) -> KeeperResult<NodeSyncing> {
        self.get("/eth/v1/node/syncing")
    }

    pub fn peer_count(&self) -> KeeperResult<PeerCount> {
        self.get("/eth/v1/node/peer_count")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_syncing() {
        let body = r#"{"data":{"head_slot":"4512","sync_distance":"120","is_syncing":true,"is_optimistic":false}}"#;
        let parsed: Envelope<NodeSyncing> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.head_slot, 4512);
        assert_eq!(parsed.data.sync_distance, 120);
        assert!(parsed.data.is_syncing);
        assert_eq!(parsed.data.el_offline, None);
    }

    #[test]
    fn test_decode_peer_count() {
        let body = r#"{"data":{"disconnected":"12","connecting":"1","connected":"56","disconnecting":"0"}}"#;
        let parsed: Envelope<PeerCount> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.connected, 56);
        assert_eq!(parsed.data.connecting, 1);
    }

    #[test]
    fn test_decode_version() {
        let body = r#"{"data":{"version":"Lighthouse/v2.1.5-2a7ec3f/x86_64-linux"}}"#;
        let parsed: Envelope<NodeVersion> = serde_json::from_str(body).unwrap();
        assert!(parsed.data.version.starts_with("Lighthouse/"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let api = BeaconApi::new("http://127.0.0.1:5052/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.base_url, "http://127.0.0.1:5052");
    }
}

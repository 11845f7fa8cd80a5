//! Execution client JSON-RPC (`eth_syncing`, `net_peerCount`,
//! `web3_clientVersion`)

use super::http_client;
use crate::error::{KeeperError, KeeperResult};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// `eth_syncing` answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// `false`: synced, or not started
    NotSyncing,
    Syncing {
        starting_block: u64,
        current_block: u64,
        highest_block: u64,
    },
}

impl SyncStatus {
    pub fn from_result(result: &Value) -> KeeperResult<Self> {
        match result {
            Value::Bool(false) => Ok(SyncStatus::NotSyncing),
            Value::Object(obj) => {
                let field = |name: &str| -> KeeperResult<u64> {
                    match obj.get(name) {
                        Some(Value::String(s)) => parse_hex_u64(s),
                        Some(Value::Number(n)) => n
                            .as_u64()
                            .ok_or_else(|| KeeperError::Rpc(format!("bad {}: {}", name, n))),
                        _ => Ok(0),
                    }
                };
                Ok(SyncStatus::Syncing {
                    starting_block: field("startingBlock")?,
                    current_block: field("currentBlock")?,
                    highest_block: field("highestBlock")?,
                })
            }
            other => Err(KeeperError::Rpc(format!("unexpected eth_syncing result: {}", other))),
        }
    }

    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncStatus::Syncing { .. })
    }

    /// Fraction of blocks processed, `None` when not syncing
    pub fn fraction(&self) -> Option<f64> {
        match self {
            SyncStatus::Syncing {
                current_block,
                highest_block,
                ..
            } if *highest_block > 0 => Some((*current_block as f64 / *highest_block as f64).min(1.0)),
            _ => None,
        }
    }
}

/// `0x1a` → 26
pub fn parse_hex_u64(text: &str) -> KeeperResult<u64> {
    let digits = text
        .trim()
        .strip_prefix("0x")
        .ok_or_else(|| KeeperError::Rpc(format!("not a hex quantity: {}", text)))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16).map_err(|e| KeeperError::Rpc(format!("bad quantity {}: {}", text, e)))
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

pub struct ExecutionRpc {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl ExecutionRpc {
    pub fn new(url: impl Into<String>, timeout: Duration) -> KeeperResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    fn call_raw(&self, method: &str, params: Value) -> KeeperResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let response = self.client.post(&self.url).json(&body).send()?;
        if !response.status().is_success() {
            return Err(KeeperError::Rpc(format!("{} returned HTTP {}", method, response.status())));
        }

        let parsed: RpcResponse = response.json()?;
        if let Some(err) = parsed.error {
            return Err(KeeperError::Rpc(format!("{} error {}: {}", method, err.code, err.message)));
        }
        parsed
            .result
            .ok_or_else(|| KeeperError::Rpc(format!("{} returned no result", method)))
    }

    fn call<T: DeserializeOwned>(&self, method: &str) -> KeeperResult<T> {
        let value = self.call_raw(method, json!([]))?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn sync_status(&self) -> KeeperResult<SyncStatus> {
        SyncStatus::from_result(&self.call_raw("eth_syncing", json!([]))?)
    }

    pub fn peer_count(&self) -> KeeperResult<u64> {
        let hex: String = self.call("net_peerCount")?;
        parse_hex_u64(&hex)
    }

    pub fn client_version(&self) -> KeeperResult<String> {
        self.call("web3_clientVersion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u64("0x1a").unwrap(), 26);
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert!(parse_hex_u64("26").is_err());
    }

    #[test]
    fn test_sync_status_false() {
        assert_eq!(SyncStatus::from_result(&json!(false)).unwrap(), SyncStatus::NotSyncing);
    }

    #[test]
    fn test_sync_status_object() {
        let status = SyncStatus::from_result(&json!({
            "startingBlock": "0x0",
            "currentBlock": "0x64",
            "highestBlock": "0xc8",
        }))
        .unwrap();
        assert!(status.is_syncing());
        assert_eq!(status.fraction(), Some(0.5));
    }

    #[test]
    fn test_sync_status_garbage() {
        assert!(SyncStatus::from_result(&json!("yes")).is_err());
    }
}

//! MEV-Boost builder API status

use super::http_client;
use crate::error::KeeperResult;
use reqwest::blocking::Client;
use std::time::Duration;

pub struct BoosterApi {
    client: Client,
    base_url: String,
}

impl BoosterApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> KeeperResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// `GET /eth/v1/builder/status`; 200 means at least one relay is reachable
    pub fn status(&self) -> KeeperResult<bool> {
        let url = format!("{}/eth/v1/builder/status", self.base_url);
        let response = self.client.get(&url).send()?;
        Ok(response.status().is_success())
    }
}

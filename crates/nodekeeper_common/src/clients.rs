//! Client catalogue
//!
//! The services nodekeeper manages and the facts the probe and planner need
//! about each: systemd units, the flag that marks a merge-ready
//! (JWT-authenticated engine API) configuration, the first merge-ready
//! release, and which version an upgrade aims for.

use crate::version::{Version, VersionInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ethereum network the node follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Holesky,
    Sepolia,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Mainnet, Network::Holesky, Network::Sepolia];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Holesky => "holesky",
            Network::Sepolia => "sepolia",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "holesky" => Ok(Network::Holesky),
            "sepolia" => Ok(Network::Sepolia),
            other => Err(format!("unknown network '{}'", other)),
        }
    }
}

/// What a service does in the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    Execution,
    Consensus,
    Booster,
}

/// Which version an upgrade aims for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeTarget {
    /// Newest build in the local package index
    Available,
    /// Newest upstream release
    Latest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientKind {
    Geth,
    Lighthouse,
    MevBoost,
}

impl ClientKind {
    pub const ALL: [ClientKind; 3] = [ClientKind::Geth, ClientKind::Lighthouse, ClientKind::MevBoost];

    pub fn role(&self) -> ServiceRole {
        match self {
            ClientKind::Geth => ServiceRole::Execution,
            ClientKind::Lighthouse => ServiceRole::Consensus,
            ClientKind::MevBoost => ServiceRole::Booster,
        }
    }

    /// Config table name, e.g. `[services.mev-boost]`
    pub fn key(&self) -> &'static str {
        match self {
            ClientKind::Geth => "geth",
            ClientKind::Lighthouse => "lighthouse",
            ClientKind::MevBoost => "mev-boost",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ClientKind::Geth => "Geth",
            ClientKind::Lighthouse => "Lighthouse",
            ClientKind::MevBoost => "MEV-Boost",
        }
    }

    pub fn binary(&self) -> &'static str {
        match self {
            ClientKind::Geth => "geth",
            ClientKind::Lighthouse => "lighthouse",
            ClientKind::MevBoost => "mev-boost",
        }
    }

    pub fn default_unit(&self) -> &'static str {
        match self {
            ClientKind::Geth => "geth.service",
            ClientKind::Lighthouse => "lighthousebeacon.service",
            ClientKind::MevBoost => "mevboost.service",
        }
    }

    /// Units started and restarted together with the primary unit
    pub fn default_companions(&self) -> &'static [&'static str] {
        match self {
            ClientKind::Lighthouse => &["lighthousevalidator.service"],
            _ => &[],
        }
    }

    /// Flag whose presence on the live command line means the merge
    /// configuration is in place
    pub fn merge_flag(&self) -> Option<&'static str> {
        match self {
            ClientKind::Geth => Some("--authrpc.jwtsecret"),
            ClientKind::Lighthouse => Some("--execution-jwt"),
            ClientKind::MevBoost => None,
        }
    }

    /// First release that supports the authenticated engine API
    pub fn merge_ready_threshold(&self) -> Option<Version> {
        match self {
            ClientKind::Geth => Some(Version::new(1, 10, 17)),
            ClientKind::Lighthouse => Some(Version::new(2, 1, 0)),
            ClientKind::MevBoost => None,
        }
    }

    pub fn upgrade_target(&self) -> UpgradeTarget {
        match self.role() {
            ServiceRole::Execution => UpgradeTarget::Available,
            ServiceRole::Consensus | ServiceRole::Booster => UpgradeTarget::Latest,
        }
    }

    /// Package name in the local package index, for clients installed that way
    pub fn package_name(&self) -> Option<&'static str> {
        match self {
            ClientKind::Geth => Some("geth"),
            _ => None,
        }
    }

    /// `owner/repo` of the upstream release feed
    pub fn release_repo(&self) -> &'static str {
        match self {
            ClientKind::Geth => "ethereum/go-ethereum",
            ClientKind::Lighthouse => "sigp/lighthouse",
            ClientKind::MevBoost => "flashbots/mev-boost",
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ClientKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "geth" => Ok(ClientKind::Geth),
            "lighthouse" => Ok(ClientKind::Lighthouse),
            "mev-boost" | "mevboost" => Ok(ClientKind::MevBoost),
            other => Err(format!("unknown client '{}'", other)),
        }
    }
}

/// One managed service as configured on this machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedService {
    pub kind: ClientKind,
    pub unit: String,
    #[serde(default)]
    pub companions: Vec<String>,
}

impl ManagedService {
    pub fn new(kind: ClientKind) -> Self {
        Self {
            kind,
            unit: kind.default_unit().to_string(),
            companions: kind
                .default_companions()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn role(&self) -> ServiceRole {
        self.kind.role()
    }

    /// Primary unit first, then companions
    pub fn units(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.unit.as_str()).chain(self.companions.iter().map(String::as_str))
    }

    pub fn merge_ready_threshold(&self) -> VersionInfo {
        self.kind.merge_ready_threshold().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_and_targets() {
        assert_eq!(ClientKind::Geth.upgrade_target(), UpgradeTarget::Available);
        assert_eq!(ClientKind::Lighthouse.upgrade_target(), UpgradeTarget::Latest);
        assert_eq!(ClientKind::MevBoost.role(), ServiceRole::Booster);
    }

    #[test]
    fn test_lighthouse_units() {
        let svc = ManagedService::new(ClientKind::Lighthouse);
        let units: Vec<&str> = svc.units().collect();
        assert_eq!(units, vec!["lighthousebeacon.service", "lighthousevalidator.service"]);
    }

    #[test]
    fn test_booster_has_no_merge_threshold() {
        assert!(ManagedService::new(ClientKind::MevBoost)
            .merge_ready_threshold()
            .is_unknown());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("MevBoost".parse::<ClientKind>().unwrap(), ClientKind::MevBoost);
        assert_eq!("Holesky".parse::<Network>().unwrap(), Network::Holesky);
        assert!("goerli".parse::<Network>().is_err());
    }
}

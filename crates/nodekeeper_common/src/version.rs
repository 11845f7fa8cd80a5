//! Client version parsing and comparison
//!
//! Every probe answer is a [`VersionInfo`]: either a parsed [`Version`] or
//! `Unknown`. Ordering predicates on `VersionInfo` are false whenever either
//! side is unknown, so a rule gated on a comparison simply does not fire when
//! data is missing.
//!
//! Each tool prints its version differently; there is one parser per format
//! in [`parse`].

use crate::error::{KeeperError, KeeperResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// `major.minor.patch` with an optional pre-release tag.
///
/// Build metadata, git commit suffixes and geth's `-stable` marker are
/// dropped while parsing; they do not order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<String>,
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"v?(\d+)\.(\d+)(?:\.(\d+))?(?:-([0-9A-Za-z.\-]+))?(?:\+[0-9A-Za-z.+\-]*)?")
            .expect("version regex is valid")
    })
}

fn is_commit_hash(s: &str) -> bool {
    s.len() >= 7 && s.chars().all(|c| c.is_ascii_hexdigit())
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    /// Parse the first version-looking token in `text`
    pub fn parse(text: &str) -> KeeperResult<Self> {
        let caps = version_regex()
            .captures(text)
            .ok_or_else(|| KeeperError::VersionParse(text.trim().to_string()))?;

        let number = |i: usize| -> KeeperResult<u64> {
            match caps.get(i) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| KeeperError::VersionParse(text.trim().to_string())),
                None => Ok(0),
            }
        };

        let pre = caps.get(4).and_then(|m| {
            let kept: Vec<&str> = m
                .as_str()
                .split('-')
                .filter(|part| !part.is_empty() && *part != "stable" && !is_commit_hash(part))
                .collect();
            if kept.is_empty() {
                None
            } else {
                Some(kept.join("-"))
            }
        });

        Ok(Self {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            pre,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            })
    }
}

/// Dot-separated identifiers; numeric ones compare as numbers and sort
/// before alphanumeric ones, so `rc.9 < rc.10`
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        let ordering = match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                (Ok(_), Err(_)) => Ordering::Less,
                (Err(_), Ok(_)) => Ordering::Greater,
                (Err(_), Err(_)) => x.cmp(y),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Version {
    type Err = KeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

/// A probed version, or the fact that it could not be determined
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionInfo {
    Known(Version),
    #[default]
    Unknown,
}

impl VersionInfo {
    pub fn known(&self) -> Option<&Version> {
        match self {
            VersionInfo::Known(v) => Some(v),
            VersionInfo::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, VersionInfo::Unknown)
    }

    /// `self < other`; false if either is unknown
    pub fn is_older_than(&self, other: &VersionInfo) -> bool {
        match (self.known(), other.known()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    /// `self >= other`; false if either is unknown
    pub fn is_at_least(&self, other: &VersionInfo) -> bool {
        match (self.known(), other.known()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }
}

impl From<Version> for VersionInfo {
    fn from(v: Version) -> Self {
        VersionInfo::Known(v)
    }
}

impl From<Option<Version>> for VersionInfo {
    fn from(v: Option<Version>) -> Self {
        v.map(VersionInfo::Known).unwrap_or(VersionInfo::Unknown)
    }
}

impl<E> From<Result<Version, E>> for VersionInfo {
    fn from(v: Result<Version, E>) -> Self {
        v.ok().into()
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionInfo::Known(v) => write!(f, "{}", v),
            VersionInfo::Unknown => write!(f, "unknown"),
        }
    }
}

/// Parsers for each tool's version output
pub mod parse {
    use super::Version;
    use crate::error::{KeeperError, KeeperResult};

    fn err(text: &str) -> KeeperError {
        KeeperError::VersionParse(text.trim().to_string())
    }

    /// Value of the first `Key: value` line
    fn field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
        text.lines().find_map(|line| {
            let (k, v) = line.trim().split_once(':')?;
            (k.trim() == key).then(|| v.trim())
        })
    }

    /// `geth version` prints a block with a `Version: 1.10.17-stable` line
    pub fn geth_cli(output: &str) -> KeeperResult<Version> {
        let value = field(output, "Version").ok_or_else(|| err(output))?;
        Version::parse(value)
    }

    /// `web3_clientVersion`, e.g. `Geth/v1.10.17-stable-25c9b49f/linux-amd64/go1.18`
    pub fn geth_client_version(value: &str) -> KeeperResult<Version> {
        let mut parts = value.trim().split('/');
        match (parts.next(), parts.next()) {
            (Some(name), Some(version)) if name.eq_ignore_ascii_case("geth") => {
                Version::parse(version)
            }
            _ => Err(err(value)),
        }
    }

    /// `lighthouse --version`, first line `Lighthouse v2.1.5-2a7ec3f`
    pub fn lighthouse_cli(output: &str) -> KeeperResult<Version> {
        let line = output
            .lines()
            .find(|l| l.trim_start().starts_with("Lighthouse"))
            .ok_or_else(|| err(output))?;
        let token = line.split_whitespace().nth(1).ok_or_else(|| err(output))?;
        Version::parse(token)
    }

    /// Beacon `/eth/v1/node/version`, e.g. `Lighthouse/v2.1.5-2a7ec3f/x86_64-linux`
    pub fn lighthouse_node_version(value: &str) -> KeeperResult<Version> {
        let mut parts = value.trim().split('/');
        match (parts.next(), parts.next()) {
            (Some(name), Some(version)) if name.eq_ignore_ascii_case("lighthouse") => {
                Version::parse(version)
            }
            _ => Err(err(value)),
        }
    }

    /// `mev-boost -version`, e.g. `mev-boost v1.4.0`
    pub fn mev_boost_cli(output: &str) -> KeeperResult<Version> {
        let token = output
            .split_whitespace()
            .find(|t| t.starts_with('v') && t[1..].starts_with(|c: char| c.is_ascii_digit()))
            .or_else(|| {
                output
                    .split_whitespace()
                    .find(|t| t.starts_with(|c: char| c.is_ascii_digit()))
            })
            .ok_or_else(|| err(output))?;
        Version::parse(token)
    }

    /// `apt-cache policy <pkg>` candidate line, e.g. `Candidate: 1.10.17+build27856+focal`
    pub fn apt_candidate(output: &str) -> KeeperResult<Version> {
        let value = field(output, "Candidate").ok_or_else(|| err(output))?;
        if value == "(none)" {
            return Err(err(output));
        }
        Version::parse(value)
    }

    /// Release feed tag, e.g. `v1.10.17`
    pub fn release_tag(tag: &str) -> KeeperResult<Version> {
        Version::parse(tag.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_plain() {
        assert_eq!(v("1.10.17"), Version::new(1, 10, 17));
        assert_eq!(v("v2.1.0"), Version::new(2, 1, 0));
        assert_eq!(v("4.2"), Version::new(4, 2, 0));
    }

    #[test]
    fn test_parse_drops_stable_and_commit() {
        assert_eq!(v("1.10.17-stable"), Version::new(1, 10, 17));
        assert_eq!(v("1.10.17-stable-25c9b49f"), Version::new(1, 10, 17));
        assert_eq!(v("v2.1.5-2a7ec3f"), Version::new(2, 1, 5));
        assert_eq!(v("1.10.17+build27856+focal"), Version::new(1, 10, 17));
    }

    #[test]
    fn test_prerelease_orders_before_release() {
        let rc = v("2.2.0-rc.0");
        assert_eq!(rc.pre.as_deref(), Some("rc.0"));
        assert!(rc < v("2.2.0"));
        assert!(rc > v("2.1.9"));
        assert!(v("1.10.18-unstable") < v("1.10.18"));
    }

    #[test]
    fn test_prerelease_numbers_compare_numerically() {
        assert!(v("5.0.0-rc.9") < v("5.0.0-rc.10"));
        assert!(v("5.0.0-beta.2") < v("5.0.0-rc.1"));
        assert!(v("5.0.0-rc") < v("5.0.0-rc.1"));
        assert!(v("5.0.0-rc.1") < v("5.0.0-rc.build"));
        assert_eq!(v("5.0.0-rc.3").cmp(&v("5.0.0-rc.3")), Ordering::Equal);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(Version::parse("no version here").is_err());
    }

    #[test]
    fn test_unknown_never_orders() {
        let known = VersionInfo::from(v("1.0.0"));
        let unknown = VersionInfo::Unknown;
        assert!(!unknown.is_older_than(&known));
        assert!(!known.is_older_than(&unknown));
        assert!(!unknown.is_at_least(&known));
        assert!(!known.is_at_least(&unknown));
        assert!(!unknown.is_at_least(&unknown));
    }

    #[test]
    fn test_known_ordering() {
        let a = VersionInfo::from(v("1.10.16"));
        let b = VersionInfo::from(v("1.10.17"));
        assert!(a.is_older_than(&b));
        assert!(b.is_at_least(&a));
        assert!(b.is_at_least(&b));
        assert!(!b.is_older_than(&b));
    }

    #[test]
    fn test_geth_outputs() {
        let cli = "Geth\nVersion: 1.10.17-stable\nGit Commit: 25c9b49fdb\nArchitecture: amd64\n";
        assert_eq!(parse::geth_cli(cli).unwrap(), Version::new(1, 10, 17));
        assert_eq!(
            parse::geth_client_version("Geth/v1.10.17-stable-25c9b49f/linux-amd64/go1.18").unwrap(),
            Version::new(1, 10, 17)
        );
        assert!(parse::geth_client_version("Nethermind/v1.12.0").is_err());
    }

    #[test]
    fn test_lighthouse_outputs() {
        let cli = "Lighthouse v2.1.5-2a7ec3f\nBLS library: blst-modern\nSHA256 hardware acceleration: true\n";
        assert_eq!(parse::lighthouse_cli(cli).unwrap(), Version::new(2, 1, 5));
        assert_eq!(
            parse::lighthouse_node_version("Lighthouse/v2.1.5-2a7ec3f/x86_64-linux").unwrap(),
            Version::new(2, 1, 5)
        );
    }

    #[test]
    fn test_mev_boost_output() {
        assert_eq!(parse::mev_boost_cli("mev-boost v1.4.0\n").unwrap(), Version::new(1, 4, 0));
        assert_eq!(parse::mev_boost_cli("1.3.2").unwrap(), Version::new(1, 3, 2));
    }

    #[test]
    fn test_apt_candidate() {
        let policy = "geth:\n  Installed: 1.10.16+build27770+focal\n  Candidate: 1.10.17+build27856+focal\n  Version table:\n";
        assert_eq!(parse::apt_candidate(policy).unwrap(), Version::new(1, 10, 17));
        assert!(parse::apt_candidate("geth:\n  Installed: (none)\n  Candidate: (none)\n").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(v("v2.2.0-rc.1").to_string(), "2.2.0-rc.1");
        assert_eq!(VersionInfo::Unknown.to_string(), "unknown");
    }
}

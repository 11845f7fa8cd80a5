//! Upstream release feed (GitHub `releases/latest`)

use super::{http_client, retry_with_backoff, RetryPolicy};
use crate::error::{KeeperError, KeeperResult};
use crate::logging::Logger;
use crate::version::{parse, Version};
use reqwest::blocking::Client;
use std::time::Duration;

pub const GITHUB_API: &str = "https://api.github.com";

/// GitHub API response for releases
#[derive(Debug, serde::Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
}

pub struct GithubReleaseFeed {
    client: Client,
    api_base: String,
    retry: RetryPolicy,
    log: Logger,
}

impl GithubReleaseFeed {
    pub fn new(timeout: Duration, log: &Logger) -> KeeperResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_base: GITHUB_API.to_string(),
            retry: RetryPolicy::default(),
            log: log.scoped("release-feed"),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn fetch_tag(&self, repo: &str) -> KeeperResult<String> {
        let url = format!("{}/repos/{}/releases/latest", self.api_base, repo);
        let response = self.client.get(&url).send()?;

        if !response.status().is_success() {
            return Err(KeeperError::Rpc(format!(
                "GitHub API error for {}: {}",
                repo,
                response.status()
            )));
        }

        let release: GitHubRelease = response.json()?;
        if release.draft || release.prerelease {
            return Err(KeeperError::VersionParse(format!(
                "latest release of {} is not a final release: {}",
                repo, release.tag_name
            )));
        }
        Ok(release.tag_name)
    }

    /// Latest published version of `owner/repo`
    pub fn latest(&self, repo: &str) -> KeeperResult<Version> {
        let what = format!("release lookup for {}", repo);
        let tag = retry_with_backoff(&self.retry, &self.log, &what, || self.fetch_tag(repo))?;
        parse::release_tag(&tag)
    }
}

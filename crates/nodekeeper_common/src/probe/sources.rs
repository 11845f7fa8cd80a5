//! Version sources for each client on a real host

use super::VersionQueries;
use crate::clients::ClientKind;
use crate::command::{describe, CommandRunner};
use crate::config::EndpointConfig;
use crate::error::KeeperResult;
use crate::rpc::{BeaconApi, ExecutionRpc, GithubReleaseFeed};
use crate::version::{parse, Version};
use std::sync::Arc;

/// Local package index, read through `apt-cache policy`
pub struct AptPackageIndex {
    runner: Arc<dyn CommandRunner>,
}

impl AptPackageIndex {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Candidate version of `package`
    pub fn candidate(&self, package: &str) -> KeeperResult<Version> {
        let args = ["policy", package];
        let stdout = self
            .runner
            .run("apt-cache", &args)?
            .into_stdout(&describe("apt-cache", &args))?;
        parse::apt_candidate(&stdout)
    }
}

fn binary_output(runner: &dyn CommandRunner, binary: &str, flag: &str) -> KeeperResult<String> {
    let output = runner.run(binary, &[flag])?;
    let command = describe(binary, &[flag]);
    // Some tools print their version on stderr
    if output.success() && output.stdout.trim().is_empty() {
        return Ok(output.stderr);
    }
    output.into_stdout(&command)
}

pub struct GethVersions {
    runner: Arc<dyn CommandRunner>,
    rpc: ExecutionRpc,
    packages: AptPackageIndex,
    feed: Arc<GithubReleaseFeed>,
}

impl GethVersions {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        rpc: ExecutionRpc,
        feed: Arc<GithubReleaseFeed>,
    ) -> Self {
        Self {
            packages: AptPackageIndex::new(runner.clone()),
            runner,
            rpc,
            feed,
        }
    }
}

impl VersionQueries for GethVersions {
    fn installed(&self) -> KeeperResult<Option<Version>> {
        let out = binary_output(self.runner.as_ref(), ClientKind::Geth.binary(), "version")?;
        parse::geth_cli(&out).map(Some)
    }

    fn running(&self) -> KeeperResult<Option<Version>> {
        parse::geth_client_version(&self.rpc.client_version()?).map(Some)
    }

    fn available(&self) -> KeeperResult<Option<Version>> {
        match ClientKind::Geth.package_name() {
            Some(package) => self.packages.candidate(package).map(Some),
            None => Ok(None),
        }
    }

    fn latest(&self) -> KeeperResult<Option<Version>> {
        self.feed.latest(ClientKind::Geth.release_repo()).map(Some)
    }
}

pub struct LighthouseVersions {
    runner: Arc<dyn CommandRunner>,
    beacon: BeaconApi,
    feed: Arc<GithubReleaseFeed>,
}

impl LighthouseVersions {
    pub fn new(runner: Arc<dyn CommandRunner>, beacon: BeaconApi, feed: Arc<GithubReleaseFeed>) -> Self {
        Self { runner, beacon, feed }
    }
}

impl VersionQueries for LighthouseVersions {
    fn installed(&self) -> KeeperResult<Option<Version>> {
        let out = binary_output(self.runner.as_ref(), ClientKind::Lighthouse.binary(), "--version")?;
        parse::lighthouse_cli(&out).map(Some)
    }

    fn running(&self) -> KeeperResult<Option<Version>> {
        parse::lighthouse_node_version(&self.beacon.node_version()?).map(Some)
    }

    fn available(&self) -> KeeperResult<Option<Version>> {
        Ok(None)
    }

    fn latest(&self) -> KeeperResult<Option<Version>> {
        self.feed.latest(ClientKind::Lighthouse.release_repo()).map(Some)
    }
}

pub struct MevBoostVersions {
    runner: Arc<dyn CommandRunner>,
    feed: Arc<GithubReleaseFeed>,
}

impl MevBoostVersions {
    pub fn new(runner: Arc<dyn CommandRunner>, feed: Arc<GithubReleaseFeed>) -> Self {
        Self { runner, feed }
    }
}

impl VersionQueries for MevBoostVersions {
    fn installed(&self) -> KeeperResult<Option<Version>> {
        let out = binary_output(self.runner.as_ref(), ClientKind::MevBoost.binary(), "-version")?;
        parse::mev_boost_cli(&out).map(Some)
    }

    fn running(&self) -> KeeperResult<Option<Version>> {
        Ok(None)
    }

    fn available(&self) -> KeeperResult<Option<Version>> {
        Ok(None)
    }

    fn latest(&self) -> KeeperResult<Option<Version>> {
        self.feed.latest(ClientKind::MevBoost.release_repo()).map(Some)
    }
}

/// The host's version sources for `kind`
pub fn host_version_queries(
    kind: ClientKind,
    endpoints: &EndpointConfig,
    runner: Arc<dyn CommandRunner>,
    feed: Arc<GithubReleaseFeed>,
) -> KeeperResult<Box<dyn VersionQueries>> {
    let timeout = endpoints.request_timeout();
    Ok(match kind {
        ClientKind::Geth => Box::new(GethVersions::new(
            runner,
            ExecutionRpc::new(endpoints.execution_rpc.clone(), timeout)?,
            feed,
        )),
        ClientKind::Lighthouse => Box::new(LighthouseVersions::new(
            runner,
            BeaconApi::new(endpoints.beacon_api.clone(), timeout)?,
            feed,
        )),
        ClientKind::MevBoost => Box::new(MevBoostVersions::new(runner, feed)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::error::KeeperError;
    use crate::logging::Logger;
    use std::time::Duration;

    struct ScriptedRunner;

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[&str]) -> KeeperResult<CommandOutput> {
            match (program, args) {
                ("geth", ["version"]) => Ok(CommandOutput::ok(
                    "Geth\nVersion: 1.10.17-stable\nGit Commit: 25c9b49fdb2e\nArchitecture: amd64\n",
                )),
                ("apt-cache", ["policy", "geth"]) => Ok(CommandOutput::ok(
                    "geth:\n  Installed: 1.10.17+build27856+focal\n  Candidate: 1.10.18+build27900+focal\n",
                )),
                ("mev-boost", ["-version"]) => Ok(CommandOutput {
                    status: Some(0),
                    stdout: String::new(),
                    stderr: "mev-boost v1.4.0\n".into(),
                }),
                _ => Err(KeeperError::command(program, "not installed")),
            }
        }
    }

    fn feed() -> Arc<GithubReleaseFeed> {
        Arc::new(GithubReleaseFeed::new(Duration::from_millis(100), &Logger::disabled()).unwrap())
    }

    #[test]
    fn test_apt_candidate() {
        let index = AptPackageIndex::new(Arc::new(ScriptedRunner));
        assert_eq!(index.candidate("geth").unwrap(), Version::new(1, 10, 18));
        assert!(index.candidate("nethermind").is_err());
    }

    #[test]
    fn test_geth_installed_and_available() {
        let rpc = ExecutionRpc::new("http://127.0.0.1:9", Duration::from_millis(100)).unwrap();
        let geth = GethVersions::new(Arc::new(ScriptedRunner), rpc, feed());
        assert_eq!(geth.installed().unwrap(), Some(Version::new(1, 10, 17)));
        assert_eq!(geth.available().unwrap(), Some(Version::new(1, 10, 18)));
        assert!(geth.running().is_err());
    }

    #[test]
    fn test_mev_boost_version_on_stderr() {
        let boost = MevBoostVersions::new(Arc::new(ScriptedRunner), feed());
        assert_eq!(boost.installed().unwrap(), Some(Version::new(1, 4, 0)));
        assert_eq!(boost.running().unwrap(), None);
        assert_eq!(boost.available().unwrap(), None);
    }

    #[test]
    fn test_missing_binary_is_error() {
        let beacon = BeaconApi::new("http://127.0.0.1:9", Duration::from_millis(100)).unwrap();
        let lh = LighthouseVersions::new(Arc::new(ScriptedRunner), beacon, feed());
        assert!(lh.installed().is_err());
    }
}

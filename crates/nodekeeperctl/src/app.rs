//! Everything a command needs, wired once in `main`

use crate::keys;
use crate::progress::{HostMonitorTargets, InteractiveVerifier, MonitorTargets};
use crate::prompt::{ConsolePrompter, Prompter};
use nodekeeper_common::command::{CommandRunner, SystemRunner};
use nodekeeper_common::config::EndpointConfig;
use nodekeeper_common::error::KeeperResult;
use nodekeeper_common::maintenance::{MaintainedService, MaintenanceRunner, SystemdActionExecutor};
use nodekeeper_common::probe::{host_version_queries, VersionQueries};
use nodekeeper_common::rpc::release::GithubReleaseFeed;
use nodekeeper_common::systemd::{Systemctl, UnitManager};
use nodekeeper_common::{
    ClientKind, Context, FileStateStore, KeeperConfig, Logger, ManagedService, ServiceProbe, StateStore,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Where the version queries of each client come from
pub trait VersionSource: Send + Sync {
    fn queries(&self, kind: ClientKind) -> KeeperResult<Box<dyn VersionQueries>>;
}

/// Client binaries, local RPC, apt and GitHub releases
pub struct HostVersionSource {
    endpoints: EndpointConfig,
    runner: Arc<dyn CommandRunner>,
    feed: Arc<GithubReleaseFeed>,
}

impl HostVersionSource {
    pub fn new(endpoints: EndpointConfig, runner: Arc<dyn CommandRunner>, log: &Logger) -> KeeperResult<Self> {
        let feed = GithubReleaseFeed::new(endpoints.request_timeout(), log)?;
        Ok(Self {
            endpoints,
            runner,
            feed: Arc::new(feed),
        })
    }
}

impl VersionSource for HostVersionSource {
    fn queries(&self, kind: ClientKind) -> KeeperResult<Box<dyn VersionQueries>> {
        host_version_queries(kind, &self.endpoints, self.runner.clone(), self.feed.clone())
    }
}

pub struct App {
    pub config: KeeperConfig,
    pub config_path: Option<PathBuf>,
    pub log: Logger,
    pub runner: Arc<dyn CommandRunner>,
    pub units: Arc<dyn UnitManager>,
    pub store: Arc<dyn StateStore>,
    pub versions: Arc<dyn VersionSource>,
    pub targets: Arc<dyn MonitorTargets>,
    pub prompter: Arc<dyn Prompter>,
    /// Draw progress bars while verifying
    pub show_progress: bool,
}

impl App {
    /// Wire the real host: systemctl, journald, local endpoints, the state
    /// file and the terminal
    pub fn for_host(config: KeeperConfig, config_path: Option<PathBuf>, log: &Logger) -> KeeperResult<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let versions = HostVersionSource::new(config.endpoints.clone(), runner.clone(), log)?;
        let targets = HostMonitorTargets::new(config.endpoints.clone(), config.monitor.clone(), runner.clone());
        Ok(Self {
            store: Arc::new(FileStateStore::new(config.state_file(), log)),
            units: Arc::new(Systemctl::new(runner.clone())),
            versions: Arc::new(versions),
            targets: Arc::new(targets),
            prompter: Arc::new(ConsolePrompter::new()),
            runner,
            config,
            config_path,
            log: log.clone(),
            show_progress: true,
        })
    }

    pub fn probe(&self) -> ServiceProbe {
        ServiceProbe::new(self.units.clone(), &self.log)
    }

    pub fn verifier(&self) -> InteractiveVerifier {
        let verifier = InteractiveVerifier::new(
            self.targets.clone(),
            self.prompter.clone(),
            &self.config.monitor,
            &self.log,
        );
        if self.show_progress {
            verifier
        } else {
            verifier.quiet()
        }
    }

    /// Services under management: the execution and consensus clients
    /// always, the booster when the install chose it or the config has a
    /// table for it
    pub fn managed_services(&self, context: Option<&Context>) -> Vec<ManagedService> {
        let booster_chosen = context
            .and_then(|c| c.get(keys::USE_BOOSTER).ok().flatten())
            .unwrap_or(false);
        let booster_configured = self.config.services.contains_key(ClientKind::MevBoost.key());

        ClientKind::ALL
            .iter()
            .filter(|kind| **kind != ClientKind::MevBoost || booster_chosen || booster_configured)
            .map(|kind| self.config.managed_service(*kind))
            .collect()
    }

    pub fn maintenance_runner(&self, services: Vec<ManagedService>) -> KeeperResult<MaintenanceRunner> {
        let maintained = services
            .into_iter()
            .map(|service| {
                Ok(MaintainedService {
                    queries: self.versions.queries(service.kind)?,
                    service,
                })
            })
            .collect::<KeeperResult<Vec<_>>>()?;

        let config = self.config.clone();
        let executor = SystemdActionExecutor::new(
            self.units.clone(),
            self.runner.clone(),
            move |service: &ManagedService| config.service(service.kind),
            &self.log,
        );

        let runner = MaintenanceRunner::new(self.probe(), maintained, Arc::new(executor), &self.log);
        Ok(if self.config.maintenance.verify_after_action {
            runner.with_verifier(Arc::new(self.verifier()))
        } else {
            runner
        })
    }
}

//! Terminal side of the Progress Monitor
//!
//! The monitor loop runs on its worker thread and writes into a
//! [`SharedProgress`]; this thread redraws a progress bar from it, prints new
//! log lines above the bar and cancels the worker once the operator's
//! patience is used up.

use crate::prompt::{Prompter, VerificationChoice};
use indicatif::{ProgressBar, ProgressStyle};
use nodekeeper_common::command::CommandRunner;
use nodekeeper_common::config::{EndpointConfig, MonitorConfig};
use nodekeeper_common::error::{KeeperError, KeeperResult};
use nodekeeper_common::maintenance::{ServiceVerifier, Verification};
use nodekeeper_common::monitor::{
    host_status_queries, spawn_monitor, JournalLogSource, LogSource, MonitorReport, MonitorSettings,
    ProgressUi, SharedProgress, StatusQuery,
};
use nodekeeper_common::{Logger, ManagedService};
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Redraw interval of the foreground thread
const REDRAW: Duration = Duration::from_millis(100);

/// Where the monitor of a service reads its status and logs
pub trait MonitorTargets: Send + Sync {
    fn status_queries(&self, service: &ManagedService) -> KeeperResult<Vec<Box<dyn StatusQuery>>>;
    fn log_source(&self, service: &ManagedService) -> Box<dyn LogSource>;
}

/// Local RPC endpoints and the systemd journal
pub struct HostMonitorTargets {
    endpoints: EndpointConfig,
    monitor: MonitorConfig,
    runner: Arc<dyn CommandRunner>,
}

impl HostMonitorTargets {
    pub fn new(endpoints: EndpointConfig, monitor: MonitorConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            endpoints,
            monitor,
            runner,
        }
    }
}

impl MonitorTargets for HostMonitorTargets {
    fn status_queries(&self, service: &ManagedService) -> KeeperResult<Vec<Box<dyn StatusQuery>>> {
        host_status_queries(service.kind, &self.endpoints, &self.monitor)
    }

    fn log_source(&self, service: &ManagedService) -> Box<dyn LogSource> {
        Box::new(JournalLogSource::new(
            self.runner.clone(),
            service.unit.clone(),
            self.monitor.initial_log_lines,
        ))
    }
}

/// Progress bar with log lines scrolling above it
pub struct ProgressView {
    bar: ProgressBar,
}

impl ProgressView {
    pub fn terminal(label: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    fn draw(&self, progress: &SharedProgress) {
        for line in progress.take_logs() {
            self.bar.println(format!("  {}", line.dimmed()));
        }
        self.bar.set_position(u64::from(progress.percentage()));
        self.bar.set_message(progress.status());
    }

    fn finish(&self, report: &MonitorReport) {
        if report.is_healthy() {
            self.bar.finish_with_message(format!("{}", "healthy".green()));
        } else {
            self.bar.abandon_with_message(format!("{}", report.snapshot.status.yellow()));
        }
    }
}

/// Monitor one service in the background until it is healthy or `patience`
/// runs out. A zero patience waits forever.
pub fn watch_service(
    service: &ManagedService,
    targets: &dyn MonitorTargets,
    settings: &MonitorSettings,
    patience: Duration,
    view: &ProgressView,
    log: &Logger,
) -> KeeperResult<MonitorReport> {
    let progress = Arc::new(SharedProgress::new());
    let ui: Arc<dyn ProgressUi> = progress.clone();
    let handle = spawn_monitor(
        settings.clone(),
        targets.status_queries(service)?,
        targets.log_source(service),
        ui,
        &log.for_service(&service.unit),
    )?;

    let started = Instant::now();
    while !handle.is_finished() {
        view.draw(&progress);
        if !patience.is_zero() && started.elapsed() >= patience && !progress.is_cancelled() {
            info!(parent: log.span(), "{} not healthy after {:?}, stopping the monitor", service.kind, patience);
            progress.cancel();
        }
        std::thread::sleep(REDRAW);
    }

    let report = handle
        .join()
        .map_err(|_| KeeperError::Action(format!("monitor thread for {} panicked", service.unit)))?;
    view.draw(&progress);
    view.finish(&report);
    Ok(report)
}

/// Watches a service and asks the operator what to do if it does not turn
/// healthy in time
pub struct InteractiveVerifier {
    targets: Arc<dyn MonitorTargets>,
    prompter: Arc<dyn Prompter>,
    settings: MonitorSettings,
    patience: Duration,
    show_progress: bool,
    log: Logger,
}

impl InteractiveVerifier {
    pub fn new(
        targets: Arc<dyn MonitorTargets>,
        prompter: Arc<dyn Prompter>,
        config: &MonitorConfig,
        log: &Logger,
    ) -> Self {
        Self {
            targets,
            prompter,
            settings: MonitorSettings::from_config(config),
            patience: config.patience(),
            show_progress: true,
            log: log.scoped("verify"),
        }
    }

    pub fn with_settings(mut self, settings: MonitorSettings, patience: Duration) -> Self {
        self.settings = settings;
        self.patience = patience;
        self
    }

    /// Do not draw a progress bar
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }
}

impl ServiceVerifier for InteractiveVerifier {
    fn verify(&self, service: &ManagedService) -> KeeperResult<Verification> {
        loop {
            let view = if self.show_progress {
                ProgressView::terminal(service.kind.display_name())
            } else {
                ProgressView::hidden()
            };
            let report = watch_service(
                service,
                self.targets.as_ref(),
                &self.settings,
                self.patience,
                &view,
                &self.log,
            )?;
            if report.is_healthy() {
                return Ok(Verification::Healthy);
            }

            warn!(parent: self.log.span(), "{} did not turn healthy: {}", service.kind, report.snapshot.status);
            match self
                .prompter
                .verification_choice(service.kind.display_name(), &report.snapshot.status)?
            {
                VerificationChoice::Retry => continue,
                VerificationChoice::ProceedAnyway => return Ok(Verification::ProceededUnhealthy),
                VerificationChoice::Quit => return Ok(Verification::Quit),
            }
        }
    }
}

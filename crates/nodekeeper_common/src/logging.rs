//! Logging for nodekeeper
//!
//! Components never look a logger up globally. `main` builds one root
//! [`Logger`], hands it to every component constructor, and each component
//! narrows it with [`Logger::scoped`]. Events go through `tracing` with an
//! explicit `parent:` span so they stay attributed to the owning component.
//!
//! Output:
//! - stderr, filtered by `NODEKEEPER_LOG` (falls back to `RUST_LOG`, then the
//!   configured level)
//! - optional plain-text file in the state directory, always at `info`

use crate::error::{KeeperError, KeeperResult};
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Env var consulted before `RUST_LOG`
pub const LOG_ENV_VAR: &str = "NODEKEEPER_LOG";

/// Handle to a component's logging scope
#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    /// Root logger, created once per process
    pub fn root(app: &'static str) -> Self {
        Self {
            span: tracing::info_span!("nodekeeper", app = app),
        }
    }

    /// Child logger for one component
    pub fn scoped(&self, component: &'static str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "component", name = component),
        }
    }

    /// Child logger tagged with the service it works on
    pub fn for_service(&self, service: &str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "service", unit = service),
        }
    }

    /// Logger that records nothing, for tests
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// Subscriber settings taken from config and CLI flags
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Level for stderr when no env filter is set
    pub level: String,
    /// Append log lines here as well
    pub file: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
            ansi: true,
        }
    }
}

/// Keeps the log file open; flushed to disk on drop
pub struct LogGuard {
    file: Option<Arc<File>>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.sync_all();
        }
    }
}

/// Install the process subscriber. Call once from `main`.
pub fn init_logging(settings: &LogSettings) -> KeeperResult<LogGuard> {
    let stderr_filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(settings.ansi)
        .with_filter(stderr_filter);

    let file = match &settings.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(Arc::new(file))
        }
        None => None,
    };

    let file_layer = file.clone().map(|file| {
        fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_filter(EnvFilter::new("info"))
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| KeeperError::Config(format!("logging already initialised: {}", e)))?;

    Ok(LogGuard { file })
}

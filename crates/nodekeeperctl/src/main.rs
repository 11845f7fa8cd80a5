//! nodekeeperctl - Ethereum node installer and maintainer

use anyhow::Result;
use clap::{Parser, Subcommand};
use nodekeeper_common::logging::{init_logging, LogSettings};
use nodekeeper_common::{paths, ClientKind, KeeperConfig, Logger};
use nodekeeperctl::errors::{exit_code_for, EXIT_GENERAL_ERROR};
use nodekeeperctl::{commands, App};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "nodekeeperctl")]
#[command(about = "Install and maintain Ethereum node services", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: $NODEKEEPER_CONFIG, /etc/nodekeeper/config.toml,
    /// then the per-user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level on stderr (overridden by NODEKEEPER_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Continue the install, then keep the services maintained (default)
    Run,

    /// Continue the install pipeline only
    Install,

    /// Probe, plan and carry out maintenance
    Maintain {
        /// Repeat on the configured interval
        #[arg(long)]
        watch: bool,

        /// Plan only, change nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show every service's state and planned action
    Status,

    /// Watch one service until it is healthy
    Monitor {
        /// geth, lighthouse or mev-boost
        service: ClientKind,
    },

    /// Forget saved install progress
    Reset {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Print the effective configuration
    Config,
}

fn run(cli: Cli) -> Result<i32> {
    let loaded = KeeperConfig::load(cli.config.as_deref())?;

    let settings = LogSettings {
        level: cli.log_level,
        file: loaded.config.log_to_file.then(paths::default_log_file),
        ansi: console::colors_enabled_stderr(),
    };
    let _guard = init_logging(&settings)?;
    let log = Logger::root("nodekeeperctl");
    loaded.report(&log);

    let app = Arc::new(App::for_host(loaded.config, loaded.path, &log)?);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run(&app),
        Commands::Install => commands::install(&app),
        Commands::Maintain { watch, dry_run } => commands::maintain(&app, watch, dry_run),
        Commands::Status => commands::status(&app),
        Commands::Monitor { service } => commands::monitor(&app, service),
        Commands::Reset { yes } => commands::reset(&app, yes),
        Commands::Config => commands::config(&app),
    }
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            let code = exit_code_for(&e);
            if code == EXIT_GENERAL_ERROR {
                eprintln!("{}", "Run with --log-level debug for details.".dimmed());
            }
            code
        }
    };
    std::process::exit(code);
}

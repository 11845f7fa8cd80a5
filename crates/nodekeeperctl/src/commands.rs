//! Subcommand implementations
//!
//! Each returns the process exit code; errors bubble up to `main`.

use crate::app::App;
use crate::errors::{EXIT_ABORTED, EXIT_GENERAL_ERROR, EXIT_SUCCESS};
use crate::keys;
use crate::steps::install_pipeline;
use anyhow::{Context as _, Result};
use nodekeeper_common::maintenance::{ActionResult, EntryResult, PassReport, ServiceVerifier, Verification};
use nodekeeper_common::planner::MaintenanceAction;
use nodekeeper_common::probe::ServiceSnapshot;
use nodekeeper_common::{ClientKind, Context, Orchestrator, RunOutcome};
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

fn orchestrator(app: &Arc<App>) -> Result<Orchestrator> {
    let sequence = install_pipeline(app.clone()).context("building the install pipeline")?;
    Ok(Orchestrator::new(sequence, app.store.clone(), &app.log))
}

fn print_run_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed(context) => {
            println!("{} {}", "✓".green().bold(), "Install pipeline completed".bold());
            if let Ok(Some(network)) = context.get(keys::NETWORK) {
                println!("  network: {}", network);
            }
            if let Ok(Some(unverified)) = context.get(keys::UNVERIFIED) {
                if !unverified.is_empty() {
                    println!(
                        "  {} accepted without a healthy check: {}",
                        "!".yellow(),
                        unverified.join(", ")
                    );
                }
            }
        }
        RunOutcome::Aborted { step_id, reason } => {
            println!("{} Stopped at step {}: {}", "✗".red().bold(), step_id.bold(), reason);
            println!("  {}", "Run nodekeeperctl again to continue from this step.".dimmed());
        }
    }
}

/// Resume the install pipeline
pub fn install(app: &Arc<App>) -> Result<i32> {
    let orchestrator = orchestrator(app)?;
    let outcome = orchestrator.resume(Context::new()).context("install pipeline failed")?;
    print_run_outcome(&outcome);
    Ok(match outcome {
        RunOutcome::Completed(_) => EXIT_SUCCESS,
        RunOutcome::Aborted { .. } => EXIT_ABORTED,
    })
}

/// Finish the install if needed, then keep the node maintained
pub fn run(app: &Arc<App>) -> Result<i32> {
    let orchestrator = orchestrator(app)?;
    let context = match orchestrator.resume(Context::new()).context("install pipeline failed")? {
        RunOutcome::Completed(context) => context,
        aborted => {
            print_run_outcome(&aborted);
            return Ok(EXIT_ABORTED);
        }
    };

    let runner = app.maintenance_runner(app.managed_services(Some(&context)))?;
    let interval = Duration::from_secs(app.config.maintenance.watch_interval_secs);
    let report = runner.watch(interval, false, |report| {
        print_pass(report);
        true
    })?;
    Ok(pass_exit_code(&report))
}

/// One maintenance pass, or passes on an interval with `watch`,
/// once the install pipeline has completed. A dry run is always allowed.
pub fn maintain(app: &Arc<App>, watch: bool, dry_run: bool) -> Result<i32> {
    let saved = app.store.load();
    let completed = saved.as_ref().map_or(false, |state| state.is_completed());
    if !completed && !dry_run {
        let next = saved.as_ref().map_or("not started", |state| state.step_id.as_str());
        warn!(parent: app.log.span(), "Maintenance refused, install pipeline at {}", next);
        println!("{} The install has not finished ({}).", "✗".red().bold(), next);
        println!("  {}", "Run `nodekeeperctl install` first, or use --dry-run to only plan.".dimmed());
        return Ok(EXIT_ABORTED);
    }
    let runner = app.maintenance_runner(app.managed_services(saved.as_ref().map(|state| &state.context)))?;

    let report = if watch {
        let interval = Duration::from_secs(app.config.maintenance.watch_interval_secs);
        runner.watch(interval, dry_run, |report| {
            print_pass(report);
            true
        })?
    } else {
        let report = runner.pass(dry_run)?;
        print_pass(&report);
        report
    };
    Ok(pass_exit_code(&report))
}

fn pass_exit_code(report: &PassReport) -> i32 {
    if report.stopped {
        EXIT_ABORTED
    } else if report.failures() > 0 {
        EXIT_GENERAL_ERROR
    } else {
        EXIT_SUCCESS
    }
}

fn print_pass(report: &PassReport) {
    println!();
    println!("{}", "Maintenance pass".bold());
    println!("{}", "=".repeat(50));
    for entry in &report.entries {
        let action = entry.planned.action;
        let outcome = match &entry.result {
            EntryResult::NotExecuted if action.is_actionable() => "planned only".dimmed().to_string(),
            EntryResult::NotExecuted => "nothing to do".dimmed().to_string(),
            EntryResult::Executed(result) => match result {
                ActionResult::Done => "done".green().to_string(),
                ActionResult::Manual(reason) => {
                    format!("{} {}", "manual:".yellow(), reason)
                }
                ActionResult::Skipped => "skipped".dimmed().to_string(),
            },
            EntryResult::Failed(reason) => format!("{} {}", "failed:".red(), reason),
        };
        let verified = match entry.verification {
            Some(Verification::Healthy) => format!(" {}", "(healthy)".green()),
            Some(Verification::ProceededUnhealthy) => format!(" {}", "(not healthy)".yellow()),
            Some(Verification::Quit) => format!(" {}", "(stopped)".red()),
            None => String::new(),
        };
        println!(
            "  {:<11} {:<22} {}{}",
            entry.planned.service.kind.display_name(),
            action_label(action),
            outcome,
            verified
        );
    }
    if report.stopped {
        println!("  {}", "Stopped by the operator.".yellow());
    } else if !report.maintenance_needed() {
        println!("  {}", "All services up to date and running.".green());
    }
}

fn action_label(action: MaintenanceAction) -> String {
    match action {
        MaintenanceAction::NoAction => action.to_string().dimmed().to_string(),
        MaintenanceAction::CheckAgainSoon => action.to_string().cyan().to_string(),
        _ => action.to_string().yellow().bold().to_string(),
    }
}

fn running_label(snapshot: &ServiceSnapshot) -> String {
    if !snapshot.service_found {
        "not found".red().to_string()
    } else if snapshot.lifecycle.running {
        "running".green().to_string()
    } else if snapshot.lifecycle.active_state.is_empty() {
        "unknown".dimmed().to_string()
    } else {
        format!("{}/{}", snapshot.lifecycle.active_state, snapshot.lifecycle.sub_state)
            .yellow()
            .to_string()
    }
}

fn merge_label(configured: Option<bool>) -> String {
    match configured {
        Some(true) => "yes".green().to_string(),
        Some(false) => "no".red().to_string(),
        None => "?".dimmed().to_string(),
    }
}

/// Probe and plan every managed service, change nothing
pub fn status(app: &Arc<App>) -> Result<i32> {
    let saved = app.store.load();
    let runner = app.maintenance_runner(app.managed_services(saved.as_ref().map(|s| &s.context)))?;

    println!("{}", "nodekeeper status".bold());
    println!("{}", "=".repeat(50));
    match &saved {
        Some(state) if state.is_completed() => println!("Install pipeline: {}", "completed".green()),
        Some(state) => println!("Install pipeline: next step {}", state.step_id.yellow()),
        None => println!("Install pipeline: {}", "not started".dimmed()),
    }
    println!();

    for planned in runner.plan_all() {
        let s = &planned.snapshot;
        println!("{}", planned.service.kind.display_name().bold());
        println!("  unit       {} ({})", planned.service.unit, running_label(s));
        println!(
            "  versions   installed {}  running {}  available {}  latest {}",
            s.versions.installed, s.versions.running, s.versions.available, s.versions.latest
        );
        if let Some(command) = &s.exec_command_line {
            println!("  command    {}", command.display().dimmed());
        }
        println!("  merge      {}", merge_label(s.merge_configured));
        println!(
            "  action     {} {}",
            action_label(planned.action),
            planned.action.describe().dimmed()
        );
        println!();
    }
    Ok(EXIT_SUCCESS)
}

/// Watch one service until it is healthy
pub fn monitor(app: &Arc<App>, kind: ClientKind) -> Result<i32> {
    let service = app.config.managed_service(kind);
    info!(parent: app.log.span(), "Monitoring {}", service.unit);
    let verification = app.verifier().verify(&service)?;
    Ok(match verification {
        Verification::Healthy => {
            println!("{} {} is healthy", "✓".green().bold(), kind);
            EXIT_SUCCESS
        }
        Verification::ProceededUnhealthy => {
            println!("{} {} is not healthy yet", "!".yellow().bold(), kind);
            EXIT_SUCCESS
        }
        Verification::Quit => EXIT_ABORTED,
    })
}

/// Forget saved install progress
pub fn reset(app: &Arc<App>, yes: bool) -> Result<i32> {
    if app.store.load().is_none() {
        println!("No saved progress.");
        return Ok(EXIT_SUCCESS);
    }
    if !yes
        && !app
            .prompter
            .confirm("Forget the saved install progress? The next run starts over.", false)?
    {
        return Ok(EXIT_ABORTED);
    }
    app.store.clear().context("removing the state file")?;
    println!("{} Saved progress removed", "✓".green().bold());
    Ok(EXIT_SUCCESS)
}

/// Print the effective configuration
pub fn config(app: &Arc<App>) -> Result<i32> {
    match &app.config_path {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# no config file found, showing defaults"),
    }
    println!("# state file: {}", app.config.state_file().display());
    println!();
    print!("{}", app.config.to_toml()?);
    Ok(EXIT_SUCCESS)
}

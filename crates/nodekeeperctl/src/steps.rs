//! The install pipeline
//!
//! Every step checks the context (and the host) for work already done, so a
//! step that crashed halfway can simply run again from the top.

use crate::app::App;
use crate::keys;
use crate::prompt::FailureChoice;
use nodekeeper_common::context::ContextKey;
use nodekeeper_common::error::KeeperResult;
use nodekeeper_common::maintenance::{ServiceVerifier, Verification};
use nodekeeper_common::{ClientKind, Context, Network, Orchestrator, Step, StepOutcome, StepSequence};
use std::sync::Arc;
use tracing::{info, warn};

pub const SELECT_NETWORK: &str = "selectNetwork";
pub const SELECT_BOOSTER: &str = "selectBooster";
pub const INSTALL_EXECUTION: &str = "installExecution";
pub const INSTALL_CONSENSUS: &str = "installConsensus";
pub const INSTALL_BOOSTER: &str = "installBooster";
pub const START_SERVICES: &str = "startServices";
pub const VERIFY_EXECUTION: &str = "verifyExecution";
pub const VERIFY_CONSENSUS: &str = "verifyConsensus";
pub const VERIFY_BOOSTER: &str = "verifyBooster";
pub const FINISH: &str = "finish";

/// Placeholder in configured install commands
pub const NETWORK_PLACEHOLDER: &str = "{network}";

/// Build the install pipeline over `app`
pub fn install_pipeline(app: Arc<App>) -> KeeperResult<StepSequence> {
    let step = |id: &'static str, name: &'static str, body: fn(&App, &'static str, Context) -> KeeperResult<StepOutcome>| {
        let app = app.clone();
        Step::from_fn(id, name, move |context: Context, _: &Orchestrator| body(&app, id, context))
    };

    StepSequence::new(vec![
        step(SELECT_NETWORK, "Select network", select_network),
        step(SELECT_BOOSTER, "Choose MEV-Boost", select_booster),
        step(INSTALL_EXECUTION, "Install execution client", install_execution).requires(&[keys::NETWORK.name()]),
        step(INSTALL_CONSENSUS, "Install consensus client", install_consensus).requires(&[keys::NETWORK.name()]),
        step(INSTALL_BOOSTER, "Install MEV-Boost", install_booster)
            .requires(&[keys::NETWORK.name(), keys::USE_BOOSTER.name()]),
        step(START_SERVICES, "Start services", start_services).requires(&[
            keys::EXECUTION_INSTALLED.name(),
            keys::CONSENSUS_INSTALLED.name(),
            keys::USE_BOOSTER.name(),
        ]),
        step(VERIFY_EXECUTION, "Verify execution client", verify_execution)
            .requires(&[keys::SERVICES_STARTED.name()]),
        step(VERIFY_CONSENSUS, "Verify consensus client", verify_consensus)
            .requires(&[keys::SERVICES_STARTED.name()]),
        step(VERIFY_BOOSTER, "Verify MEV-Boost", verify_booster)
            .requires(&[keys::SERVICES_STARTED.name(), keys::USE_BOOSTER.name()]),
        step(FINISH, "Finish", finish),
    ])
}

fn select_network(app: &App, _id: &'static str, mut context: Context) -> KeeperResult<StepOutcome> {
    if context.get(keys::NETWORK)?.is_none() {
        let network = match app.config.network {
            Some(network) => network,
            None => app.prompter.choose_network(Network::Mainnet)?,
        };
        info!(parent: app.log.span(), "Network: {}", network);
        context.set(keys::NETWORK, network)?;
    }
    Ok(StepOutcome::Continue(context))
}

fn select_booster(app: &App, _id: &'static str, mut context: Context) -> KeeperResult<StepOutcome> {
    if context.get(keys::USE_BOOSTER)?.is_none() {
        let use_booster = app
            .prompter
            .confirm("Run MEV-Boost next to the validator?", false)?;
        context.set(keys::USE_BOOSTER, use_booster)?;
    }
    Ok(StepOutcome::Continue(context))
}

fn install_execution(app: &App, id: &'static str, context: Context) -> KeeperResult<StepOutcome> {
    install_client(app, id, ClientKind::Geth, keys::EXECUTION_INSTALLED, context)
}

fn install_consensus(app: &App, id: &'static str, context: Context) -> KeeperResult<StepOutcome> {
    install_client(app, id, ClientKind::Lighthouse, keys::CONSENSUS_INSTALLED, context)
}

fn install_booster(app: &App, id: &'static str, context: Context) -> KeeperResult<StepOutcome> {
    if !context.require(id, keys::USE_BOOSTER)? {
        return Ok(StepOutcome::Continue(context));
    }
    install_client(app, id, ClientKind::MevBoost, keys::BOOSTER_INSTALLED, context)
}

/// Replace the network placeholder in every argument
pub fn substitute_network(argv: &[String], network: Network) -> Vec<String> {
    argv.iter()
        .map(|arg| arg.replace(NETWORK_PLACEHOLDER, network.as_str()))
        .collect()
}

/// Unit known to systemd and binary reporting a version
fn is_installed(app: &App, kind: ClientKind) -> bool {
    let service = app.config.managed_service(kind);
    let unit_found = app
        .units
        .show(&service.unit)
        .map(|props| props.is_found())
        .unwrap_or(false);
    if !unit_found {
        return false;
    }
    match app.versions.queries(kind).and_then(|q| q.installed()) {
        Ok(Some(version)) => {
            info!(parent: app.log.span(), "{} {} already installed", kind, version);
            true
        }
        Ok(None) => false,
        Err(e) => {
            warn!(parent: app.log.span(), "Cannot read installed {} version: {}", kind, e);
            false
        }
    }
}

fn install_client(
    app: &App,
    id: &'static str,
    kind: ClientKind,
    done: ContextKey<bool>,
    mut context: Context,
) -> KeeperResult<StepOutcome> {
    if context.get(done)?.unwrap_or(false) || is_installed(app, kind) {
        context.set(done, true)?;
        return Ok(StepOutcome::Continue(context));
    }

    let network = context.require(id, keys::NETWORK)?;
    let install = app.config.service(kind).install;

    if install.is_empty() {
        let installed = app.prompter.confirm(
            &format!(
                "No install command configured for {} (services.{}.install). Is it installed by hand now?",
                kind,
                kind.key()
            ),
            false,
        )?;
        if !installed {
            return Ok(StepOutcome::Abort(format!("{} is not installed", kind)));
        }
    } else {
        let argv = substitute_network(&install, network);
        loop {
            info!(parent: app.log.span(), "Installing {}: {}", kind, argv.join(" "));
            let reason = match app.runner.run_argv(&argv) {
                Ok(output) if output.success() => break,
                Ok(output) => match output.status {
                    Some(code) => format!("exit code {}: {}", code, output.stderr.trim()),
                    None => format!("killed: {}", output.stderr.trim()),
                },
                Err(e) => e.to_string(),
            };
            warn!(parent: app.log.span(), "Install of {} failed: {}", kind, reason);
            match app
                .prompter
                .failure_choice(&format!("Installing {}", kind), &reason)?
            {
                FailureChoice::Retry => continue,
                FailureChoice::Quit => {
                    return Ok(StepOutcome::Abort(format!("install command for {} failed: {}", kind, reason)))
                }
            }
        }
    }

    context.set(done, true)?;
    Ok(StepOutcome::Continue(context))
}

fn start_services(app: &App, id: &'static str, mut context: Context) -> KeeperResult<StepOutcome> {
    let mut kinds = vec![ClientKind::Geth, ClientKind::Lighthouse];
    if context.require(id, keys::USE_BOOSTER)? {
        kinds.push(ClientKind::MevBoost);
    }

    for kind in kinds {
        let service = app.config.managed_service(kind);
        for unit in service.units() {
            let running = app.units.show(unit).map(|p| p.is_running()).unwrap_or(false);
            if running {
                continue;
            }
            info!(parent: app.log.span(), "Starting {}", unit);
            app.units.start(unit)?;
        }
    }

    context.set(keys::SERVICES_STARTED, true)?;
    Ok(StepOutcome::Continue(context))
}

fn verify(app: &App, kind: ClientKind, mut context: Context) -> KeeperResult<StepOutcome> {
    let service = app.config.managed_service(kind);
    match app.verifier().verify(&service)? {
        Verification::Healthy => {}
        Verification::ProceededUnhealthy => {
            let mut unverified = context.get_or(keys::UNVERIFIED, Vec::new())?;
            if !unverified.iter().any(|s| s == kind.key()) {
                unverified.push(kind.key().to_string());
            }
            context.set(keys::UNVERIFIED, unverified)?;
        }
        Verification::Quit => {
            return Ok(StepOutcome::Abort(format!("{} is not healthy", kind)));
        }
    }
    Ok(StepOutcome::Continue(context))
}

fn verify_execution(app: &App, _id: &'static str, context: Context) -> KeeperResult<StepOutcome> {
    verify(app, ClientKind::Geth, context)
}

fn verify_consensus(app: &App, _id: &'static str, context: Context) -> KeeperResult<StepOutcome> {
    verify(app, ClientKind::Lighthouse, context)
}

fn verify_booster(app: &App, id: &'static str, context: Context) -> KeeperResult<StepOutcome> {
    if !context.require(id, keys::USE_BOOSTER)? {
        return Ok(StepOutcome::Continue(context));
    }
    verify(app, ClientKind::MevBoost, context)
}

fn finish(_app: &App, _id: &'static str, mut context: Context) -> KeeperResult<StepOutcome> {
    if context.get(keys::COMPLETED_AT)?.is_none() {
        context.set(keys::COMPLETED_AT, chrono::Utc::now().to_rfc3339())?;
    }
    Ok(StepOutcome::Continue(context))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_network() {
        let argv = vec![
            "/usr/local/bin/install-geth".to_string(),
            "--network={network}".to_string(),
            "{network}".to_string(),
        ];
        assert_eq!(
            substitute_network(&argv, Network::Holesky),
            vec!["/usr/local/bin/install-geth", "--network=holesky", "holesky"]
        );
    }
}

//! Step / StepSequence Orchestrator
//!
//! Drives an ordered pipeline of steps. Before each step runs, `{step id,
//! context}` is saved through the [`StateStore`], so the saved id always names
//! the next step to run. After the last step the `completed` sentinel is saved
//! with the final context.
//!
//! The Orchestrator is the only place a run stops early: a step returning
//! [`StepOutcome::Abort`] ends the run with [`RunOutcome::Aborted`], and a step
//! returning an error ends it with that error.

mod step;

pub use step::{Step, StepAction, StepOutcome};

use crate::context::Context;
use crate::error::{KeeperError, KeeperResult};
use crate::logging::Logger;
use crate::store::{StateStore, COMPLETED_STEP_ID};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

/// Ordered, immutable list of steps with an id lookup
pub struct StepSequence {
    steps: Vec<Step>,
    index: OnceLock<HashMap<String, usize>>,
}

impl StepSequence {
    /// Build a sequence. Ids must be unique and must not collide with the
    /// completion sentinel.
    pub fn new(steps: Vec<Step>) -> KeeperResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for step in &steps {
            if step.id() == COMPLETED_STEP_ID {
                return Err(KeeperError::Config(format!(
                    "step id '{}' is reserved",
                    COMPLETED_STEP_ID
                )));
            }
            if !seen.insert(step.id()) {
                return Err(KeeperError::Config(format!(
                    "duplicate step id '{}'",
                    step.id()
                )));
            }
        }
        Ok(Self {
            steps,
            index: OnceLock::new(),
        })
    }

    fn index(&self) -> &HashMap<String, usize> {
        self.index.get_or_init(|| {
            self.steps
                .iter()
                .enumerate()
                .map(|(i, step)| (step.id().to_string(), i))
                .collect()
        })
    }

    pub fn position(&self, step_id: &str) -> Option<usize> {
        self.index().get(step_id).copied()
    }

    pub fn get_step(&self, step_id: &str) -> Option<&Step> {
        self.position(step_id).map(|i| &self.steps[i])
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every step ran; final context
    Completed(Context),
    /// A step asked to stop
    Aborted { step_id: String, reason: String },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

pub struct Orchestrator {
    sequence: StepSequence,
    store: Arc<dyn StateStore>,
    log: Logger,
}

impl Orchestrator {
    pub fn new(sequence: StepSequence, store: Arc<dyn StateStore>, log: &Logger) -> Self {
        Self {
            sequence,
            store,
            log: log.scoped("orchestrator"),
        }
    }

    pub fn sequence(&self) -> &StepSequence {
        &self.sequence
    }

    pub fn get_step(&self, step_id: &str) -> Option<&Step> {
        self.sequence.get_step(step_id)
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    pub fn run_from_start(&self, initial: Option<Context>) -> KeeperResult<RunOutcome> {
        self.run_from_index(0, initial.unwrap_or_default())
    }

    pub fn run_from_step(&self, step_id: &str, context: Option<Context>) -> KeeperResult<RunOutcome> {
        let start = self
            .sequence
            .position(step_id)
            .ok_or_else(|| KeeperError::UnknownStep(step_id.to_string()))?;
        self.run_from_index(start, context.unwrap_or_default())
    }

    /// Continue wherever the last run left off.
    ///
    /// - nothing saved: run from the start with `initial`
    /// - `completed` saved: return the saved context, run nothing
    /// - a known step saved: run from it with the saved context
    /// - an unknown step saved: start over with `initial`
    pub fn resume(&self, initial: Context) -> KeeperResult<RunOutcome> {
        let state = match self.store.load() {
            Some(state) => state,
            None => {
                info!(parent: self.log.span(), "No saved progress, starting from the first step");
                return self.run_from_start(Some(initial));
            }
        };

        if state.is_completed() {
            info!(parent: self.log.span(), "Pipeline already completed");
            return Ok(RunOutcome::Completed(state.context));
        }

        match self.sequence.position(&state.step_id) {
            Some(start) => {
                info!(parent: self.log.span(), step = %state.step_id, "Resuming saved progress");
                self.run_from_index(start, state.context)
            }
            None => {
                warn!(
                    parent: self.log.span(),
                    "Saved step '{}' is not part of this pipeline, starting over",
                    state.step_id
                );
                self.run_from_start(Some(initial))
            }
        }
    }

    fn run_from_index(&self, start: usize, mut context: Context) -> KeeperResult<RunOutcome> {
        let total = self.sequence.len();

        for (offset, step) in self.sequence.steps()[start..].iter().enumerate() {
            let number = start + offset + 1;

            self.store.save(step.id(), &context)?;

            if let Some(key) = context.first_missing(step.required_keys()) {
                error!(
                    parent: self.log.span(),
                    "Step '{}' cannot run: context variable '{}' is missing",
                    step.id(),
                    key
                );
                return Err(KeeperError::MissingContextVariable {
                    step: step.id().to_string(),
                    key: key.to_string(),
                });
            }

            info!(parent: self.log.span(), "Step {}/{}: {}", number, total, step.display_name());

            match step.run(context, self)? {
                StepOutcome::Continue(next) => context = next,
                StepOutcome::Abort(reason) => {
                    warn!(parent: self.log.span(), step = step.id(), "Run aborted: {}", reason);
                    return Ok(RunOutcome::Aborted {
                        step_id: step.id().to_string(),
                        reason,
                    });
                }
            }
        }

        self.store.save(COMPLETED_STEP_ID, &context)?;
        info!(parent: self.log.span(), "All {} steps completed", total);
        Ok(RunOutcome::Completed(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;
    use serde_json::json;

    fn flag_step(id: &'static str, key: &'static str) -> Step {
        Step::from_fn(id, id, move |mut ctx: Context, _orch: &Orchestrator| {
            ctx.insert_raw(key, json!(true));
            Ok(StepOutcome::Continue(ctx))
        })
    }

    fn orchestrator(steps: Vec<Step>, store: Arc<MemoryStateStore>) -> Orchestrator {
        Orchestrator::new(StepSequence::new(steps).unwrap(), store, &Logger::disabled())
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let result = StepSequence::new(vec![flag_step("a", "x"), flag_step("a", "y")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_reserved_id() {
        assert!(StepSequence::new(vec![flag_step("completed", "x")]).is_err());
    }

    #[test]
    fn test_get_step() {
        let seq = StepSequence::new(vec![flag_step("a", "x"), flag_step("b", "y")]).unwrap();
        assert_eq!(seq.get_step("b").unwrap().id(), "b");
        assert!(seq.get_step("zzz").is_none());
    }

    #[test]
    fn test_saves_before_each_step_then_sentinel() {
        let store = Arc::new(MemoryStateStore::new());
        let orch = orchestrator(vec![flag_step("a", "x"), flag_step("b", "y")], store.clone());

        let outcome = orch.run_from_start(None).unwrap();
        assert!(outcome.is_completed());
        assert_eq!(store.saved_step_ids(), vec!["a", "b", "completed"]);
    }

    #[test]
    fn test_saved_context_is_the_step_start_context() {
        let store = Arc::new(MemoryStateStore::new());
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_in_step = seen.clone();
        let inner_store = store.clone();
        let steps = vec![
            flag_step("a", "x"),
            Step::from_fn("b", "b", move |ctx: Context, _orch: &Orchestrator| {
                *seen_in_step.lock().unwrap() = inner_store.load();
                Ok(StepOutcome::Continue(ctx))
            }),
        ];
        orchestrator(steps, store).run_from_start(None).unwrap();

        let state = seen.lock().unwrap().clone().unwrap();
        assert_eq!(state.step_id, "b");
        assert!(state.context.contains("x"));
    }

    #[test]
    fn test_abort_stops_run_and_keeps_step_saved() {
        let store = Arc::new(MemoryStateStore::new());
        let steps = vec![
            flag_step("a", "x"),
            Step::from_fn("b", "b", |_ctx: Context, _orch: &Orchestrator| {
                Ok(StepOutcome::Abort("operator quit".to_string()))
            }),
            flag_step("c", "z"),
        ];
        let outcome = orchestrator(steps, store.clone()).run_from_start(None).unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Aborted {
                step_id: "b".to_string(),
                reason: "operator quit".to_string()
            }
        );
        assert_eq!(store.load().unwrap().step_id, "b");
    }

    #[test]
    fn test_missing_required_key_is_fatal() {
        let store = Arc::new(MemoryStateStore::new());
        let steps = vec![flag_step("a", "x").requires(&["network"])];
        let err = orchestrator(steps, store).run_from_start(None).unwrap_err();
        assert!(matches!(
            err,
            KeeperError::MissingContextVariable { ref key, .. } if key == "network"
        ));
    }

    #[test]
    fn test_run_from_unknown_step() {
        let orch = orchestrator(vec![flag_step("a", "x")], Arc::new(MemoryStateStore::new()));
        assert!(matches!(
            orch.run_from_step("nope", None),
            Err(KeeperError::UnknownStep(_))
        ));
    }

    #[test]
    fn test_resume_completed_runs_nothing() {
        let mut ctx = Context::new();
        ctx.insert_raw("done", json!(true));
        let store = Arc::new(MemoryStateStore::with_state(COMPLETED_STEP_ID, ctx.clone()));
        let orch = orchestrator(vec![flag_step("a", "x")], store.clone());

        assert_eq!(orch.resume(Context::new()).unwrap(), RunOutcome::Completed(ctx));
        assert!(store.saved_step_ids().is_empty());
    }

    #[test]
    fn test_resume_unknown_saved_step_starts_over() {
        let store = Arc::new(MemoryStateStore::with_state("retired_step", Context::new()));
        let orch = orchestrator(vec![flag_step("a", "x"), flag_step("b", "y")], store.clone());

        orch.resume(Context::new()).unwrap();
        assert_eq!(store.saved_step_ids(), vec!["a", "b", "completed"]);
    }
}

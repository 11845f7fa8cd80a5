//! Steps: one named unit of pipeline work

use super::Orchestrator;
use crate::context::Context;
use crate::error::KeeperResult;
use std::fmt;

/// What a step hands back to the Orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Carry on with this context
    Continue(Context),
    /// Stop the pipeline here. The saved state keeps naming this step, so the
    /// next start resumes at it.
    Abort(String),
}

/// Body of a step.
///
/// Must be safe to re-run from the top: a crash mid-step resumes at the same
/// step with the context it started with.
pub trait StepAction: Send + Sync {
    fn run(&self, context: Context, orchestrator: &Orchestrator) -> KeeperResult<StepOutcome>;
}

impl<F> StepAction for F
where
    F: Fn(Context, &Orchestrator) -> KeeperResult<StepOutcome> + Send + Sync,
{
    fn run(&self, context: Context, orchestrator: &Orchestrator) -> KeeperResult<StepOutcome> {
        self(context, orchestrator)
    }
}

pub struct Step {
    id: String,
    display_name: String,
    requires: Vec<&'static str>,
    action: Box<dyn StepAction>,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        action: impl StepAction + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            requires: Vec::new(),
            action: Box::new(action),
        }
    }

    /// Step whose body is a closure
    pub fn from_fn<F>(id: impl Into<String>, display_name: impl Into<String>, action: F) -> Self
    where
        F: Fn(Context, &Orchestrator) -> KeeperResult<StepOutcome> + Send + Sync + 'static,
    {
        Self::new(id, display_name, action)
    }

    /// Context keys that must be present before this step runs
    pub fn requires(mut self, keys: &[&'static str]) -> Self {
        self.requires.extend_from_slice(keys);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn required_keys(&self) -> &[&'static str] {
        &self.requires
    }

    pub(crate) fn run(&self, context: Context, orchestrator: &Orchestrator) -> KeeperResult<StepOutcome> {
        self.action.run(context, orchestrator)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("requires", &self.requires)
            .finish()
    }
}

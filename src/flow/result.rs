//! Run result aggregation
//!
//! Built once per run, keyed by node identity (not completion order) so the
//! final report is deterministic regardless of task interleaving. Consumed
//! by summary rendering and by the resume protocol.

use serde::{Deserialize, Serialize};

use crate::chain::Phase;
use crate::checkout::CheckoutOutcome;
use crate::command::ExecuteCommandResult;

/// Results of one node's commands for a single phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteNodeResult {
    /// Project id of the node.
    pub project: String,
    /// One result per command, in execution order. Empty when the phase had
    /// no work.
    pub results: Vec<ExecuteCommandResult>,
}

impl ExecuteNodeResult {
    /// Whether no command in this phase failed.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.results.iter().all(ExecuteCommandResult::ok)
    }
}

/// Per-phase node results, each in chain order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseResults {
    /// Results for the `before` phase.
    #[serde(default)]
    pub before: Vec<ExecuteNodeResult>,
    /// Results for the main `commands` phase.
    #[serde(default)]
    pub commands: Vec<ExecuteNodeResult>,
    /// Results for the `after` phase.
    #[serde(default)]
    pub after: Vec<ExecuteNodeResult>,
}

impl PhaseResults {
    /// The result list for one phase.
    #[must_use]
    pub const fn phase(&self, phase: Phase) -> &Vec<ExecuteNodeResult> {
        match phase {
            Phase::Before => &self.before,
            Phase::Commands => &self.commands,
            Phase::After => &self.after,
        }
    }

    /// Mutable result list for one phase.
    pub fn phase_mut(&mut self, phase: Phase) -> &mut Vec<ExecuteNodeResult> {
        match phase {
            Phase::Before => &mut self.before,
            Phase::Commands => &mut self.commands,
            Phase::After => &mut self.after,
        }
    }

    /// A node's recorded result for one phase, if any.
    #[must_use]
    pub fn node(&self, phase: Phase, project: &str) -> Option<&ExecuteNodeResult> {
        self.phase(phase).iter().find(|r| r.project == project)
    }

    /// Whether every recorded result across all phases is non-failing.
    #[must_use]
    pub fn ok(&self) -> bool {
        Phase::ALL
            .iter()
            .all(|&phase| self.phase(phase).iter().all(ExecuteNodeResult::ok))
    }
}

/// Checkout outcome attached to its node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedOutNode {
    /// Project id of the node.
    pub project: String,
    /// The checkout outcome.
    pub outcome: CheckoutOutcome,
}

/// Result of collecting one declared artifact path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactResult {
    /// Project id the artifact belongs to.
    pub project: String,
    /// Declared path, relative to the node's checkout.
    pub path: String,
    /// Whether the path existed and was collected.
    pub archived: bool,
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowResult {
    /// Per-node checkout outcomes, in chain order.
    pub checkout_info: Vec<CheckedOutNode>,
    /// Per-phase execution results, in chain order.
    pub execution_result: PhaseResults,
    /// Artifact collection results.
    #[serde(default)]
    pub artifacts: Vec<ArtifactResult>,
}

impl FlowResult {
    /// Overall run success, derived after the fact by scanning every
    /// recorded result for a failing entry.
    #[must_use]
    pub fn success(&self) -> bool {
        let checkout_ok = self
            .checkout_info
            .iter()
            .all(|node| !node.outcome.is_failed());
        checkout_ok && self.execution_result.ok()
    }
}

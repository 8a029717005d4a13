//! Resumable state protocol
//!
//! One JSON snapshot is written at the end of every run (success or
//! failure) to a fixed path under the run's working folder. The `resume`
//! tool reads it once, rebinds it as live state and replays only the work
//! whose prior result was failing or absent. Snapshots are never mutated in
//! place; resumption produces a new run that supersedes them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::chain::{Chain, Node, Phase};
use crate::checkout::CheckoutOutcome;
use crate::config::RunConfig;
use crate::flow::result::{CheckedOutNode, ExecuteNodeResult, FlowResult, PhaseResults};

/// Fixed state file name under the run's working folder.
pub const STATE_FILE_NAME: &str = ".state.build-chain.json";

/// Snapshot schema version. Bumped on incompatible layout changes so stale
/// files fail loudly instead of deserializing into garbage.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized configuration component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationState {
    /// The run configuration the snapshot was taken with.
    pub config: RunConfig,
    /// The resolved chain nodes, so resume never re-reads the definition
    /// file (which may have changed since).
    pub nodes: Vec<Node>,
}

/// Serialized checkout component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutState {
    /// Per-node checkout outcomes, in chain order.
    pub nodes: Vec<CheckedOutNode>,
}

/// Serialized flow component: per-phase execution results.
pub type FlowState = PhaseResults;

/// The whole persisted run state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Schema version of this snapshot.
    pub version: u32,
    /// Configuration component.
    #[serde(rename = "configurationService")]
    pub configuration: ConfigurationState,
    /// Checkout component.
    #[serde(rename = "checkoutService")]
    pub checkout: CheckoutState,
    /// Flow component.
    #[serde(rename = "flowService")]
    pub flow: FlowState,
}

impl StateSnapshot {
    /// Capture a snapshot from a finished (or failed) run.
    #[must_use]
    pub fn capture(config: &RunConfig, chain: &Chain, result: &FlowResult) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            configuration: ConfigurationState {
                config: config.clone(),
                nodes: chain.nodes().to_vec(),
            },
            checkout: CheckoutState {
                nodes: result.checkout_info.clone(),
            },
            flow: result.execution_result.clone(),
        }
    }

    /// Split the snapshot into the pieces a resumed run needs.
    #[must_use]
    pub fn into_parts(self) -> (RunConfig, Chain, PriorRun) {
        let prior = PriorRun::new(&self.checkout.nodes, &self.flow);
        (
            self.configuration.config,
            Chain::new(self.configuration.nodes),
            prior,
        )
    }
}

/// Path of the state file under a working folder.
#[must_use]
pub fn state_file_path(root_folder: &Path) -> PathBuf {
    root_folder.join(STATE_FILE_NAME)
}

/// Write a snapshot to the working folder, replacing any previous one.
pub fn save(root_folder: &Path, snapshot: &StateSnapshot) -> Result<()> {
    std::fs::create_dir_all(root_folder)
        .with_context(|| format!("Failed to create {}", root_folder.display()))?;
    let path = state_file_path(root_folder);
    let json =
        serde_json::to_string_pretty(snapshot).context("Failed to serialize state snapshot")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write state file: {}", path.display()))?;
    Ok(())
}

/// Read the snapshot from a working folder.
pub fn load(root_folder: &Path) -> Result<StateSnapshot> {
    let path = state_file_path(root_folder);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let snapshot: StateSnapshot =
        serde_json::from_str(&content).context("Failed to parse state file")?;
    if snapshot.version != SNAPSHOT_VERSION {
        bail!(
            "Unsupported state file version {} (expected {SNAPSHOT_VERSION})",
            snapshot.version
        );
    }
    Ok(snapshot)
}

/// A previous run's recorded work, indexed for resume decisions.
#[derive(Debug, Clone, Default)]
pub struct PriorRun {
    checkouts: HashMap<String, CheckoutOutcome>,
    phases: HashMap<String, HashMap<Phase, ExecuteNodeResult>>,
}

impl PriorRun {
    /// Index checkout and phase results by project.
    #[must_use]
    pub fn new(checkouts: &[CheckedOutNode], flow: &PhaseResults) -> Self {
        let checkout_map = checkouts
            .iter()
            .map(|c| (c.project.clone(), c.outcome.clone()))
            .collect();

        let mut phase_map: HashMap<String, HashMap<Phase, ExecuteNodeResult>> = HashMap::new();
        for &phase in &Phase::ALL {
            for node_result in flow.phase(phase) {
                phase_map
                    .entry(node_result.project.clone())
                    .or_default()
                    .insert(phase, node_result.clone());
            }
        }

        Self {
            checkouts: checkout_map,
            phases: phase_map,
        }
    }

    /// The recorded checkout outcome for a project, if any.
    #[must_use]
    pub fn checkout(&self, project: &str) -> Option<&CheckoutOutcome> {
        self.checkouts.get(project)
    }

    /// A reusable checkout: resolved or skipped, not failed.
    #[must_use]
    pub fn reusable_checkout(&self, project: &str) -> Option<&CheckoutOutcome> {
        self.checkout(project).filter(|c| !c.is_failed())
    }

    /// The recorded result of one phase, if any.
    #[must_use]
    pub fn phase_result(&self, project: &str, phase: Phase) -> Option<&ExecuteNodeResult> {
        self.phases.get(project).and_then(|p| p.get(&phase))
    }

    /// Whether a phase must be (re-)executed: its prior result was failing
    /// or absent. A prior all-OK result is never re-executed.
    #[must_use]
    pub fn phase_needs_run(&self, project: &str, phase: Phase) -> bool {
        self.phase_result(project, phase)
            .is_none_or(|result| !result.ok())
    }

    /// Whether a node finished completely: checkout did not fail and every
    /// phase has a non-failing recorded result. Batches made entirely of
    /// complete nodes are replayed without being scheduled.
    #[must_use]
    pub fn node_complete(&self, project: &str) -> bool {
        self.reusable_checkout(project).is_some()
            && Phase::ALL
                .iter()
                .all(|&phase| !self.phase_needs_run(project, phase))
    }
}

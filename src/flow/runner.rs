//! Flow runner
//!
//! Drives a run end to end: batches the chain, and within each batch
//! resolves checkouts and executes command phases concurrently per node.
//! A batch is a hard synchronization barrier; the next batch is not even
//! constructed until every task of the current one has settled.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use tokio::task::JoinSet;

use crate::chain::{Chain, ExecutionLevel, Node, Phase};
use crate::checkout::{
    copy_dir_recursive, CheckoutOutcome, CheckoutResolver, ForgeClient, Git,
};
use crate::command::{seeded_env, CommandExecutor, SharedEnv};
use crate::config::RunConfig;
use crate::flow::result::{
    ArtifactResult, CheckedOutNode, ExecuteNodeResult, FlowResult,
};
use crate::flow::scheduler::{batches, sequential_batches};
use crate::state::{save, PriorRun, StateSnapshot};

/// Everything one per-node task needs, cloned before being moved onto the
/// join set.
struct NodeTask {
    node: Node,
    starter: Node,
    level: ExecutionLevel,
    config: Arc<RunConfig>,
    forge: Arc<dyn ForgeClient>,
    git: Arc<dyn Git>,
    env: SharedEnv,
    prior_checkout: Option<CheckoutOutcome>,
    prior_phases: HashMap<Phase, ExecuteNodeResult>,
}

/// One node's complete outcome for a run.
struct NodeRunOutcome {
    project: String,
    checkout: CheckoutOutcome,
    phases: HashMap<Phase, ExecuteNodeResult>,
}

impl NodeRunOutcome {
    fn ok(&self) -> bool {
        !self.checkout.is_failed() && self.phases.values().all(ExecuteNodeResult::ok)
    }
}

/// Orchestrates a whole run over a resolved chain.
pub struct FlowRunner {
    config: Arc<RunConfig>,
    chain: Chain,
    forge: Arc<dyn ForgeClient>,
    git: Arc<dyn Git>,
    env: SharedEnv,
}

impl FlowRunner {
    /// Create a runner with its collaborators passed in explicitly. The run
    /// environment is seeded from the OS process environment.
    #[must_use]
    pub fn new(
        config: RunConfig,
        chain: Chain,
        forge: Arc<dyn ForgeClient>,
        git: Arc<dyn Git>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            chain,
            forge,
            git,
            env: seeded_env(),
        }
    }

    /// Replace the run environment. Mostly useful for tests that need a
    /// clean, inspectable map.
    #[must_use]
    pub fn with_env(mut self, env: SharedEnv) -> Self {
        self.env = env;
        self
    }

    /// The chain this runner operates on.
    #[must_use]
    pub const fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Execute the run, optionally replaying a prior run's completed work.
    ///
    /// Returns the aggregated result; individual command and checkout
    /// failures are recorded in it, not raised. A state snapshot is written
    /// to the working folder on every terminal state (except dry runs).
    pub async fn run(&self, prior: Option<&PriorRun>) -> Result<FlowResult> {
        let starter_project = self.config.starting_project.as_str();
        let starter_index = self.chain.starter_index(starter_project)?;
        let starter = self.chain.get(starter_index).clone();

        let layers = if self.config.sequential {
            sequential_batches(&self.chain)
        } else {
            batches(&self.chain)?
        };

        let mut checkout_map: HashMap<String, CheckoutOutcome> = HashMap::new();
        let mut phase_map: HashMap<String, HashMap<Phase, ExecuteNodeResult>> = HashMap::new();
        let mut stop_scheduling = false;

        for (batch_number, batch) in layers.iter().enumerate() {
            if stop_scheduling {
                break;
            }

            // Batches whose nodes all completed in a prior run are replayed,
            // not re-scheduled.
            if let Some(prior) = prior {
                let complete = batch
                    .iter()
                    .all(|&i| prior.node_complete(&self.chain.get(i).project));
                if complete {
                    for &i in batch {
                        self.replay_node(prior, &self.chain.get(i).project, &mut checkout_map, &mut phase_map);
                    }
                    continue;
                }
            }

            self.print_batch_header(batch_number, layers.len(), batch);

            let mut tasks = JoinSet::new();
            for &i in batch {
                let project = &self.chain.get(i).project;
                let task = NodeTask {
                    node: self.chain.get(i).clone(),
                    starter: starter.clone(),
                    level: self.chain.execution_level(i, starter_index),
                    config: Arc::clone(&self.config),
                    forge: Arc::clone(&self.forge),
                    git: Arc::clone(&self.git),
                    env: Arc::clone(&self.env),
                    prior_checkout: prior
                        .and_then(|p| p.reusable_checkout(project))
                        .cloned(),
                    prior_phases: prior.map_or_else(HashMap::new, |p| {
                        Phase::ALL
                            .iter()
                            .filter_map(|&phase| {
                                p.phase_result(project, phase)
                                    .filter(|result| result.ok())
                                    .map(|result| (phase, result.clone()))
                            })
                            .collect()
                    }),
                };
                tasks.spawn(run_node(task));
            }

            // Hard barrier: let every sibling settle, even after a failure.
            let mut batch_failed = false;
            while let Some(joined) = tasks.join_next().await {
                let outcome = joined.context("node task panicked")?;
                if !outcome.ok() {
                    batch_failed = true;
                }
                checkout_map.insert(outcome.project.clone(), outcome.checkout);
                phase_map.insert(outcome.project, outcome.phases);
            }

            if batch_failed && !self.config.fail_at_end {
                stop_scheduling = true;
            }
        }

        let mut result = self.assemble(checkout_map, phase_map);
        if !self.config.dry_run {
            result.artifacts = self.archive_artifacts(&result);
            let snapshot = StateSnapshot::capture(&self.config, &self.chain, &result);
            save(&self.config.root_folder, &snapshot)?;
        }
        Ok(result)
    }

    /// Copy a completed node's prior results forward unchanged.
    fn replay_node(
        &self,
        prior: &PriorRun,
        project: &str,
        checkout_map: &mut HashMap<String, CheckoutOutcome>,
        phase_map: &mut HashMap<String, HashMap<Phase, ExecuteNodeResult>>,
    ) {
        if let Some(outcome) = prior.checkout(project) {
            checkout_map.insert(project.to_string(), outcome.clone());
        }
        let phases = Phase::ALL
            .iter()
            .filter_map(|&phase| {
                prior
                    .phase_result(project, phase)
                    .map(|result| (phase, result.clone()))
            })
            .collect();
        phase_map.insert(project.to_string(), phases);
    }

    /// Collect per-node maps into chain-ordered result lists.
    fn assemble(
        &self,
        mut checkout_map: HashMap<String, CheckoutOutcome>,
        mut phase_map: HashMap<String, HashMap<Phase, ExecuteNodeResult>>,
    ) -> FlowResult {
        let mut result = FlowResult::default();
        for node in self.chain.nodes() {
            if let Some(outcome) = checkout_map.remove(&node.project) {
                result.checkout_info.push(CheckedOutNode {
                    project: node.project.clone(),
                    outcome,
                });
            }
            if let Some(mut phases) = phase_map.remove(&node.project) {
                for &phase in &Phase::ALL {
                    if let Some(node_result) = phases.remove(&phase) {
                        result.execution_result.phase_mut(phase).push(node_result);
                    }
                }
            }
        }
        result
    }

    /// Collect declared artifacts from every checked-out node.
    fn archive_artifacts(&self, result: &FlowResult) -> Vec<ArtifactResult> {
        let mut collected = Vec::new();
        for node in self.chain.nodes() {
            let Some(declared) = &node.archive_artifacts else {
                continue;
            };
            let checked_out = result
                .checkout_info
                .iter()
                .any(|c| c.project == node.project && !c.outcome.is_failed());
            if !checked_out {
                continue;
            }

            let repo_dir = self.node_workdir(node, result);
            let archive_name = declared.name.clone().unwrap_or_else(|| node.repo_dir_name());
            let destination = self
                .config
                .root_folder
                .join("artifacts")
                .join(archive_name);

            for path in &declared.paths {
                let source = repo_dir.join(path);
                let archived = archive_path(&source, &destination.join(path));
                collected.push(ArtifactResult {
                    project: node.project.clone(),
                    path: path.clone(),
                    archived,
                });
            }
        }
        collected
    }

    /// The directory a node's commands run in.
    fn node_workdir(&self, node: &Node, result: &FlowResult) -> PathBuf {
        result
            .checkout_info
            .iter()
            .find(|c| c.project == node.project)
            .and_then(|c| c.outcome.info())
            .map_or_else(
                || self.config.root_folder.join(node.repo_dir_name()),
                |info| info.repo_dir.clone(),
            )
    }

    fn print_batch_header(&self, batch_number: usize, total: usize, batch: &[usize]) {
        let projects: Vec<&str> = batch
            .iter()
            .map(|&i| self.chain.get(i).project.as_str())
            .collect();
        eprintln!(
            "\n{} {}",
            format!("=== batch {}/{total}", batch_number + 1).bold().cyan(),
            projects.join(", ")
        );
    }
}

/// Copy one artifact path (file or directory) into the archive location.
fn archive_path(source: &Path, destination: &Path) -> bool {
    if source.is_dir() {
        return copy_dir_recursive(source, destination).is_ok();
    }
    if source.is_file() {
        if let Some(parent) = destination.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return false;
            }
        }
        return std::fs::copy(source, destination).is_ok();
    }
    false
}

/// Run one node: checkout (unless reused or skipped), then every phase at
/// the node's execution level. Never fails; everything is folded into the
/// returned outcome.
async fn run_node(task: NodeTask) -> NodeRunOutcome {
    let project = task.node.project.clone();
    let checkout = resolve_checkout(&task).await;

    if checkout.is_failed() {
        if let CheckoutOutcome::NotCheckedOut { reason } = &checkout {
            eprintln!("{} {project}: {reason}", "✗".red().bold());
        }
        // Commands cannot run without a checkout; the absent phase results
        // make resume re-execute them after the checkout is repaired.
        return NodeRunOutcome {
            project,
            checkout,
            phases: HashMap::new(),
        };
    }

    let workdir = checkout.info().map_or_else(
        || task.config.root_folder.join(task.node.repo_dir_name()),
        |info| info.repo_dir.clone(),
    );
    // Skipped checkouts still need a working folder for their commands; a
    // folder that cannot be created fails the node with the real cause
    // instead of an opaque spawn error on every command.
    if let Err(e) = std::fs::create_dir_all(&workdir) {
        let reason = format!(
            "failed to create working folder {}: {e}",
            workdir.display()
        );
        eprintln!("{} {project}: {reason}", "✗".red().bold());
        return NodeRunOutcome {
            project,
            checkout: CheckoutOutcome::NotCheckedOut { reason },
            phases: HashMap::new(),
        };
    }

    let executor = CommandExecutor::new(
        Arc::clone(&task.env),
        task.config.replace_expressions.clone(),
        task.config.dry_run,
    );
    let skip = task.config.execution_skipped(&project);

    let mut phases = HashMap::new();
    for &phase in &Phase::ALL {
        if let Some(previous) = task.prior_phases.get(&phase) {
            phases.insert(phase, previous.clone());
            continue;
        }
        let commands = task.node.build.phase(phase).for_level(task.level);
        let results = executor.execute_all(commands, &workdir, skip).await;
        let node_result = ExecuteNodeResult {
            project: project.clone(),
            results,
        };
        if !node_result.ok() {
            eprintln!(
                "{} {project} [{}]",
                "✗".red().bold(),
                phase.label()
            );
        }
        phases.insert(phase, node_result);
    }

    let outcome = NodeRunOutcome {
        project,
        checkout,
        phases,
    };
    if outcome.ok() {
        eprintln!("{} {}", "✓".green(), outcome.project);
    }
    outcome
}

/// Reuse, skip or resolve-and-materialize the node's checkout.
async fn resolve_checkout(task: &NodeTask) -> CheckoutOutcome {
    if let Some(previous) = &task.prior_checkout {
        return previous.clone();
    }
    if task.config.checkout_skipped(&task.node.project) {
        return CheckoutOutcome::Skipped;
    }

    let resolver = CheckoutResolver::new(Arc::clone(&task.config), Arc::clone(&task.forge));
    let info = match resolver.resolve(&task.node, &task.starter).await {
        Ok(info) => info,
        Err(e) => {
            return CheckoutOutcome::NotCheckedOut {
                reason: format!("resolution failed: {e:#}"),
            }
        }
    };

    if let Err(e) = resolver
        .materialize(task.git.as_ref(), &task.node.project, &info)
        .await
    {
        return CheckoutOutcome::NotCheckedOut {
            reason: e.to_string(),
        };
    }

    // Replicate the materialized checkout into any extra clone locations.
    for extra in &task.node.clone_dirs {
        let destination = task.config.root_folder.join(extra);
        if destination.exists() {
            continue;
        }
        if let Err(e) = copy_dir_recursive(&info.repo_dir, &destination) {
            return CheckoutOutcome::NotCheckedOut {
                reason: format!("clone replication to '{extra}' failed: {e:#}"),
            };
        }
    }

    CheckoutOutcome::CheckedOut { info }
}

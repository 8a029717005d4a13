//! Checkout resolution
//!
//! Decides, for every non-skipped node, which source/target branch pair to
//! materialize on disk. A fixed-priority three-case protocol is evaluated in
//! order, first match wins:
//!
//! 1. a pull request from a fork owned by the triggering author,
//! 2. a pull request from a branch on the target repository itself,
//! 3. no pull request: the mapped target branch is checked out directly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::chain::Node;
use crate::checkout::forge::ForgeClient;
use crate::checkout::git::Git;
use crate::config::RunConfig;
use crate::error::ChainError;

/// Resolved source/target decision for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutInfo {
    /// Account the source repository belongs to.
    pub source_group: String,
    /// Source repository name (may differ from the target for renamed forks).
    pub source_name: String,
    /// Branch checked out or merged from the source.
    pub source_branch: String,
    /// Account the target repository belongs to.
    pub target_group: String,
    /// Target repository name.
    pub target_name: String,
    /// Mapped branch on the target repository.
    pub target_branch: String,
    /// Directory the repository is materialized into.
    pub repo_dir: PathBuf,
    /// Whether the source branch is merged on top of the target branch.
    pub merge: bool,
}

/// Per-node checkout outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum CheckoutOutcome {
    /// The node was resolved and materialized.
    CheckedOut {
        /// The resolved decision.
        info: CheckoutInfo,
    },
    /// Checkout was explicitly skipped for this node.
    Skipped,
    /// Clone or merge failed; the node was not checked out.
    NotCheckedOut {
        /// Failure description with full context.
        reason: String,
    },
}

impl CheckoutOutcome {
    /// The resolved checkout info, when the node was checked out.
    #[must_use]
    pub const fn info(&self) -> Option<&CheckoutInfo> {
        match self {
            Self::CheckedOut { info } => Some(info),
            Self::Skipped | Self::NotCheckedOut { .. } => None,
        }
    }

    /// Whether checkout failed for this node.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::NotCheckedOut { .. })
    }
}

/// Translate the starter's target branch into the equivalent branch for
/// `node`.
///
/// Pure and deterministic: if the starter declares `source -> target` and
/// the run branch equals its `source`, peers see `target`; if the node
/// declares a mapping whose `target` equals the incoming branch, the node
/// checks out its own `source` instead (e.g. `main -> 8.x`).
#[must_use]
pub fn map_branch(starter: &Node, node: &Node, target_branch: &str) -> String {
    if starter.project == node.project {
        return target_branch.to_string();
    }

    let mut branch = target_branch.to_string();
    if let Some(mapping) = &starter.mapping {
        if mapping.source == branch {
            branch = mapping.target.clone();
        }
    }
    if let Some(mapping) = &node.mapping {
        if mapping.target == branch {
            branch = mapping.source.clone();
        }
    }
    branch
}

/// Produces [`CheckoutInfo`] for chain nodes and materializes them on disk.
pub struct CheckoutResolver {
    config: Arc<RunConfig>,
    forge: Arc<dyn ForgeClient>,
}

impl CheckoutResolver {
    /// Create a resolver over the run configuration and forge client.
    #[must_use]
    pub fn new(config: Arc<RunConfig>, forge: Arc<dyn ForgeClient>) -> Self {
        Self { config, forge }
    }

    /// Resolve the source/target decision for `node`.
    ///
    /// Deterministic given fixed fork/PR lookup answers. Lookup misses fall
    /// through to the next case; only transport failures are errors.
    pub async fn resolve(&self, node: &Node, starter: &Node) -> Result<CheckoutInfo> {
        let target_group = node.group().to_string();
        let target_name = node.name().to_string();
        let mapped_branch = map_branch(starter, node, &self.config.target_branch);
        let repo_dir = self.config.root_folder.join(node.repo_dir_name());

        // Case 1: pull request from a fork owned by the triggering author.
        if let Some(fork_name) = self
            .forge
            .fork_name(&target_group, &self.config.source_group, &target_name)
            .await?
        {
            let head = format!("{}:{}", self.config.source_group, self.config.source_branch);
            if self
                .forge
                .has_pull_request(&target_group, &target_name, &head, &mapped_branch)
                .await?
            {
                return Ok(CheckoutInfo {
                    source_group: self.config.source_group.clone(),
                    source_name: fork_name,
                    source_branch: self.config.source_branch.clone(),
                    target_group,
                    target_name,
                    target_branch: mapped_branch,
                    repo_dir,
                    merge: true,
                });
            }
        }

        // Case 2: pull request from a branch on the target repository.
        let head = format!("{target_group}:{}", self.config.source_branch);
        if self
            .forge
            .has_pull_request(&target_group, &target_name, &head, &mapped_branch)
            .await?
        {
            return Ok(CheckoutInfo {
                source_group: target_group.clone(),
                source_name: target_name.clone(),
                source_branch: self.config.source_branch.clone(),
                target_group,
                target_name,
                target_branch: mapped_branch,
                repo_dir,
                merge: true,
            });
        }

        // Case 3: no pull request, check out the mapped branch directly.
        // Branch existence is not pre-validated; a missing branch surfaces
        // as a clone failure.
        Ok(CheckoutInfo {
            source_group: target_group.clone(),
            source_name: target_name.clone(),
            source_branch: mapped_branch.clone(),
            target_group,
            target_name,
            target_branch: mapped_branch,
            repo_dir,
            merge: false,
        })
    }

    /// Materialize a resolved checkout: clone the target branch and, for
    /// pull requests, merge the source branch on top and rename the local
    /// branch after it.
    ///
    /// An existing checkout directory is reused as-is, which keeps resumed
    /// runs from re-cloning.
    pub async fn materialize(
        &self,
        git: &dyn Git,
        project: &str,
        info: &CheckoutInfo,
    ) -> Result<(), ChainError> {
        if info.repo_dir.exists() {
            return Ok(());
        }

        let checkout = async {
            let target_url = format!(
                "{}/{}/{}",
                self.config.forge_url, info.target_group, info.target_name
            );
            git.clone_repo(&target_url, &info.repo_dir, &info.target_branch)
                .await?;

            if info.merge {
                let source_url = format!(
                    "{}/{}/{}",
                    self.config.forge_url, info.source_group, info.source_name
                );
                git.merge(&info.repo_dir, &source_url, &info.source_branch)
                    .await?;
                git.rename_branch(&info.repo_dir, &info.source_branch).await?;
            }
            Ok::<(), anyhow::Error>(())
        };

        checkout.await.map_err(|e| ChainError::Checkout {
            project: project.to_string(),
            reason: format!("{e:#}"),
        })
    }
}

//! Run configuration
//!
//! The resolved configuration a flow runs with. The CLI surface builds one
//! of these from arguments; `tools resume` rebuilds it from the snapshot.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which flow triggered the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowType {
    /// Cross-repository pull request: starter plus its transitive upstream.
    CrossPullRequest,
    /// Push that rebuilds the starter's whole downstream tree as well.
    FullDownstream,
    /// Single-repository pull request: starter only.
    SinglePullRequest,
    /// Manual branch build naming a starting project.
    Branch,
}

impl FlowType {
    /// Whether this flow builds the starter's transitive upstream.
    #[must_use]
    pub const fn includes_upstream(self) -> bool {
        !matches!(self, Self::SinglePullRequest)
    }

    /// Whether this flow builds the starter's transitive downstream.
    ///
    /// Branch flows only do so when the full project dependency tree was
    /// requested.
    #[must_use]
    pub const fn includes_downstream(self, full_project_dependency_tree: bool) -> bool {
        match self {
            Self::FullDownstream => true,
            Self::Branch => full_project_dependency_tree,
            Self::CrossPullRequest | Self::SinglePullRequest => false,
        }
    }

    /// Human-readable flow name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CrossPullRequest => "cross-pr",
            Self::FullDownstream => "full-downstream",
            Self::SinglePullRequest => "single-pr",
            Self::Branch => "branch",
        }
    }
}

/// Resolved configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// The triggering flow.
    pub flow_type: FlowType,
    /// Project id that anchors the run.
    pub starting_project: String,
    /// Account that authored the triggering source (fork lookups key on it).
    pub source_group: String,
    /// Branch the triggering change lives on.
    pub source_branch: String,
    /// Branch the triggering change targets; mapped per node.
    pub target_branch: String,
    /// Working folder; per-node checkout dirs and the state file live here.
    pub root_folder: PathBuf,
    /// Record failures and keep scheduling instead of stopping at the first
    /// failed batch.
    #[serde(default)]
    pub fail_at_end: bool,
    /// One node per batch, in chain order.
    #[serde(default)]
    pub sequential: bool,
    /// Record every command as SKIP without invoking anything.
    #[serde(default)]
    pub skip_execution: bool,
    /// Projects whose commands are recorded as SKIP.
    #[serde(default)]
    pub skip_project_execution: Vec<String>,
    /// Skip checkout for every node.
    #[serde(default)]
    pub skip_checkout: bool,
    /// Projects whose checkout is skipped.
    #[serde(default)]
    pub skip_project_checkout: Vec<String>,
    /// Ordered `pattern||replacement` command treatment expressions.
    #[serde(default)]
    pub replace_expressions: Vec<String>,
    /// Branch flows: build the entire tree, not just upstream.
    #[serde(default)]
    pub full_project_dependency_tree: bool,
    /// Base URL repositories are cloned from.
    #[serde(default = "default_forge_url")]
    pub forge_url: String,
    /// Base URL for fork/PR REST lookups.
    #[serde(default = "default_forge_api_url")]
    pub forge_api_url: String,
    /// Stub git, forge and command execution (`tools plan`).
    #[serde(default)]
    pub dry_run: bool,
}

fn default_forge_url() -> String {
    "https://github.com".to_string()
}

fn default_forge_api_url() -> String {
    "https://api.github.com".to_string()
}

impl RunConfig {
    /// Whether execution is skipped for the given project.
    #[must_use]
    pub fn execution_skipped(&self, project: &str) -> bool {
        self.skip_execution || self.skip_project_execution.iter().any(|p| p == project)
    }

    /// Whether checkout is skipped for the given project.
    #[must_use]
    pub fn checkout_skipped(&self, project: &str) -> bool {
        self.skip_checkout || self.skip_project_checkout.iter().any(|p| p == project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_config;

    #[test]
    fn test_flow_type_chain_shape() {
        assert!(FlowType::CrossPullRequest.includes_upstream());
        assert!(!FlowType::CrossPullRequest.includes_downstream(false));

        assert!(FlowType::FullDownstream.includes_upstream());
        assert!(FlowType::FullDownstream.includes_downstream(false));

        assert!(!FlowType::SinglePullRequest.includes_upstream());
        assert!(!FlowType::SinglePullRequest.includes_downstream(true));

        assert!(FlowType::Branch.includes_upstream());
        assert!(!FlowType::Branch.includes_downstream(false));
        assert!(FlowType::Branch.includes_downstream(true));
    }

    #[test]
    fn test_execution_skipped_globally() {
        let mut config = test_config("g/a");
        config.skip_execution = true;
        assert!(config.execution_skipped("g/a"));
        assert!(config.execution_skipped("g/other"));
    }

    #[test]
    fn test_execution_skipped_per_project() {
        let mut config = test_config("g/a");
        config.skip_project_execution = vec!["g/skipme".to_string()];
        assert!(config.execution_skipped("g/skipme"));
        assert!(!config.execution_skipped("g/a"));
    }

    #[test]
    fn test_checkout_skipped_per_project() {
        let mut config = test_config("g/a");
        config.skip_project_checkout = vec!["g/local".to_string()];
        assert!(config.checkout_skipped("g/local"));
        assert!(!config.checkout_skipped("g/a"));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = test_config("g/a");
        let json = serde_json::to_string(&config).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_forge_defaults_applied_when_absent() {
        let config: RunConfig = serde_json::from_str(
            r#"{
                "flow_type": "cross-pull-request",
                "starting_project": "g/a",
                "source_group": "author",
                "source_branch": "feature",
                "target_branch": "main",
                "root_folder": "/tmp/work"
            }"#,
        )
        .unwrap();
        assert_eq!(config.forge_url, "https://github.com");
        assert_eq!(config.forge_api_url, "https://api.github.com");
        assert!(!config.fail_at_end);
    }
}

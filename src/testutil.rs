//! Shared test utilities
//!
//! Common helpers used across test modules. Only compiled in test builds.

use std::path::PathBuf;

use crate::chain::{BuildCommands, Chain, LevelCommands, Node};
use crate::config::{FlowType, RunConfig};

/// Create a node with no dependencies and no commands.
#[must_use]
pub fn node(project: &str) -> Node {
    Node {
        project: project.to_string(),
        dependencies: vec![],
        mapping: None,
        build: BuildCommands::default(),
        archive_artifacts: None,
        clone_dirs: vec![],
    }
}

/// Create a node depending on the given project ids.
#[must_use]
pub fn node_with_deps(project: &str, dependencies: &[&str]) -> Node {
    let mut n = node(project);
    n.dependencies = dependencies.iter().map(ToString::to_string).collect();
    n
}

/// Create a node whose `commands` phase runs the given current-level commands.
#[must_use]
pub fn node_with_commands(project: &str, commands: &[&str]) -> Node {
    let mut n = node(project);
    n.build.commands = LevelCommands {
        current: commands.iter().map(ToString::to_string).collect(),
        upstream: None,
        downstream: None,
    };
    n
}

/// Create a chain of independent nodes in the given order.
#[must_use]
pub fn chain_of(projects: &[&str]) -> Chain {
    Chain::new(projects.iter().map(|p| node(p)).collect())
}

/// A minimal cross-PR run configuration for tests.
#[must_use]
pub fn test_config(starting_project: &str) -> RunConfig {
    RunConfig {
        flow_type: FlowType::CrossPullRequest,
        starting_project: starting_project.to_string(),
        source_group: "author".to_string(),
        source_branch: "feature".to_string(),
        target_branch: "main".to_string(),
        root_folder: PathBuf::from("/tmp/build-chain-test"),
        fail_at_end: false,
        sequential: false,
        skip_execution: false,
        skip_project_execution: vec![],
        skip_checkout: false,
        skip_project_checkout: vec![],
        replace_expressions: vec![],
        full_project_dependency_tree: false,
        forge_url: "https://github.com".to_string(),
        forge_api_url: "https://api.github.com".to_string(),
        dry_run: false,
    }
}

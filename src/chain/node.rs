//! Node definitions: one repository participating in a run.
//!
//! Nodes arrive already dependency-ordered from the definition file reader
//! and are immutable once the run starts; results are accumulated separately.

use serde::{Deserialize, Serialize};

/// Build phase within one node's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Setup commands run before the main build.
    Before,
    /// The main build commands.
    Commands,
    /// Cleanup/reporting commands run after the main build.
    After,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Self; 3] = [Self::Before, Self::Commands, Self::After];

    /// Human-readable phase name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::Commands => "commands",
            Self::After => "after",
        }
    }
}

/// A node's position relative to the starter project.
///
/// Always derived from the node's index versus the starter's index in the
/// chain, never stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionLevel {
    /// The node appears before the starter: a dependency.
    Upstream,
    /// The node is the starter itself.
    Current,
    /// The node appears after the starter: a dependant.
    Downstream,
}

/// Command lists per execution level for one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCommands {
    /// Commands run when the node is the starter. Also the documented
    /// fallback for upstream/downstream when no level-specific list exists.
    #[serde(default)]
    pub current: Vec<String>,
    /// Commands run when the node builds upstream of the starter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Vec<String>>,
    /// Commands run when the node builds downstream of the starter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downstream: Option<Vec<String>>,
}

impl LevelCommands {
    /// Select the command list for `level`, falling back to `current` when
    /// the node declares no level-specific list.
    #[must_use]
    pub fn for_level(&self, level: ExecutionLevel) -> &[String] {
        match level {
            ExecutionLevel::Current => &self.current,
            ExecutionLevel::Upstream => self.upstream.as_deref().unwrap_or(&self.current),
            ExecutionLevel::Downstream => self.downstream.as_deref().unwrap_or(&self.current),
        }
    }

    /// Whether no commands are declared for any level.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.upstream.is_none() && self.downstream.is_none()
    }
}

/// The before/commands/after grid for one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCommands {
    /// Setup commands.
    #[serde(default)]
    pub before: LevelCommands,
    /// Main build commands.
    #[serde(default)]
    pub commands: LevelCommands,
    /// Cleanup commands.
    #[serde(default)]
    pub after: LevelCommands,
}

impl BuildCommands {
    /// The level grid for one phase.
    #[must_use]
    pub const fn phase(&self, phase: Phase) -> &LevelCommands {
        match phase {
            Phase::Before => &self.before,
            Phase::Commands => &self.commands,
            Phase::After => &self.after,
        }
    }
}

/// Declared branch-name translation for a node.
///
/// `source` is this node's branch name that corresponds to `target` on its
/// peers, e.g. `source = "8.x", target = "main"` means this node's `8.x`
/// tracks everyone else's `main`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchMapping {
    /// This node's branch name.
    pub source: String,
    /// The equivalent branch name on peer projects.
    pub target: String,
}

/// Artifacts to collect from the node's checkout after its build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveArtifacts {
    /// Archive name; defaults to the node's directory name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Paths relative to the node's checkout directory.
    #[serde(default)]
    pub paths: Vec<String>,
}

/// One repository participating in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Stable project id in `group/name` form.
    pub project: String,
    /// Project ids this node depends on. Must be declared earlier in the
    /// definition file.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Branch-name translation relative to peer projects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<BranchMapping>,
    /// Per-phase, per-level build commands.
    #[serde(default)]
    pub build: BuildCommands,
    /// Artifacts to collect after the build.
    #[serde(
        default,
        rename = "archive-artifacts",
        skip_serializing_if = "Option::is_none"
    )]
    pub archive_artifacts: Option<ArchiveArtifacts>,
    /// Extra checkout locations replicated from the primary clone.
    #[serde(default, rename = "clone")]
    pub clone_dirs: Vec<String>,
}

impl Node {
    /// The group (owner) part of the project id.
    #[must_use]
    pub fn group(&self) -> &str {
        self.project
            .split_once('/')
            .map_or(self.project.as_str(), |(group, _)| group)
    }

    /// The repository name part of the project id.
    #[must_use]
    pub fn name(&self) -> &str {
        self.project
            .split_once('/')
            .map_or(self.project.as_str(), |(_, name)| name)
    }

    /// Directory name for this node under the run's working folder.
    ///
    /// Derived from the project id so filesystem writes across nodes never
    /// collide.
    #[must_use]
    pub fn repo_dir_name(&self) -> String {
        self.project.replace('/', "_")
    }
}

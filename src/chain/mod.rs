//! Node model
//!
//! This module owns the dependency chain data structure and the
//! execution-level classifier.

#[allow(clippy::module_inception)]
pub mod chain;
pub mod node;

pub use chain::Chain;
pub use node::{
    ArchiveArtifacts, BranchMapping, BuildCommands, ExecutionLevel, LevelCommands, Node, Phase,
};

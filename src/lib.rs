//! build-chain - Cross-repository build orchestrator
//!
//! build-chain checks out a chain of interdependent repositories around a
//! starting project, picks the right branch (or pull-request merge) for each
//! one, and executes their build commands in dependency-respecting parallel
//! batches. Interrupted runs resume from a persisted state snapshot.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

pub mod chain;
pub mod checkout;
pub mod command;
pub mod config;
pub mod definition;
pub mod error;
pub mod flow;
pub mod state;
pub mod summary;

#[cfg(test)]
pub mod testutil;

// Re-export commonly used types
pub use chain::{Chain, ExecutionLevel, Node, Phase};
pub use checkout::{CheckoutInfo, CheckoutOutcome, CheckoutResolver, ForgeClient, Git};
pub use command::{CommandExecutor, CommandOutcome, ExecuteCommandResult};
pub use config::{FlowType, RunConfig};
pub use definition::{parse_definition, read_definition};
pub use error::ChainError;
pub use flow::{FlowResult, FlowRunner};
pub use state::{PriorRun, StateSnapshot};

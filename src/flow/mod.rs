//! Flow orchestration
//!
//! Scheduling, per-run result aggregation and the runner that drives a
//! whole chain build.

pub mod result;
pub mod runner;
pub mod scheduler;

pub use result::{ArtifactResult, CheckedOutNode, ExecuteNodeResult, FlowResult, PhaseResults};
pub use runner::FlowRunner;
pub use scheduler::{batches, sequential_batches};

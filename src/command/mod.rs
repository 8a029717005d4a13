//! Command pipeline
//!
//! This module owns per-phase command selection helpers, the treatment
//! pipeline applied to every command string, and the execution strategies.

pub mod executor;
pub mod treatment;

pub use executor::{
    empty_env, seeded_env, CommandExecutor, CommandOutcome, ExecuteCommandResult, SharedEnv,
};
pub use treatment::{apply_replacement, interpolate_env, treat_command, treat_maven};

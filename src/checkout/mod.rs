//! Checkout resolution and materialization
//!
//! This module owns per-node checkout decisions (the three-case fork/PR
//! protocol), the forge lookups feeding them, and the git plumbing that
//! materializes the result on disk.

pub mod forge;
pub mod git;
pub mod resolver;

pub use forge::{ForgeClient, GithubClient, NullForge};
pub use git::{copy_dir_recursive, CliGit, DryRunGit, Git};
pub use resolver::{map_branch, CheckoutInfo, CheckoutOutcome, CheckoutResolver};

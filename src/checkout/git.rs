//! Git plumbing
//!
//! Opaque clone/merge/rename operations over the `git` binary, plus the
//! directory replication used for a node's extra `clone` locations. A
//! dry-run implementation backs `tools plan`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

/// The git operations the checkout step needs.
#[async_trait]
pub trait Git: Send + Sync {
    /// Clone `url` at `branch` into `dir`.
    async fn clone_repo(&self, url: &str, dir: &Path, branch: &str) -> Result<()>;

    /// Fetch and merge `url`'s `branch` into the checkout at `dir`.
    async fn merge(&self, dir: &Path, url: &str, branch: &str) -> Result<()>;

    /// Rename the current local branch at `dir` to `branch`.
    async fn rename_branch(&self, dir: &Path, branch: &str) -> Result<()>;
}

/// Real implementation shelling out to the `git` binary.
pub struct CliGit;

#[async_trait]
impl Git for CliGit {
    async fn clone_repo(&self, url: &str, dir: &Path, branch: &str) -> Result<()> {
        let dir = dir.to_string_lossy();
        run_git(&["clone", "-b", branch, "--single-branch", url, &dir], None).await?;
        Ok(())
    }

    async fn merge(&self, dir: &Path, url: &str, branch: &str) -> Result<()> {
        run_git(&["pull", "--no-rebase", url, branch], Some(dir)).await?;
        Ok(())
    }

    async fn rename_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        run_git(&["branch", "--move", branch], Some(dir)).await?;
        Ok(())
    }
}

/// Run one git command, failing with its captured stderr on non-zero exit.
async fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .await
        .with_context(|| format!("Failed to spawn git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Stub implementation for dry runs: prints what would happen and only
/// creates the checkout directory so later steps have a working folder.
pub struct DryRunGit;

#[async_trait]
impl Git for DryRunGit {
    async fn clone_repo(&self, url: &str, dir: &Path, branch: &str) -> Result<()> {
        eprintln!("[plan] clone {url} ({branch}) -> {}", dir.display());
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(())
    }

    async fn merge(&self, dir: &Path, url: &str, branch: &str) -> Result<()> {
        eprintln!("[plan] merge {url} ({branch}) into {}", dir.display());
        Ok(())
    }

    async fn rename_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        eprintln!("[plan] rename branch to {branch} in {}", dir.display());
        Ok(())
    }
}

/// Copy a directory tree. Used to replicate an already-materialized
/// checkout into a node's extra `clone` locations.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create {}", dst.display()))?;

    for entry in std::fs::read_dir(src)
        .with_context(|| format!("Failed to read {}", src.display()))?
    {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
        }
    }

    Ok(())
}

//! Command execution
//!
//! Runs treated commands and records one result per command. Two strategies:
//! `export VAR=value` writes into the shared run environment; everything
//! else runs as an ordinary shell invocation in the node's checkout
//! directory. A failing command is recorded, never raised, so a complete
//! per-node report is always produced.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::command::treatment::treat_command;
use crate::error::ChainError;

/// Outcome category for one executed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandOutcome {
    /// The command exited successfully.
    Ok,
    /// The command failed or could not be started.
    NotOk,
    /// Execution was skipped by configuration.
    Skip,
}

/// One command's recorded outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteCommandResult {
    /// The command as executed (after treatment), or as declared when
    /// skipped.
    pub command: String,
    /// Outcome category.
    pub result: CommandOutcome,
    /// When execution started.
    pub starting_date: DateTime<Utc>,
    /// When execution finished.
    pub ending_date: DateTime<Utc>,
    /// Elapsed milliseconds.
    pub time: u64,
    /// Captured error text for failed commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecuteCommandResult {
    /// Whether this command did not fail.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.result != CommandOutcome::NotOk
    }
}

/// The run's shared environment map.
///
/// Logically global to the run but deliberately decoupled from the OS
/// process environment. Shared and mutable: two sibling nodes in the same
/// batch exporting the same variable name race, which is a documented
/// hazard of the design.
pub type SharedEnv = Arc<Mutex<HashMap<String, String>>>;

/// A shared environment seeded from the OS process environment.
#[must_use]
pub fn seeded_env() -> SharedEnv {
    Arc::new(Mutex::new(std::env::vars().collect()))
}

/// An empty shared environment.
#[must_use]
pub fn empty_env() -> SharedEnv {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Executes treated commands against the shared run environment.
#[derive(Clone)]
pub struct CommandExecutor {
    env: SharedEnv,
    replace_expressions: Vec<String>,
    dry_run: bool,
}

impl CommandExecutor {
    /// Create an executor over the shared environment.
    #[must_use]
    pub const fn new(env: SharedEnv, replace_expressions: Vec<String>, dry_run: bool) -> Self {
        Self {
            env,
            replace_expressions,
            dry_run,
        }
    }

    fn lock_env(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.env.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute a command list sequentially, producing one result each.
    pub async fn execute_all(
        &self,
        commands: &[String],
        cwd: &Path,
        skip: bool,
    ) -> Vec<ExecuteCommandResult> {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            results.push(self.execute(command, cwd, skip).await);
        }
        results
    }

    /// Execute one command, never failing: errors are folded into the
    /// recorded result.
    pub async fn execute(&self, command: &str, cwd: &Path, skip: bool) -> ExecuteCommandResult {
        let starting_date = Utc::now();
        let timer = Instant::now();

        let (command, result, error_message) = if skip || self.dry_run {
            if self.dry_run {
                eprintln!("[plan] would run: {command}");
            }
            (command.to_string(), CommandOutcome::Skip, None)
        } else {
            let treated = {
                let env = self.lock_env().clone();
                treat_command(command, &env, &self.replace_expressions)
            };
            match treated {
                Err(e) => (command.to_string(), CommandOutcome::NotOk, Some(e.to_string())),
                Ok(treated) => match self.dispatch(&treated, cwd).await {
                    Ok(()) => (treated, CommandOutcome::Ok, None),
                    Err(message) => (treated, CommandOutcome::NotOk, Some(message)),
                },
            }
        };

        let ending_date = Utc::now();
        ExecuteCommandResult {
            command,
            result,
            starting_date,
            ending_date,
            time: u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX),
            error_message,
        }
    }

    /// Choose the execution strategy: export assignment or shell invocation.
    async fn dispatch(&self, command: &str, cwd: &Path) -> Result<(), String> {
        match parse_export(command) {
            Some(Ok((variable, raw_value))) => {
                let value = self.evaluate_export_value(&raw_value, cwd).await?;
                self.lock_env().insert(variable, value);
                Ok(())
            }
            Some(Err(e)) => Err(e.to_string()),
            None => self.run_shell(command, cwd).await,
        }
    }

    /// Resolve the value side of an export: a back-ticked sub-shell is
    /// executed and its stdout captured, otherwise quotes are stripped and
    /// the literal value is used.
    async fn evaluate_export_value(&self, raw_value: &str, cwd: &Path) -> Result<String, String> {
        if raw_value.len() >= 2 && raw_value.starts_with('`') && raw_value.ends_with('`') {
            let inner = &raw_value[1..raw_value.len() - 1];
            let output = self
                .shell_command(inner, cwd)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
                .map_err(|e| format!("failed to spawn sub-shell '{inner}': {e}"))?;

            if !output.status.success() {
                return Err(format!(
                    "sub-shell '{inner}' failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ));
            }
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Ok(raw_value
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string())
        }
    }

    /// Run an ordinary shell command in `cwd` with the run environment
    /// overlayed.
    async fn run_shell(&self, command: &str, cwd: &Path) -> Result<(), String> {
        let output = self
            .shell_command(command, cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| format!("failed to spawn '{command}': {e}"))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.is_empty() {
            print!("{stdout}");
        }

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"));
            if stderr.trim().is_empty() {
                Err(code)
            } else {
                Err(format!("{code}: {}", stderr.trim()))
            }
        }
    }

    fn shell_command(&self, command: &str, cwd: &Path) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(cwd);
        for (key, value) in self.lock_env().iter() {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Recognize `export VAR=expression` commands.
///
/// Returns `None` for non-export commands and `Some(Err)` for malformed
/// export syntax, which is fatal to that command only.
fn parse_export(command: &str) -> Option<Result<(String, String), ChainError>> {
    let rest = command.trim().strip_prefix("export ")?;
    let rest = rest.trim_start();

    let Some((variable, value)) = rest.split_once('=') else {
        return Some(Err(ChainError::InvalidInput(format!(
            "malformed export '{command}': expected 'export VAR=value'"
        ))));
    };

    let valid_name = !variable.is_empty()
        && variable
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && variable
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_name {
        return Some(Err(ChainError::InvalidInput(format!(
            "malformed export '{command}': invalid variable name '{variable}'"
        ))));
    }

    Some(Ok((variable.to_string(), value.trim().to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn executor(env: SharedEnv) -> CommandExecutor {
        CommandExecutor::new(env, vec![], false)
    }

    fn env_value(env: &SharedEnv, key: &str) -> Option<String> {
        env.lock().unwrap().get(key).cloned()
    }

    #[test]
    fn test_parse_export_plain_value() {
        let (variable, value) = parse_export("export VAR=value").unwrap().unwrap();
        assert_eq!(variable, "VAR");
        assert_eq!(value, "value");
    }

    #[test]
    fn test_parse_export_non_export_is_none() {
        assert!(parse_export("mvn install").is_none());
        // `exporting` is not the export keyword
        assert!(parse_export("exporting VAR=1").is_none());
    }

    #[test]
    fn test_parse_export_missing_assignment_is_invalid() {
        let err = parse_export("export JUSTANAME").unwrap().unwrap_err();
        assert!(err.to_string().contains("malformed export"));
    }

    #[test]
    fn test_parse_export_invalid_variable_name() {
        let err = parse_export("export 1BAD=value").unwrap().unwrap_err();
        assert!(err.to_string().contains("invalid variable name"));
    }

    #[tokio::test]
    async fn test_execute_successful_command() {
        let temp = TempDir::new().unwrap();
        let result = executor(empty_env())
            .execute("true", temp.path(), false)
            .await;
        assert_eq!(result.result, CommandOutcome::Ok);
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_execute_failing_command_records_not_ok() {
        let temp = TempDir::new().unwrap();
        let result = executor(empty_env())
            .execute("sh -c 'echo broken >&2; exit 3'", temp.path(), false)
            .await;
        assert_eq!(result.result, CommandOutcome::NotOk);
        let message = result.error_message.unwrap();
        assert!(message.contains("exit code 3"), "got: {message}");
        assert!(message.contains("broken"), "got: {message}");
    }

    #[tokio::test]
    async fn test_execute_skip_records_skip_without_running() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("marker");
        let command = format!("touch {}", marker.display());

        let result = executor(empty_env())
            .execute(&command, temp.path(), true)
            .await;

        assert_eq!(result.result, CommandOutcome::Skip);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_export_literal_value_lands_in_env() {
        let temp = TempDir::new().unwrap();
        let env = empty_env();
        let result = executor(env.clone())
            .execute("export BUILD_MVN_OPTS=-DskipTests", temp.path(), false)
            .await;

        assert_eq!(result.result, CommandOutcome::Ok);
        assert_eq!(env_value(&env, "BUILD_MVN_OPTS").unwrap(), "-DskipTests");
    }

    #[tokio::test]
    async fn test_export_strips_quotes() {
        let temp = TempDir::new().unwrap();
        let env = empty_env();
        executor(env.clone())
            .execute("export VAR=\"quoted value\"", temp.path(), false)
            .await;
        assert_eq!(env_value(&env, "VAR").unwrap(), "quoted value");
    }

    #[tokio::test]
    async fn test_export_backticked_subshell_captures_stdout() {
        let temp = TempDir::new().unwrap();
        let env = empty_env();
        let result = executor(env.clone())
            .execute("export CURRENT=`echo computed`", temp.path(), false)
            .await;

        assert_eq!(result.result, CommandOutcome::Ok);
        assert_eq!(env_value(&env, "CURRENT").unwrap(), "computed");
    }

    #[tokio::test]
    async fn test_export_failing_subshell_records_not_ok() {
        let temp = TempDir::new().unwrap();
        let env = empty_env();
        let result = executor(env.clone())
            .execute("export BAD=`exit 1`", temp.path(), false)
            .await;

        assert_eq!(result.result, CommandOutcome::NotOk);
        assert!(env_value(&env, "BAD").is_none());
    }

    #[tokio::test]
    async fn test_malformed_export_is_fatal_to_that_command_only() {
        let temp = TempDir::new().unwrap();
        let exec = executor(empty_env());

        let results = exec
            .execute_all(
                &["export NOPE".to_string(), "true".to_string()],
                temp.path(),
                false,
            )
            .await;

        assert_eq!(results[0].result, CommandOutcome::NotOk);
        assert_eq!(results[1].result, CommandOutcome::Ok);
    }

    #[tokio::test]
    async fn test_exported_variable_visible_to_later_commands() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("seen");
        let env = empty_env();
        let exec = executor(env);

        let command = format!("sh -c 'test \"$GREETING\" = hello && touch {}'", marker.display());
        let results = exec
            .execute_all(
                &["export GREETING=hello".to_string(), command],
                temp.path(),
                false,
            )
            .await;

        assert_eq!(results[0].result, CommandOutcome::Ok);
        assert_eq!(results[1].result, CommandOutcome::Ok);
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_env_reference_interpolated_from_run_env() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("interp");
        let env = empty_env();
        env.lock()
            .unwrap()
            .insert("TARGET".to_string(), marker.display().to_string());

        let result = executor(env)
            .execute("touch ${{ env.TARGET }}", temp.path(), false)
            .await;

        assert_eq!(result.result, CommandOutcome::Ok);
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_pipeline_continues_after_failure() {
        let temp = TempDir::new().unwrap();
        let exec = executor(empty_env());

        let results = exec
            .execute_all(
                &["false".to_string(), "true".to_string()],
                temp.path(),
                false,
            )
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].result, CommandOutcome::NotOk);
        assert_eq!(results[1].result, CommandOutcome::Ok);
    }

    #[tokio::test]
    async fn test_missing_working_directory_records_not_ok() {
        let exec = executor(empty_env());
        let result = exec
            .execute("true", Path::new("/nonexistent/build-chain"), false)
            .await;
        assert_eq!(result.result, CommandOutcome::NotOk);
        assert!(result.error_message.unwrap().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_result_records_timing() {
        let temp = TempDir::new().unwrap();
        let result = executor(empty_env())
            .execute("sleep 0.01", temp.path(), false)
            .await;
        assert!(result.ending_date >= result.starting_date);
        assert!(result.time < 5_000, "expected fast execution, got {}ms", result.time);
    }
}

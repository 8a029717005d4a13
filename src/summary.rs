//! Run summary rendering
//!
//! Renders the aggregated run result as human-readable terminal output.
//! All output goes to stderr so stdout remains clean for piping.

use colored::Colorize;

use crate::chain::{Chain, ExecutionLevel, Phase};
use crate::checkout::CheckoutOutcome;
use crate::command::{CommandOutcome, ExecuteCommandResult};
use crate::flow::FlowResult;

/// Print the post-run summary to stderr.
pub fn print_summary(result: &FlowResult) {
    eprintln!("\n{}", "─".repeat(50).dimmed());

    for node in &result.checkout_info {
        eprintln!("  {} {}", checkout_label(&node.outcome), node.project.bold());

        for &phase in &Phase::ALL {
            let Some(node_result) = result.execution_result.node(phase, &node.project) else {
                continue;
            };
            if node_result.results.is_empty() {
                continue;
            }
            eprintln!("    {}", format!("[{}]", phase.label()).dimmed());
            for command in &node_result.results {
                eprintln!("      {}", command_line(command));
            }
        }
    }

    let archived = result.artifacts.iter().filter(|a| a.archived).count();
    if !result.artifacts.is_empty() {
        eprintln!(
            "  {} {archived}/{} artifact path(s) collected",
            "Artifacts:".dimmed(),
            result.artifacts.len()
        );
    }

    eprintln!("{}", "─".repeat(50).dimmed());
    let status = if result.success() {
        "COMPLETED".green().bold().to_string()
    } else {
        "FAILED".red().bold().to_string()
    };
    eprintln!("  {status}\n");
}

/// Print the resolved chain with each node's execution level.
pub fn print_project_list(chain: &Chain, starter_index: usize) {
    eprintln!(
        "\n{} {} project(s)",
        "===".bold().cyan(),
        chain.len()
    );
    for (index, node) in chain.nodes().iter().enumerate() {
        let level = chain.execution_level(index, starter_index);
        eprintln!("  {} {}", level_tag(level), node.project);
    }
    eprintln!();
}

/// One-character status marker plus branch detail for a checkout outcome.
fn checkout_label(outcome: &CheckoutOutcome) -> String {
    match outcome {
        CheckoutOutcome::CheckedOut { info } => {
            let detail = if info.merge {
                format!(
                    "{}/{}:{} merged into {}:{}",
                    info.source_group,
                    info.source_name,
                    info.source_branch,
                    info.target_group,
                    info.target_branch
                )
            } else {
                format!("{}/{}:{}", info.target_group, info.target_name, info.target_branch)
            };
            format!("{} {}", "✓".green(), detail.dimmed())
        }
        CheckoutOutcome::Skipped => format!("{}", "– skipped".dimmed()),
        CheckoutOutcome::NotCheckedOut { reason } => {
            format!("{} {}", "✗".red().bold(), reason.red())
        }
    }
}

/// One line per executed command: status, command text, duration.
fn command_line(result: &ExecuteCommandResult) -> String {
    let marker = match result.result {
        CommandOutcome::Ok => "✓".green().to_string(),
        CommandOutcome::NotOk => "✗".red().bold().to_string(),
        CommandOutcome::Skip => "–".dimmed().to_string(),
    };
    let mut line = format!(
        "{marker} {} {}",
        result.command,
        format_duration(result.time).dimmed()
    );
    if let Some(message) = &result.error_message {
        line.push_str(&format!("\n        {}", message.red()));
    }
    line
}

/// Render milliseconds as a compact duration.
fn format_duration(millis: u64) -> String {
    let secs = millis / 1000;
    if secs >= 60 {
        format!("({}m {}s)", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("({secs}s)")
    } else {
        format!("({millis}ms)")
    }
}

const fn level_tag(level: ExecutionLevel) -> &'static str {
    match level {
        ExecutionLevel::Upstream => "↑ upstream  ",
        ExecutionLevel::Current => "● starter   ",
        ExecutionLevel::Downstream => "↓ downstream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::CheckoutInfo;
    use crate::flow::{CheckedOutNode, ExecuteNodeResult};
    use crate::testutil::chain_of;
    use chrono::Utc;
    use std::path::PathBuf;

    fn checked_out(merge: bool) -> CheckoutOutcome {
        CheckoutOutcome::CheckedOut {
            info: CheckoutInfo {
                source_group: "author".to_string(),
                source_name: "repo".to_string(),
                source_branch: "feature".to_string(),
                target_group: "kiegroup".to_string(),
                target_name: "repo".to_string(),
                target_branch: "main".to_string(),
                repo_dir: PathBuf::from("/tmp/kiegroup_repo"),
                merge,
            },
        }
    }

    #[test]
    fn test_checkout_label_merge_names_both_sides() {
        let label = checkout_label(&checked_out(true));
        assert!(label.contains("author/repo:feature"));
        assert!(label.contains("kiegroup:main"));
    }

    #[test]
    fn test_checkout_label_plain_branch() {
        let label = checkout_label(&checked_out(false));
        assert!(label.contains("kiegroup/repo:main"));
        assert!(!label.contains("author"));
    }

    #[test]
    fn test_checkout_label_failure_carries_reason() {
        let label = checkout_label(&CheckoutOutcome::NotCheckedOut {
            reason: "clone failed".to_string(),
        });
        assert!(label.contains("clone failed"));
    }

    #[test]
    fn test_command_line_includes_error_message() {
        let result = ExecuteCommandResult {
            command: "mvn install".to_string(),
            result: CommandOutcome::NotOk,
            starting_date: Utc::now(),
            ending_date: Utc::now(),
            time: 1500,
            error_message: Some("exit code 1: compilation failure".to_string()),
        };
        let line = command_line(&result);
        assert!(line.contains("mvn install"));
        assert!(line.contains("compilation failure"));
    }

    #[test]
    fn test_format_duration_ranges() {
        assert_eq!(format_duration(250), "(250ms)");
        assert_eq!(format_duration(3_000), "(3s)");
        assert_eq!(format_duration(125_000), "(2m 5s)");
    }

    #[test]
    fn test_print_summary_does_not_panic() {
        let mut result = FlowResult::default();
        result.checkout_info.push(CheckedOutNode {
            project: "g/a".to_string(),
            outcome: checked_out(true),
        });
        result
            .execution_result
            .phase_mut(Phase::Commands)
            .push(ExecuteNodeResult {
                project: "g/a".to_string(),
                results: vec![],
            });
        print_summary(&result);
    }

    #[test]
    fn test_print_project_list_does_not_panic() {
        let chain = chain_of(&["g/a", "g/b", "g/c"]);
        print_project_list(&chain, 1);
    }
}

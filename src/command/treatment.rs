//! Command treatment pipeline
//!
//! Every selected command string passes through an ordered treatment
//! pipeline before execution: environment interpolation, maven-specific
//! augmentation, then user-supplied regex replacements.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

use crate::error::ChainError;

/// Flags appended to maven invocations to keep CI logs quiet and
/// non-interactive.
const MAVEN_FLAGS: [&str; 2] = [
    "-Dorg.slf4j.simpleLogger.log.org.apache.maven.cli.transfer.Slf4jMavenTransferListener=warn",
    "-B",
];

fn env_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid regex")
    })
}

/// Apply the full treatment pipeline to one command.
///
/// Treatment order is fixed: interpolation, maven augmentation, then the
/// user's `pattern||replacement` expressions in declared order. A malformed
/// replacement expression is fatal to this command only.
pub fn treat_command(
    command: &str,
    env: &HashMap<String, String>,
    replace_expressions: &[String],
) -> Result<String, ChainError> {
    let mut treated = interpolate_env(command, env);
    treated = treat_maven(&treated);
    for expression in replace_expressions {
        treated = apply_replacement(&treated, expression)?;
    }
    Ok(treated)
}

/// Replace `${{ env.NAME }}` references with values from the run
/// environment (empty string when unset).
///
/// `export` and `echo` commands are passed through untouched so they can
/// carry the reference itself into the shell.
#[must_use]
pub fn interpolate_env(command: &str, env: &HashMap<String, String>) -> String {
    let first_word = command.trim_start().split_whitespace().next().unwrap_or("");
    if first_word == "export" || first_word == "echo" {
        return command.to_string();
    }

    env_reference_regex()
        .replace_all(command, |captures: &regex::Captures<'_>| {
            env.get(&captures[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Append quiet/non-interactive flags to maven invocations, unless already
/// present.
#[must_use]
pub fn treat_maven(command: &str) -> String {
    let first_word = command.trim_start().split_whitespace().next().unwrap_or("");
    if first_word != "mvn" {
        return command.to_string();
    }

    let mut treated = command.to_string();
    for flag in MAVEN_FLAGS {
        if !command.split_whitespace().any(|word| word == flag) {
            treated.push(' ');
            treated.push_str(flag);
        }
    }
    treated
}

/// Apply one `pattern||replacement` expression.
///
/// `pattern` is either `/regex/flags` (flag `g` replaces every match, `i`,
/// `m`, `s` and `x` map to the regex engine's inline flags) or a literal
/// string, replaced everywhere it occurs.
pub fn apply_replacement(command: &str, expression: &str) -> Result<String, ChainError> {
    let (pattern, replacement) = expression.split_once("||").ok_or_else(|| {
        ChainError::InvalidInput(format!(
            "replacement expression '{expression}' must be 'pattern||replacement'"
        ))
    })?;

    if let Some(regex_spec) = pattern.strip_prefix('/') {
        if let Some(closing) = regex_spec.rfind('/') {
            let (body, flags) = regex_spec.split_at(closing);
            let flags = &flags[1..];

            let inline: String = flags
                .chars()
                .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
                .collect();
            let full_pattern = if inline.is_empty() {
                body.to_string()
            } else {
                format!("(?{inline}){body}")
            };
            let regex = Regex::new(&full_pattern).map_err(|e| {
                ChainError::InvalidInput(format!("invalid replacement regex '{pattern}': {e}"))
            })?;

            let replaced = if flags.contains('g') {
                regex.replace_all(command, replacement)
            } else {
                regex.replace(command, replacement)
            };
            return Ok(replaced.into_owned());
        }
    }

    Ok(command.replace(pattern, replacement))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_interpolate_env_replaces_reference() {
        let result = interpolate_env(
            "mvn deploy -Dtoken=${{ env.DEPLOY_TOKEN }}",
            &env(&[("DEPLOY_TOKEN", "secret")]),
        );
        assert_eq!(result, "mvn deploy -Dtoken=secret");
    }

    #[test]
    fn test_interpolate_env_unset_becomes_empty() {
        let result = interpolate_env("run ${{ env.MISSING }}", &HashMap::new());
        assert_eq!(result, "run ");
    }

    #[test]
    fn test_interpolate_env_without_spaces() {
        let result = interpolate_env("run ${{env.VAR}}", &env(&[("VAR", "value")]));
        assert_eq!(result, "run value");
    }

    #[test]
    fn test_interpolate_env_skips_export_commands() {
        let command = "export VAR=${{ env.OTHER }}";
        let result = interpolate_env(command, &env(&[("OTHER", "value")]));
        assert_eq!(result, command);
    }

    #[test]
    fn test_interpolate_env_skips_echo_commands() {
        let command = "echo ${{ env.OTHER }}";
        let result = interpolate_env(command, &env(&[("OTHER", "value")]));
        assert_eq!(result, command);
    }

    #[test]
    fn test_treat_maven_appends_flags() {
        assert_eq!(
            treat_maven("mvn test"),
            "mvn test -Dorg.slf4j.simpleLogger.log.org.apache.maven.cli.transfer.Slf4jMavenTransferListener=warn -B"
        );
    }

    #[test]
    fn test_treat_maven_does_not_duplicate_present_flags() {
        let command = "mvn test -B";
        assert_eq!(
            treat_maven(command),
            "mvn test -B -Dorg.slf4j.simpleLogger.log.org.apache.maven.cli.transfer.Slf4jMavenTransferListener=warn"
        );
    }

    #[test]
    fn test_treat_maven_leaves_other_commands_alone() {
        assert_eq!(treat_maven("make test"), "make test");
        assert_eq!(treat_maven("echo mvn"), "echo mvn");
    }

    #[test]
    fn test_apply_replacement_literal_replaces_all() {
        let result = apply_replacement("mvn install && mvn test", "mvn||./mvnw").unwrap();
        assert_eq!(result, "./mvnw install && ./mvnw test");
    }

    #[test]
    fn test_apply_replacement_regex_first_match() {
        let result = apply_replacement("mvn install install", "/install/||verify").unwrap();
        assert_eq!(result, "mvn verify install");
    }

    #[test]
    fn test_apply_replacement_regex_global_flag() {
        let result = apply_replacement("mvn install install", "/install/g||verify").unwrap();
        assert_eq!(result, "mvn verify verify");
    }

    #[test]
    fn test_apply_replacement_regex_case_insensitive() {
        let result = apply_replacement("mvn INSTALL", "/install/i||verify").unwrap();
        assert_eq!(result, "mvn verify");
    }

    #[test]
    fn test_apply_replacement_missing_separator_is_invalid_input() {
        let err = apply_replacement("mvn install", "no-separator").unwrap_err();
        assert!(err.to_string().contains("pattern||replacement"));
    }

    #[test]
    fn test_apply_replacement_invalid_regex_is_invalid_input() {
        let err = apply_replacement("mvn install", "/(unclosed/||x").unwrap_err();
        assert!(err.to_string().contains("invalid replacement regex"));
    }

    #[test]
    fn test_treat_command_full_pipeline() {
        let result = treat_command(
            "mvn test -Dkey=${{ env.VALUE }}",
            &env(&[("VALUE", "v1")]),
            &[],
        )
        .unwrap();
        assert_eq!(
            result,
            "mvn test -Dkey=v1 -Dorg.slf4j.simpleLogger.log.org.apache.maven.cli.transfer.Slf4jMavenTransferListener=warn -B"
        );
    }

    #[test]
    fn test_treat_command_with_no_options_matches_maven_augmentation() {
        // "mvn test" with no regex options becomes the quiet batch variant.
        let result = treat_command("mvn test", &HashMap::new(), &[]).unwrap();
        assert_eq!(
            result,
            "mvn test -Dorg.slf4j.simpleLogger.log.org.apache.maven.cli.transfer.Slf4jMavenTransferListener=warn -B"
        );
    }

    #[test]
    fn test_treat_command_applies_replacements_in_declared_order() {
        let result = treat_command(
            "run a",
            &HashMap::new(),
            &["a||b".to_string(), "b||c".to_string()],
        )
        .unwrap();
        assert_eq!(result, "run c");
    }
}

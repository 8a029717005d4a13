//! Dependency-definition file reader
//!
//! Parses the TOML definition file into the ordered node list. The engine
//! never re-derives ordering from it, only validates that the declared order
//! is dependency-consistent.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::chain::Node;

/// Top-level shape of the definition file.
#[derive(Debug, Deserialize)]
struct DefinitionFile {
    /// Schema version; informational for now.
    #[allow(dead_code)]
    version: Option<String>,
    /// Projects in dependency order.
    #[serde(rename = "project", default)]
    projects: Vec<Node>,
}

/// Read and validate a definition file from a path.
pub fn read_definition<P: AsRef<Path>>(path: P) -> Result<Vec<Node>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read definition file: {}", path.display()))?;
    parse_definition(&content)
}

/// Parse and validate definition file content.
pub fn parse_definition(content: &str) -> Result<Vec<Node>> {
    let definition: DefinitionFile =
        toml::from_str(content).context("Failed to parse definition file")?;
    validate(&definition.projects)?;
    Ok(definition.projects)
}

/// Validate the declared node list.
fn validate(nodes: &[Node]) -> Result<()> {
    if nodes.is_empty() {
        bail!("Definition file declares no projects");
    }

    // Check for duplicate project ids
    let mut seen = HashSet::new();
    for node in nodes {
        if node.project.trim().is_empty() {
            bail!("Project id cannot be empty");
        }
        if !seen.insert(&node.project) {
            bail!("Duplicate project: '{}'", node.project);
        }
    }

    // Dependencies must reference declared projects, earlier in the list
    for (index, node) in nodes.iter().enumerate() {
        for dep in &node.dependencies {
            match nodes.iter().position(|n| &n.project == dep) {
                None => bail!(
                    "Project '{}' depends on undeclared project '{}'",
                    node.project,
                    dep
                ),
                Some(dep_index) if dep_index >= index => bail!(
                    "Project '{}' must be declared after its dependency '{}'",
                    node.project,
                    dep
                ),
                Some(_) => {}
            }
        }
    }

    Ok(())
}

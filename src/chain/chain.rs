//! The ordered dependency chain and execution-level classification.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::chain::node::{ExecutionLevel, Node};
use crate::error::ChainError;

/// An ordered sequence of nodes covering exactly the subgraph relevant to
/// the triggering project.
///
/// Invariant: nodes upstream of the starter precede it, nodes downstream
/// follow it; a node's dependencies always appear at a lower index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    nodes: Vec<Node>,
}

impl Chain {
    /// Wrap an already dependency-ordered node list.
    #[must_use]
    pub const fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// The nodes in chain order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the chain has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// Index of the node with the given project id, if present.
    #[must_use]
    pub fn position(&self, project: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.project == project)
    }

    /// Index of the starter node.
    ///
    /// Fails with a configuration error when no node's project matches.
    pub fn starter_index(&self, starter_project: &str) -> Result<usize, ChainError> {
        self.position(starter_project).ok_or_else(|| {
            ChainError::Configuration(format!(
                "starter project '{starter_project}' not found in the chain"
            ))
        })
    }

    /// Classify a node's position relative to the starter.
    ///
    /// Computed purely from relative indices, recomputed on demand: chain
    /// membership can change between tool invocations, so this is never
    /// cached against a stale chain.
    #[must_use]
    pub const fn execution_level(&self, index: usize, starter_index: usize) -> ExecutionLevel {
        if index < starter_index {
            ExecutionLevel::Upstream
        } else if index == starter_index {
            ExecutionLevel::Current
        } else {
            ExecutionLevel::Downstream
        }
    }

    /// Direct dependencies of the node at `index`, restricted to chain
    /// members, as chain indices.
    #[must_use]
    pub fn dependency_indices(&self, index: usize) -> Vec<usize> {
        self.nodes[index]
            .dependencies
            .iter()
            .filter_map(|dep| self.position(dep))
            .collect()
    }

    /// Build the run chain for a starter from the full definition list.
    ///
    /// Includes the transitive upstream closure and/or the transitive
    /// downstream closure of the starter, preserving definition order.
    pub fn subset(
        &self,
        starter_project: &str,
        include_upstream: bool,
        include_downstream: bool,
    ) -> Result<Self, ChainError> {
        let starter = self.starter_index(starter_project)?;

        let mut selected: HashSet<usize> = HashSet::new();
        selected.insert(starter);

        if include_upstream {
            collect_upstream(self, starter, &mut selected);
        }
        if include_downstream {
            collect_downstream(self, starter, &mut selected);
        }

        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| selected.contains(i))
            .map(|(_, n)| n.clone())
            .collect();

        Ok(Self::new(nodes))
    }
}

/// Add the transitive dependencies of `index` to `selected`.
fn collect_upstream(chain: &Chain, index: usize, selected: &mut HashSet<usize>) {
    for dep in chain.dependency_indices(index) {
        if selected.insert(dep) {
            collect_upstream(chain, dep, selected);
        }
    }
}

/// Add the transitive dependants of `index` to `selected`.
///
/// A dependant pulled into the chain also pulls in its own dependencies, so
/// it can actually build.
fn collect_downstream(chain: &Chain, index: usize, selected: &mut HashSet<usize>) {
    for (i, node) in chain.nodes.iter().enumerate() {
        let depends_on_index = node
            .dependencies
            .iter()
            .any(|dep| chain.position(dep) == Some(index));
        if depends_on_index && selected.insert(i) {
            collect_upstream(chain, i, selected);
            collect_downstream(chain, i, selected);
        }
    }
}

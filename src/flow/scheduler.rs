//! Parallel scheduler
//!
//! Partitions the resolved chain into an ordered sequence of batches via
//! repeated layered topological sorting (Kahn's algorithm by layer). Every
//! node lands in exactly one batch, strictly after all of its dependencies;
//! ties preserve the chain's original relative order.

use crate::chain::Chain;
use crate::error::ChainError;

/// Compute dependency-respecting batches of chain indices.
///
/// Each batch is the set of not-yet-scheduled nodes whose dependencies are
/// all scheduled in earlier batches. A cycle among chain nodes is a
/// configuration error (the definition input is declared ordered, so this
/// only guards against malformed input).
pub fn batches(chain: &Chain) -> Result<Vec<Vec<usize>>, ChainError> {
    let total = chain.len();
    let mut scheduled = vec![false; total];
    let mut remaining = total;
    let mut layers = Vec::new();

    while remaining > 0 {
        let layer: Vec<usize> = (0..total)
            .filter(|&i| {
                !scheduled[i]
                    && chain
                        .dependency_indices(i)
                        .iter()
                        .all(|&dep| scheduled[dep])
            })
            .collect();

        if layer.is_empty() {
            let stuck: Vec<&str> = (0..total)
                .filter(|&i| !scheduled[i])
                .map(|i| chain.get(i).project.as_str())
                .collect();
            return Err(ChainError::Configuration(format!(
                "dependency cycle among: {}",
                stuck.join(", ")
            )));
        }

        for &i in &layer {
            scheduled[i] = true;
        }
        remaining -= layer.len();
        layers.push(layer);
    }

    Ok(layers)
}

/// Degenerate batching used when parallel execution is disabled: one node
/// per batch, in chain order.
#[must_use]
pub fn sequential_batches(chain: &Chain) -> Vec<Vec<usize>> {
    (0..chain.len()).map(|i| vec![i]).collect()
}

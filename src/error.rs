//! Error taxonomy for the orchestrator.
//!
//! Only genuinely fatal conditions are modeled as errors. A fork or pull
//! request that does not exist is an expected lookup miss and is returned as
//! `Option`/`bool`; a failing build command is recorded as a `NotOk` result
//! and never raised.

use thiserror::Error;

/// Fatal error categories surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The run cannot start or continue: starter project absent from the
    /// chain, malformed definition, cyclic dependencies.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A clone or merge failed for one node. Depending on the fail-at-end
    /// policy this either aborts the run or is recorded while peers continue.
    #[error("checkout of '{project}' failed: {reason}")]
    Checkout {
        /// Project id of the node that failed to check out.
        project: String,
        /// Underlying git failure, including captured stderr.
        reason: String,
    },

    /// A single command is malformed and cannot be executed. Fatal to that
    /// command only; the rest of the pipeline continues.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ChainError {
    /// Whether this error should abort before any scheduling happens.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ChainError::Configuration("starter project not found".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: starter project not found"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn test_checkout_error_display() {
        let err = ChainError::Checkout {
            project: "kiegroup/drools".to_string(),
            reason: "clone failed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "checkout of 'kiegroup/drools' failed: clone failed"
        );
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_invalid_input_display() {
        let err = ChainError::InvalidInput("malformed export".to_string());
        assert_eq!(err.to_string(), "invalid input: malformed export");
    }
}

//! Error types for operator construction, restore and execution.

use std::path::PathBuf;

use thiserror::Error;
use vispar_core::AttributeType;

/// Rejected operator construction. Raised once, at pattern-compile time; the
/// offending pattern is not deployed and other patterns are unaffected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{operator}: expected {expected} argument(s), found {found}")]
    ArgumentCount {
        operator: String,
        expected: usize,
        found: usize,
    },

    #[error("{operator}: argument {index} must be {expected}, found {found}")]
    ArgumentType {
        operator: String,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("{operator}: {message}")]
    InvalidBound { operator: String, message: String },

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

impl ConfigError {
    pub(crate) fn arity(operator: &str, expected: usize, found: usize) -> Self {
        ConfigError::ArgumentCount {
            operator: operator.to_string(),
            expected,
            found,
        }
    }

    pub(crate) fn argument_type(
        operator: &str,
        index: usize,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        ConfigError::ArgumentType {
            operator: operator.to_string(),
            index,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn bound(operator: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidBound {
            operator: operator.to_string(),
            message: message.into(),
        }
    }
}

/// Rejected restore. The instance keeps the state it had before the call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("Checkpoint version {found} is not supported (expected {expected})")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Checkpoint holds {found} state, expected {expected}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Malformed checkpoint: {0}")]
    Malformed(String),

    #[error("Inconsistent checkpoint state: {0}")]
    Inconsistent(String),
}

/// Failure inside an already validated operator. Isolated to that instance;
/// values are never coerced to make them fit.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OperatorError {
    #[error("{operator}: expected {expected} value, got {found}")]
    TypeMismatch {
        operator: &'static str,
        expected: AttributeType,
        found: &'static str,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Operator task has shut down")]
    Closed,
}

use std::fmt;

use thiserror::Error;

/// Identifies which input record an evaluation error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordPosition {
    Header,
    /// Zero-based data row index, counting only non-empty rows.
    Row(usize),
}

impl fmt::Display for RecordPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordPosition::Header => write!(f, "header row"),
            RecordPosition::Row(index) => write!(f, "row {index}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColspecError {
    #[error("Column '{name}' not found in header")]
    UnresolvedName { name: String },
    #[error("Malformed selector '{token}': {reason}")]
    MalformedSpec { token: String, reason: String },
    #[error("Invalid filter expression '{expression}': {message}")]
    InvalidFilterSyntax { expression: String, message: String },
    #[error("{position}: selector '{selector}' is out of range for a record with {width} column(s)")]
    ColumnOutOfRange {
        position: RecordPosition,
        selector: String,
        width: usize,
    },
    #[error("{position}: filter '{expression}' failed: {message}")]
    FilterEvaluation {
        position: RecordPosition,
        expression: String,
        message: String,
    },
}

impl ColspecError {
    pub(crate) fn malformed(token: &str, reason: impl Into<String>) -> Self {
        ColspecError::MalformedSpec {
            token: token.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unresolved(name: &str) -> Self {
        ColspecError::UnresolvedName {
            name: name.to_string(),
        }
    }
}

//! Executor-specific errors.
//!
//! End-of-stream is not represented here: operator `next()` methods return
//! `Ok(None)` when a stream is exhausted, so errors always mean the query
//! cannot proceed.

use crate::storage::StorageError;
use crate::value::ValueError;

/// Errors that can occur while binding, planning, or executing a query.
#[derive(Debug)]
pub enum ExecutorError {
    /// A statement or expression is semantically invalid.
    InvalidArgument(String),

    /// An internal contract was violated during execution.
    Internal(String),

    /// The requested operation has no implementation for these operands
    /// (notably vectorized paths for unsupported types); callers may fall
    /// back to the row path.
    Unimplemented(String),

    /// Referenced table does not exist.
    TableNotFound { name: String },

    /// Referenced field does not exist in any visible table.
    FieldMissing { name: String },

    /// A value cannot be stored or cast to the required field type.
    TypeMismatch { expected: String, found: String },

    /// Storage or lock-table failure.
    Storage(StorageError),
}

impl std::fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            ExecutorError::Internal(msg) => write!(f, "internal error: {}", msg),
            ExecutorError::Unimplemented(msg) => write!(f, "unimplemented: {}", msg),
            ExecutorError::TableNotFound { name } => {
                write!(f, "table \"{}\" does not exist", name)
            }
            ExecutorError::FieldMissing { name } => {
                write!(f, "field \"{}\" does not exist", name)
            }
            ExecutorError::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {}, found {}", expected, found)
            }
            ExecutorError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutorError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for ExecutorError {
    fn from(e: StorageError) -> Self {
        ExecutorError::Storage(e)
    }
}

impl From<ValueError> for ExecutorError {
    fn from(e: ValueError) -> Self {
        // Type failures surfacing mid-execution are internal errors; layers
        // with more context (e.g. INSERT value casting) map them themselves.
        ExecutorError::Internal(e.to_string())
    }
}

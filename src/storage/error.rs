//! Storage-level errors.

use std::fmt;

use crate::storage::Rid;

/// Errors from the record heap, codec, and lock table.
#[derive(Debug)]
pub enum StorageError {
    /// The schema handed to the catalog or codec is unusable.
    InvalidSchema(String),
    /// A record image does not fit the table layout.
    InvalidRecord(String),
    /// No live record exists at the given rid.
    RecordNotFound { rid: Rid },
    /// Another transaction holds an incompatible table lock.
    LockConflict { table: String },
    /// The same transaction asked to upgrade a shared lock to exclusive.
    /// Granting it would self-deadlock, so the request is refused.
    LockUpgradeRefused { table: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidSchema(msg) => write!(f, "invalid schema: {}", msg),
            StorageError::InvalidRecord(msg) => write!(f, "invalid record: {}", msg),
            StorageError::RecordNotFound { rid } => {
                write!(f, "no record at rid {}", rid)
            }
            StorageError::LockConflict { table } => {
                write!(f, "lock conflict on table {}", table)
            }
            StorageError::LockUpgradeRefused { table } => {
                write!(f, "refusing shared-to-exclusive lock upgrade on table {}", table)
            }
        }
    }
}

impl std::error::Error for StorageError {}

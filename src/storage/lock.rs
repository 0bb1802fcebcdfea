//! Transaction handles and the table-level lock table.
//!
//! Locking here is deliberately coarse: one shared/exclusive lock per
//! table, acquired when a scanner or DML operator opens and released when
//! it closes. Requests that cannot be granted fail immediately instead of
//! blocking, which keeps single-threaded query execution deterministic.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::storage::StorageError;

/// Scan/lock mode requested by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared access; concurrent readers allowed.
    ReadOnly,
    /// Exclusive access for mutation.
    ReadWrite,
}

/// A transaction handle.
///
/// The handle itself is only an identity; lock state lives in each table's
/// [`TableLock`], keyed by this id.
#[derive(Debug)]
pub struct Trx {
    id: u64,
}

impl Trx {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Default)]
struct LockState {
    /// Shared holds per transaction id (reentrant, counted).
    readers: HashMap<u64, u32>,
    /// Exclusive holder, if any (reentrant, counted).
    writer: Option<(u64, u32)>,
}

/// Table-level shared/exclusive lock with reentrant grants per transaction.
pub struct TableLock {
    state: Mutex<LockState>,
}

impl TableLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
        }
    }

    /// Attempts to acquire the lock for `trx_id` in `mode`.
    ///
    /// A shared request is granted unless another transaction holds the
    /// exclusive lock. An exclusive request is granted only when no other
    /// transaction holds any lock; if the requesting transaction itself
    /// holds a shared lock, the upgrade is refused (it would self-deadlock
    /// under a blocking lock manager).
    pub fn acquire(&self, table: &str, trx_id: u64, mode: LockMode) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        match mode {
            LockMode::ReadOnly => {
                if let Some((owner, _)) = state.writer {
                    if owner != trx_id {
                        return Err(StorageError::LockConflict {
                            table: table.to_string(),
                        });
                    }
                }
                *state.readers.entry(trx_id).or_insert(0) += 1;
                Ok(())
            }
            LockMode::ReadWrite => {
                if state.readers.keys().any(|id| *id != trx_id) {
                    return Err(StorageError::LockConflict {
                        table: table.to_string(),
                    });
                }
                match state.writer {
                    Some((owner, ref mut count)) if owner == trx_id => {
                        *count += 1;
                        Ok(())
                    }
                    Some(_) => Err(StorageError::LockConflict {
                        table: table.to_string(),
                    }),
                    None => {
                        if state.readers.contains_key(&trx_id) {
                            return Err(StorageError::LockUpgradeRefused {
                                table: table.to_string(),
                            });
                        }
                        state.writer = Some((trx_id, 1));
                        Ok(())
                    }
                }
            }
        }
    }

    /// Releases one grant previously acquired by `trx_id` in `mode`.
    /// Releasing a lock that is not held is a no-op.
    pub fn release(&self, trx_id: u64, mode: LockMode) {
        let mut state = self.state.lock();
        match mode {
            LockMode::ReadOnly => {
                if let Some(count) = state.readers.get_mut(&trx_id) {
                    *count -= 1;
                    if *count == 0 {
                        state.readers.remove(&trx_id);
                    }
                }
            }
            LockMode::ReadWrite => {
                if let Some((owner, ref mut count)) = state.writer {
                    if owner == trx_id {
                        *count -= 1;
                        if *count == 0 {
                            state.writer = None;
                        }
                    }
                }
            }
        }
    }
}

impl Default for TableLock {
    fn default() -> Self {
        Self::new()
    }
}

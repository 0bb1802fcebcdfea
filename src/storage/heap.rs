//! Slotted in-memory record heap and its scanner.

use std::rc::Rc;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::Table;
use crate::storage::{LockMode, Record, Rid, StorageError, Trx};

/// The record heap of one table.
///
/// Slots are append-only; deletion tombstones a slot. Rids are stable slot
/// indices, so a scan visits records in insertion order. Interior locking
/// is per call; table-level isolation is the lock table's job.
pub struct TableHeap {
    slots: RwLock<Vec<Option<Record>>>,
}

impl TableHeap {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Appends a record, assigning and returning its rid.
    pub fn insert(&self, mut record: Record) -> Rid {
        let mut slots = self.slots.write();
        let rid = Rid::new(slots.len() as u64);
        record.set_rid(rid);
        slots.push(Some(record));
        rid
    }

    /// Tombstones the record at `rid`.
    pub fn delete(&self, rid: Rid) -> Result<(), StorageError> {
        let mut slots = self.slots.write();
        match slots.get_mut(rid.slot_num as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(StorageError::RecordNotFound { rid }),
        }
    }

    /// Runs `visitor` on the live record at `rid`.
    pub fn visit<R>(
        &self,
        rid: Rid,
        visitor: impl FnOnce(&Record) -> R,
    ) -> Result<R, StorageError> {
        let slots = self.slots.read();
        match slots.get(rid.slot_num as usize) {
            Some(Some(record)) => Ok(visitor(record)),
            _ => Err(StorageError::RecordNotFound { rid }),
        }
    }

    /// Returns the live record at or after `slot`, along with the slot to
    /// resume from. Used by the scanner cursor.
    fn next_from(&self, slot: usize) -> Option<(usize, Record)> {
        let slots = self.slots.read();
        slots[slot.min(slots.len())..]
            .iter()
            .enumerate()
            .find_map(|(i, s)| s.as_ref().map(|r| (slot + i, r.clone())))
    }

    /// Number of live records.
    pub fn live_count(&self) -> usize {
        self.slots.read().iter().filter(|s| s.is_some()).count()
    }
}

impl Default for TableHeap {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over a table heap in storage order.
///
/// Created through [`Table::get_record_scanner`], which acquires the table
/// lock in the requested mode; [`RecordScanner::close`] releases it.
/// Dropping an unclosed scanner closes it.
pub struct RecordScanner {
    table: Arc<Table>,
    trx: Rc<Trx>,
    mode: LockMode,
    next_slot: usize,
    open: bool,
}

impl RecordScanner {
    pub(crate) fn new(table: Arc<Table>, trx: Rc<Trx>, mode: LockMode) -> Self {
        Self {
            table,
            trx,
            mode,
            next_slot: 0,
            open: true,
        }
    }

    /// Returns the next live record, or `None` at end of table.
    pub fn next(&mut self) -> Result<Option<Record>, StorageError> {
        if !self.open {
            return Ok(None);
        }
        match self.table.heap().next_from(self.next_slot) {
            Some((slot, record)) => {
                self.next_slot = slot + 1;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Releases the table lock. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.open {
            self.table.unlock(&self.trx, self.mode);
            self.open = false;
        }
    }
}

impl Drop for RecordScanner {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: u8) -> Record {
        Record::new(vec![tag; 4])
    }

    #[test]
    fn test_insert_assigns_sequential_rids() {
        let heap = TableHeap::new();
        assert_eq!(heap.insert(record(1)), Rid::new(0));
        assert_eq!(heap.insert(record(2)), Rid::new(1));
        assert_eq!(heap.live_count(), 2);
    }

    #[test]
    fn test_delete_tombstones() {
        let heap = TableHeap::new();
        let rid = heap.insert(record(1));
        heap.insert(record(2));
        heap.delete(rid).unwrap();
        assert_eq!(heap.live_count(), 1);
        assert!(matches!(
            heap.delete(rid),
            Err(StorageError::RecordNotFound { .. })
        ));
        assert!(heap.visit(rid, |_| ()).is_err());
    }

    #[test]
    fn test_scan_skips_tombstones_in_order() {
        let heap = TableHeap::new();
        heap.insert(record(1));
        let rid = heap.insert(record(2));
        heap.insert(record(3));
        heap.delete(rid).unwrap();

        let mut seen = Vec::new();
        let mut slot = 0;
        while let Some((s, r)) = heap.next_from(slot) {
            seen.push(r.data()[0]);
            slot = s + 1;
        }
        assert_eq!(seen, vec![1, 3]);
    }
}

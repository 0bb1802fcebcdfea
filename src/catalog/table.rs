//! Table metadata, table handles, and the database catalog.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::{FieldDef, FieldMeta};
use crate::storage::{
    encode_record, LockMode, Record, RecordScanner, Rid, StorageError, TableHeap, TableLock, Trx,
};
use crate::value::{AttrType, Value};

/// Table metadata: the ordered field list and the record layout derived
/// from it.
///
/// A record is a fixed-length byte buffer. The null bitmap comes first and
/// covers the non-system fields; each field then sits at its computed
/// offset. Chars fields occupy their declared capacity and are zero padded.
#[derive(Debug, Clone)]
pub struct TableMeta {
    name: String,
    fields: Vec<FieldMeta>,
    sys_field_num: usize,
    null_bitmap_start: usize,
    record_size: usize,
}

impl TableMeta {
    /// Builds the metadata for a new table, assigning field ids and record
    /// offsets.
    ///
    /// Rejects field types that are not storable and duplicate field names.
    pub fn new(name: &str, defs: &[FieldDef]) -> Result<Self, StorageError> {
        if defs.is_empty() {
            return Err(StorageError::InvalidSchema(format!(
                "table {} has no fields",
                name
            )));
        }
        let bitmap_len = defs.len().div_ceil(8);
        let mut fields = Vec::with_capacity(defs.len());
        let mut offset = bitmap_len;
        for (field_id, def) in defs.iter().enumerate() {
            let len = match def.attr_type {
                AttrType::Int | AttrType::Float | AttrType::Date => 4,
                AttrType::Chars => def.len,
                other => {
                    return Err(StorageError::InvalidSchema(format!(
                        "field {} has unstorable type {}",
                        def.name, other
                    )));
                }
            };
            if fields.iter().any(|f: &FieldMeta| f.name == def.name) {
                return Err(StorageError::InvalidSchema(format!(
                    "duplicate field name {}",
                    def.name
                )));
            }
            fields.push(FieldMeta {
                name: def.name.clone(),
                attr_type: def.attr_type,
                offset,
                len,
                nullable: def.nullable,
                field_id,
                is_sys: false,
            });
            offset += len;
        }
        Ok(Self {
            name: name.to_string(),
            fields,
            sys_field_num: 0,
            null_bitmap_start: 0,
            record_size: offset,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the field at `index` (system fields first).
    pub fn field_at(&self, index: usize) -> &FieldMeta {
        &self.fields[index]
    }

    pub fn field_num(&self) -> usize {
        self.fields.len()
    }

    pub fn sys_field_num(&self) -> usize {
        self.sys_field_num
    }

    /// Byte offset where the null bitmap begins.
    pub fn null_bitmap_start(&self) -> usize {
        self.null_bitmap_start
    }

    /// Length of the null bitmap in bytes (covers non-system fields).
    pub fn null_bitmap_len(&self) -> usize {
        (self.field_num() - self.sys_field_num).div_ceil(8)
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Iterates the non-system (user-visible) fields.
    pub fn user_fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter().skip(self.sys_field_num)
    }
}

/// A handle to one table: metadata, record heap, and its table-level lock.
pub struct Table {
    meta: TableMeta,
    heap: TableHeap,
    lock: TableLock,
}

impl Table {
    fn new(meta: TableMeta) -> Self {
        Self {
            meta,
            heap: TableHeap::new(),
            lock: TableLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.meta.name()
    }

    pub fn table_meta(&self) -> &TableMeta {
        &self.meta
    }

    pub(crate) fn heap(&self) -> &TableHeap {
        &self.heap
    }

    /// Acquires the table-level lock in the given mode on behalf of `trx`.
    ///
    /// An exclusive request while the same transaction holds only a shared
    /// lock is refused (`LockUpgradeRefused`) rather than self-deadlocking;
    /// callers must release their shared lock first, which is why Update
    /// materializes its target set before mutating.
    pub fn lock(&self, trx: &Trx, mode: LockMode) -> Result<(), StorageError> {
        self.lock.acquire(self.name(), trx.id(), mode)
    }

    /// Releases one lock acquired via [`Table::lock`].
    pub fn unlock(&self, trx: &Trx, mode: LockMode) {
        self.lock.release(trx.id(), mode);
    }

    /// Opens a record scanner over this table, acquiring the table lock in
    /// the mode implied by the scan. The lock is released when the scanner
    /// is closed.
    pub fn get_record_scanner(
        self: &Arc<Table>,
        trx: &Rc<Trx>,
        mode: LockMode,
    ) -> Result<RecordScanner, StorageError> {
        self.lock(trx, mode)?;
        Ok(RecordScanner::new(self.clone(), trx.clone(), mode))
    }

    /// Builds a record image from typed values, one per field in table
    /// order.
    pub fn make_record(&self, values: &[Value]) -> Result<Record, StorageError> {
        let data = encode_record(&self.meta, values)?;
        Ok(Record::new(data))
    }

    /// Inserts a record, assigning its rid.
    pub fn insert_record(&self, record: Record) -> Result<Rid, StorageError> {
        Ok(self.heap.insert(record))
    }

    /// Deletes the record at `rid`.
    pub fn delete_record(&self, rid: Rid) -> Result<(), StorageError> {
        self.heap.delete(rid)
    }

    /// Runs `visitor` against the current record at `rid`.
    pub fn visit_record<R>(
        &self,
        rid: Rid,
        visitor: impl FnOnce(&Record) -> R,
    ) -> Result<R, StorageError> {
        self.heap.visit(rid, visitor)
    }
}

/// The database catalog: a name-to-table map plus transaction id
/// allocation.
///
/// All state is owned by the `Db` instance; there is no process-global
/// registry.
pub struct Db {
    tables: RwLock<HashMap<String, Arc<Table>>>,
    next_trx_id: AtomicU64,
}

impl Db {
    pub fn new() -> Arc<Db> {
        Arc::new(Db {
            tables: RwLock::new(HashMap::new()),
            next_trx_id: AtomicU64::new(1),
        })
    }

    /// Creates a table and registers it in the catalog.
    pub fn create_table(&self, name: &str, defs: &[FieldDef]) -> Result<Arc<Table>, StorageError> {
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(StorageError::InvalidSchema(format!(
                "table {} already exists",
                name
            )));
        }
        let table = Arc::new(Table::new(TableMeta::new(name, defs)?));
        tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    /// Resolves a table by name.
    pub fn find_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.read().get(name).cloned()
    }

    /// Starts a transaction handle with a fresh id.
    pub fn begin_trx(&self) -> Rc<Trx> {
        Rc::new(Trx::new(self.next_trx_id.fetch_add(1, Ordering::Relaxed)))
    }
}

impl Default for Db {
    fn default() -> Self {
        Db {
            tables: RwLock::new(HashMap::new()),
            next_trx_id: AtomicU64::new(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_defs() -> Vec<FieldDef> {
        vec![FieldDef::int("id"), FieldDef::chars("name", 8)]
    }

    #[test]
    fn test_record_layout() {
        let meta = TableMeta::new("t", &sample_defs()).unwrap();
        // 2 fields -> 1 bitmap byte, then id at 1 (4 bytes), name at 5 (8 bytes).
        assert_eq!(meta.null_bitmap_len(), 1);
        assert_eq!(meta.field("id").unwrap().offset, 1);
        assert_eq!(meta.field("name").unwrap().offset, 5);
        assert_eq!(meta.record_size(), 13);
        assert_eq!(meta.field_num(), 2);
        assert_eq!(meta.sys_field_num(), 0);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let defs = vec![FieldDef::int("x"), FieldDef::float("x")];
        assert!(TableMeta::new("t", &defs).is_err());
    }

    #[test]
    fn test_unstorable_type_rejected() {
        let defs = vec![FieldDef::new("b", AttrType::Boolean, 1, true)];
        assert!(TableMeta::new("t", &defs).is_err());
    }

    #[test]
    fn test_catalog_create_and_find() {
        let db = Db::new();
        db.create_table("t", &sample_defs()).unwrap();
        assert!(db.find_table("t").is_some());
        assert!(db.find_table("missing").is_none());
        assert!(db.create_table("t", &sample_defs()).is_err());
    }

    #[test]
    fn test_trx_ids_are_distinct() {
        let db = Db::new();
        let a = db.begin_trx();
        let b = db.begin_trx();
        assert_ne!(a.id(), b.id());
    }
}

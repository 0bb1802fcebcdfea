//! In-memory record storage.
//!
//! Each table owns a slotted record heap addressed by [`Rid`]. Records are
//! fixed-length byte buffers with a leading null bitmap; the codec in
//! [`record`] encodes typed values into that layout and back. Scanners
//! acquire a table-level lock on open and release it on close, per the
//! transaction contract in [`lock`].

pub mod error;
pub mod heap;
pub mod lock;
pub mod record;

pub use error::StorageError;
pub use heap::{RecordScanner, TableHeap};
pub use lock::{LockMode, TableLock, Trx};
pub use record::{decode_field, encode_record, patch_field, Record, Rid};

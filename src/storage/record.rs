//! Record identity and the record byte codec.
//!
//! A record image is `null bitmap | field 0 | field 1 | ...` with every
//! field at the offset declared by its [`FieldMeta`]. Int, Float, and Date
//! fields are stored as 4 little-endian bytes; Chars fields occupy their
//! declared capacity, zero padded, with reads stopping at the first NUL.
//! A set bitmap bit marks the field NULL (the field bytes are then zero).

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::catalog::{FieldMeta, TableMeta};
use crate::storage::StorageError;
use crate::value::{AttrType, Value};

/// Identity of a record within its table heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid {
    pub slot_num: u64,
}

impl Rid {
    pub fn new(slot_num: u64) -> Self {
        Self { slot_num }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slot_num)
    }
}

/// One stored record: its rid and the raw record image.
#[derive(Debug, Clone)]
pub struct Record {
    rid: Rid,
    data: Vec<u8>,
}

impl Record {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            rid: Rid::new(0),
            data,
        }
    }

    pub fn rid(&self) -> Rid {
        self.rid
    }

    pub fn set_rid(&mut self, rid: Rid) {
        self.rid = rid;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Encodes one typed value per user field into a fresh record image.
///
/// Values must already carry the field's type (the statement layer casts
/// before storage is reached); Null is accepted for nullable fields only.
pub fn encode_record(meta: &TableMeta, values: &[Value]) -> Result<Vec<u8>, StorageError> {
    let user_fields: Vec<&FieldMeta> = meta.user_fields().collect();
    if values.len() != user_fields.len() {
        return Err(StorageError::InvalidRecord(format!(
            "table {} expects {} values, got {}",
            meta.name(),
            user_fields.len(),
            values.len()
        )));
    }

    let mut buf = BytesMut::zeroed(meta.record_size());
    for (field, value) in user_fields.iter().zip(values) {
        if value.is_null() {
            if !field.nullable {
                return Err(StorageError::InvalidRecord(format!(
                    "field {} is not nullable",
                    field.name
                )));
            }
            set_null_bit(meta, buf.as_mut(), field, true);
            continue;
        }
        if value.attr_type() != field.attr_type {
            return Err(StorageError::InvalidRecord(format!(
                "field {} expects {}, got {}",
                field.name,
                field.attr_type,
                value.attr_type()
            )));
        }
        let mut slot = &mut buf.as_mut()[field.offset..field.offset + field.len];
        match value {
            Value::Int(n) | Value::Date(n) => slot.put_i32_le(*n),
            Value::Float(f) => slot.put_f32_le(*f),
            Value::Chars(s) => {
                let n = s.len().min(field.len);
                slot.put_slice(&s.as_bytes()[..n]);
            }
            _ => unreachable!("type checked above"),
        }
    }
    Ok(buf.to_vec())
}

/// Decodes one field out of a record image, honoring the null bitmap.
pub fn decode_field(meta: &TableMeta, field: &FieldMeta, data: &[u8]) -> Value {
    if null_bit(meta, data, field) {
        return Value::Null;
    }
    let slot = &data[field.offset..field.offset + field.len];
    match field.attr_type {
        AttrType::Int => Value::Int(i32::from_le_bytes(slot[..4].try_into().unwrap())),
        AttrType::Date => Value::Date(i32::from_le_bytes(slot[..4].try_into().unwrap())),
        AttrType::Float => Value::Float(f32::from_le_bytes(slot[..4].try_into().unwrap())),
        AttrType::Chars => {
            let end = slot.iter().position(|b| *b == 0).unwrap_or(slot.len());
            Value::Chars(String::from_utf8_lossy(&slot[..end]).into_owned())
        }
        _ => Value::Null,
    }
}

/// Overwrites one field inside an existing record image.
///
/// Chars values longer than the field are truncated silently; shorter
/// values leave the remainder of the slot zeroed. The null bitmap bit is
/// set when `value` is Null and cleared otherwise.
pub fn patch_field(meta: &TableMeta, field: &FieldMeta, data: &mut [u8], value: &Value) {
    let slot = &mut data[field.offset..field.offset + field.len];
    slot.fill(0);
    match value {
        Value::Null => {}
        Value::Int(n) | Value::Date(n) => slot[..4].copy_from_slice(&n.to_le_bytes()),
        Value::Float(f) => slot[..4].copy_from_slice(&f.to_le_bytes()),
        Value::Chars(s) => {
            let n = s.len().min(field.len);
            slot[..n].copy_from_slice(&s.as_bytes()[..n]);
        }
        _ => {}
    }
    set_null_bit(meta, data, field, value.is_null());
}

fn bit_position(meta: &TableMeta, field: &FieldMeta) -> (usize, u8) {
    let bit = field.field_id - meta.sys_field_num();
    (meta.null_bitmap_start() + bit / 8, 1 << (bit % 8))
}

fn null_bit(meta: &TableMeta, data: &[u8], field: &FieldMeta) -> bool {
    let (byte, mask) = bit_position(meta, field);
    data[byte] & mask != 0
}

fn set_null_bit(meta: &TableMeta, data: &mut [u8], field: &FieldMeta, null: bool) {
    let (byte, mask) = bit_position(meta, field);
    if null {
        data[byte] |= mask;
    } else {
        data[byte] &= !mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;

    fn meta() -> TableMeta {
        TableMeta::new(
            "t",
            &[
                FieldDef::int("id"),
                FieldDef::chars("name", 8),
                FieldDef::float("score"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let meta = meta();
        let values = vec![
            Value::Int(7),
            Value::Chars("ada".into()),
            Value::Float(2.5),
        ];
        let data = encode_record(&meta, &values).unwrap();
        assert_eq!(data.len(), meta.record_size());
        for (field, expected) in meta.user_fields().zip(&values) {
            assert_eq!(&decode_field(&meta, field, &data), expected);
        }
    }

    #[test]
    fn test_null_round_trip() {
        let meta = meta();
        let values = vec![Value::Int(1), Value::Null, Value::Null];
        let data = encode_record(&meta, &values).unwrap();
        assert!(decode_field(&meta, meta.field("name").unwrap(), &data).is_null());
        assert!(decode_field(&meta, meta.field("score").unwrap(), &data).is_null());
        assert_eq!(
            decode_field(&meta, meta.field("id").unwrap(), &data),
            Value::Int(1)
        );
    }

    #[test]
    fn test_null_rejected_for_not_null_field() {
        let meta = TableMeta::new("t", &[FieldDef::int("id").not_null()]).unwrap();
        assert!(encode_record(&meta, &[Value::Null]).is_err());
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let meta = meta();
        assert!(encode_record(&meta, &[Value::Int(1)]).is_err());
    }

    #[test]
    fn test_chars_truncate_on_encode() {
        let meta = meta();
        let values = vec![
            Value::Int(1),
            Value::Chars("longer-than-8".into()),
            Value::Null,
        ];
        let data = encode_record(&meta, &values).unwrap();
        assert_eq!(
            decode_field(&meta, meta.field("name").unwrap(), &data),
            Value::Chars("longer-t".into())
        );
    }

    #[test]
    fn test_patch_field() {
        let meta = meta();
        let mut data = encode_record(
            &meta,
            &[Value::Int(1), Value::Chars("old-name".into()), Value::Float(1.0)],
        )
        .unwrap();

        let name = meta.field("name").unwrap().clone();
        patch_field(&meta, &name, &mut data, &Value::Chars("x".into()));
        assert_eq!(
            decode_field(&meta, &name, &data),
            Value::Chars("x".into())
        );

        patch_field(&meta, &name, &mut data, &Value::Null);
        assert!(decode_field(&meta, &name, &data).is_null());

        // Clearing the null bit again restores a readable value.
        patch_field(&meta, &name, &mut data, &Value::Chars("back".into()));
        assert_eq!(
            decode_field(&meta, &name, &data),
            Value::Chars("back".into())
        );
    }
}

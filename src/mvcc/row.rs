//! Row storage: the MVCC record format plus the legacy (non-versioned) one.

use std::collections::HashSet;

use crate::catalog::data_type::DataValue;
use crate::catalog::table_schema::TableSchema;
use crate::common::{Error, Result, TrxId};

/// A pointer into the undo log: `(segment, page, offset)`. Opaque to this
/// crate -- undo storage is an external collaborator (§4.9); `Row` only
/// needs to carry and compare the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollPtr {
    pub segment: u16,
    pub page: u32,
    pub offset: u16,
}

impl RollPtr {
    pub const INVALID: RollPtr = RollPtr { segment: u16::MAX, page: u32::MAX, offset: u16::MAX };

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..2].copy_from_slice(&self.segment.to_le_bytes());
        buf[2..6].copy_from_slice(&self.page.to_le_bytes());
        buf[6..8].copy_from_slice(&self.offset.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; 8]) -> Self {
        Self {
            segment: u16::from_le_bytes(bytes[0..2].try_into().unwrap()),
            page: u32::from_le_bytes(bytes[2..6].try_into().unwrap()),
            offset: u16::from_le_bytes(bytes[6..8].try_into().unwrap()),
        }
    }
}

/// Which on-disk shape a row record uses. Written as a one-byte tag
/// immediately before the row body so every page's records self-describe
/// their format -- routing all reads through a single format would make the
/// legacy one unreachable, which the engine still permits callers to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    Legacy = 0,
    Mvcc = 1,
}

impl RowFormat {
    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(RowFormat::Legacy),
            1 => Ok(RowFormat::Mvcc),
            other => Err(Error::Constraint(format!("unknown row format tag {other}"))),
        }
    }
}

const DELETED_FLAG: u8 = 0x01;

/// One row's in-memory representation, whichever format it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub trx_id: TrxId,
    pub roll_ptr: RollPtr,
    pub deleted: bool,
    pub values: Vec<DataValue>,
    /// Runtime-only: column ordinals an online-schema-change left
    /// un-backfilled on this row. Never persisted; a read of one of these
    /// ordinals returns the schema's declared default.
    pub not_backfilled: Option<HashSet<u16>>,
}

impl Row {
    pub fn new(trx_id: TrxId, values: Vec<DataValue>) -> Self {
        Self { trx_id, roll_ptr: RollPtr::INVALID, deleted: false, values, not_backfilled: None }
    }

    /// The value at `ordinal`, substituting the schema's declared default if
    /// this column was left un-backfilled by an online schema change.
    pub fn get(&self, ordinal: u16, schema: &TableSchema) -> DataValue {
        if let Some(lazy) = &self.not_backfilled {
            if lazy.contains(&ordinal) {
                return schema
                    .columns
                    .iter()
                    .find(|c| c.ordinal == ordinal)
                    .and_then(|c| c.default.clone())
                    .unwrap_or(DataValue::Null);
            }
        }
        self.values.get(ordinal as usize).cloned().unwrap_or(DataValue::Null)
    }

    fn null_bitmap(&self) -> Vec<u8> {
        let mut bitmap = vec![0u8; self.values.len().div_ceil(8)];
        for (i, value) in self.values.iter().enumerate() {
            if value.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        bitmap
    }

    pub fn serialize(&self, format: RowFormat) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(format as u8);

        if format == RowFormat::Mvcc {
            out.extend_from_slice(&self.trx_id.to_le_bytes());
            out.extend_from_slice(&self.roll_ptr.to_bytes());
            out.push(if self.deleted { DELETED_FLAG } else { 0 });
        }

        out.extend_from_slice(&self.null_bitmap());
        for value in &self.values {
            value.serialize(&mut out);
        }
        out
    }

    pub fn deserialize(bytes: &[u8], schema: &TableSchema) -> Result<(Self, usize)> {
        let too_short = || Error::Constraint("row buffer too short".into());
        let format = RowFormat::from_tag(*bytes.first().ok_or_else(too_short)?)?;
        let mut offset = 1;

        let (trx_id, roll_ptr, deleted) = if format == RowFormat::Mvcc {
            let trx_id = u64::from_le_bytes(bytes.get(offset..offset + 8).ok_or_else(too_short)?.try_into().unwrap());
            offset += 8;
            let roll_ptr_bytes: [u8; 8] = bytes.get(offset..offset + 8).ok_or_else(too_short)?.try_into().unwrap();
            let roll_ptr = RollPtr::from_bytes(&roll_ptr_bytes);
            offset += 8;
            let flags = *bytes.get(offset).ok_or_else(too_short)?;
            offset += 1;
            (trx_id, roll_ptr, flags & DELETED_FLAG != 0)
        } else {
            (0, RollPtr::INVALID, false)
        };

        let column_count = schema.columns.len();
        let bitmap_len = column_count.div_ceil(8);
        let bitmap = bytes.get(offset..offset + bitmap_len).ok_or_else(too_short)?;
        offset += bitmap_len;

        let mut values = Vec::with_capacity(column_count);
        for (i, column) in schema.columns.iter().enumerate() {
            let is_null = bitmap[i / 8] & (1 << (i % 8)) != 0;
            if is_null {
                values.push(DataValue::Null);
            } else {
                let (value, consumed) = DataValue::deserialize(column.data_type, &bytes[offset..])?;
                offset += consumed;
                values.push(value);
            }
        }

        Ok((Self { trx_id, roll_ptr, deleted, values, not_backfilled: None }, offset))
    }
}

/// Abstracts the undo log so `Table`/MVCC readers can walk a row's version
/// chain without this crate owning an undo-log implementation.
pub trait UndoSource {
    fn previous_version(&self, roll_ptr: RollPtr) -> Result<Option<(Row, RollPtr)>>;
}

/// Walks a row's version chain via an [`UndoSource`], oldest-to-newest
/// traversal happening one `next()` call at a time by the caller.
pub struct VersionChain<'a, U: UndoSource> {
    source: &'a U,
}

impl<'a, U: UndoSource> VersionChain<'a, U> {
    pub fn new(source: &'a U) -> Self {
        Self { source }
    }

    /// The version immediately preceding `row`, if its roll pointer is
    /// valid and the undo source still has it.
    pub fn previous(&self, row: &Row) -> Result<Option<(Row, RollPtr)>> {
        if !row.roll_ptr.is_valid() {
            return Ok(None);
        }
        self.source.previous_version(row.roll_ptr)
    }
}

//! Column data types and the runtime values that carry them.

use std::hash::{Hash, Hasher};

use crate::common::{Error, Result};

/// A column's declared SQL-ish type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int32,
    Int64,
    Float64,
    Bool,
    VarChar,
    Bytes,
}

impl DataType {
    fn tag(self) -> u8 {
        match self {
            DataType::Int32 => 1,
            DataType::Int64 => 2,
            DataType::Float64 => 3,
            DataType::Bool => 4,
            DataType::VarChar => 5,
            DataType::Bytes => 6,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            1 => DataType::Int32,
            2 => DataType::Int64,
            3 => DataType::Float64,
            4 => DataType::Bool,
            5 => DataType::VarChar,
            6 => DataType::Bytes,
            other => return Err(Error::Constraint(format!("unknown data type tag {other}"))),
        })
    }
}

/// A runtime value for a column. Variable-length variants own their data
/// directly rather than an inline fixed-size buffer -- Rust's enum layout
/// already makes this cheap, and column values are schema-typed rather than
/// opaque blobs needing an inline-then-spill representation.
/// Index keys need `Eq`/`Hash` (e.g. the adaptive hash index's `DashMap`
/// keys); `PartialEq`'s derive is structural, and `Eq`/`Hash` here hash
/// `Float64` by bit pattern rather than value so NaNs hash consistently.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Null,
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    VarChar(String),
    Bytes(Vec<u8>),
}

impl Eq for DataValue {}

impl Hash for DataValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            DataValue::Null => {}
            DataValue::Int32(v) => v.hash(state),
            DataValue::Int64(v) => v.hash(state),
            DataValue::Float64(v) => v.to_bits().hash(state),
            DataValue::Bool(v) => v.hash(state),
            DataValue::VarChar(v) => v.hash(state),
            DataValue::Bytes(v) => v.hash(state),
        }
    }
}

impl DataValue {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            DataValue::Null => None,
            DataValue::Int32(_) => Some(DataType::Int32),
            DataValue::Int64(_) => Some(DataType::Int64),
            DataValue::Float64(_) => Some(DataType::Float64),
            DataValue::Bool(_) => Some(DataType::Bool),
            DataValue::VarChar(_) => Some(DataType::VarChar),
            DataValue::Bytes(_) => Some(DataType::Bytes),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Serialize into `out`. Null values write nothing -- the row's null
    /// bitmap is what records their nullness.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            DataValue::Null => {}
            DataValue::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
            DataValue::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
            DataValue::Float64(v) => out.extend_from_slice(&v.to_le_bytes()),
            DataValue::Bool(v) => out.push(if *v { 1 } else { 0 }),
            DataValue::VarChar(s) => {
                let bytes = s.as_bytes();
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
            DataValue::Bytes(b) => {
                out.extend_from_slice(&(b.len() as u32).to_le_bytes());
                out.extend_from_slice(b);
            }
        }
    }

    /// Deserialize a value of `data_type` from the front of `bytes`, returning
    /// the value and the number of bytes consumed.
    pub fn deserialize(data_type: DataType, bytes: &[u8]) -> Result<(Self, usize)> {
        let too_short = || Error::Constraint("value buffer too short".into());
        match data_type {
            DataType::Int32 => {
                let slice = bytes.get(0..4).ok_or_else(too_short)?;
                Ok((DataValue::Int32(i32::from_le_bytes(slice.try_into().unwrap())), 4))
            }
            DataType::Int64 => {
                let slice = bytes.get(0..8).ok_or_else(too_short)?;
                Ok((DataValue::Int64(i64::from_le_bytes(slice.try_into().unwrap())), 8))
            }
            DataType::Float64 => {
                let slice = bytes.get(0..8).ok_or_else(too_short)?;
                Ok((DataValue::Float64(f64::from_le_bytes(slice.try_into().unwrap())), 8))
            }
            DataType::Bool => {
                let b = *bytes.first().ok_or_else(too_short)?;
                Ok((DataValue::Bool(b != 0), 1))
            }
            DataType::VarChar => {
                let len_bytes = bytes.get(0..4).ok_or_else(too_short)?;
                let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
                let data = bytes.get(4..4 + len).ok_or_else(too_short)?;
                let s = String::from_utf8(data.to_vec())
                    .map_err(|e| Error::Constraint(format!("invalid utf-8 in varchar: {e}")))?;
                Ok((DataValue::VarChar(s), 4 + len))
            }
            DataType::Bytes => {
                let len_bytes = bytes.get(0..4).ok_or_else(too_short)?;
                let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
                let data = bytes.get(4..4 + len).ok_or_else(too_short)?;
                Ok((DataValue::Bytes(data.to_vec()), 4 + len))
            }
        }
    }
}

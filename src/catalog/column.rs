//! Column definitions.

use crate::catalog::data_type::{DataType, DataValue};
use crate::catalog::varint::{read_string, read_varint, write_string, write_varint};
use crate::common::Result;

/// Name list for a MySQL-style `ENUM`/`SET` column. DDL-level validation of
/// the values is out of scope; the struct just carries the declared names
/// through persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub max_length: u32,
    pub precision: u8,
    pub scale: u8,
    pub nullable: bool,
    pub is_pk: bool,
    pub is_autoinc: bool,
    pub default: Option<DataValue>,
    pub ordinal: u16,
    pub enum_descriptor: Option<EnumDescriptor>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType, ordinal: u16) -> Self {
        Self {
            name: name.into(),
            data_type,
            max_length: 0,
            precision: 0,
            scale: 0,
            nullable: true,
            is_pk: false,
            is_autoinc: false,
            default: None,
            ordinal,
            enum_descriptor: None,
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        write_string(out, &self.name);
        out.push(data_type_tag(self.data_type));
        out.extend_from_slice(&self.max_length.to_le_bytes());
        out.push(self.precision);
        out.push(self.scale);
        out.push(self.nullable as u8);
        out.push(self.is_pk as u8);
        out.push(self.is_autoinc as u8);
        out.extend_from_slice(&self.ordinal.to_le_bytes());

        match &self.default {
            None => out.push(0),
            Some(value) => {
                out.push(1);
                value.serialize(out);
            }
        }

        match &self.enum_descriptor {
            None => out.push(0),
            Some(descriptor) => {
                out.push(1);
                write_varint(out, descriptor.values.len() as u32);
                for v in &descriptor.values {
                    write_string(out, v);
                }
            }
        }
    }

    pub fn read_from(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let (name, n) = read_string(&bytes[offset..])?;
        offset += n;

        let data_type = data_type_from_tag(bytes[offset])?;
        offset += 1;

        let max_length = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        offset += 4;
        let precision = bytes[offset];
        offset += 1;
        let scale = bytes[offset];
        offset += 1;
        let nullable = bytes[offset] != 0;
        offset += 1;
        let is_pk = bytes[offset] != 0;
        offset += 1;
        let is_autoinc = bytes[offset] != 0;
        offset += 1;
        let ordinal = u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap());
        offset += 2;

        let has_default = bytes[offset] != 0;
        offset += 1;
        let default = if has_default {
            let (value, n) = DataValue::deserialize(data_type, &bytes[offset..])?;
            offset += n;
            Some(value)
        } else {
            None
        };

        let has_enum = bytes[offset] != 0;
        offset += 1;
        let enum_descriptor = if has_enum {
            let (count, n) = read_varint(&bytes[offset..])?;
            offset += n;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (v, n) = read_string(&bytes[offset..])?;
                offset += n;
                values.push(v);
            }
            Some(EnumDescriptor { values })
        } else {
            None
        };

        Ok((
            Self {
                name,
                data_type,
                max_length,
                precision,
                scale,
                nullable,
                is_pk,
                is_autoinc,
                default,
                ordinal,
                enum_descriptor,
            },
            offset,
        ))
    }
}

fn data_type_tag(dt: DataType) -> u8 {
    match dt {
        DataType::Int32 => 1,
        DataType::Int64 => 2,
        DataType::Float64 => 3,
        DataType::Bool => 4,
        DataType::VarChar => 5,
        DataType::Bytes => 6,
    }
}

fn data_type_from_tag(tag: u8) -> Result<DataType> {
    Ok(match tag {
        1 => DataType::Int32,
        2 => DataType::Int64,
        3 => DataType::Float64,
        4 => DataType::Bool,
        5 => DataType::VarChar,
        6 => DataType::Bytes,
        other => {
            return Err(crate::common::Error::Constraint(format!("unknown data type tag {other}")))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_roundtrip() {
        let col = ColumnDef::new("id", DataType::Int64, 0);
        let mut buf = Vec::new();
        col.write_to(&mut buf);
        let (decoded, consumed) = ColumnDef::read_from(&buf).unwrap();
        assert_eq!(decoded, col);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_column_with_default_roundtrip() {
        let mut col = ColumnDef::new("status", DataType::VarChar, 1);
        col.default = Some(DataValue::VarChar("active".into()));
        col.nullable = false;

        let mut buf = Vec::new();
        col.write_to(&mut buf);
        let (decoded, _) = ColumnDef::read_from(&buf).unwrap();
        assert_eq!(decoded, col);
    }

    #[test]
    fn test_column_with_enum_descriptor_roundtrip() {
        let mut col = ColumnDef::new("color", DataType::VarChar, 2);
        col.enum_descriptor = Some(EnumDescriptor { values: vec!["red".into(), "blue".into()] });

        let mut buf = Vec::new();
        col.write_to(&mut buf);
        let (decoded, _) = ColumnDef::read_from(&buf).unwrap();
        assert_eq!(decoded.enum_descriptor, col.enum_descriptor);
    }
}

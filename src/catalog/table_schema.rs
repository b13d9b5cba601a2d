//! Table schema: the catalog's description of one table's shape.

use crate::catalog::column::ColumnDef;
use crate::catalog::data_type::DataValue;
use crate::catalog::varint::{read_string, read_varint, write_string, write_varint};
use crate::common::config::MAX_COLUMNS;
use crate::common::{Error, Result, TableId};

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub id: TableId,
    pub database_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    pub row_count: u64,
    pub autoinc_next: u64,
    pub created_at: u64,
    pub modified_at: u64,
}

impl TableSchema {
    pub fn new(id: TableId, database_name: impl Into<String>, table_name: impl Into<String>, columns: Vec<ColumnDef>, now: u64) -> Result<Self> {
        let schema = Self {
            id,
            database_name: database_name.into(),
            table_name: table_name.into(),
            columns,
            row_count: 0,
            autoinc_next: 1,
            created_at: now,
            modified_at: now,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Column names must be unique case-insensitively, at least one column
    /// must exist, and the column count must stay under the platform max.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::Constraint("table must have at least one column".into()));
        }
        if self.columns.len() > MAX_COLUMNS {
            return Err(Error::Constraint(format!(
                "table has {} columns, exceeding the platform maximum of {MAX_COLUMNS}",
                self.columns.len()
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for column in &self.columns {
            let lowered = column.name.to_ascii_lowercase();
            if !seen.insert(lowered) {
                return Err(Error::Constraint(format!("duplicate column name `{}`", column.name)));
            }
        }

        Ok(())
    }

    /// Columns marked as part of the primary key, in ordinal order.
    pub fn primary_key_columns(&self) -> Vec<&ColumnDef> {
        let mut pk: Vec<&ColumnDef> = self.columns.iter().filter(|c| c.is_pk).collect();
        pk.sort_by_key(|c| c.ordinal);
        pk
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Validate a row's already-assigned `values` against this schema: arity,
    /// nullability, declared type, and (for `VarChar`/`Bytes`) `max_length`.
    /// Auto-increment substitution is expected to have already happened --
    /// by the time values reach here every column is expected to carry a
    /// concrete, schema-typed value or an explicit, permitted null.
    pub fn validate_row(&self, values: &[DataValue]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::Constraint(format!(
                "row has {} values, table `{}` declares {} columns",
                values.len(),
                self.table_name,
                self.columns.len()
            )));
        }

        for (value, column) in values.iter().zip(&self.columns) {
            if value.is_null() {
                if !column.nullable {
                    return Err(Error::Constraint(format!("column `{}` cannot be null", column.name)));
                }
                continue;
            }

            let actual = value.data_type().expect("non-null value always has a data type");
            if actual != column.data_type {
                return Err(Error::Constraint(format!(
                    "column `{}` expects {:?}, got {actual:?}",
                    column.name, column.data_type
                )));
            }

            if column.max_length > 0 {
                let len = match value {
                    DataValue::VarChar(s) => Some(s.len()),
                    DataValue::Bytes(b) => Some(b.len()),
                    _ => None,
                };
                if let Some(len) = len {
                    if len > column.max_length as usize {
                        return Err(Error::Constraint(format!(
                            "column `{}` value of {len} bytes exceeds max length {}",
                            column.name, column.max_length
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_le_bytes());
        write_string(out, &self.database_name);
        write_string(out, &self.table_name);
        write_varint(out, self.columns.len() as u32);
        for column in &self.columns {
            column.write_to(out);
        }
        out.extend_from_slice(&self.row_count.to_le_bytes());
        out.extend_from_slice(&self.autoinc_next.to_le_bytes());
        out.extend_from_slice(&self.created_at.to_le_bytes());
        out.extend_from_slice(&self.modified_at.to_le_bytes());
    }

    pub fn read_from(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let id = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        offset += 4;

        let (database_name, n) = read_string(&bytes[offset..])?;
        offset += n;
        let (table_name, n) = read_string(&bytes[offset..])?;
        offset += n;

        let (column_count, n) = read_varint(&bytes[offset..])?;
        offset += n;
        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let (column, n) = ColumnDef::read_from(&bytes[offset..])?;
            offset += n;
            columns.push(column);
        }

        let row_count = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
        offset += 8;
        let autoinc_next = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
        offset += 8;
        let created_at = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
        offset += 8;
        let modified_at = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
        offset += 8;

        let schema = Self { id, database_name, table_name, columns, row_count, autoinc_next, created_at, modified_at };
        schema.validate()?;
        Ok((schema, offset))
    }
}

//! Database-level catalog metadata.

use crate::catalog::table_schema::TableSchema;
use crate::catalog::varint::{read_string, read_varint, write_string, write_varint};
use crate::common::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInfo {
    pub id: u32,
    pub name: String,
    pub data_directory: String,
    pub charset: String,
    pub collation: String,
    pub next_table_id: u32,
    pub tables: Vec<TableSchema>,
}

impl DatabaseInfo {
    pub fn new(id: u32, name: impl Into<String>, data_directory: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            data_directory: data_directory.into(),
            charset: "utf8mb4".into(),
            collation: "utf8mb4_general_ci".into(),
            next_table_id: 1,
            tables: Vec::new(),
        }
    }

    pub fn table_by_name(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.table_name.eq_ignore_ascii_case(name))
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_le_bytes());
        write_string(out, &self.name);
        write_string(out, &self.data_directory);
        write_string(out, &self.charset);
        write_string(out, &self.collation);
        out.extend_from_slice(&self.next_table_id.to_le_bytes());
        write_varint(out, self.tables.len() as u32);
        for table in &self.tables {
            table.write_to(out);
        }
    }

    pub fn read_from(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let id = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        offset += 4;

        let (name, n) = read_string(&bytes[offset..])?;
        offset += n;
        let (data_directory, n) = read_string(&bytes[offset..])?;
        offset += n;
        let (charset, n) = read_string(&bytes[offset..])?;
        offset += n;
        let (collation, n) = read_string(&bytes[offset..])?;
        offset += n;

        let next_table_id = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        offset += 4;

        let (table_count, n) = read_varint(&bytes[offset..])?;
        offset += n;
        let mut tables = Vec::with_capacity(table_count as usize);
        for _ in 0..table_count {
            let (table, n) = TableSchema::read_from(&bytes[offset..])?;
            offset += n;
            tables.push(table);
        }

        Ok((Self { id, name, data_directory, charset, collation, next_table_id, tables }, offset))
    }
}

//! Catalog persistence: the set of databases and table schemas, atomically
//! written to a single `catalog.bin` file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::catalog::database_info::DatabaseInfo;
use crate::catalog::table_schema::TableSchema;
use crate::catalog::varint::{read_string, read_varint, write_string, write_varint};
use crate::common::{Error, Result, TableId};

const FILE_MAGIC: &[u8; 4] = b"CYCA";
const FILE_VERSION: u32 = 1;

/// Owns every database/table schema known to a `StorageEngine` and persists
/// them to `catalog.bin` under the engine's data directory.
pub struct Catalog {
    path: PathBuf,
    next_db_id: u32,
    databases: Vec<DatabaseInfo>,
    /// Table ids with a live `Table` handle open against them. Not
    /// persisted; rebuilt as tables are opened during this process's
    /// lifetime.
    open_tables: HashSet<TableId>,
}

impl Catalog {
    /// Load `catalog.bin` from `data_dir`, or create an empty catalog if it
    /// doesn't exist yet.
    pub fn open_or_create(data_dir: impl AsRef<Path>) -> Result<Self> {
        let path = data_dir.as_ref().join("catalog.bin");
        if path.exists() {
            Self::load(&path)
        } else {
            info!("no catalog at {:?}, starting empty", path);
            Ok(Self { path, next_db_id: 1, databases: Vec::new(), open_tables: HashSet::new() })
        }
    }

    fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        if bytes.len() < 8 || &bytes[0..4] != FILE_MAGIC {
            return Err(Error::Constraint("catalog file has bad magic".into()));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        if version != FILE_VERSION {
            return Err(Error::Constraint(format!("unsupported catalog version {version}")));
        }

        let mut offset = 8;
        let next_db_id = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        offset += 4;

        let (db_count, n) = read_varint(&bytes[offset..])?;
        offset += n;
        let mut databases = Vec::with_capacity(db_count as usize);
        for _ in 0..db_count {
            let (db, n) = DatabaseInfo::read_from(&bytes[offset..])?;
            offset += n;
            databases.push(db);
        }

        info!("loaded catalog with {} databases from {:?}", databases.len(), path);
        Ok(Self { path: path.to_path_buf(), next_db_id, databases, open_tables: HashSet::new() })
    }

    /// Persist the catalog atomically: write to a sibling `.tmp` file, then
    /// rename over the real path.
    pub fn save(&self) -> Result<()> {
        let mut buf = Vec::new();
        buf.extend_from_slice(FILE_MAGIC);
        buf.extend_from_slice(&FILE_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.next_db_id.to_le_bytes());
        write_varint(&mut buf, self.databases.len() as u32);
        for db in &self.databases {
            db.write_to(&mut buf);
        }

        let tmp_path = self.path.with_extension("bin.tmp");
        fs::write(&tmp_path, &buf)?;
        fs::rename(&tmp_path, &self.path)?;
        info!("saved catalog ({} databases) to {:?}", self.databases.len(), self.path);
        Ok(())
    }

    pub fn database_by_name(&self, name: &str) -> Option<&DatabaseInfo> {
        self.databases.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn create_database(&mut self, name: impl Into<String>, data_directory: impl Into<String>) -> Result<u32> {
        let name = name.into();
        if self.database_by_name(&name).is_some() {
            return Err(Error::AlreadyExists(format!("database `{name}`")));
        }
        let id = self.next_db_id;
        self.next_db_id += 1;
        self.databases.push(DatabaseInfo::new(id, name, data_directory));
        Ok(id)
    }

    /// Refuses while any table in the database is open.
    pub fn drop_database(&mut self, name: &str) -> Result<()> {
        let db = self
            .database_by_name(name)
            .ok_or_else(|| Error::NotFound(format!("database `{name}`")))?;

        if db.tables.iter().any(|t| self.open_tables.contains(&t.id)) {
            warn!("refusing to drop database `{name}`: a table is still open");
            return Err(Error::Constraint(format!("database `{name}` has an open table")));
        }

        self.databases.retain(|d| !d.name.eq_ignore_ascii_case(name));
        Ok(())
    }

    pub fn create_table(&mut self, database: &str, schema: TableSchema) -> Result<()> {
        let db = self
            .databases
            .iter_mut()
            .find(|d| d.name.eq_ignore_ascii_case(database))
            .ok_or_else(|| Error::NotFound(format!("database `{database}`")))?;

        if db.table_by_name(&schema.table_name).is_some() {
            return Err(Error::AlreadyExists(format!("table `{}`", schema.table_name)));
        }
        db.next_table_id = db.next_table_id.max(schema.id + 1);
        db.tables.push(schema);
        Ok(())
    }

    pub fn drop_table(&mut self, database: &str, table: &str) -> Result<()> {
        let db = self
            .databases
            .iter_mut()
            .find(|d| d.name.eq_ignore_ascii_case(database))
            .ok_or_else(|| Error::NotFound(format!("database `{database}`")))?;

        let schema = db
            .table_by_name(table)
            .ok_or_else(|| Error::NotFound(format!("table `{table}`")))?;

        if self.open_tables.contains(&schema.id) {
            return Err(Error::Constraint(format!("table `{table}` is open")));
        }

        db.tables.retain(|t| !t.table_name.eq_ignore_ascii_case(table));
        Ok(())
    }

    pub fn table_schema(&self, database: &str, table: &str) -> Option<&TableSchema> {
        self.database_by_name(database)?.table_by_name(table)
    }

    pub fn mark_open(&mut self, table_id: TableId) {
        self.open_tables.insert(table_id);
    }

    pub fn mark_closed(&mut self, table_id: TableId) {
        self.open_tables.remove(&table_id);
    }

    pub fn databases(&self) -> &[DatabaseInfo] {
        &self.databases
    }
}

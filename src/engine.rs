//! `StorageEngine`: the crate's single externally-visible entry point.
//!
//! Owns the catalog, the shared buffer pool, and every currently-open
//! [`Table`], and wires the zone map / adaptive hash index / change buffer
//! into the row-level read and scan paths.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use parking_lot::{Mutex, RwLock};

use crate::buffer::BufferPoolManager;
use crate::catalog::{Catalog, DataValue, TableSchema};
use crate::common::config::BufferPoolConfig;
use crate::common::{ColumnId, Error, IndexId, PageId, Result, RowId, TableId};
use crate::index::{AdaptiveHashIndex, ChangeBuffer, CompareOp, ZoneEntry, ZoneMap};
use crate::mvcc::row::Row;
use crate::storage::doublewrite::DoublewriteBuffer;
use crate::table::{OptimizeStats, Table};

/// A single-column predicate for [`StorageEngine::scan_table`], used both to
/// filter rows and, via the zone map, to skip whole pages that can't match.
pub struct ScanPredicate {
    pub column: ColumnId,
    pub op: CompareOp,
    pub value: DataValue,
}

/// Owns everything needed to serve row-level operations against a data
/// directory: the catalog, the buffer pool, open table handles, and the
/// in-memory indexing structures layered on top.
pub struct StorageEngine {
    data_dir: PathBuf,
    catalog: Mutex<Catalog>,
    pool: Arc<BufferPoolManager>,
    tables: RwLock<HashMap<TableId, Arc<Table>>>,
    zone_map: ZoneMap,
    change_buffer: ChangeBuffer,
    ahi: AdaptiveHashIndex,
}

impl StorageEngine {
    /// Open (or initialize) a data directory. `buffer_pool_pages` is the
    /// entire externally-tunable surface -- everything else is in-memory
    /// default configuration.
    pub fn open(data_dir: impl AsRef<Path>, buffer_pool_pages: usize) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let catalog = Catalog::open_or_create(&data_dir)?;
        let pool = BufferPoolManager::new(BufferPoolConfig::new(buffer_pool_pages));

        let dw_path = data_dir.join("doublewrite.db");
        let pool = match DoublewriteBuffer::open_or_create(&dw_path) {
            Ok(dw) => pool.with_doublewrite(dw),
            Err(err) => {
                info!("doublewrite buffer unavailable at {:?}, running without one: {}", dw_path, err);
                pool
            }
        };

        info!("storage engine opened at {:?} with {} buffer pool pages", data_dir, buffer_pool_pages);

        Ok(Self {
            data_dir,
            catalog: Mutex::new(catalog),
            pool: Arc::new(pool),
            tables: RwLock::new(HashMap::new()),
            zone_map: ZoneMap::new(),
            change_buffer: ChangeBuffer::new(),
            ahi: AdaptiveHashIndex::new(),
        })
    }

    fn table_path(&self, database: &str, table: &str) -> PathBuf {
        self.data_dir.join(database).join(format!("{table}.tbl"))
    }

    /// Open (if needed) and return the live handle for `database`.`table`.
    fn open_table(&self, database: &str, table: &str) -> Result<Arc<Table>> {
        let schema = {
            let catalog = self.catalog.lock();
            catalog
                .table_schema(database, table)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("table `{database}.{table}`")))?
        };

        if let Some(existing) = self.tables.read().get(&schema.id) {
            return Ok(Arc::clone(existing));
        }

        let path = self.table_path(database, table);
        fs::create_dir_all(path.parent().unwrap())?;
        let handle = Arc::new(Table::open(schema.clone(), path, Arc::clone(&self.pool))?);

        self.tables.write().insert(schema.id, Arc::clone(&handle));
        self.catalog.lock().mark_open(schema.id);
        Ok(handle)
    }

    pub fn create_database(&self, name: &str, data_directory: &str) -> Result<()> {
        let mut catalog = self.catalog.lock();
        catalog.create_database(name, data_directory)?;
        catalog.save()
    }

    pub fn drop_database(&self, name: &str) -> Result<()> {
        let mut catalog = self.catalog.lock();
        catalog.drop_database(name)?;
        catalog.save()
    }

    pub fn create_table(&self, database: &str, schema: TableSchema) -> Result<()> {
        let mut catalog = self.catalog.lock();
        catalog.create_table(database, schema)?;
        catalog.save()
    }

    /// Refuses if the table is currently open (mirrors
    /// [`Catalog::drop_database`]'s open-table guard).
    pub fn drop_table(&self, database: &str, table: &str) -> Result<()> {
        let mut catalog = self.catalog.lock();
        catalog.drop_table(database, table)?;
        catalog.save()
    }

    pub fn insert_row(&self, database: &str, table: &str, row: &Row) -> Result<RowId> {
        let handle = self.open_table(database, table)?;
        let row_id = handle.insert(row)?;
        self.refresh_zone_stats(&handle, PageId::new(row_id.page_id as u32))?;
        Ok(row_id)
    }

    pub fn get_row(&self, database: &str, table: &str, row_id: RowId) -> Result<Option<Row>> {
        let handle = self.open_table(database, table)?;
        handle.get(row_id)
    }

    pub fn update_row(&self, database: &str, table: &str, row_id: RowId, row: &Row) -> Result<()> {
        let handle = self.open_table(database, table)?;
        handle.update(row_id, row)?;
        self.ahi.invalidate_table(handle.schema().id);
        self.refresh_zone_stats(&handle, PageId::new(row_id.page_id as u32))
    }

    pub fn delete_row(&self, database: &str, table: &str, row_id: RowId) -> Result<()> {
        let handle = self.open_table(database, table)?;
        handle.delete(row_id)?;
        self.ahi.invalidate_table(handle.schema().id);
        self.refresh_zone_stats(&handle, PageId::new(row_id.page_id as u32))
    }

    /// Look up a row by a secondary-index key. Consults the adaptive hash
    /// index first; on a miss, falls back to a full scan and records the
    /// access so a hot key eventually gets an AHI entry of its own.
    pub fn lookup_by_key(&self, database: &str, table: &str, index: IndexId, key: &DataValue) -> Result<Option<(RowId, Row)>> {
        let handle = self.open_table(database, table)?;
        let table_id = handle.schema().id;

        if let Some(row_id) = self.ahi.lookup(table_id, index, key) {
            if let Some(row) = handle.get(row_id)? {
                return Ok(Some((row_id, row)));
            }
        }

        let pk = handle.schema().primary_key_columns().first().map(|c| c.ordinal);
        for (row_id, row) in handle.scan()? {
            let matches = match pk {
                Some(ordinal) => row.get(ordinal, handle.schema()) == *key,
                None => false,
            };
            if matches {
                self.ahi.record_access(table_id, index, key.clone(), row_id);
                return Ok(Some((row_id, row)));
            }
        }
        Ok(None)
    }

    /// Scan every live row, optionally filtered by a single-column
    /// predicate. Pages the zone map can prove don't match are skipped
    /// without being read.
    pub fn scan_table(&self, database: &str, table: &str, predicate: Option<&ScanPredicate>) -> Result<Vec<(RowId, Row)>> {
        let handle = self.open_table(database, table)?;
        let table_id = handle.schema().id;

        let rows = match predicate {
            None => handle.scan()?,
            Some(pred) => handle.scan_filtered(|page_id| {
                self.zone_map.can_skip_page(table_id, page_id, pred.column, pred.op, &pred.value)
            })?,
        };

        match predicate {
            None => Ok(rows),
            Some(pred) => Ok(rows
                .into_iter()
                .filter(|(_, row)| row_matches(row, handle.schema(), pred))
                .collect()),
        }
    }

    pub fn optimize_table(&self, database: &str, table: &str) -> Result<OptimizeStats> {
        let handle = self.open_table(database, table)?;
        let stats = handle.optimize()?;
        self.ahi.invalidate_table(handle.schema().id);
        Ok(stats)
    }

    /// Recompute and publish per-column zone-map stats for the page a write
    /// just landed on.
    fn refresh_zone_stats(&self, handle: &Table, page_id: PageId) -> Result<()> {
        let schema = handle.schema();
        let table_id = schema.id;
        let rows = handle.rows_on_page(page_id)?;

        for column in &schema.columns {
            let mut min: Option<DataValue> = None;
            let mut max: Option<DataValue> = None;
            let mut row_count = 0u32;

            for (_, row) in &rows {
                if row.deleted {
                    continue;
                }
                let value = row.get(column.ordinal, schema);
                if value.is_null() {
                    continue;
                }
                row_count += 1;
                min = Some(match min {
                    Some(existing) if value_cmp(&existing, &value).is_lt() => existing,
                    _ => value.clone(),
                });
                max = Some(match max {
                    Some(existing) if value_cmp(&existing, &value).is_gt() => existing,
                    _ => value.clone(),
                });
            }

            let entry = ZoneEntry {
                min: min.unwrap_or(DataValue::Null),
                max: max.unwrap_or(DataValue::Null),
                row_count,
            };
            self.zone_map.update_page_stats(table_id, page_id, column.ordinal, entry);
        }

        Ok(())
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.pool
    }

    pub fn change_buffer(&self) -> &ChangeBuffer {
        &self.change_buffer
    }

    pub fn adaptive_hash_index(&self) -> &AdaptiveHashIndex {
        &self.ahi
    }
}

fn value_cmp(a: &DataValue, b: &DataValue) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (DataValue::Int32(a), DataValue::Int32(b)) => a.cmp(b),
        (DataValue::Int64(a), DataValue::Int64(b)) => a.cmp(b),
        (DataValue::Float64(a), DataValue::Float64(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (DataValue::Bool(a), DataValue::Bool(b)) => a.cmp(b),
        (DataValue::VarChar(a), DataValue::VarChar(b)) => a.cmp(b),
        (DataValue::Bytes(a), DataValue::Bytes(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

fn row_matches(row: &Row, schema: &TableSchema, pred: &ScanPredicate) -> bool {
    if row.deleted {
        return false;
    }
    let value = row.get(pred.column, schema);
    let Some(ordering) = value_partial_cmp(&value, &pred.value) else { return false };
    match pred.op {
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::Ne => !ordering.is_eq(),
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Le => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Ge => ordering.is_ge(),
    }
}

fn value_partial_cmp(a: &DataValue, b: &DataValue) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (DataValue::Int32(a), DataValue::Int32(b)) => a.partial_cmp(b),
        (DataValue::Int64(a), DataValue::Int64(b)) => a.partial_cmp(b),
        (DataValue::Float64(a), DataValue::Float64(b)) => a.partial_cmp(b),
        (DataValue::Bool(a), DataValue::Bool(b)) => a.partial_cmp(b),
        (DataValue::VarChar(a), DataValue::VarChar(b)) => a.partial_cmp(b),
        (DataValue::Bytes(a), DataValue::Bytes(b)) => a.partial_cmp(b),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, DataType};
    use tempfile::tempdir;

    fn schema(id: TableId) -> TableSchema {
        let mut pk = ColumnDef::new("id", DataType::Int64, 0);
        pk.is_pk = true;
        pk.nullable = false;
        TableSchema::new(id, "shop", "orders", vec![pk, ColumnDef::new("amount", DataType::Int64, 1)], 0).unwrap()
    }

    #[test]
    fn test_create_database_table_and_roundtrip_row() {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::open(dir.path(), 16).unwrap();
        engine.create_database("shop", "shop").unwrap();
        engine.create_table("shop", schema(1)).unwrap();

        let row = Row::new(1, vec![DataValue::Int64(1), DataValue::Int64(500)]);
        let row_id = engine.insert_row("shop", "orders", &row).unwrap();

        let fetched = engine.get_row("shop", "orders", row_id).unwrap().unwrap();
        assert_eq!(fetched.values, row.values);
    }

    #[test]
    fn test_scan_table_with_predicate_filters_rows() {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::open(dir.path(), 16).unwrap();
        engine.create_database("shop", "shop").unwrap();
        engine.create_table("shop", schema(1)).unwrap();

        for i in 0..5 {
            let row = Row::new(1, vec![DataValue::Int64(i), DataValue::Int64(i * 100)]);
            engine.insert_row("shop", "orders", &row).unwrap();
        }

        let predicate = ScanPredicate { column: 1, op: CompareOp::Ge, value: DataValue::Int64(300) };
        let rows = engine.scan_table("shop", "orders", Some(&predicate)).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_lookup_by_key_builds_ahi_entry_after_hot_threshold() {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::open(dir.path(), 16).unwrap();
        engine.create_database("shop", "shop").unwrap();
        engine.create_table("shop", schema(1)).unwrap();

        let row = Row::new(1, vec![DataValue::Int64(42), DataValue::Int64(9)]);
        engine.insert_row("shop", "orders", &row).unwrap();

        let found = engine.lookup_by_key("shop", "orders", 0, &DataValue::Int64(42)).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn test_drop_table_refuses_while_open() {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::open(dir.path(), 16).unwrap();
        engine.create_database("shop", "shop").unwrap();
        engine.create_table("shop", schema(1)).unwrap();
        engine.open_table("shop", "orders").unwrap();

        assert!(engine.drop_table("shop", "orders").is_err());
    }
}

//! Table: schema-aware row placement on top of the buffer pool.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::buffer::BufferPoolManager;
use crate::catalog::data_type::{DataType, DataValue};
use crate::catalog::table_schema::TableSchema;
use crate::common::{Error, PageId, Result, RowId};
use crate::mvcc::row::{Row, RowFormat};
use crate::storage::page::{Page, PageType};
use crate::storage::DiskManager;

/// Statistics returned by [`Table::optimize`].
#[derive(Debug, Clone, Copy)]
pub struct OptimizeStats {
    pub rows: u64,
    pub old_pages: u32,
    pub new_pages: u32,
    pub bytes_reclaimed: u64,
    pub duration_ms: u64,
}

/// Owns one tablespace file's worth of row storage for a schema, routed
/// through a shared buffer pool.
pub struct Table {
    schema: TableSchema,
    path: PathBuf,
    pool: Arc<BufferPoolManager>,
    /// Last page a row was successfully inserted into -- tried first on the
    /// next insert before falling back to allocating a new page.
    insert_hint: AtomicU32,
    /// Next value handed out for a null auto-increment column, seeded from
    /// `schema.autoinc_next` at open time.
    next_autoinc: AtomicU64,
}

impl Table {
    /// Open (or create) the table's backing file at `path`, registering it
    /// with `pool`.
    pub fn open(schema: TableSchema, path: impl AsRef<Path>, pool: Arc<BufferPoolManager>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let disk_manager = if path.exists() { DiskManager::open(&path)? } else { DiskManager::create(&path)? };
        let page_count = disk_manager.page_count();
        let key: Arc<str> = Arc::from(path.to_string_lossy().as_ref());
        pool.register_file(Arc::clone(&key), disk_manager);

        let hint = if page_count == 0 { u32::MAX } else { page_count - 1 };
        let next_autoinc = AtomicU64::new(schema.autoinc_next);
        Ok(Self { schema, path, pool, insert_hint: AtomicU32::new(hint), next_autoinc })
    }

    fn file_key(&self) -> Arc<str> {
        Arc::from(self.path.to_string_lossy().as_ref())
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Substitute a fresh value for any null auto-increment column, then
    /// validate every value against the schema. Run before any page is
    /// touched so a constraint violation never leaves a partial write.
    fn prepare_row(&self, row: &mut Row) -> Result<()> {
        for (i, column) in self.schema.columns.iter().enumerate() {
            if column.is_autoinc && row.values.get(i).is_some_and(DataValue::is_null) {
                let next = self.next_autoinc.fetch_add(1, Ordering::Relaxed);
                row.values[i] = match column.data_type {
                    DataType::Int32 => DataValue::Int32(next as i32),
                    _ => DataValue::Int64(next as i64),
                };
            }
        }
        self.schema.validate_row(&row.values)
    }

    /// Insert a row, returning its `RowId`. Tries the last-used page first;
    /// falls back to allocating a fresh page when it's full.
    pub fn insert(&self, row: &Row) -> Result<RowId> {
        let mut row = row.clone();
        self.prepare_row(&mut row)?;
        let bytes = row.serialize(RowFormat::Mvcc);

        let hint = self.insert_hint.load(Ordering::Relaxed);
        if hint != u32::MAX {
            let page_id = PageId::new(hint);
            if let Ok(mut guard) = self.pool.fetch_page_write(self.file_key(), page_id) {
                if guard.can_fit(bytes.len()) {
                    let slot = guard.insert_record(&bytes)?;
                    return Ok(RowId::new(page_id.0 as i32, slot as i16));
                }
            }
        }

        let (page_id, mut guard) = self.pool.new_page(self.file_key())?;
        let slot = guard.insert_record(&bytes)?;
        self.insert_hint.store(page_id.0, Ordering::Relaxed);
        debug!("table {} allocated page {} for insert", self.schema.table_name, page_id.0);
        Ok(RowId::new(page_id.0 as i32, slot as i16))
    }

    pub fn get(&self, row_id: RowId) -> Result<Option<Row>> {
        if !row_id.is_valid() {
            return Ok(None);
        }
        let page_id = PageId::new(row_id.page_id as u32);
        let guard = self.pool.fetch_page_read(self.file_key(), page_id)?;
        match guard.get_record(row_id.slot_number as u16) {
            Some(bytes) => {
                let (row, _) = Row::deserialize(bytes, &self.schema)?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    /// Replace the row at `row_id` in place (relocating within the page if
    /// the new encoding is larger).
    pub fn update(&self, row_id: RowId, row: &Row) -> Result<()> {
        let mut row = row.clone();
        self.prepare_row(&mut row)?;
        let page_id = PageId::new(row_id.page_id as u32);
        let bytes = row.serialize(RowFormat::Mvcc);
        let mut guard = self.pool.fetch_page_write(self.file_key(), page_id)?;
        guard.update_record(row_id.slot_number as u16, &bytes)
    }

    /// Soft-delete: marks the row's MVCC `deleted` flag rather than
    /// physically removing its slot, so readers with an older snapshot can
    /// still see it.
    pub fn delete(&self, row_id: RowId) -> Result<()> {
        let Some(mut row) = self.get(row_id)? else {
            return Err(Error::NotFound(format!("row {row_id}")));
        };
        row.deleted = true;
        self.update(row_id, &row)
    }

    /// Yield every live (non-tombstoned slot) row in page order.
    pub fn scan(&self) -> Result<Vec<(RowId, Row)>> {
        self.scan_filtered(|_| false)
    }

    /// Yield every live row in page order, skipping any page for which
    /// `skip_page` returns true (used to wire zone-map predicate skipping
    /// into a scan without reading the skipped pages at all).
    pub fn scan_filtered(&self, mut skip_page: impl FnMut(PageId) -> bool) -> Result<Vec<(RowId, Row)>> {
        let mut rows = Vec::new();
        let page_count = self.page_count()?;

        for page_idx in 0..page_count {
            let page_id = PageId::new(page_idx);
            if skip_page(page_id) {
                continue;
            }
            rows.extend(self.rows_on_page(page_id)?);
        }

        Ok(rows)
    }

    /// Every live row stored on a single page.
    pub fn rows_on_page(&self, page_id: PageId) -> Result<Vec<(RowId, Row)>> {
        let guard = self.pool.fetch_page_read(self.file_key(), page_id)?;
        let slot_count = guard.header().slot_count;
        let mut rows = Vec::new();
        for slot in 0..slot_count {
            if let Some(bytes) = guard.get_record(slot) {
                let (row, _) = Row::deserialize(bytes, &self.schema)?;
                rows.push((RowId::new(page_id.0 as i32, slot as i16), row));
            }
        }
        Ok(rows)
    }

    /// Number of pages currently allocated to this table's file.
    pub fn page_count(&self) -> Result<u32> {
        // The disk manager is the source of truth for how many pages exist;
        // go through a throwaway open rather than threading a handle
        // through the pool, since the pool only exposes cached pages.
        let dm = DiskManager::open(&self.path)?;
        Ok(dm.page_count())
    }

    /// Rewrite the table's storage into a fresh file containing only live
    /// rows, packed tightly, then atomically swap it in. Deleted rows and
    /// reclaimable fragmentation are dropped in the process.
    pub fn optimize(&self) -> Result<OptimizeStats> {
        let start = Instant::now();
        let old_pages = self.page_count()?;
        let old_size = DiskManager::open(&self.path)?.file_size();

        let rows: Vec<Row> = self
            .scan()?
            .into_iter()
            .map(|(_, row)| row)
            .filter(|row| !row.deleted)
            .collect();

        let tmp_path = self.path.with_extension("optimize.tmp");
        let mut new_dm = DiskManager::create(&tmp_path)?;

        let mut new_pages = 0u32;
        let mut current_page_id = new_dm.allocate()?;
        let mut current_page = Page::init(current_page_id.0 as i32, PageType::Data);
        new_pages += 1;

        for row in &rows {
            let bytes = row.serialize(RowFormat::Mvcc);
            if !current_page.can_fit(bytes.len()) {
                current_page.update_checksum();
                new_dm.write(current_page_id, &current_page)?;
                current_page_id = new_dm.allocate()?;
                current_page = Page::init(current_page_id.0 as i32, PageType::Data);
                new_pages += 1;
            }
            current_page.insert_record(&bytes)?;
        }
        current_page.update_checksum();
        new_dm.write(current_page_id, &current_page)?;
        new_dm.flush()?;
        drop(new_dm);

        std::fs::rename(&tmp_path, &self.path)?;

        // the pool's cached pages and registered DiskManager still point at
        // the old inode; drop them and re-register against the new file.
        let key = self.file_key();
        self.pool.evict_file(&key);
        self.pool.register_file(Arc::clone(&key), DiskManager::open(&self.path)?);

        self.insert_hint.store(new_pages.saturating_sub(1), Ordering::Relaxed);

        let new_size = DiskManager::open(&self.path)?.file_size();
        info!(
            "optimized table {}: {} rows, {} -> {} pages",
            self.schema.table_name, rows.len(), old_pages, new_pages
        );

        Ok(OptimizeStats {
            rows: rows.len() as u64,
            old_pages,
            new_pages,
            bytes_reclaimed: old_size.saturating_sub(new_size),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Compact in place every currently-resident page with reclaimable dead
    /// space, without rewriting the file.
    pub fn compact_pages(&self) -> Result<u32> {
        let mut compacted = 0;
        let page_count = self.page_count()?;
        for page_idx in 0..page_count {
            let page_id = PageId::new(page_idx);
            if let Ok(mut guard) = self.pool.fetch_page_write(self.file_key(), page_id) {
                guard.compact();
                compacted += 1;
            }
        }
        Ok(compacted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::column::ColumnDef;
    use crate::catalog::data_type::{DataType, DataValue};
    use crate::common::config::BufferPoolConfig;
    use tempfile::tempdir;

    fn schema() -> TableSchema {
        TableSchema::new(1, "db", "t", vec![ColumnDef::new("id", DataType::Int64, 0), ColumnDef::new("name", DataType::VarChar, 1)], 0).unwrap()
    }

    fn autoinc_schema() -> TableSchema {
        let mut id = ColumnDef::new("id", DataType::Int64, 0);
        id.is_pk = true;
        id.nullable = false;
        id.is_autoinc = true;
        TableSchema::new(1, "db", "t", vec![id, ColumnDef::new("name", DataType::VarChar, 1)], 0).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(BufferPoolManager::new(BufferPoolConfig::new(4)));
        let table = Table::open(schema(), dir.path().join("t.tbl"), pool).unwrap();

        let row = Row::new(1, vec![DataValue::Int64(1), DataValue::VarChar("alice".into())]);
        let row_id = table.insert(&row).unwrap();

        let fetched = table.get(row_id).unwrap().unwrap();
        assert_eq!(fetched.values, row.values);
    }

    #[test]
    fn test_update_row() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(BufferPoolManager::new(BufferPoolConfig::new(4)));
        let table = Table::open(schema(), dir.path().join("t.tbl"), pool).unwrap();

        let row = Row::new(1, vec![DataValue::Int64(1), DataValue::VarChar("alice".into())]);
        let row_id = table.insert(&row).unwrap();

        let updated = Row::new(1, vec![DataValue::Int64(1), DataValue::VarChar("alicia".into())]);
        table.update(row_id, &updated).unwrap();

        let fetched = table.get(row_id).unwrap().unwrap();
        assert_eq!(fetched.values, updated.values);
    }

    #[test]
    fn test_delete_is_soft() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(BufferPoolManager::new(BufferPoolConfig::new(4)));
        let table = Table::open(schema(), dir.path().join("t.tbl"), pool).unwrap();

        let row = Row::new(1, vec![DataValue::Int64(1), DataValue::Null]);
        let row_id = table.insert(&row).unwrap();
        table.delete(row_id).unwrap();

        let fetched = table.get(row_id).unwrap().unwrap();
        assert!(fetched.deleted);
    }

    #[test]
    fn test_scan_returns_all_rows() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(BufferPoolManager::new(BufferPoolConfig::new(4)));
        let table = Table::open(schema(), dir.path().join("t.tbl"), pool).unwrap();

        for i in 0..5 {
            let row = Row::new(1, vec![DataValue::Int64(i), DataValue::Null]);
            table.insert(&row).unwrap();
        }

        let rows = table.scan().unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn test_insert_rejects_null_in_non_null_column() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(BufferPoolManager::new(BufferPoolConfig::new(4)));
        let table = Table::open(autoinc_schema(), dir.path().join("t.tbl"), pool).unwrap();

        let row = Row::new(1, vec![DataValue::Int64(1), DataValue::Null]);
        let err = table.insert(&row).unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        assert_eq!(table.page_count().unwrap(), 0);
    }

    #[test]
    fn test_insert_rejects_type_mismatch() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(BufferPoolManager::new(BufferPoolConfig::new(4)));
        let table = Table::open(schema(), dir.path().join("t.tbl"), pool).unwrap();

        let row = Row::new(1, vec![DataValue::VarChar("not an id".into()), DataValue::Null]);
        let err = table.insert(&row).unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
    }

    #[test]
    fn test_insert_assigns_autoincrement_for_null_pk() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(BufferPoolManager::new(BufferPoolConfig::new(4)));
        let table = Table::open(autoinc_schema(), dir.path().join("t.tbl"), pool).unwrap();

        let first = table.insert(&Row::new(1, vec![DataValue::Null, DataValue::VarChar("alice".into())])).unwrap();
        let second = table.insert(&Row::new(1, vec![DataValue::Null, DataValue::VarChar("bob".into())])).unwrap();

        let first_id = table.get(first).unwrap().unwrap().values[0].clone();
        let second_id = table.get(second).unwrap().unwrap().values[0].clone();
        assert_eq!(first_id, DataValue::Int64(1));
        assert_eq!(second_id, DataValue::Int64(2));
    }

    #[test]
    fn test_insert_respects_explicit_autoincrement_value() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(BufferPoolManager::new(BufferPoolConfig::new(4)));
        let table = Table::open(autoinc_schema(), dir.path().join("t.tbl"), pool).unwrap();

        let row_id = table.insert(&Row::new(1, vec![DataValue::Int64(42), DataValue::VarChar("alice".into())])).unwrap();
        let fetched = table.get(row_id).unwrap().unwrap();
        assert_eq!(fetched.values[0], DataValue::Int64(42));
    }

    #[test]
    fn test_optimize_drops_deleted_rows() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(BufferPoolManager::new(BufferPoolConfig::new(4)));
        let table = Table::open(schema(), dir.path().join("t.tbl"), pool).unwrap();

        let keep = table.insert(&Row::new(1, vec![DataValue::Int64(1), DataValue::Null])).unwrap();
        let drop_id = table.insert(&Row::new(1, vec![DataValue::Int64(2), DataValue::Null])).unwrap();
        table.delete(drop_id).unwrap();

        let stats = table.optimize().unwrap();
        assert_eq!(stats.rows, 1);

        let remaining = table.scan().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, RowId::new(0, 0));
        let _ = keep;
    }
}

//! Change buffer: deferred secondary-index writes for pages not currently
//! resident in the buffer pool.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::catalog::data_type::DataValue;
use crate::common::config::CHANGE_BUFFER_MAX_BYTES;
use crate::common::{IndexId, PageId, Result, RowId, TableId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Delete,
    /// A delete-mark purge, applied once no active read view can still see
    /// the deleted entry.
    PurgeDelete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEntry {
    pub kind: ChangeKind,
    pub key_values: Vec<DataValue>,
    pub row_id: RowId,
    pub buffered_at: u64,
}

impl ChangeEntry {
    fn approx_size(&self) -> usize {
        let mut buf = Vec::new();
        for value in &self.key_values {
            value.serialize(&mut buf);
        }
        // fixed overhead for kind/row_id/buffered_at, beyond the key bytes
        buf.len() + 32
    }
}

type Key = (TableId, IndexId, PageId);

/// Buffers secondary-index changes for pages not currently cached, so a
/// write doesn't have to fault in a cold index page. Entries are applied
/// (merged into the real index page) the next time that page is fetched.
pub struct ChangeBuffer {
    entries: DashMap<Key, Vec<ChangeEntry>>,
    buffered_bytes: AtomicUsize,
}

impl ChangeBuffer {
    pub fn new() -> Self {
        Self { entries: DashMap::new(), buffered_bytes: AtomicUsize::new(0) }
    }

    /// Append a change, in insertion order (merge order matters -- no
    /// reordering or short-circuiting). Fails once the tracked byte budget
    /// is exhausted so the caller applies the change synchronously instead.
    pub fn buffer_change(&self, table: TableId, index: IndexId, page: PageId, entry: ChangeEntry) -> Result<()> {
        let size = entry.approx_size();
        let current = self.buffered_bytes.load(Ordering::Relaxed);
        if current + size > CHANGE_BUFFER_MAX_BYTES {
            return Err(crate::common::Error::Constraint("change buffer is full".into()));
        }

        self.entries.entry((table, index, page)).or_default().push(entry);
        self.buffered_bytes.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }

    pub fn has_changes(&self, table: TableId, index: IndexId, page: PageId) -> bool {
        self.entries.contains_key(&(table, index, page))
    }

    /// Atomically take and remove a key's buffered entries, called right
    /// before the target page is handed back to its fetcher.
    pub fn get_and_remove(&self, table: TableId, index: IndexId, page: PageId) -> Vec<ChangeEntry> {
        match self.entries.remove(&(table, index, page)) {
            Some((_, entries)) => {
                let reclaimed: usize = entries.iter().map(ChangeEntry::approx_size).sum();
                self.buffered_bytes.fetch_sub(reclaimed, Ordering::Relaxed);
                entries
            }
            None => Vec::new(),
        }
    }

    /// Every buffered key and its entries, for shutdown-time application.
    pub fn drain_all(&self) -> Vec<(Key, Vec<ChangeEntry>)> {
        let keys: Vec<Key> = self.entries.iter().map(|e| *e.key()).collect();
        let mut drained = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((k, v)) = self.entries.remove(&key) {
                drained.push((k, v));
            }
        }
        self.buffered_bytes.store(0, Ordering::Relaxed);
        drained
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes.load(Ordering::Relaxed)
    }
}

impl Default for ChangeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

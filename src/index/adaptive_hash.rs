//! Adaptive hash index: an in-memory hash lookup auto-built over hot
//! `(table, index)` pairs, sharded into independently-lockable partitions.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;

use crate::catalog::data_type::DataValue;
use crate::common::config::{AHI_EVICT_PERCENT, AHI_HOT_THRESHOLD, AHI_PARTITION_CAPACITY, AHI_PARTITION_COUNT};
use crate::common::{IndexId, RowId, TableId};

type Key = (TableId, IndexId, DataValue);

#[derive(Debug)]
pub struct AhiEntry {
    pub row_id: RowId,
    last_access: AtomicU64,
}

impl Clone for AhiEntry {
    fn clone(&self) -> Self {
        Self { row_id: self.row_id, last_access: AtomicU64::new(self.last_access.load(Ordering::Relaxed)) }
    }
}

struct Partition {
    entries: DashMap<Key, AhiEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Partition {
    fn new() -> Self {
        Self { entries: DashMap::new(), hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }
}

fn partition_of(table: TableId, index: IndexId, key: &DataValue) -> usize {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    (table, index, key).hash(&mut hasher);
    (hasher.finish() as usize) % AHI_PARTITION_COUNT
}

/// An auto-building, concurrently-sharded hash index over hot secondary
/// index lookups. Populated only once a `(table, index)` pair crosses
/// `AHI_HOT_THRESHOLD` accesses -- cold indexes never pay the memory cost.
pub struct AdaptiveHashIndex {
    partitions: Vec<Partition>,
    access_counts: DashMap<(TableId, IndexId), AtomicU32>,
    tick: AtomicU64,
}

impl AdaptiveHashIndex {
    pub fn new() -> Self {
        Self {
            partitions: (0..AHI_PARTITION_COUNT).map(|_| Partition::new()).collect(),
            access_counts: DashMap::new(),
            tick: AtomicU64::new(0),
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a lookup against the on-disk index for `(table, index)`. Once
    /// this crosses `AHI_HOT_THRESHOLD`, the looked-up key is auto-inserted.
    pub fn record_access(&self, table: TableId, index: IndexId, key: DataValue, row_id: RowId) {
        let counter = self.access_counts.entry((table, index)).or_insert_with(|| AtomicU32::new(0));
        let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= AHI_HOT_THRESHOLD {
            self.insert(table, index, key, row_id);
        }
    }

    /// Look up a key. Hits refresh the entry's access tick and bump the
    /// partition's hit counter; misses bump the miss counter.
    pub fn lookup(&self, table: TableId, index: IndexId, key: &DataValue) -> Option<RowId> {
        let partition = &self.partitions[partition_of(table, index, key)];
        let full_key = (table, index, key.clone());

        match partition.entries.get(&full_key) {
            Some(entry) => {
                entry.last_access.store(self.next_tick(), Ordering::Relaxed);
                partition.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.row_id)
            }
            None => {
                partition.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert (or refresh) a key. Evicts the coldest ~`AHI_EVICT_PERCENT` of
    /// a full partition's entries, by ascending `last_access`, before
    /// inserting.
    pub fn insert(&self, table: TableId, index: IndexId, key: DataValue, row_id: RowId) {
        let partition_idx = partition_of(table, index, &key);
        let partition = &self.partitions[partition_idx];
        let full_key = (table, index, key);

        if partition.entries.len() >= AHI_PARTITION_CAPACITY && !partition.entries.contains_key(&full_key) {
            self.evict_coldest(partition);
        }

        partition
            .entries
            .insert(full_key, AhiEntry { row_id, last_access: AtomicU64::new(self.next_tick()) });
    }

    fn evict_coldest(&self, partition: &Partition) {
        let mut by_access: Vec<(Key, u64)> = partition
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().last_access.load(Ordering::Relaxed)))
            .collect();
        by_access.sort_by_key(|(_, access)| *access);

        let evict_count = (by_access.len() * AHI_EVICT_PERCENT as usize) / 100;
        for (key, _) in by_access.into_iter().take(evict_count.max(1)) {
            partition.entries.remove(&key);
        }
    }

    pub fn invalidate(&self, table: TableId, index: IndexId, key: &DataValue) {
        let partition = &self.partitions[partition_of(table, index, key)];
        partition.entries.remove(&(table, index, key.clone()));
    }

    /// Remove every entry belonging to `table`, across all partitions.
    pub fn invalidate_table(&self, table: TableId) {
        for partition in &self.partitions {
            partition.entries.retain(|(t, _, _), _| *t != table);
        }
        self.access_counts.retain(|(t, _), _| *t != table);
    }

    pub fn stats(&self, table: TableId, index: IndexId, key: &DataValue) -> (u64, u64) {
        let partition = &self.partitions[partition_of(table, index, key)];
        (partition.hits.load(Ordering::Relaxed), partition.misses.load(Ordering::Relaxed))
    }
}

impl Default for AdaptiveHashIndex {
    fn default() -> Self {
        Self::new()
    }
}

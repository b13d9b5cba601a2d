//! Segmented buffer pool -- `N` independent [`BufferPoolManager`]s keyed by
//! `hash(file_path, page_id) % N`, reducing lock contention under heavy
//! concurrent access compared to a single shared pool.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::buffer::{BufferPoolManager, PageReadGuard, PageWriteGuard, StatsSnapshot};
use crate::common::config::BufferPoolConfig;
use crate::common::{PageId, Result};
use crate::storage::DiskManager;

/// Wraps `N` [`BufferPoolManager`] segments behind a single handle. Every
/// operation routes to exactly one segment, chosen by hashing the page's
/// `(file_path, page_id)` key, so segments never need to coordinate with
/// each other.
pub struct SegmentedBufferPool {
    segments: Vec<BufferPoolManager>,
}

impl SegmentedBufferPool {
    /// Build `segment_count` segments, each with its own `config`.
    pub fn new(segment_count: usize, config: BufferPoolConfig) -> Self {
        assert!(segment_count > 0, "a segmented pool needs at least one segment");
        let segments = (0..segment_count).map(|_| BufferPoolManager::new(config.clone())).collect();
        Self { segments }
    }

    fn segment_for(&self, path: &Arc<str>, page_id: PageId) -> &BufferPoolManager {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        page_id.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.segments.len();
        &self.segments[idx]
    }

    /// Register `path` against every segment -- a file's pages can land in
    /// any segment depending on page id, so every segment needs to be able
    /// to source reads for it.
    pub fn register_file(&self, path: impl Into<Arc<str>>, disk_manager_factory: impl Fn() -> Result<DiskManager>) -> Result<()> {
        let path: Arc<str> = path.into();
        for segment in &self.segments {
            segment.register_file(Arc::clone(&path), disk_manager_factory()?);
        }
        Ok(())
    }

    pub fn fetch_page_read(&self, path: impl Into<Arc<str>>, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let path = path.into();
        self.segment_for(&path, page_id).fetch_page_read(path, page_id)
    }

    pub fn fetch_page_write(&self, path: impl Into<Arc<str>>, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let path = path.into();
        self.segment_for(&path, page_id).fetch_page_write(path, page_id)
    }

    pub fn flush_page(&self, path: impl Into<Arc<str>>, page_id: PageId) -> Result<()> {
        let path = path.into();
        self.segment_for(&path, page_id).flush_page(path, page_id)
    }

    pub fn flush_all_pages(&self) -> Result<()> {
        for segment in &self.segments {
            segment.flush_all_pages()?;
        }
        Ok(())
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Sum of every segment's resident page count.
    pub fn page_count(&self) -> usize {
        self.segments.iter().map(|s| s.page_count()).sum()
    }

    /// Cache hits/misses/evictions/etc. summed across every segment.
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        let mut total =
            StatsSnapshot { cache_hits: 0, cache_misses: 0, evictions: 0, pages_read: 0, pages_written: 0 };
        for segment in &self.segments {
            let s = segment.stats().snapshot();
            total.cache_hits += s.cache_hits;
            total.cache_misses += s.cache_misses;
            total.evictions += s.evictions;
            total.pages_read += s.pages_read;
            total.pages_written += s.pages_written;
        }
        total
    }
}

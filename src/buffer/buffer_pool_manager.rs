//! Buffer Pool Manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between disk and memory, for pages spread across any
//!   number of registered tablespace files
//! - Pin-based reference counting
//! - Scan-resistant midpoint-insertion LRU eviction (not a pluggable
//!   replacer -- the boundary, `old_count`, and promotion timing are pool
//!   invariants, not a swappable policy)
//! - Automatic dirty page write-back, optionally staged through a
//!   [`DoublewriteBuffer`]
//! - A [`FlushList`] tracking the oldest unflushed LSN per dirty page, so a
//!   checkpoint can report how far back recovery would need to look

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::trace;
use parking_lot::{Mutex, RwLock};

use super::flush_list::FlushList;
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard};
use crate::common::config::BufferPoolConfig;
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::doublewrite::DoublewriteBuffer;
use crate::storage::page::Page;
use crate::storage::DiskManager;

type FrameKey = (Arc<str>, PageId);

/// Internal midpoint-insertion LRU list state.
///
/// The list runs MRU (`head`) to LRU (`tail`). `boundary` is the first node
/// of the "old" sublist; everything between `head` and `boundary` (exclusive)
/// is "young". Eviction always takes from `tail`.
struct LruState {
    head: Option<u32>,
    tail: Option<u32>,
    boundary: Option<u32>,
    old_count: usize,
    young_count: usize,
}

impl LruState {
    fn new() -> Self {
        Self { head: None, tail: None, boundary: None, old_count: 0, young_count: 0 }
    }
}

/// Manages a pool of buffer frames for caching disk pages across one or
/// more tablespace files.
///
/// # Thread Safety
/// - `page_table`: `RwLock` -- many readers, few writers
/// - `free_list`: `Mutex` -- always modified
/// - `lru`: `Mutex` -- structural list changes
/// - `sources`: `RwLock` of per-file `Mutex<DiskManager>` -- I/O serialized
///   per file, not globally
/// - `frames`: no lock on the `Vec` itself (fixed size); each `Frame` has
///   its own interior locks
/// - `stats`: no lock -- all atomic counters
pub struct BufferPoolManager {
    frames: Vec<Frame>,
    page_table: RwLock<HashMap<FrameKey, FrameId>>,
    free_list: Mutex<Vec<FrameId>>,
    lru: Mutex<LruState>,
    sources: RwLock<HashMap<Arc<str>, Arc<Mutex<DiskManager>>>>,
    doublewrite: Option<Arc<Mutex<DoublewriteBuffer>>>,
    flush_list: RwLock<FlushList>,
    next_lsn: AtomicU64,
    stats: BufferPoolStats,
    pool_size: usize,
    config: BufferPoolConfig,
    epoch: Instant,
}

impl BufferPoolManager {
    /// Create a new buffer pool with `config.capacity` frames.
    pub fn new(config: BufferPoolConfig) -> Self {
        let pool_size = config.capacity;
        let frames = (0..pool_size).map(|_| Frame::new()).collect();
        let free_list = (0..pool_size).map(FrameId::new).collect();

        Self {
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            lru: Mutex::new(LruState::new()),
            sources: RwLock::new(HashMap::new()),
            doublewrite: None,
            flush_list: RwLock::new(FlushList::new()),
            next_lsn: AtomicU64::new(1),
            stats: BufferPoolStats::new(),
            pool_size,
            config,
            epoch: Instant::now(),
        }
    }

    /// Attach a doublewrite buffer; from then on, dirty-page flushes stage
    /// through it instead of writing the tablespace file directly.
    pub fn with_doublewrite(mut self, doublewrite: DoublewriteBuffer) -> Self {
        self.doublewrite = Some(Arc::new(Mutex::new(doublewrite)));
        self
    }

    /// Register a tablespace file under `path` so its pages can be cached.
    pub fn register_file(&self, path: impl Into<Arc<str>>, disk_manager: DiskManager) {
        self.sources.write().insert(path.into(), Arc::new(Mutex::new(disk_manager)));
    }

    /// Drop every cached page belonging to `path` without flushing them,
    /// and unregister its `DiskManager`. Used when a file has been replaced
    /// out from under the pool (e.g. `Table::optimize`'s rename-over), so
    /// stale cached content from the old inode can't be served afterward.
    pub fn evict_file(&self, path: &Arc<str>) {
        let keys: Vec<FrameKey> = self
            .page_table
            .read()
            .keys()
            .filter(|(p, _)| p == path)
            .cloned()
            .collect();

        for key in keys {
            if let Some(frame_id) = self.page_table.write().remove(&key) {
                let idx = self.frame_idx(frame_id);
                {
                    let mut lru = self.lru.lock();
                    self.lru_unlink(&mut lru, idx);
                }
                self.frames[frame_id.0].reset();
                self.free_list.lock().push(frame_id);
                self.flush_list.write().remove(&key);
            }
        }

        self.sources.write().remove(path);
    }

    fn source(&self, path: &Arc<str>) -> Result<Arc<Mutex<DiskManager>>> {
        self.sources
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no registered file at {path}")))
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    // ========================================================================
    // LRU list surgery
    // ========================================================================

    fn frame_idx(&self, frame_id: FrameId) -> u32 {
        frame_id.0 as u32
    }

    fn lru_unlink(&self, lru: &mut LruState, idx: u32) {
        let prev = *self.frames[idx as usize].prev.lock();
        let next = *self.frames[idx as usize].next.lock();

        match prev {
            Some(p) => *self.frames[p as usize].next.lock() = next,
            None => lru.head = next,
        }
        match next {
            Some(n) => *self.frames[n as usize].prev.lock() = prev,
            None => lru.tail = prev,
        }
        if lru.boundary == Some(idx) {
            lru.boundary = next;
        }

        if self.frames[idx as usize].in_old_region.load(Ordering::Relaxed) {
            lru.old_count = lru.old_count.saturating_sub(1);
        } else {
            lru.young_count = lru.young_count.saturating_sub(1);
        }

        *self.frames[idx as usize].prev.lock() = None;
        *self.frames[idx as usize].next.lock() = None;
    }

    /// Insert at the overall head (MRU of the young sublist).
    fn lru_insert_young_head(&self, lru: &mut LruState, idx: u32) {
        *self.frames[idx as usize].prev.lock() = None;
        *self.frames[idx as usize].next.lock() = lru.head;
        if let Some(h) = lru.head {
            *self.frames[h as usize].prev.lock() = Some(idx);
        }
        lru.head = Some(idx);
        if lru.tail.is_none() {
            lru.tail = Some(idx);
        }
        self.frames[idx as usize].in_old_region.store(false, Ordering::Relaxed);
        lru.young_count += 1;
        self.rebalance(lru);
    }

    /// Insert right before the boundary, i.e. as the MRU node of the old
    /// sublist. This is the midpoint-insertion point for freshly cached
    /// pages -- new pages do not get young-region treatment until they
    /// prove themselves by surviving a hit after `old_block_time_ms`.
    fn lru_insert_at_boundary(&self, lru: &mut LruState, idx: u32) {
        match lru.boundary {
            Some(b) => {
                let before = *self.frames[b as usize].prev.lock();
                *self.frames[idx as usize].next.lock() = Some(b);
                *self.frames[idx as usize].prev.lock() = before;
                *self.frames[b as usize].prev.lock() = Some(idx);
                match before {
                    Some(p) => *self.frames[p as usize].next.lock() = Some(idx),
                    None => lru.head = Some(idx),
                }
            }
            None => {
                *self.frames[idx as usize].next.lock() = None;
                *self.frames[idx as usize].prev.lock() = lru.tail;
                if let Some(t) = lru.tail {
                    *self.frames[t as usize].next.lock() = Some(idx);
                }
                if lru.head.is_none() {
                    lru.head = Some(idx);
                }
                lru.tail = Some(idx);
            }
        }
        lru.boundary = Some(idx);
        self.frames[idx as usize].in_old_region.store(true, Ordering::Relaxed);
        self.frames[idx as usize].old_region_entered_at_ms.store(self.now_ms(), Ordering::Relaxed);
        lru.old_count += 1;
        self.rebalance(lru);
    }

    /// Shift the boundary by one node at a time toward the target old-region
    /// share implied by `old_block_percent`.
    fn rebalance(&self, lru: &mut LruState) {
        let total = (lru.old_count + lru.young_count).max(1);
        let target_old = (total * self.config.old_block_percent as usize) / 100;

        while lru.old_count < target_old {
            // Grow the old region by pulling the node just before the
            // boundary (the coldest young node) into old.
            let Some(boundary) = lru.boundary else { break };
            let Some(new_old) = *self.frames[boundary as usize].prev.lock() else { break };
            self.frames[new_old as usize].in_old_region.store(true, Ordering::Relaxed);
            self.frames[new_old as usize].old_region_entered_at_ms.store(self.now_ms(), Ordering::Relaxed);
            lru.boundary = Some(new_old);
            lru.old_count += 1;
            lru.young_count = lru.young_count.saturating_sub(1);
        }

        while lru.old_count > target_old + 1 {
            let Some(boundary) = lru.boundary else { break };
            let Some(new_boundary) = *self.frames[boundary as usize].next.lock() else { break };
            self.frames[boundary as usize].in_old_region.store(false, Ordering::Relaxed);
            lru.boundary = Some(new_boundary);
            lru.old_count = lru.old_count.saturating_sub(1);
            lru.young_count += 1;
        }
    }

    /// Promote a frame in the old sublist that has been hit after residing
    /// past `old_block_time_ms` to the young head. Called on every cache
    /// hit; a no-op for frames already young or not yet eligible.
    fn touch(&self, idx: u32) {
        let in_old = self.frames[idx as usize].in_old_region.load(Ordering::Relaxed);
        if !in_old {
            // Already young: just move to MRU.
            let mut lru = self.lru.lock();
            if lru.head == Some(idx) {
                return;
            }
            self.lru_unlink(&mut lru, idx);
            self.lru_insert_young_head(&mut lru, idx);
            return;
        }

        let entered_at = self.frames[idx as usize].old_region_entered_at_ms.load(Ordering::Relaxed);
        if self.now_ms().saturating_sub(entered_at) < self.config.old_block_time_ms {
            return; // scan resistance: too soon to promote
        }

        let mut lru = self.lru.lock();
        self.lru_unlink(&mut lru, idx);
        self.lru_insert_young_head(&mut lru, idx);
    }

    // ========================================================================
    // Public page access API
    // ========================================================================

    /// Fetch a page for shared read access, loading it from disk if needed.
    pub fn fetch_page_read(&self, path: impl Into<Arc<str>>, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let path = path.into();
        let frame_id = self.fetch_page_internal(&path, page_id)?;
        let frame = &self.frames[frame_id.0];
        let lock = frame.page();
        Ok(PageReadGuard::new(self, frame_id, page_id, lock))
    }

    /// Fetch a page for exclusive write access, loading it from disk if
    /// needed. The page is marked dirty when the returned guard is dropped.
    pub fn fetch_page_write(&self, path: impl Into<Arc<str>>, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let path = path.into();
        let frame_id = self.fetch_page_internal(&path, page_id)?;
        let frame = &self.frames[frame_id.0];
        let lock = frame.page_mut();
        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    fn fetch_page_internal(&self, path: &Arc<str>, page_id: PageId) -> Result<FrameId> {
        let key = (Arc::clone(path), page_id);

        if let Some(&frame_id) = self.page_table.read().get(&key) {
            self.handle_cache_hit(frame_id)
        } else {
            self.handle_cache_miss(path, page_id)
        }
    }

    fn handle_cache_hit(&self, frame_id: FrameId) -> Result<FrameId> {
        let idx = self.frame_idx(frame_id);
        self.frames[frame_id.0].pin();
        self.touch(idx);
        self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
        Ok(frame_id)
    }

    fn handle_cache_miss(&self, path: &Arc<str>, page_id: PageId) -> Result<FrameId> {
        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let source = self.source(path)?;
        let page = source.lock().read(page_id)?;
        self.stats.pages_read.fetch_add(1, Ordering::Relaxed);

        let frame_id = self.get_free_frame()?;
        let frame = &self.frames[frame_id.0];
        *frame.page_mut() = page;
        frame.set_key((Arc::clone(path), page_id));
        frame.pin();

        self.page_table.write().insert((Arc::clone(path), page_id), frame_id);

        let idx = self.frame_idx(frame_id);
        let mut lru = self.lru.lock();
        self.lru_insert_at_boundary(&mut lru, idx);

        Ok(frame_id)
    }

    fn get_free_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok(frame_id);
        }
        self.evict_page()
    }

    /// Evict the least-recently-used unpinned page (from the tail of the
    /// old sublist, which is the overall LRU end), flushing it first if
    /// dirty.
    fn evict_page(&self) -> Result<FrameId> {
        let victim = {
            let lru = self.lru.lock();
            let mut cursor = lru.tail;
            let mut found = None;
            while let Some(idx) = cursor {
                if !self.frames[idx as usize].is_pinned() {
                    found = Some(idx);
                    break;
                }
                cursor = *self.frames[idx as usize].prev.lock();
            }
            found
        };

        let Some(idx) = victim else {
            return Err(Error::NoFreeFrames);
        };

        let frame_id = FrameId::new(idx as usize);
        let frame = &self.frames[idx as usize];

        if frame.is_dirty() {
            self.flush_frame(frame_id)?;
        }

        if let Some(key) = frame.key() {
            self.page_table.write().remove(&key);
        }

        {
            let mut lru = self.lru.lock();
            self.lru_unlink(&mut lru, idx);
        }

        frame.reset();
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        Ok(frame_id)
    }

    /// Allocate a brand-new page on `path`'s tablespace and pin it for
    /// writing.
    pub fn new_page(&self, path: impl Into<Arc<str>>) -> Result<(PageId, PageWriteGuard<'_>)> {
        let path = path.into();
        let source = self.source(&path)?;
        let page_id = source.lock().allocate()?;

        let frame_id = self.get_free_frame()?;
        let frame = &self.frames[frame_id.0];
        *frame.page_mut() = Page::init(page_id.0 as i32, crate::storage::page::PageType::Data);
        frame.set_key((Arc::clone(&path), page_id));
        frame.pin();

        self.page_table.write().insert((Arc::clone(&path), page_id), frame_id);

        let idx = self.frame_idx(frame_id);
        let mut lru = self.lru.lock();
        self.lru_insert_young_head(&mut lru, idx);
        drop(lru);

        let lock = frame.page_mut();
        Ok((page_id, PageWriteGuard::new(self, frame_id, page_id, lock)))
    }

    /// Delete a page: it must not be pinned. Removes it from the pool and
    /// frees its frame; the underlying tablespace slot is not reclaimed
    /// (callers that need that should route through a free-page list at
    /// the table layer).
    pub fn delete_page(&self, path: impl Into<Arc<str>>, page_id: PageId) -> Result<()> {
        let path = path.into();
        let key = (Arc::clone(&path), page_id);

        let frame_id = match self.page_table.read().get(&key).copied() {
            Some(id) => id,
            None => return Ok(()), // not resident, nothing to do
        };

        let idx = self.frame_idx(frame_id);
        let frame = &self.frames[frame_id.0];
        if frame.is_pinned() {
            return Err(Error::Constraint(format!("page {} is pinned and cannot be deleted", page_id.0)));
        }

        self.page_table.write().remove(&key);
        {
            let mut lru = self.lru.lock();
            self.lru_unlink(&mut lru, idx);
        }
        frame.reset();
        self.free_list.lock().push(frame_id);
        self.flush_list.write().remove(&key);
        Ok(())
    }

    /// Flush a single page to disk if dirty.
    pub fn flush_page(&self, path: impl Into<Arc<str>>, page_id: PageId) -> Result<()> {
        let path = path.into();
        let key = (Arc::clone(&path), page_id);
        let frame_id = match self.page_table.read().get(&key).copied() {
            Some(id) => id,
            None => return Ok(()),
        };
        self.flush_frame(frame_id)
    }

    fn flush_frame(&self, frame_id: FrameId) -> Result<()> {
        let frame = &self.frames[frame_id.0];
        let Some((path, page_id)) = frame.key() else { return Ok(()) };
        let source = self.source(&path)?;

        let mut page = frame.page_mut();
        page.update_checksum();

        match &self.doublewrite {
            Some(dw) => {
                let mut dw = dw.lock();
                dw.stage_and_write(page_id, &page, |pid, p| source.lock().write(pid, p))?;
            }
            None => {
                source.lock().write(page_id, &page)?;
            }
        }

        drop(page);
        frame.clear_dirty();
        self.flush_list.write().remove(&(path, page_id));
        self.stats.pages_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Flush every dirty page currently resident in the pool.
    pub fn flush_all_pages(&self) -> Result<()> {
        for idx in 0..self.frames.len() {
            let frame_id = FrameId::new(idx);
            if self.frames[idx].is_dirty() {
                self.flush_frame(frame_id)?;
            }
        }
        Ok(())
    }

    /// Called by [`PageReadGuard`]/[`PageWriteGuard`] on drop.
    pub(crate) fn unpin_page_internal(&self, frame_id: FrameId, is_dirty: bool) {
        let frame = &self.frames[frame_id.0];
        if is_dirty {
            frame.mark_dirty();
            if let Some(key) = frame.key() {
                let lsn = self.next_lsn.fetch_add(1, Ordering::Relaxed);
                self.flush_list.write().add_dirty(key, lsn);
            }
        }
        frame.unpin();
    }

    /// The oldest LSN still unflushed, i.e. the point before which recovery
    /// never needs to look -- `None` if nothing is dirty.
    pub fn checkpoint_floor(&self) -> Option<u64> {
        let list = self.flush_list.read();
        let floor = list.oldest_lsn();
        trace!("checkpoint floor over {} dirty pages: {:?}", list.len(), floor);
        floor
    }

    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.free_list.lock().len()
    }

    pub fn page_count(&self) -> usize {
        self.page_table.read().len()
    }

    /// Warm the cache for pages not already resident, inserting each at the
    /// LRU boundary unpinned (`pin = 0`) rather than going through the
    /// normal fetch path. Best-effort: stops silently once the pool has no
    /// free frames left rather than evicting real work for speculative
    /// reads, and skips any single page that fails to read.
    pub fn prefetch(&self, path: impl Into<Arc<str>>, page_ids: &[PageId]) -> Result<()> {
        let path = path.into();
        let source = self.source(&path)?;

        for &page_id in page_ids {
            let key = (Arc::clone(&path), page_id);
            if self.page_table.read().contains_key(&key) {
                continue;
            }

            let Some(frame_id) = self.free_list.lock().pop() else { break };

            let page = match source.lock().read(page_id) {
                Ok(page) => page,
                Err(_) => {
                    self.free_list.lock().push(frame_id);
                    continue;
                }
            };

            let frame = &self.frames[frame_id.0];
            *frame.page_mut() = page;
            frame.set_key((Arc::clone(&path), page_id));

            self.page_table.write().insert(key, frame_id);
            let idx = self.frame_idx(frame_id);
            let mut lru = self.lru.lock();
            self.lru_insert_at_boundary(&mut lru, idx);
        }

        Ok(())
    }
}

//! Flush list -- dirty pages ordered by oldest modifying LSN.
//!
//! Per the source algorithm this is ported from, dirty pages need to be
//! flushed roughly in the order they were first dirtied, so that recovery
//! never needs to replay past a page whose own write is still unflushed.
//! The source's `lsn_key = lsn * 10^6 + page_id` trick risks overflow and
//! collisions once LSNs get large; this port instead orders entries by a
//! plain lexicographic `(u64, u32)` tuple, which is exactly as cheap to
//! compare and carries no overflow risk.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::common::PageId;

type PageRef = (Arc<str>, PageId);
type OrderKey = (u64, PageRef);

/// One dirty-page bookkeeping entry.
#[derive(Debug, Clone)]
pub struct FlushEntry {
    pub oldest_lsn: u64,
    pub newest_lsn: u64,
}

/// Tracks dirty pages ordered by the LSN of their oldest unflushed change.
pub struct FlushList {
    ordered: BTreeMap<OrderKey, FlushEntry>,
    index: HashMap<PageRef, OrderKey>,
}

impl FlushList {
    pub fn new() -> Self {
        Self { ordered: BTreeMap::new(), index: HashMap::new() }
    }

    /// Record that `page` was dirtied at `lsn`. If the page is already
    /// tracked, its `oldest_lsn` is left untouched (only `newest_lsn`
    /// advances) -- a page isn't "more urgent" to flush just because it was
    /// touched again.
    pub fn add_dirty(&mut self, page: PageRef, lsn: u64) {
        if let Some(key) = self.index.get(&page).cloned() {
            let entry = self.ordered.get_mut(&key).expect("index/ordered map out of sync");
            entry.newest_lsn = entry.newest_lsn.max(lsn);
            return;
        }

        let key = (lsn, page.clone());
        self.ordered.insert(key.clone(), FlushEntry { oldest_lsn: lsn, newest_lsn: lsn });
        self.index.insert(page, key);
    }

    /// Remove a page from the flush list (after it has been flushed).
    pub fn remove(&mut self, page: &PageRef) -> Option<FlushEntry> {
        let key = self.index.remove(page)?;
        self.ordered.remove(&key)
    }

    pub fn is_dirty(&self, page: &PageRef) -> bool {
        self.index.contains_key(page)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// The LSN of the page with the oldest unflushed change -- the
    /// checkpoint floor. `None` if nothing is dirty.
    pub fn oldest_lsn(&self) -> Option<u64> {
        self.ordered.keys().next().map(|(lsn, _)| *lsn)
    }

    /// The `n` pages with the oldest dirtying LSN, in flush order.
    pub fn oldest_n(&self, n: usize) -> Vec<PageRef> {
        self.ordered.keys().take(n).map(|(_, page)| page.clone()).collect()
    }

    /// All pages dirtied at or before `lsn`.
    pub fn older_than(&self, lsn: u64) -> Vec<PageRef> {
        self.ordered
            .iter()
            .filter(|((entry_lsn, _), _)| *entry_lsn <= lsn)
            .map(|((_, page), _)| page.clone())
            .collect()
    }

    /// Flush the oldest `count` pages via `write_fn`, removing each from the
    /// list only after `write_fn` succeeds for it. Stops at the first
    /// failure and returns it, having already removed every page flushed
    /// before that point.
    pub fn flush(
        &mut self,
        count: usize,
        mut write_fn: impl FnMut(&PageRef) -> crate::common::Result<()>,
    ) -> crate::common::Result<usize> {
        let candidates = self.oldest_n(count);
        let mut flushed = 0;
        for page in candidates {
            write_fn(&page)?;
            self.remove(&page);
            flushed += 1;
        }
        Ok(flushed)
    }
}

impl Default for FlushList {
    fn default() -> Self {
        Self::new()
    }
}

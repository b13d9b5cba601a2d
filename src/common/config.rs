//! Configuration constants for InterchangeDB.
//!
//! Most of these are fixed layout constants mandated by the on-disk format;
//! the handful that are legitimately host-tunable (buffer pool capacity, the
//! scan-resistance knobs) are also exposed as fields on [`BufferPoolConfig`]
//! so tests can override them.

/// Size of a page in bytes (16 KiB).
///
/// Chosen to match common database page sizes (InnoDB's default). All
/// on-disk offsets in [`crate::storage::page`] are computed against this
/// constant.
pub const PAGE_SIZE: usize = 16384;

/// Size of the fixed page header: page id(4) + type(1) + flags(1) +
/// slot count(2) + free-space-start(2) + free-space-end(2) + checksum(4).
pub const PAGE_HEADER_SIZE: usize = 16;

/// Size of one slot-directory entry: offset(2) + length(2).
pub const SLOT_SIZE: usize = 4;

/// Maximum number of pages per single-file `DiskManager`, bounded by the
/// 32-bit page id.
pub const MAX_PAGES: u64 = (u32::MAX as u64) + 1;

/// Target share of the buffer pool given to the "old" (midpoint-insertion)
/// region, as a percentage.
pub const OLD_BLOCK_PERCENT: u8 = 37;

/// Minimum residency, in milliseconds, a page must spend in the old region
/// before a subsequent access promotes it to young.
pub const OLD_BLOCK_TIME_MS: u64 = 1000;

/// Number of slots in the doublewrite staging file.
pub const DOUBLEWRITE_SLOTS: usize = 64;

/// Number of lookups against the on-disk index required before the
/// adaptive hash index auto-builds an entry for a `(table, index)` pair.
pub const AHI_HOT_THRESHOLD: u32 = 100;

/// Number of independent, separately-lockable partitions in the adaptive
/// hash index.
pub const AHI_PARTITION_COUNT: usize = 16;

/// Per-partition capacity of the adaptive hash index before an insert
/// triggers an eviction pass.
pub const AHI_PARTITION_CAPACITY: usize = 8192;

/// Fraction (as a percent) of a full AHI partition evicted, by ascending
/// `last_access`, when an insert finds the partition full.
pub const AHI_EVICT_PERCENT: u8 = 25;

/// Maximum buffered byte count per `ChangeBuffer` before callers must apply
/// changes synchronously instead of deferring them.
pub const CHANGE_BUFFER_MAX_BYTES: usize = 16 * 1024 * 1024;

/// Maximum number of columns a single table schema may declare.
pub const MAX_COLUMNS: usize = 4096;

/// Maximum number of reads a single file may have in flight at once through
/// an [`crate::storage::multifile::IoScheduler`].
pub const IO_SCHEDULER_MAX_IN_FLIGHT_PER_FILE: usize = 4;

/// Tunable parameters for a [`crate::buffer::BufferPoolManager`].
///
/// `capacity` is the only value the host is required to supply (the spec
/// this crate implements names "buffer pool size in pages" as the entire
/// externally configurable surface); the other two default to the module
/// constants above but are overridable so tests can exercise the boundary
/// behaviors around promotion timing.
#[derive(Debug, Clone, Copy)]
pub struct BufferPoolConfig {
    pub capacity: usize,
    pub old_block_percent: u8,
    pub old_block_time_ms: u64,
}

impl BufferPoolConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            old_block_percent: OLD_BLOCK_PERCENT,
            old_block_time_ms: OLD_BLOCK_TIME_MS,
        }
    }

    pub fn with_old_block_time_ms(mut self, ms: u64) -> Self {
        self.old_block_time_ms = ms;
        self
    }

    pub fn with_old_block_percent(mut self, pct: u8) -> Self {
        self.old_block_percent = pct;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert_eq!(PAGE_SIZE, 16384);
    }

    #[test]
    fn test_header_and_slot_sizes() {
        assert_eq!(PAGE_HEADER_SIZE, 16);
        assert_eq!(SLOT_SIZE, 4);
    }

    #[test]
    fn test_buffer_pool_config_defaults() {
        let cfg = BufferPoolConfig::new(100);
        assert_eq!(cfg.capacity, 100);
        assert_eq!(cfg.old_block_percent, OLD_BLOCK_PERCENT);
        assert_eq!(cfg.old_block_time_ms, OLD_BLOCK_TIME_MS);
    }

    #[test]
    fn test_buffer_pool_config_overrides() {
        let cfg = BufferPoolConfig::new(50)
            .with_old_block_time_ms(0)
            .with_old_block_percent(50);
        assert_eq!(cfg.old_block_time_ms, 0);
        assert_eq!(cfg.old_block_percent, 50);
    }
}

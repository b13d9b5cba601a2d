//! In-memory indexing structures layered on top of the buffer pool.
//!
//! - [`change_buffer`] - deferred secondary-index writes for cold pages
//! - [`adaptive_hash`] - auto-built hash lookup over hot index access
//! - [`zone_map`] - per-page min/max statistics for scan skipping

pub mod adaptive_hash;
pub mod change_buffer;
pub mod zone_map;

pub use adaptive_hash::{AdaptiveHashIndex, AhiEntry};
pub use change_buffer::{ChangeBuffer, ChangeEntry, ChangeKind};
pub use zone_map::{CompareOp, ZoneEntry, ZoneMap};

//! Multi-file tablespace placement and scheduling.
//!
//! A table whose tablespace spans more than one file uses a [`FileGroup`]
//! to place new pages and a logical [`GlobalPageId`] to address them, and
//! an [`IoScheduler`] to bound and prioritize concurrent I/O per file.

pub mod file_group;
pub mod io_scheduler;

pub use file_group::{AllocationPolicy, FileGroup, GlobalPageId};
pub use io_scheduler::{IoScheduler, Priority};

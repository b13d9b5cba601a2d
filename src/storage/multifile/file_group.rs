//! A group of tablespace files a table's pages are placed across.

use crate::common::error::{Error, Result};
use crate::common::PageId;
use crate::storage::DiskManager;

/// A logical page id packing a file index into the upper 16 bits and a
/// local page id into the lower 32, so a single `u64` addresses any page
/// in any file of a [`FileGroup`].
pub type GlobalPageId = u64;

pub fn pack(file_id: u16, local_page_id: u32) -> GlobalPageId {
    ((file_id as u64) << 32) | local_page_id as u64
}

pub fn unpack(global: GlobalPageId) -> (u16, u32) {
    ((global >> 32) as u16, global as u32)
}

/// How a [`FileGroup`] picks which file a newly allocated page lands in.
///
/// A closed enum with a dispatch function rather than a trait object, per
/// the spec's guidance against polymorphic inheritance for a fixed, small
/// set of strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPolicy {
    /// Send new pages to whichever file currently has the most free space
    /// relative to its allocated size.
    ProportionalFill,
    /// Cycle through files in order.
    RoundRobin,
    /// Stripe pages across files by page index modulo file count.
    Striped,
}

impl AllocationPolicy {
    /// Choose the index of the file a new page should be allocated in.
    pub fn choose_file(&self, group: &FileGroup) -> usize {
        match self {
            AllocationPolicy::ProportionalFill => group
                .files
                .iter()
                .enumerate()
                .min_by_key(|(_, f)| f.page_count())
                .map(|(i, _)| i)
                .unwrap_or(0),
            AllocationPolicy::RoundRobin => group.round_robin_cursor % group.files.len().max(1),
            AllocationPolicy::Striped => {
                (group.next_logical_page_index as usize) % group.files.len().max(1)
            }
        }
    }
}

/// An ordered collection of per-file [`DiskManager`]s a table's storage is
/// spread across.
pub struct FileGroup {
    files: Vec<DiskManager>,
    policy: AllocationPolicy,
    round_robin_cursor: usize,
    next_logical_page_index: u64,
}

impl FileGroup {
    pub fn new(files: Vec<DiskManager>, policy: AllocationPolicy) -> Self {
        Self { files, policy, round_robin_cursor: 0, next_logical_page_index: 0 }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Add a file to the group. Can happen online -- existing pages are
    /// untouched and new allocations may start landing in it immediately.
    pub fn add_file(&mut self, disk_manager: DiskManager) -> u16 {
        self.files.push(disk_manager);
        (self.files.len() - 1) as u16
    }

    /// Remove a file from the group.
    ///
    /// # Errors
    /// Fails if the file still has allocated pages; callers must migrate
    /// pages out of a file before it can be dropped.
    pub fn remove_file(&mut self, file_id: u16) -> Result<()> {
        let idx = file_id as usize;
        if idx >= self.files.len() {
            return Err(Error::NotFound(format!("file {file_id}")));
        }
        if self.files[idx].page_count() != 0 {
            return Err(Error::Constraint(format!(
                "file {file_id} still has {} allocated pages",
                self.files[idx].page_count()
            )));
        }
        self.files.remove(idx);
        Ok(())
    }

    /// Allocate a new page, chosen by the group's [`AllocationPolicy`].
    pub fn allocate(&mut self) -> Result<GlobalPageId> {
        if self.files.is_empty() {
            return Err(Error::Constraint("file group has no files".into()));
        }
        let file_id = self.policy.choose_file(self) as u16;
        let local = self.files[file_id as usize].allocate()?;

        self.round_robin_cursor = (self.round_robin_cursor + 1) % self.files.len().max(1);
        self.next_logical_page_index += 1;

        Ok(pack(file_id, local.0))
    }

    pub fn read(&mut self, global: GlobalPageId) -> Result<crate::storage::page::Page> {
        let (file_id, local) = unpack(global);
        let file = self
            .files
            .get_mut(file_id as usize)
            .ok_or_else(|| Error::NotFound(format!("file {file_id}")))?;
        file.read(PageId::new(local))
    }

    pub fn write(&mut self, global: GlobalPageId, page: &crate::storage::page::Page) -> Result<()> {
        let (file_id, local) = unpack(global);
        let file = self
            .files
            .get_mut(file_id as usize)
            .ok_or_else(|| Error::NotFound(format!("file {file_id}")))?;
        file.write(PageId::new(local), page)
    }

    pub fn allocated_pages(&self, file_id: u16) -> Option<u32> {
        self.files.get(file_id as usize).map(|f| f.page_count())
    }
}

//! Disk Manager - low-level file I/O for database pages.
//!
//! The [`DiskManager`] handles all direct file operations for a single
//! tablespace file:
//! - Reading and writing pages, with checksum verification on read
//! - Allocating new pages
//! - The tablespace file header

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::PAGE_SIZE;
use crate::common::error::Error;
use crate::common::{PageId, Result};
use crate::storage::page::{Page, PageHeader};

/// Magic bytes identifying an InterchangeDB tablespace file.
pub const FILE_MAGIC: [u8; 4] = *b"CYDB";

/// Current tablespace file format version.
pub const FILE_VERSION: u32 = 1;

/// The tablespace file header, stored zero-padded across page 0.
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     magic ("CYDB")
/// 4       4     version
/// 8       4     page_count (data pages, excluding this header page)
/// 12      4     page_size
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileHeader {
    version: u32,
    page_count: u32,
    page_size: u32,
}

impl FileHeader {
    fn to_bytes(self) -> [u8; PAGE_SIZE] {
        let mut buf = [0u8; PAGE_SIZE];
        buf[0..4].copy_from_slice(&FILE_MAGIC);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.page_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.page_size.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < 16 || buf[0..4] != FILE_MAGIC {
            return Err(Error::PageCorrupted(0));
        }
        let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let page_count = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let page_size = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);
        Ok(Self { version, page_count, page_size })
    }
}

/// Manages disk I/O for a single tablespace file.
///
/// # File Layout
/// Page 0 holds the [`FileHeader`]; data pages are numbered from 0 and
/// stored starting at file offset `PAGE_SIZE` (i.e. data page `N` lives at
/// file page `N + 1`):
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┐
/// │ Header  │ Page 0  │ Page 1  │  ...    │
/// └─────────┴─────────┴─────────┴─────────┘
/// ```
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. The `BufferPoolManager` is
/// responsible for serializing access to the disk manager.
///
/// # Durability
/// Writes are not synced automatically; callers call [`DiskManager::flush`]
/// (or rely on the doublewrite buffer's own fsync) at the appropriate
/// durability boundary.
pub struct DiskManager {
    file: File,
    page_count: u32,
}

impl DiskManager {
    /// Create a new tablespace file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let header = FileHeader { version: FILE_VERSION, page_count: 0, page_size: PAGE_SIZE as u32 };
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;

        Ok(Self { file, page_count: 0 })
    }

    /// Open an existing tablespace file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist, cannot be opened, or its
    /// header is missing/corrupted.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header_buf = [0u8; PAGE_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header_buf)?;
        let header = FileHeader::from_bytes(&header_buf)?;

        Ok(Self { file, page_count: header.page_count })
    }

    /// Open an existing tablespace file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    fn data_page_offset(page_id: u32) -> u64 {
        (page_id as u64 + 1) * (PAGE_SIZE as u64)
    }

    fn write_header(&mut self) -> Result<()> {
        let header = FileHeader { version: FILE_VERSION, page_count: self.page_count, page_size: PAGE_SIZE as u32 };
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.to_bytes())?;
        Ok(())
    }

    /// Read a page from disk, verifying its checksum.
    ///
    /// # Errors
    /// - [`Error::OutOfRange`] if `page_id` has never been allocated.
    /// - [`Error::PageCorrupted`] if the stored checksum doesn't match.
    pub fn read(&mut self, page_id: PageId) -> Result<Page> {
        if page_id.0 >= self.page_count {
            return Err(Error::OutOfRange(page_id.0, self.page_count as u64));
        }

        self.file.seek(SeekFrom::Start(Self::data_page_offset(page_id.0)))?;

        let mut page = Page::new();
        self.file.read_exact(page.as_mut_slice())?;

        if !page.verify_checksum() {
            return Err(Error::PageCorrupted(page_id.0));
        }

        Ok(page)
    }

    /// Write a page to disk exactly as given. The page must have been
    /// previously allocated.
    ///
    /// This does **not** recompute the page's checksum -- callers must call
    /// [`Page::update_checksum`] themselves first. Every call site in this
    /// crate does so already; `write` trusts the caller rather than forcing
    /// it, so a test (or a future caller) can still write a page with a
    /// deliberately stale checksum to exercise [`Self::read`]'s corruption
    /// detection.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if the page hasn't been allocated.
    pub fn write(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        if page_id.0 >= self.page_count {
            return Err(Error::OutOfRange(page_id.0, self.page_count as u64));
        }

        self.file.seek(SeekFrom::Start(Self::data_page_offset(page_id.0)))?;
        self.file.write_all(page.as_slice())?;

        Ok(())
    }

    /// Allocate a new, zeroed page, returning its id.
    pub fn allocate(&mut self) -> Result<PageId> {
        let page_id = PageId::new(self.page_count);

        self.file.seek(SeekFrom::Start(Self::data_page_offset(page_id.0)))?;
        let zeros = [0u8; PAGE_SIZE];
        self.file.write_all(&zeros)?;

        self.page_count += 1;
        self.write_header()?;

        Ok(page_id)
    }

    /// Force all buffered writes (page data and the file header) to stable
    /// storage.
    pub fn flush(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Get the number of data pages in the tablespace.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Get the total size of the tablespace file in bytes, including its
    /// header page.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.page_count as u64 + 1) * (PAGE_SIZE as u64)
    }
}

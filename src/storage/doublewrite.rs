//! Doublewrite buffer -- an atomic-write-with-recovery staging area.
//!
//! Before a page is written to its real tablespace location, it is first
//! staged into one of a small, fixed number of slots in this file and
//! flushed. Only then is the tablespace write issued. If the process dies
//! mid-write, [`DoublewriteBuffer::recover`] can tell a torn or missing
//! tablespace page apart from a clean one and reapply the staged copy.
//!
//! This port resolves the question of *where* to record which slot holds
//! which page with a small sidecar header rather than stealing bytes from
//! the page body: `Page` reserves no spare tail field, and overwriting part
//! of a record to hold the page id would silently corrupt whatever data
//! landed there.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::PAGE_SIZE;
use crate::common::config::DOUBLEWRITE_SLOTS;
use crate::common::error::{Error, Result};
use crate::common::PageId;
use crate::storage::page::Page;
use crate::storage::DiskManager;

const SENTINEL: u32 = u32::MAX;

/// Fixed-size staging buffer used to make tablespace writes recoverable
/// across a crash between a page write starting and its fsync landing.
pub struct DoublewriteBuffer {
    file: File,
    /// `slots[i]` is the page id currently staged in slot `i`, or the
    /// sentinel if the slot is empty.
    slots: [u32; DOUBLEWRITE_SLOTS],
    next: usize,
}

impl DoublewriteBuffer {
    fn header_bytes(slots: &[u32; DOUBLEWRITE_SLOTS]) -> Vec<u8> {
        let mut buf = vec![0u8; PAGE_SIZE];
        for (i, page_id) in slots.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&page_id.to_le_bytes());
        }
        buf
    }

    fn parse_header(buf: &[u8]) -> [u32; DOUBLEWRITE_SLOTS] {
        let mut slots = [SENTINEL; DOUBLEWRITE_SLOTS];
        for (i, slot) in slots.iter_mut().enumerate() {
            let at = i * 4;
            *slot = u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        }
        slots
    }

    fn slot_offset(slot: usize) -> u64 {
        (1 + slot) as u64 * PAGE_SIZE as u64
    }

    /// Create a new, empty doublewrite file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let slots = [SENTINEL; DOUBLEWRITE_SLOTS];
        file.write_all(&Self::header_bytes(&slots))?;
        let empty_slot = vec![0u8; PAGE_SIZE];
        for _ in 0..DOUBLEWRITE_SLOTS {
            file.write_all(&empty_slot)?;
        }
        file.sync_all()?;

        Ok(Self { file, slots, next: 0 })
    }

    /// Open an existing doublewrite file, recovering its slot directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut header = vec![0u8; PAGE_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;
        let slots = Self::parse_header(&header);
        Ok(Self { file, slots, next: 0 })
    }

    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    fn write_header(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&Self::header_bytes(&self.slots))?;
        Ok(())
    }

    fn stage(&mut self, slot: usize, page_id: PageId, page: &Page) -> Result<()> {
        self.file.seek(SeekFrom::Start(Self::slot_offset(slot)))?;
        self.file.write_all(page.as_slice())?;
        self.slots[slot] = page_id.0;
        Ok(())
    }

    /// Stage `page` into the next slot, flush, run `final_write_fn` (the
    /// real tablespace write), then clear the slot. Returns whatever
    /// `final_write_fn` returns; the slot stays staged on failure so a
    /// subsequent crash recovery can still find it.
    pub fn stage_and_write(
        &mut self,
        page_id: PageId,
        page: &Page,
        final_write_fn: impl FnOnce(PageId, &Page) -> Result<()>,
    ) -> Result<()> {
        let slot = self.next % DOUBLEWRITE_SLOTS;
        self.stage(slot, page_id, page)?;
        self.write_header()?;
        self.file.sync_all()?;

        final_write_fn(page_id, page)?;

        self.slots[slot] = SENTINEL;
        self.write_header()?;
        self.next = (self.next + 1) % DOUBLEWRITE_SLOTS;
        Ok(())
    }

    /// Stage every entry into successive slots before a single flush, then
    /// issue all final writes in order.
    pub fn write_batch(
        &mut self,
        entries: &[(PageId, &Page)],
        final_write_fn: impl Fn(PageId, &Page) -> Result<()>,
    ) -> Result<()> {
        if entries.len() > DOUBLEWRITE_SLOTS {
            return Err(Error::Constraint(format!(
                "write_batch of {} entries exceeds {} doublewrite slots",
                entries.len(),
                DOUBLEWRITE_SLOTS
            )));
        }

        let mut used_slots = Vec::with_capacity(entries.len());
        for (page_id, page) in entries {
            let slot = self.next % DOUBLEWRITE_SLOTS;
            self.stage(slot, *page_id, page)?;
            used_slots.push(slot);
            self.next = (self.next + 1) % DOUBLEWRITE_SLOTS;
        }
        self.write_header()?;
        self.file.sync_all()?;

        for (page_id, page) in entries {
            final_write_fn(*page_id, page)?;
        }

        for slot in used_slots {
            self.slots[slot] = SENTINEL;
        }
        self.write_header()?;
        Ok(())
    }

    /// Scan every slot; for any slot still holding a page id, check whether
    /// the tablespace's copy is missing or corrupted, and if so reapply the
    /// staged copy. Returns the page ids that were recovered.
    pub fn recover(&mut self, tablespace: &mut DiskManager) -> Result<Vec<PageId>> {
        let mut recovered = Vec::new();

        for slot in 0..DOUBLEWRITE_SLOTS {
            let raw_page_id = self.slots[slot];
            if raw_page_id == SENTINEL {
                continue;
            }
            let page_id = PageId::new(raw_page_id);

            let mut staged = Page::new();
            self.file.seek(SeekFrom::Start(Self::slot_offset(slot)))?;
            self.file.read_exact(staged.as_mut_slice())?;

            let needs_recovery = match tablespace.read(page_id) {
                Ok(existing) => existing.as_slice().iter().all(|&b| b == 0),
                Err(Error::PageCorrupted(_)) => true,
                Err(Error::OutOfRange(_, _)) => true,
                Err(e) => return Err(e),
            };

            if needs_recovery {
                tablespace.write(page_id, &staged)?;
                recovered.push(page_id);
            }

            self.slots[slot] = SENTINEL;
        }

        self.write_header()?;
        tablespace.flush()?;
        Ok(recovered)
    }
}

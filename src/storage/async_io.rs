//! Thread-pool-backed asynchronous wrapper over [`DiskManager`].
//!
//! The teacher carries no async runtime dependency, and pulling one in for
//! a handful of cooperative reads would be the single biggest dependency
//! this crate could add for the least reason. `AsyncDiskManager` instead
//! spawns blocking I/O on `std::thread` and resolves the call through a
//! oneshot `mpsc` channel, so a caller can `.recv()` at its own pace without
//! an executor. Writes are serialized by a `parking_lot::Mutex` so only one
//! positioned write is ever outstanding against the file at a time.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::error::Result;
use crate::common::PageId;
use crate::storage::page::Page;
use crate::storage::DiskManager;

/// A single in-flight async operation's result channel.
pub struct PageFuture {
    rx: mpsc::Receiver<Result<Page>>,
}

impl PageFuture {
    /// Block until the operation completes and return its result.
    pub fn wait(self) -> Result<Page> {
        self.rx
            .recv()
            .unwrap_or_else(|_| Err(crate::common::error::Error::NotFound("async worker dropped".into())))
    }
}

/// Async-flavored facade over a [`DiskManager`].
///
/// All actual I/O still runs synchronously inside a spawned thread; this
/// type only arranges for the calling thread not to block on it directly.
pub struct AsyncDiskManager {
    inner: Arc<Mutex<DiskManager>>,
}

impl AsyncDiskManager {
    pub fn new(disk_manager: DiskManager) -> Self {
        Self { inner: Arc::new(Mutex::new(disk_manager)) }
    }

    /// Submit a read, returning a handle the caller can wait on later.
    pub fn read(&self, page_id: PageId) -> PageFuture {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        std::thread::spawn(move || {
            let result = inner.lock().read(page_id);
            let _ = tx.send(result);
        });
        PageFuture { rx }
    }

    /// Submit a write. The returned handle resolves to the written page on
    /// success, for call-site symmetry with [`AsyncDiskManager::read`].
    pub fn write(&self, page_id: PageId, page: Page) -> PageFuture {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        std::thread::spawn(move || {
            let result = inner.lock().write(page_id, &page).map(|_| page);
            let _ = tx.send(result);
        });
        PageFuture { rx }
    }

    /// Submit a batch of reads and collect them in request order.
    ///
    /// This is the "batched read-ahead" entry point: `start..start+count`
    /// are all submitted before any result is awaited, so the underlying
    /// disk can service them without the caller serializing one at a time.
    pub fn read_ahead(&self, start: u32, count: u32) -> Vec<Result<Page>> {
        let futures: Vec<PageFuture> =
            (start..start + count).map(|id| self.read(PageId::new(id))).collect();
        futures.into_iter().map(PageFuture::wait).collect()
    }
}

/// Spawns an [`AsyncDiskManager`] over a freshly opened or created file.
pub fn open_or_create(path: PathBuf) -> Result<AsyncDiskManager> {
    Ok(AsyncDiskManager::new(DiskManager::open_or_create(path)?))
}

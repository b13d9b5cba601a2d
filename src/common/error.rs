//! Error types for InterchangeDB.

use thiserror::Error as ThisError;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in InterchangeDB.
///
/// This enum represents every error that can occur in the database. By
/// having a single error type, we make error handling consistent across
/// every layer, from raw disk I/O up through catalog and table operations.
#[derive(Debug, ThisError)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist on disk.
    #[error("page {0} not found")]
    PageNotFound(u32),

    /// A page id or offset fell outside the bounds of the backing file.
    #[error("page {0} is out of range (file has {1} pages)")]
    OutOfRange(u32, u64),

    /// A page's checksum did not match its contents when read from disk.
    #[error("page {0} failed checksum verification")]
    PageCorrupted(u32),

    /// Buffer pool has no free frames and cannot evict any pages.
    ///
    /// This happens when every frame is pinned.
    #[error("no free frames available in buffer pool")]
    NoFreeFrames,

    /// Buffer pool is at capacity and cannot admit a new page.
    #[error("buffer pool is exhausted (capacity {0})")]
    BufferExhausted(usize),

    /// The provided page ID is invalid (e.g. exceeds max pages).
    #[error("invalid page id: {0}")]
    InvalidPageId(u32),

    /// Attempted to unpin a page that wasn't pinned.
    ///
    /// This indicates a bug -- unpinning should match pinning.
    #[error("page {0} is not pinned")]
    PageNotPinned(u32),

    /// A row did not fit on any page, even an empty one.
    #[error("row of {0} bytes exceeds the maximum storable row size ({1} bytes)")]
    RowTooLarge(usize, usize),

    /// A catalog lookup (table, column, database) found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A create operation collided with an existing catalog entry.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A schema or data constraint was violated (column count, null rule, type mismatch).
    #[error("constraint violation: {0}")]
    Constraint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PageNotFound(42);
        assert_eq!(format!("{}", err), "page 42 not found");

        let err = Error::NoFreeFrames;
        assert_eq!(format!("{}", err), "no free frames available in buffer pool");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {} // Success
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_result_type_alias() {
        // This function returns our Result type
        fn might_fail() -> Result<u32> {
            Ok(42)
        }

        assert_eq!(might_fail().unwrap(), 42);
    }

    #[test]
    fn test_constraint_and_not_found_messages() {
        let err = Error::NotFound("table orders".to_string());
        assert_eq!(format!("{}", err), "not found: table orders");

        let err = Error::Constraint("column `id` cannot be null".to_string());
        assert_eq!(format!("{}", err), "constraint violation: column `id` cannot be null");
    }

    #[test]
    fn test_row_too_large_message() {
        let err = Error::RowTooLarge(20000, 16000);
        assert_eq!(
            format!("{}", err),
            "row of 20000 bytes exceeds the maximum storable row size (16000 bytes)"
        );
    }
}

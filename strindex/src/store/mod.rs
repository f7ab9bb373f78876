//! Byte store abstraction backing the index.
//!
//! The index never talks to a file or a buffer directly. It addresses a flat,
//! growable byte medium through the [`ByteStore`] trait, which allows the same
//! index code to run against an in-memory buffer in tests and a file on disk.
//!
//! # Contract
//!
//! - `read(offset, size)` returns exactly `size` bytes, or
//!   [`StoreError::OutOfRange`] if `offset + size` is past the current extent.
//! - `write(offset, data)` grows the extent when needed (gaps are zero-filled)
//!   and never shrinks it.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::{MemoryStore, MemoryStoreStats};

/// Errors that can occur during byte store operations.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error from the underlying medium.
    Io(std::io::Error),
    /// Read past the current extent of the store.
    OutOfRange { offset: u64, size: u32, extent: u64 },
    /// Injected fault (test stores only).
    InjectedFault(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OutOfRange {
                offset,
                size,
                extent,
            } => write!(
                f,
                "read of {size} bytes at offset {offset} out of range (extent: {extent})"
            ),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Abstraction over an addressable, growable byte medium.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `read` returns the last written content for every byte in range
/// - bytes never written but inside the extent read back as zero
/// - `extent` only ever grows
pub trait ByteStore {
    /// Read exactly `size` bytes starting at `offset`.
    fn read(&self, offset: u64, size: u32) -> Result<Vec<u8>, StoreError>;

    /// Write `data` at `offset`, growing the store if needed.
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), StoreError>;

    /// Current extent of the store in bytes.
    fn extent(&self) -> u64;

    /// Make previous writes durable. In-memory stores have nothing to do.
    fn sync(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Lets an index borrow a store instead of owning it.
impl<T: ByteStore + ?Sized> ByteStore for &mut T {
    fn read(&self, offset: u64, size: u32) -> Result<Vec<u8>, StoreError> {
        (**self).read(offset, size)
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        (**self).write(offset, data)
    }

    fn extent(&self) -> u64 {
        (**self).extent()
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        (**self).sync()
    }
}

/// Check a read request against the extent of a store.
pub(crate) fn check_range(offset: u64, size: u32, extent: u64) -> Result<(), StoreError> {
    match offset.checked_add(u64::from(size)) {
        Some(end) if end <= extent => Ok(()),
        _ => Err(StoreError::OutOfRange {
            offset,
            size,
            extent,
        }),
    }
}

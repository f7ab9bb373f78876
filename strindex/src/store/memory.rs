//! In-memory byte store.
//!
//! Backs the index with a growable `Vec<u8>`. The store can grow in whole
//! pages so that its extent behaves like a page-granular medium: a write that
//! lands past the end extends the buffer by zero-filled pages until it fits.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::store::{ByteStore, StoreError, check_range};

/// Statistics about memory store operations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// Number of reads.
    pub reads: u64,
    /// Number of writes.
    pub writes: u64,
    /// Total bytes read.
    pub bytes_read: u64,
    /// Total bytes written.
    pub bytes_written: u64,
}

/// A byte store held entirely in memory.
///
/// # Invariants
///
/// - `data.len()` is always a multiple of `page_size`
/// - `data` never shrinks
#[derive(Debug)]
pub struct MemoryStore {
    data: Vec<u8>,
    /// Growth granularity in bytes (1 means exact growth).
    page_size: usize,
    reads: AtomicU64,
    writes: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store that grows exactly to the bytes written.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(1)
    }

    /// Create an empty store that grows in zero-filled pages of `page_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is 0.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        assert!(page_size > 0, "page size must be positive");
        Self {
            data: Vec::new(),
            page_size,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    /// Raw contents of the store.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw contents, for tests that corrupt records in place.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }

    /// Reset the operation counters.
    pub fn reset_stats(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.bytes_read.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteStore for MemoryStore {
    fn read(&self, offset: u64, size: u32) -> Result<Vec<u8>, StoreError> {
        check_range(offset, size, self.extent())?;

        // Both values are bounded by data.len() after the range check.
        #[allow(clippy::cast_possible_truncation)]
        let (start, len) = (offset as usize, size as usize);

        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(u64::from(size), Ordering::Relaxed);

        Ok(self.data[start..start + len].to_vec())
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        let start = usize::try_from(offset).map_err(|_| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("offset {offset} does not fit in memory"),
            ))
        })?;
        let end = start
            .checked_add(data.len())
            .ok_or_else(|| write_out_of_range(offset, data.len()))?;

        if end > self.data.len() {
            let new_len = end
                .div_ceil(self.page_size)
                .checked_mul(self.page_size)
                .ok_or_else(|| write_out_of_range(offset, data.len()))?;
            self.data.resize(new_len, 0);
        }
        self.data[start..end].copy_from_slice(data);

        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written
            .fetch_add(data.len() as u64, Ordering::Relaxed);

        Ok(())
    }

    fn extent(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Error for a write whose end does not fit in the address space.
fn write_out_of_range(offset: u64, len: usize) -> StoreError {
    StoreError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("write of {len} bytes at offset {offset} overflows the store"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_write_then_read() {
        let mut store = MemoryStore::new();
        store.write(0, b"hello").expect("write");
        assert_eq!(store.read(0, 5).expect("read"), b"hello".to_vec());
        assert_eq!(store.extent(), 5);
    }

    #[test]
    fn test_write_past_end_zero_fills_gap() {
        let mut store = MemoryStore::new();
        store.write(10, b"xy").expect("write");

        assert_eq!(store.extent(), 12);
        assert_eq!(store.read(0, 10).expect("read gap"), vec![0u8; 10]);
        assert_eq!(store.read(10, 2).expect("read data"), b"xy".to_vec());
    }

    #[test]
    fn test_read_out_of_range() {
        let mut store = MemoryStore::new();
        store.write(0, &[1, 2, 3]).expect("write");

        let err = store.read(2, 2).expect_err("should be out of range");
        assert!(matches!(
            err,
            StoreError::OutOfRange {
                offset: 2,
                size: 2,
                extent: 3
            }
        ));
    }

    #[test]
    fn test_never_shrinks() {
        let mut store = MemoryStore::new();
        store.write(0, &[7u8; 32]).expect("write");
        store.write(0, &[1u8; 4]).expect("overwrite");

        assert_eq!(store.extent(), 32);
        assert_eq!(store.read(4, 28).expect("read tail"), vec![7u8; 28]);
    }

    #[test]
    fn test_write_near_address_limit_fails() {
        let mut store = MemoryStore::new();
        let err = store
            .write(u64::MAX - 1, b"abcd")
            .expect_err("write should overflow");
        assert!(matches!(err, StoreError::Io(ref e) if e.kind() == std::io::ErrorKind::InvalidInput));
        assert_eq!(store.extent(), 0);
        assert_eq!(store.stats().writes, 0);
    }

    #[test]
    fn test_page_granular_growth() {
        let mut store = MemoryStore::with_page_size(512);
        store.write(10, &[1u8; 20]).expect("write");
        assert_eq!(store.extent(), 512);

        store.write(500, &[2u8; 20]).expect("write across page");
        assert_eq!(store.extent(), 1024);
        assert_eq!(store.read(500, 20).expect("read"), vec![2u8; 20]);
    }

    #[test]
    fn test_random_round_trips_across_page_sizes() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let page_size = rng.random_range(1..=4097);
            let len = rng.random_range(1..=page_size * 4);
            let offset = rng.random_range(0..=page_size) as u64;
            let data: Vec<u8> = (0..len).map(|_| rng.random()).collect();

            let mut store = MemoryStore::with_page_size(page_size);
            store.write(offset, &data).expect("write");

            let size = u32::try_from(len).expect("len fits in u32");
            assert_eq!(store.read(offset, size).expect("read"), data);
            assert_eq!(store.extent() % page_size as u64, 0);
        }
    }

    #[test]
    fn test_stats() {
        let mut store = MemoryStore::new();
        store.write(0, b"abcd").expect("write");
        let _ = store.read(0, 2).expect("read");
        let _ = store.read(2, 2).expect("read");

        let stats = store.stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.bytes_written, 4);
        assert_eq!(stats.bytes_read, 4);

        store.reset_stats();
        assert_eq!(store.stats(), MemoryStoreStats::default());
    }
}

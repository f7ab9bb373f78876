//! Shared index handle.
//!
//! Wraps an [`Index`] in `Arc<RwLock<_>>` so that many threads can search
//! concurrently while inserts take exclusive access:
//! - `search`, `search_all`, `range`, `len` and `stats` take the read lock
//! - `insert` and `sync` take the write lock
//!
//! A poisoned lock surfaces as [`IndexError::LockPoisoned`].

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::index::{Index, IndexError, IndexStats};
use crate::store::ByteStore;

/// Cloneable, thread-safe handle to a single index.
pub struct SharedIndex<S: ByteStore> {
    inner: Arc<RwLock<Index<S>>>,
}

impl<S: ByteStore> Clone for SharedIndex<S> {
    #[allow(clippy::disallowed_methods)] // Arc::clone is safe and expected
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ByteStore> SharedIndex<S> {
    /// Take ownership of an index.
    #[must_use]
    pub fn new(index: Index<S>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Index<S>>, IndexError> {
        self.inner.read().map_err(|_| IndexError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Index<S>>, IndexError> {
        self.inner.write().map_err(|_| IndexError::LockPoisoned)
    }

    /// Insert a key-value pair under the write lock.
    pub fn insert(&self, key: &str, value: &str) -> Result<(), IndexError> {
        self.write()?.insert(key, value)
    }

    /// Look up a key under the read lock.
    pub fn search(&self, key: &str) -> Result<Option<String>, IndexError> {
        self.read()?.search(key)
    }

    pub fn search_all(&self, key: &str) -> Result<Vec<String>, IndexError> {
        self.read()?.search_all(key)
    }

    /// Entries with keys in `[start, end)`.
    pub fn range(&self, start: &str, end: &str) -> Result<Vec<(String, String)>, IndexError> {
        self.read()?.range(start, end)
    }

    pub fn len(&self) -> Result<usize, IndexError> {
        self.read()?.len()
    }

    pub fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.read()?.is_empty())
    }

    pub fn stats(&self) -> Result<IndexStats, IndexError> {
        Ok(self.read()?.stats())
    }

    pub fn sync(&self) -> Result<(), IndexError> {
        self.write()?.sync()
    }

    /// Run `f` with shared access to the index, e.g. to drive a cursor.
    pub fn with_index<T>(&self, f: impl FnOnce(&Index<S>) -> T) -> Result<T, IndexError> {
        let guard = self.read()?;
        Ok(f(&guard))
    }

    /// Recover the index if this is the last handle.
    pub fn try_unwrap(self) -> Result<Index<S>, Self> {
        Arc::try_unwrap(self.inner)
            .map(|lock| lock.into_inner().unwrap_or_else(PoisonError::into_inner))
            .map_err(|inner| Self { inner })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::index::IndexOptions;
    use crate::store::MemoryStore;

    fn shared(fanout: usize) -> SharedIndex<MemoryStore> {
        let index = Index::create(MemoryStore::new(), IndexOptions::with_fanout(fanout))
            .expect("create index");
        SharedIndex::new(index)
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let index = shared(4);
        for i in 0..50 {
            index.insert(&format!("base{i:03}"), "b").expect("insert");
        }

        let writer = {
            let index = index.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    index.insert(&format!("new{i:03}"), "n").expect("insert");
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let index = index.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let found = index.search(&format!("base{i:03}")).expect("search");
                        assert_eq!(found, Some("b".to_string()));
                    }
                })
            })
            .collect();

        writer.join().expect("writer thread");
        for reader in readers {
            reader.join().expect("reader thread");
        }

        assert_eq!(index.len().expect("len"), 250);
        let violations = index
            .with_index(Index::check_invariants)
            .expect("lock")
            .expect("check");
        assert!(violations.is_empty());
    }

    #[test]
    fn test_range_and_stats_through_handle() {
        let index = shared(3);
        for key in ["a", "b", "c", "d", "e"] {
            index.insert(key, key).expect("insert");
        }

        let keys: Vec<String> = index
            .range("b", "e")
            .expect("range")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["b", "c", "d"]);
        assert_eq!(index.stats().expect("stats").height, 2);
        assert!(!index.is_empty().expect("is_empty"));
    }

    #[test]
    fn test_with_index_drives_cursor() {
        let index = shared(3);
        for key in ["c", "a", "b", "d"] {
            index.insert(key, key).expect("insert");
        }

        let keys = index
            .with_index(|index| {
                index
                    .cursor()?
                    .map(|entry| entry.map(|(k, _)| k))
                    .collect::<Result<Vec<String>, IndexError>>()
            })
            .expect("lock")
            .expect("scan");
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_try_unwrap_last_handle() {
        let index = shared(3);
        let other = index.clone();
        let index = index.try_unwrap().err().expect("two handles alive");
        drop(other);

        let index = index.try_unwrap().ok().expect("last handle");
        assert!(index.is_empty());
    }

    #[test]
    fn test_poisoned_lock_reported() {
        let index = shared(3);
        let poisoner = index.clone();
        let result = thread::spawn(move || {
            let _guard = poisoner.write().expect("lock");
            panic!("poison the lock");
        })
        .join();
        assert!(result.is_err());

        assert!(matches!(index.search("a"), Err(IndexError::LockPoisoned)));
    }
}

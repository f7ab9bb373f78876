//! File-backed byte store.
//!
//! Reads and writes go straight to a single file. On unix, reads use `pread`
//! so they do not need mutable access and do not move the file cursor.

use std::fs::{File, OpenOptions};
#[cfg(not(unix))]
use std::io::{Read, Seek, SeekFrom};
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::store::{ByteStore, StoreError, check_range};

/// A byte store backed by a single file.
pub struct FileStore {
    file: File,
    path: PathBuf,
    extent: u64,
}

impl FileStore {
    /// Create a new, empty store file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        tracing::debug!("Created store file {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
            extent: 0,
        })
    }

    /// Open an existing store file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let extent = file.metadata()?.len();

        tracing::debug!(
            "Opened store file {} ({} bytes)",
            path.display(),
            extent
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            extent,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(not(unix))]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    #[cfg(unix)]
    fn write_at(&self, data: &[u8], offset: u64) -> std::io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    #[cfg(not(unix))]
    fn write_at(&self, data: &[u8], offset: u64) -> std::io::Result<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }
}

impl ByteStore for FileStore {
    fn read(&self, offset: u64, size: u32) -> Result<Vec<u8>, StoreError> {
        check_range(offset, size, self.extent)?;

        let mut buf = vec![0u8; size as usize];
        self.read_at(&mut buf, offset)?;
        Ok(buf)
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        let end = offset.checked_add(data.len() as u64).ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("write of {} bytes at offset {offset} overflows the store", data.len()),
            ))
        })?;

        // Extend first so a gap between the old end and `offset` reads as zeros.
        if end > self.extent {
            self.file.set_len(end)?;
            self.extent = end;
        }
        self.write_at(data, offset)?;

        Ok(())
    }

    fn extent(&self) -> u64 {
        self.extent
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_write_read() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("store.bin");

        let mut store = FileStore::create(&path).expect("create store");
        assert_eq!(store.extent(), 0);

        store.write(4, b"data").expect("write");
        assert_eq!(store.extent(), 8);
        assert_eq!(store.read(0, 4).expect("read gap"), vec![0u8; 4]);
        assert_eq!(store.read(4, 4).expect("read data"), b"data".to_vec());
    }

    #[test]
    fn test_create_fails_if_exists() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("store.bin");

        let _store = FileStore::create(&path).expect("create store");
        assert!(matches!(FileStore::create(&path), Err(StoreError::Io(_))));
    }

    #[test]
    fn test_reopen_preserves_contents() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("store.bin");

        {
            let mut store = FileStore::create(&path).expect("create store");
            store.write(100, b"persisted").expect("write");
            store.sync().expect("sync");
        }

        let store = FileStore::open(&path).expect("open store");
        assert_eq!(store.extent(), 109);
        assert_eq!(store.read(100, 9).expect("read"), b"persisted".to_vec());
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn test_write_near_address_limit_fails() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("store.bin");

        let mut store = FileStore::create(&path).expect("create store");
        let err = store
            .write(u64::MAX - 1, b"abcd")
            .expect_err("write should overflow");
        assert!(matches!(err, StoreError::Io(ref e) if e.kind() == std::io::ErrorKind::InvalidInput));
        assert_eq!(store.extent(), 0);
    }

    #[test]
    fn test_read_out_of_range() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("store.bin");

        let mut store = FileStore::create(&path).expect("create store");
        store.write(0, &[1u8; 16]).expect("write");

        assert!(matches!(
            store.read(8, 16),
            Err(StoreError::OutOfRange { extent: 16, .. })
        ));
    }
}

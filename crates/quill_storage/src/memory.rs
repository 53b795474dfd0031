//! In-memory directory for testing.

use crate::directory::{Directory, DirectoryLock, FileData};
use crate::error::{StorageError, StorageResult};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

type SharedBytes = Arc<RwLock<Vec<u8>>>;

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, SharedBytes>,
    locked: bool,
    failing: bool,
    backups: u64,
}

/// An in-memory directory.
///
/// Clones share the same files, so a test can keep one handle to inspect or
/// tamper with the files while a store owns another. Suitable for:
/// - Unit tests
/// - Crash and corruption scenarios built byte-for-byte
/// - I/O failure injection via [`MemoryDirectory::fail`]
///
/// # Example
///
/// ```rust
/// use quill_storage::{Directory, MemoryDirectory};
///
/// let dir = MemoryDirectory::new();
/// dir.write("hash0", b"abc");
/// assert_eq!(dir.read_string("hash0").as_deref(), Some("abc"));
/// assert!(dir.open_file("hash1").unwrap().is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDirectory {
    /// Creates a new empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation on this directory and its open
    /// handles fail with an I/O error.
    pub fn fail(&self) {
        self.state.lock().failing = true;
    }

    /// Stops injecting failures.
    pub fn recover(&self) {
        self.state.lock().failing = false;
    }

    /// Returns a copy of a file's content, or `None` if it does not exist.
    #[must_use]
    pub fn read(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(name).map(|f| f.read().clone())
    }

    /// Returns a file's content decoded as UTF-8 (lossily).
    #[must_use]
    pub fn read_string(&self, name: &str) -> Option<String> {
        self.read(name)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Replaces a file's content, creating it if needed.
    pub fn write(&self, name: &str, data: &[u8]) {
        self.state
            .lock()
            .files
            .insert(name.to_string(), Arc::new(RwLock::new(data.to_vec())));
    }

    /// Returns whether a file exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.state.lock().files.contains_key(name)
    }

    /// Returns the names of all files, sorted.
    #[must_use]
    pub fn file_names(&self) -> Vec<String> {
        self.state.lock().files.keys().cloned().collect()
    }

    fn check(&self, operation: &str) -> StorageResult<()> {
        if self.state.lock().failing {
            return Err(StorageError::simulated(operation));
        }
        Ok(())
    }

    fn handle(&self, data: SharedBytes) -> Box<dyn FileData> {
        Box::new(MemoryFile {
            data,
            directory: self.clone(),
        })
    }
}

impl Directory for MemoryDirectory {
    fn open_file(&self, name: &str) -> StorageResult<Option<Box<dyn FileData>>> {
        self.check("open")?;
        let data = self.state.lock().files.get(name).cloned();
        Ok(data.map(|data| self.handle(data)))
    }

    fn create_file(&self, name: &str, append: bool) -> StorageResult<Box<dyn FileData>> {
        self.check("create")?;
        let data = {
            let mut state = self.state.lock();
            let entry = state
                .files
                .entry(name.to_string())
                .or_insert_with(SharedBytes::default)
                .clone();
            if !append {
                entry.write().clear();
            }
            entry
        };
        Ok(self.handle(data))
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        self.check("delete")?;
        self.state.lock().files.remove(name);
        Ok(())
    }

    fn backup(&self, name: &str) -> StorageResult<()> {
        self.check("backup")?;
        let mut state = self.state.lock();
        if let Some(data) = state.files.remove(name) {
            state.backups += 1;
            let backup = format!("backup-{name}-{}", state.backups);
            state.files.insert(backup, data);
        }
        Ok(())
    }

    fn lock(&self) -> StorageResult<Box<dyn DirectoryLock>> {
        self.check("lock")?;
        let mut state = self.state.lock();
        if state.locked {
            return Err(StorageError::Locked {
                path: "<memory>".to_string(),
            });
        }
        state.locked = true;
        Ok(Box::new(MemoryLock {
            state: Arc::clone(&self.state),
            held: true,
        }))
    }
}

#[derive(Debug)]
struct MemoryLock {
    state: Arc<Mutex<MemoryState>>,
    held: bool,
}

impl MemoryLock {
    fn release(&mut self) {
        if self.held {
            self.state.lock().locked = false;
            self.held = false;
        }
    }
}

impl DirectoryLock for MemoryLock {
    fn unlock(mut self: Box<Self>) -> StorageResult<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// A file handle inside a [`MemoryDirectory`].
///
/// A handle keeps its bytes alive after the file is deleted, like an open
/// descriptor on an unlinked file.
#[derive(Debug)]
pub struct MemoryFile {
    data: SharedBytes,
    directory: MemoryDirectory,
}

impl FileData for MemoryFile {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.directory.check("read")?;
        let data = self.data.read();
        let size = data.len() as u64;
        let offset_usize = offset as usize;
        let end = offset_usize.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset_usize..end].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        self.directory.check("append")?;
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn size(&self) -> StorageResult<u64> {
        self.directory.check("size")?;
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.directory.check("truncate")?;
        let mut data = self.data.write();
        let current_size = data.len() as u64;

        if new_size > current_size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_size, current_size
                ),
            )));
        }

        data.truncate(new_size as usize);
        Ok(())
    }

    fn force(&mut self, _metadata: bool) -> StorageResult<()> {
        // Nothing is buffered, but a failing directory still fails here
        self.directory.check("force")
    }
}

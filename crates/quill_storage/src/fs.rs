//! File-based directory for persistent storage.
//!
//! ```text
//! <store_path>/
//! ├─ LOCK              # Advisory lock for single-writer
//! ├─ append.log        # Hash-chained record log
//! ├─ hash0             # Rotating final-hash slot
//! └─ hash1             # Rotating final-hash slot
//! ```

use crate::directory::{Directory, DirectoryLock, FileData};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the advisory lock file.
const LOCK_FILE: &str = "LOCK";

/// A directory on the local filesystem.
///
/// # Durability
///
/// Creating, deleting and renaming files fsyncs the directory so the
/// metadata change survives a crash.
///
/// # Example
///
/// ```no_run
/// use quill_storage::{Directory, FsDirectory};
/// use std::path::Path;
///
/// let dir = FsDirectory::open(Path::new("config-store"), true).unwrap();
/// let _lock = dir.lock().unwrap();
/// let mut log = dir.create_file("append.log", true).unwrap();
/// log.append(b"persistent data").unwrap();
/// log.force(false).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FsDirectory {
    path: PathBuf,
}

impl FsDirectory {
    /// Opens a directory, creating it first if `create_if_missing` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path exists but is not a directory
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::InvalidDirectory(format!(
                    "directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(StorageError::InvalidDirectory(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Returns the path to the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    fn backup_name(&self, name: &str) -> String {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let base = format!("backup-{name}-{stamp}");
        let mut candidate = base.clone();
        let mut n = 1;
        while self.file_path(&candidate).exists() {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        candidate
    }

    /// Syncs the directory so that created, renamed or deleted entries are
    /// durable.
    ///
    /// On Windows, NTFS journaling covers metadata durability and directories
    /// cannot be opened for fsync, so this is a no-op there.
    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl Directory for FsDirectory {
    fn open_file(&self, name: &str) -> StorageResult<Option<Box<dyn FileData>>> {
        let path = self.file_path(name);
        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => Ok(Some(Box::new(FsFile::from_file(path, file)?))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn create_file(&self, name: &str, append: bool) -> StorageResult<Box<dyn FileData>> {
        let path = self.file_path(name);
        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(!append)
            .open(&path)?;

        if !existed {
            self.sync_directory()?;
        }

        Ok(Box::new(FsFile::from_file(path, file)?))
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        match fs::remove_file(self.file_path(name)) {
            Ok(()) => {
                debug!(file = name, "deleted");
                self.sync_directory()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn backup(&self, name: &str) -> StorageResult<()> {
        let source = self.file_path(name);
        if !source.exists() {
            return Ok(());
        }

        let backup = self.backup_name(name);
        fs::rename(&source, self.file_path(&backup))?;
        debug!(file = name, backup = %backup, "moved aside");
        self.sync_directory()
    }

    fn lock(&self) -> StorageResult<Box<dyn DirectoryLock>> {
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.file_path(LOCK_FILE))?;

        // Non-blocking: contention is reported, never waited on
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: self.path.display().to_string(),
            });
        }

        Ok(Box::new(FsLock { file: lock_file }))
    }
}

/// Exclusive advisory lock on an [`FsDirectory`].
///
/// The lock is released when the lock file handle is closed.
#[derive(Debug)]
struct FsLock {
    file: File,
}

impl DirectoryLock for FsLock {
    fn unlock(self: Box<Self>) -> StorageResult<()> {
        FileExt::unlock(&self.file)?;
        Ok(())
    }
}

/// A file handle inside an [`FsDirectory`].
///
/// - `force(false)` calls `File::sync_data()`
/// - `force(true)` calls `File::sync_all()`
#[derive(Debug)]
pub struct FsFile {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
}

impl FsFile {
    fn from_file(path: PathBuf, file: File) -> StorageResult<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            file: RwLock::new(file),
            size: RwLock::new(size),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileData for FsFile {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if data.is_empty() {
            return Ok(*self.size.read());
        }

        let mut file = self.file.write();
        let mut size = self.size.write();

        let offset = *size;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        *size += data.len() as u64;

        Ok(offset)
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let file = self.file.write();
        let mut size = self.size.write();

        if new_size > *size {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to size {} which is greater than current size {}",
                    new_size, *size
                ),
            )));
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;

        Ok(())
    }

    fn force(&mut self, metadata: bool) -> StorageResult<()> {
        let mut file = self.file.write();
        file.flush()?;
        if metadata {
            file.sync_all()?;
        } else {
            file.sync_data()?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> StorageResult<()> {
        let FsFile { file, .. } = *self;
        file.into_inner().flush()?;
        Ok(())
    }
}

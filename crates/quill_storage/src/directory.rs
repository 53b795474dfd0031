//! Filesystem collaborator trait definitions.

use crate::error::StorageResult;

/// A handle on one named file inside a [`Directory`].
///
/// File handles are **opaque byte stores**. The log engine owns all format
/// interpretation - handles do not understand records or hashes.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `force` makes all appended data durable before returning
pub trait FileData: Send {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read would extend beyond the current size or
    /// an I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the file.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Returns the current size of the file in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Truncates the file to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Forces all written data to the storage medium.
    ///
    /// When `metadata` is true, file metadata (size, timestamps) is forced as
    /// well.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn force(&mut self, metadata: bool) -> StorageResult<()>;

    /// Closes the handle.
    ///
    /// Dropping a handle closes it too; this variant reports failures.
    ///
    /// # Errors
    ///
    /// Returns an error if pending data cannot be flushed.
    fn close(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

/// A directory of named files owned by a single writer.
///
/// Missing files are not errors: `open_file` returns `None`, and `delete` or
/// `backup` of a missing file succeed without doing anything.
pub trait Directory: Send {
    /// Opens an existing file, or returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be opened.
    fn open_file(&self, name: &str) -> StorageResult<Option<Box<dyn FileData>>>;

    /// Creates a file, or opens it if it already exists.
    ///
    /// With `append` false any existing content is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or opened.
    fn create_file(&self, name: &str, append: bool) -> StorageResult<Box<dyn FileData>>;

    /// Deletes a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    fn delete(&self, name: &str) -> StorageResult<()>;

    /// Moves a file aside under a backup name so its content is never lost.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be renamed.
    fn backup(&self, name: &str) -> StorageResult<()>;

    /// Acquires the exclusive single-writer lock for this directory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Locked`] if the lock is already held.
    fn lock(&self) -> StorageResult<Box<dyn DirectoryLock>>;
}

/// The exclusive lock on a [`Directory`].
///
/// The lock is released when the guard is dropped; [`DirectoryLock::unlock`]
/// releases it explicitly and reports failures.
pub trait DirectoryLock: Send {
    /// Releases the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying lock cannot be released.
    fn unlock(self: Box<Self>) -> StorageResult<()>;
}

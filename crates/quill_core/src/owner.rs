//! Scoped ownership of closeable resources.
//!
//! Opening a store acquires several resources in turn (the directory lock,
//! file handles) and any step may fail. Wrapping each resource in an
//! [`Owner`] as soon as it is acquired guarantees it is closed exactly once
//! on the failure path, while [`Owner::release`] hands it on unclosed once
//! every fallible step has succeeded.

use quill_storage::{DirectoryLock, FileData, StorageError};
use std::fmt;
use std::mem::ManuallyDrop;
use tracing::warn;

/// A resource with a fallible close.
pub trait Closeable {
    /// Error reported by [`Closeable::close`].
    type Error: fmt::Display;

    /// Closes the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be closed cleanly.
    fn close(self) -> Result<(), Self::Error>;
}

impl Closeable for Box<dyn FileData> {
    type Error = StorageError;

    fn close(self) -> Result<(), StorageError> {
        FileData::close(self)
    }
}

impl Closeable for Box<dyn DirectoryLock> {
    type Error = StorageError;

    fn close(self) -> Result<(), StorageError> {
        self.unlock()
    }
}

/// Closes its resource on drop unless it was released.
///
/// # Example
///
/// ```rust
/// use quill_core::Owner;
/// use quill_storage::{Directory, MemoryDirectory};
///
/// let dir = MemoryDirectory::new();
/// let lock = Owner::own(dir.lock().unwrap());
/// // A failure here would drop `lock` and release the directory.
/// let lock = lock.release();
/// assert!(dir.lock().is_err());
/// drop(lock);
/// assert!(dir.lock().is_ok());
/// ```
pub struct Owner<T: Closeable> {
    resource: ManuallyDrop<T>,
}

impl<T: Closeable> Owner<T> {
    /// Takes ownership of `resource`.
    pub fn own(resource: T) -> Self {
        Self {
            resource: ManuallyDrop::new(resource),
        }
    }

    /// Returns the resource without giving up ownership.
    pub fn borrow(&self) -> &T {
        &self.resource
    }

    /// Returns the resource mutably without giving up ownership.
    pub fn borrow_mut(&mut self) -> &mut T {
        &mut self.resource
    }

    /// Hands the resource on; it will not be closed by this owner.
    #[allow(unsafe_code)]
    pub fn release(self) -> T {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the resource is moved out
        // exactly once and never touched again.
        unsafe { ManuallyDrop::take(&mut this.resource) }
    }

    /// Closes the resource now, reporting failure.
    ///
    /// # Errors
    ///
    /// Returns the resource's close error.
    pub fn close(self) -> Result<(), T::Error> {
        self.release().close()
    }
}

impl<T: Closeable> Drop for Owner<T> {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        // SAFETY: drop runs at most once and `release` skips it, so the
        // resource is still present and is not used after this.
        let resource = unsafe { ManuallyDrop::take(&mut self.resource) };
        if let Err(e) = resource.close() {
            warn!(error = %e, "failed to close owned resource");
        }
    }
}

impl<T: Closeable> fmt::Debug for Owner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner").finish_non_exhaustive()
    }
}

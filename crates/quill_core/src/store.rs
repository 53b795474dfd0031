//! The public store facade.

use crate::change::Change;
use crate::config::Config;
use crate::document::Document;
use crate::error::CoreResult;
use crate::log::LogEngine;
use crate::mapper::{JsonMapper, Mapper};
use crate::owner::Owner;
use quill_storage::{Directory, DirectoryLock, FsDirectory};
use serde::de::DeserializeOwned;
use std::path::Path;

/// A crash-safe document store backed by a hash-chained append log.
///
/// The store holds the directory lock from open until it is closed or
/// dropped. Values handed out are copies; the stored tree is only changed
/// through [`LogStore::apply_change`] and its shorthands, each of which is
/// durable when it returns.
///
/// After any failed write or reset, every operation returns
/// [`CoreError::Poisoned`](crate::CoreError::Poisoned); drop the store and open it again.
///
/// # Example
///
/// ```rust
/// use quill_core::{ChangeBuilder, JsonMapper, LogStore};
/// use quill_storage::MemoryDirectory;
///
/// let dir = MemoryDirectory::new();
/// let mut store = LogStore::open(dir.clone(), JsonMapper::new()).unwrap();
/// store.set_string("mode", "ACCEPTING").unwrap();
/// store
///     .apply_change(&ChangeBuilder::new().set_long("version", 3).unset("mode").build())
///     .unwrap();
/// store.close().unwrap();
///
/// let store = LogStore::open(dir, JsonMapper::new()).unwrap();
/// assert_eq!(store.get_long("version").unwrap(), Some(3));
/// assert_eq!(store.get_string("mode").unwrap(), None);
/// ```
pub struct LogStore<M: Mapper = JsonMapper> {
    engine: LogEngine<M>,
    lock: Box<dyn DirectoryLock>,
}

impl<M: Mapper> LogStore<M> {
    /// Opens the store in `directory` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DirectoryLocked`](crate::CoreError::DirectoryLocked) if another store holds the
    /// directory, or any error from replaying the log.
    pub fn open<D>(directory: D, mapper: M) -> CoreResult<Self>
    where
        D: Directory + 'static,
    {
        Self::open_with_config(directory, mapper, Config::default())
    }

    /// Opens the store in `directory`.
    ///
    /// # Errors
    ///
    /// See [`LogStore::open`].
    pub fn open_with_config<D>(directory: D, mapper: M, config: Config) -> CoreResult<Self>
    where
        D: Directory + 'static,
    {
        let lock = Owner::own(directory.lock()?);
        let engine = LogEngine::open(Box::new(directory), mapper, config)?;
        Ok(Self {
            engine,
            lock: lock.release(),
        })
    }

    /// Opens the store in the directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a usable directory (or is missing
    /// and [`Config::create_if_missing`] is off), or see [`LogStore::open`].
    pub fn open_path(path: impl AsRef<Path>, mapper: M, config: Config) -> CoreResult<Self> {
        let directory = FsDirectory::open(path.as_ref(), config.create_if_missing)?;
        Self::open_with_config(directory, mapper, config)
    }

    /// Returns the mapper.
    #[must_use]
    pub fn mapper(&self) -> &M {
        self.engine.mapper()
    }

    /// Returns whether a previous failure made the store unusable.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.engine.is_poisoned()
    }

    /// Returns the number of records in the log.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Poisoned`](crate::CoreError::Poisoned) after a failure.
    pub fn record_count(&self) -> CoreResult<u64> {
        self.engine.data()?;
        Ok(self.engine.record_count())
    }

    /// Returns the string stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`](crate::CoreError::TypeMismatch) if the key holds another kind, or
    /// [`CoreError::Poisoned`](crate::CoreError::Poisoned) after a failure.
    pub fn get_string(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.data()?.get_string(key)?.map(str::to_string))
    }

    /// Returns the integer stored under `key`.
    ///
    /// # Errors
    ///
    /// See [`LogStore::get_string`].
    pub fn get_long(&self, key: &str) -> CoreResult<Option<i64>> {
        self.data()?.get_long(key)
    }

    /// Returns a copy of the document stored under `key`.
    ///
    /// # Errors
    ///
    /// See [`LogStore::get_string`].
    pub fn get_object(&self, key: &str) -> CoreResult<Option<Document>> {
        Ok(self.data()?.get_object(key)?.cloned())
    }

    /// Converts the value stored under `key` into `T` through the mapper.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapper cannot convert the value, or
    /// [`CoreError::Poisoned`](crate::CoreError::Poisoned) after a failure.
    pub fn get_external<T>(&self, key: &str, version: Option<&str>) -> CoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.data()?.get_external(key, self.engine.mapper(), version)
    }

    /// Returns a copy of the whole root document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Poisoned`](crate::CoreError::Poisoned) after a failure.
    pub fn snapshot(&self) -> CoreResult<Document> {
        self.data().cloned()
    }

    /// Durably stores a string.
    ///
    /// # Errors
    ///
    /// See [`LogStore::apply_change`].
    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> CoreResult<()> {
        self.apply_change(&Change::set_string(key, value))
    }

    /// Durably stores an integer.
    ///
    /// # Errors
    ///
    /// See [`LogStore::apply_change`].
    pub fn set_long(&mut self, key: impl Into<String>, value: i64) -> CoreResult<()> {
        self.apply_change(&Change::set_long(key, value))
    }

    /// Durably stores a copy of a document.
    ///
    /// # Errors
    ///
    /// See [`LogStore::apply_change`].
    pub fn set_object(&mut self, key: impl Into<String>, value: &Document) -> CoreResult<()> {
        self.apply_change(&Change::set_object(key, value.clone()))
    }

    /// Durably removes a key.
    ///
    /// # Errors
    ///
    /// See [`LogStore::apply_change`].
    pub fn remove_key(&mut self, key: impl Into<String>) -> CoreResult<()> {
        self.apply_change(&Change::unset(key))
    }

    /// Applies `change` and appends it to the log as one record.
    ///
    /// # Errors
    ///
    /// Returns the write error, after which the store is poisoned, or
    /// [`CoreError::Poisoned`](crate::CoreError::Poisoned) if it already was.
    pub fn apply_change(&mut self, change: &Change) -> CoreResult<()> {
        self.engine.apply_change(change)
    }

    /// Discards all stored state, keeping a backup of the log.
    ///
    /// # Errors
    ///
    /// See [`LogStore::apply_change`].
    pub fn reset(&mut self) -> CoreResult<()> {
        self.engine.reset()
    }

    /// Closes the store and releases the directory lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be released.
    pub fn close(self) -> CoreResult<()> {
        let Self { engine, lock, .. } = self;
        drop(engine);
        lock.unlock()?;
        Ok(())
    }

    fn data(&self) -> CoreResult<&Document> {
        self.engine.data()
    }
}

impl<M: Mapper> std::fmt::Debug for LogStore<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

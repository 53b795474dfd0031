//! Test fixtures and store helpers.
//!
//! Provides temporary on-disk stores, test logging, and [`LogBuilder`] for
//! writing expected log content byte for byte.

use quill_core::log::{Record, APPEND_LOG};
use quill_core::{
    Change, Config, CoreResult, Document, JsonMapper, LogStore, Mapper, CURRENT_FORMAT_VERSION,
};
use quill_storage::{Directory, MemoryDirectory};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// A slot value that matches no record.
pub const NO_MATCH_HASH: &str = "0000000000000000000000000000000000000000";

/// Installs a `tracing` subscriber for tests, once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Returns the fixed timestamp of the record at `index`.
#[must_use]
pub fn fixed_timestamp(index: usize) -> String {
    format!(
        "2018-12-05T{:02}:{:02}:{:02}.000Z",
        17 + index / 3600,
        (index / 60) % 60,
        index % 60
    )
}

/// Returns the slot file that receives the final hash of the record at
/// `index` when the log is written from empty.
#[must_use]
pub fn slot_for(index: usize) -> &'static str {
    if index % 2 == 0 {
        "hash0"
    } else {
        "hash1"
    }
}

/// Builds the exact text of an append log, with fixed timestamps.
///
/// # Example
///
/// ```rust
/// use quill_core::Change;
/// use quill_testkit::LogBuilder;
///
/// let log = LogBuilder::new().record(&Change::set_long("n", 1));
/// assert!(log.text().starts_with("format version: 2\n2018-12-05T17:00:00.000Z\n"));
/// assert_eq!(log.final_hash(0).len(), 40);
/// ```
#[derive(Debug, Clone)]
pub struct LogBuilder {
    version: String,
    mapper: JsonMapper,
    records: Vec<Record>,
    states: Vec<Document>,
}

impl Default for LogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuilder {
    /// Creates a builder writing the current format version.
    pub fn new() -> Self {
        Self::with_version(CURRENT_FORMAT_VERSION)
    }

    /// Creates a builder writing legacy records, without a version header.
    pub fn legacy() -> Self {
        Self::with_version("")
    }

    /// Creates a builder writing `version` headers.
    pub fn with_version(version: &str) -> Self {
        Self {
            version: version.to_string(),
            mapper: JsonMapper::new(),
            records: Vec::new(),
            states: Vec::new(),
        }
    }

    /// Adds a record for `change`.
    pub fn record(mut self, change: &Change) -> Self {
        let payload = self
            .mapper
            .to_payload(change)
            .expect("Failed to encode change");
        let mut state = self.states.last().cloned().unwrap_or_default();
        change.apply_to(&mut state);
        self.push(&payload);
        self.states.push(state);
        self
    }

    /// Adds a record with a raw payload, which need not be valid.
    pub fn raw_record(mut self, payload: &str) -> Self {
        let state = self.states.last().cloned().unwrap_or_default();
        self.push(payload);
        self.states.push(state);
        self
    }

    fn push(&mut self, payload: &str) {
        let previous = self.records.last().map(|r| r.hash.as_str());
        let record = Record::new(
            self.version.as_str(),
            fixed_timestamp(self.records.len()),
            payload,
            previous,
        )
        .expect("Failed to frame record");
        self.records.push(record);
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether no records were added.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the record at `index`.
    pub fn get(&self, index: usize) -> &Record {
        &self.records[index]
    }

    /// Returns the text of the whole log.
    pub fn text(&self) -> String {
        self.text_through(self.records.len())
    }

    /// Returns the text of the first `count` records.
    pub fn text_through(&self, count: usize) -> String {
        self.records[..count].iter().map(Record::to_text).collect()
    }

    /// Returns the slot value written after the record at `index`.
    pub fn final_hash(&self, index: usize) -> String {
        self.records[index].final_hash()
    }

    /// Returns the document state after the first `count` records.
    ///
    /// Records added with [`LogBuilder::raw_record`] leave the state as is.
    pub fn state_after(&self, count: usize) -> Document {
        match count {
            0 => Document::new(),
            n => self.states[n - 1].clone(),
        }
    }

    /// Writes the whole log to `dir`, with the hash slot a clean writer
    /// would leave after `verified` records.
    ///
    /// With `verified` less than the record count, the extra records look
    /// like appends whose slot write never happened.
    pub fn write_to(&self, dir: &MemoryDirectory, verified: usize) {
        dir.write(APPEND_LOG, self.text().as_bytes());
        if verified > 0 {
            dir.write(
                slot_for(verified - 1),
                self.final_hash(verified - 1).as_bytes(),
            );
        }
    }
}

/// Opens a store in `dir` with the JSON mapper.
pub fn open_memory_store(dir: &MemoryDirectory) -> CoreResult<LogStore> {
    LogStore::open(dir.clone(), JsonMapper::new())
}

/// Snapshot of every file in a directory, for "nothing changed" checks.
pub fn snapshot_files(dir: &MemoryDirectory) -> Vec<(String, Vec<u8>)> {
    dir.file_names()
        .into_iter()
        .filter_map(|name| dir.read(&name).map(|data| (name, data)))
        .collect()
}

/// Asserts that a file has exactly `expected` as content.
pub fn assert_file(dir: &MemoryDirectory, name: &str, expected: &str) {
    assert_eq!(
        dir.read_string(name).as_deref(),
        Some(expected),
        "content of {name}"
    );
}

/// Asserts that none of `names` exist.
pub fn assert_no_files(dir: &MemoryDirectory, names: &[&str]) {
    for name in names {
        assert!(
            dir.open_file(name).expect("Failed to open file").is_none(),
            "{name} should not exist"
        );
    }
}

/// A store directory on disk with automatic cleanup.
pub struct TempStore {
    temp_dir: TempDir,
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TempStore {
    /// Creates an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the store directory path.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the path of a file in the store directory.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Opens a store with the default configuration.
    pub fn open(&self) -> CoreResult<LogStore> {
        self.open_with(Config::default())
    }

    /// Opens a store with `config`.
    pub fn open_with(&self, config: Config) -> CoreResult<LogStore> {
        LogStore::open_path(self.path(), JsonMapper::new(), config)
    }

    /// Reads a file, or returns `None` if it does not exist.
    pub fn read(&self, name: &str) -> Option<Vec<u8>> {
        fs::read(self.file_path(name)).ok()
    }

    /// Reads a file as UTF-8.
    pub fn read_string(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.file_path(name)).ok()
    }

    /// Replaces a file's content.
    pub fn write(&self, name: &str, data: &[u8]) {
        fs::write(self.file_path(name), data).expect("Failed to write file");
    }

    /// Returns the names of all files in the directory, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path())
            .expect("Failed to list directory")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_distinct_and_ordered() {
        assert_eq!(fixed_timestamp(0), "2018-12-05T17:00:00.000Z");
        assert_eq!(fixed_timestamp(61), "2018-12-05T17:01:01.000Z");
        assert!(fixed_timestamp(1) < fixed_timestamp(2));
    }

    #[test]
    fn builder_tracks_state() {
        let log = LogBuilder::new()
            .record(&Change::set_string("key", "value1"))
            .record(&Change::set_long("n", 2))
            .raw_record("json");

        assert_eq!(log.len(), 3);
        assert!(log.state_after(0).is_empty());
        assert_eq!(log.state_after(1).get_string("key").unwrap(), Some("value1"));
        assert_eq!(log.state_after(3), log.state_after(2));
        assert_eq!(log.text(), log.text_through(3));
    }

    #[test]
    fn legacy_builder_omits_header() {
        let log = LogBuilder::legacy().record(&Change::set_string("k", "v"));
        assert!(log.text().starts_with("2018-12-05T17:00:00.000Z\n{\"k\":\"v\"}\n"));
    }

    #[test]
    fn write_to_places_slot() {
        let dir = MemoryDirectory::new();
        let log = LogBuilder::new()
            .record(&Change::set_long("a", 1))
            .record(&Change::set_long("a", 2));
        log.write_to(&dir, 2);
        assert_file(&dir, "hash1", &log.final_hash(1));
        assert_no_files(&dir, &["hash0"]);
    }

    #[test]
    fn temp_store_lists_files() {
        let temp = TempStore::new();
        let mut store = temp.open().unwrap();
        store.set_string("k", "v").unwrap();
        store.close().unwrap();

        let names = temp.file_names();
        assert!(names.contains(&"append.log".to_string()));
        assert!(names.contains(&"hash0".to_string()));
    }
}

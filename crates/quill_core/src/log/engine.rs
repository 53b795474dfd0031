//! The log engine: replay on open, append on change.

use super::checker::{HashChecker, HashSlot};
use super::grouper::RecordGrouper;
use super::parser::{FileReader, LineParser};
use super::record::Record;
use super::APPEND_LOG;
use crate::change::Change;
use crate::config::Config;
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::hash::{is_hash, HASH_HEX_LEN};
use crate::mapper::Mapper;
use crate::owner::Owner;
use chrono::{SecondsFormat, Utc};
use quill_storage::Directory;
use tracing::{debug, trace, warn};

/// Owns the append log and hash slots of one directory.
///
/// The engine is single-threaded and performs no locking; the caller holds
/// the directory lock for the engine's lifetime. Any error from
/// [`LogEngine::apply_change`] or [`LogEngine::reset`] may leave the
/// in-memory document and the chain head out of step with the files, so the
/// engine poisons itself: every later write, reset or read of the document
/// returns [`CoreError::Poisoned`]. Reopen the directory to recover.
pub struct LogEngine<M> {
    directory: Box<dyn Directory>,
    mapper: M,
    config: Config,
    data: Document,
    last_hash: Option<String>,
    next_slot: HashSlot,
    records: u64,
    poisoned: bool,
}

impl<M: Mapper> LogEngine<M> {
    /// Opens the log in `directory`, replaying every verified record.
    ///
    /// A torn trailing record, and at most one complete record written after
    /// the last hash slot update, are discarded and the log is truncated to
    /// the last verified record.
    ///
    /// # Errors
    ///
    /// Returns an integrity error if the log and hash slots disagree, a
    /// format error for malformed records, or a mapper or I/O error. Nothing
    /// in the directory is modified when an error is returned.
    pub fn open(directory: Box<dyn Directory>, mapper: M, config: Config) -> CoreResult<Self> {
        let mut engine = Self {
            directory,
            mapper,
            config,
            data: Document::new(),
            last_hash: None,
            next_slot: HashSlot::Hash0,
            records: 0,
            poisoned: false,
        };
        engine.replay()?;
        Ok(engine)
    }

    /// Returns the replayed document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Poisoned`] after a failed write or reset.
    pub fn data(&self) -> CoreResult<&Document> {
        self.check()?;
        Ok(&self.data)
    }

    /// Returns whether a failed write or reset made the engine unusable.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns the mapper.
    #[must_use]
    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Returns the hash of the last record, if any.
    #[must_use]
    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Returns the slot the next write goes to.
    #[must_use]
    pub fn next_slot(&self) -> HashSlot {
        self.next_slot
    }

    /// Returns the number of records in the log.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Applies `change` to the document and appends it to the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be encoded or written, after
    /// which the engine is poisoned, or [`CoreError::Poisoned`] if it
    /// already was.
    pub fn apply_change(&mut self, change: &Change) -> CoreResult<()> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.apply_change_at(change, &timestamp)
    }

    /// Like [`LogEngine::apply_change`], with an explicit record timestamp.
    ///
    /// # Errors
    ///
    /// See [`LogEngine::apply_change`].
    pub fn apply_change_at(&mut self, change: &Change, timestamp: &str) -> CoreResult<()> {
        self.check()?;
        change.apply_to(&mut self.data);
        let result = self
            .mapper
            .to_payload(change)
            .and_then(|payload| self.append_record(timestamp, &payload));
        self.poison_on_error(result, "apply_change")
    }

    /// Discards all state.
    ///
    /// Deletes both hash slots, moves the append log aside (or deletes it
    /// when [`Config::discard_log_on_reset`] is on), then replays the now
    /// empty directory.
    ///
    /// # Errors
    ///
    /// Returns an error if any file operation fails, after which the engine
    /// is poisoned, or [`CoreError::Poisoned`] if it already was.
    pub fn reset(&mut self) -> CoreResult<()> {
        self.check()?;
        let result = self.discard_and_replay();
        self.poison_on_error(result, "reset")
    }

    fn discard_and_replay(&mut self) -> CoreResult<()> {
        debug!(records = self.records, "resetting log");
        self.directory.delete(HashSlot::Hash0.file_name())?;
        self.directory.delete(HashSlot::Hash1.file_name())?;
        if self.config.discard_log_on_reset {
            warn!(records = self.records, "discarding append log without backup");
            self.directory.delete(APPEND_LOG)?;
        } else {
            self.directory.backup(APPEND_LOG)?;
        }
        self.replay()
    }

    fn check(&self) -> CoreResult<()> {
        if self.poisoned {
            Err(CoreError::Poisoned)
        } else {
            Ok(())
        }
    }

    fn poison_on_error(&mut self, result: CoreResult<()>, operation: &str) -> CoreResult<()> {
        if let Err(e) = &result {
            warn!(operation, error = %e, "log engine poisoned");
            self.poisoned = true;
        }
        result
    }

    fn append_record(&mut self, timestamp: &str, payload: &str) -> CoreResult<()> {
        let record = Record::new(
            self.mapper.current_format_version(),
            timestamp,
            payload,
            self.last_hash.as_deref(),
        )?;
        let final_hash = record.final_hash();

        let mut log = Owner::own(self.directory.create_file(APPEND_LOG, true)?);
        log.borrow_mut().append(record.to_text().as_bytes())?;
        log.borrow_mut().force(self.config.force_metadata)?;
        log.close()?;

        let slot = self.next_slot;
        let mut hash_file = Owner::own(self.directory.create_file(slot.file_name(), false)?);
        hash_file.borrow_mut().append(final_hash.as_bytes())?;
        hash_file.borrow_mut().force(self.config.force_metadata)?;
        hash_file.close()?;

        self.next_slot = slot.other();
        self.directory.delete(self.next_slot.file_name())?;

        self.records += 1;
        debug!(
            index = self.records,
            timestamp,
            hash = %record.hash,
            slot = slot.file_name(),
            "appended record"
        );
        self.last_hash = Some(record.hash);
        Ok(())
    }

    fn replay(&mut self) -> CoreResult<()> {
        let mut to_delete = Vec::new();
        let hash0 = self.read_hash_slot(HashSlot::Hash0, &mut to_delete)?;
        let hash1 = self.read_hash_slot(HashSlot::Hash1, &mut to_delete)?;
        let mut checker = HashChecker::new(hash0, hash1);

        let mut data = Document::new();
        let mut last_hash: Option<String> = None;
        let mut records = 0u64;

        let append_log = self.directory.open_file(APPEND_LOG)?.map(Owner::own);
        let mut truncate_to = None;

        if let Some(log) = &append_log {
            let size = log.borrow().size()?;
            let mut grouper = RecordGrouper::new(LineParser::new(FileReader::new(
                log.borrow().as_ref(),
            )?));

            let mut index = 0u64;
            while let Some(lines) = grouper.next() {
                index += 1;
                let record = Record::from_lines(lines?)?;

                if record.expected_hash(last_hash.as_deref()) != record.hash {
                    return Err(CoreError::HashMismatch {
                        index,
                        stored: record.hash,
                    });
                }

                let accepted = checker.check(&record.final_hash())?;
                trace!(
                    index,
                    timestamp = %record.timestamp,
                    version = %record.format_version,
                    hash = %record.hash,
                    accepted,
                    "replayed record"
                );

                if accepted {
                    grouper.lines_mut().mark();
                    self.mapper
                        .apply_payload(&record.payload, &record.format_version, &mut data)?;
                    last_hash = Some(record.hash);
                    records += 1;
                }
            }

            let mark = grouper.lines().marked();
            if mark == 0 {
                to_delete.push(APPEND_LOG);
            } else if mark < size {
                truncate_to = Some((mark, size));
            }
        }

        let stale = checker.done()?;

        if let Some(mut log) = append_log {
            if let Some((mark, size)) = truncate_to {
                debug!(mark, size, "truncating unverified tail of append log");
                log.borrow_mut().truncate(mark)?;
            }
            log.close()?;
        }

        if let Some(stale) = stale {
            to_delete.push(stale.file_name());
        }
        for name in to_delete {
            debug!(file = name, "deleting");
            self.directory.delete(name)?;
        }

        self.next_slot = checker.next_slot();
        self.data = data;
        self.last_hash = last_hash;
        self.records = records;
        debug!(
            records,
            next_slot = self.next_slot.file_name(),
            "replayed append log"
        );
        Ok(())
    }

    fn read_hash_slot(
        &self,
        slot: HashSlot,
        to_delete: &mut Vec<&'static str>,
    ) -> CoreResult<Option<String>> {
        let Some(file) = self.directory.open_file(slot.file_name())? else {
            return Ok(None);
        };
        let file = Owner::own(file);

        let size = file.borrow().size()?;
        let hash = if size == HASH_HEX_LEN as u64 {
            let bytes = file.borrow().read_at(0, HASH_HEX_LEN)?;
            String::from_utf8(bytes).ok().filter(|h| is_hash(h))
        } else {
            None
        };
        file.close()?;

        match &hash {
            Some(hash) => trace!(slot = slot.file_name(), %hash, "read hash slot"),
            None => {
                debug!(slot = slot.file_name(), size, "discarding malformed hash slot");
                to_delete.push(slot.file_name());
            }
        }
        Ok(hash)
    }
}

impl<M> std::fmt::Debug for LogEngine<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEngine")
            .field("records", &self.records)
            .field("last_hash", &self.last_hash)
            .field("next_slot", &self.next_slot)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::final_hash;
    use crate::mapper::JsonMapper;
    use quill_storage::{DirectoryLock, FileData, MemoryDirectory, StorageError, StorageResult};
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const T1: &str = "2018-12-05T17:15:28.000Z";
    const T2: &str = "2018-12-05T17:15:29.000Z";

    fn open(dir: &MemoryDirectory) -> CoreResult<LogEngine<JsonMapper>> {
        LogEngine::open(Box::new(dir.clone()), JsonMapper::new(), Config::default())
    }

    fn log_text(dir: &MemoryDirectory) -> String {
        dir.read_string(APPEND_LOG).unwrap_or_default()
    }

    #[test]
    fn empty_directory_opens_empty() {
        let dir = MemoryDirectory::new();
        let engine = open(&dir).unwrap();
        assert!(engine.data().unwrap().is_empty());
        assert_eq!(engine.record_count(), 0);
        assert_eq!(engine.next_slot(), HashSlot::Hash0);
        assert!(dir.file_names().is_empty());
    }

    #[test]
    fn append_writes_record_and_rotates_slots() {
        let dir = MemoryDirectory::new();
        let mut engine = open(&dir).unwrap();

        engine.apply_change_at(&Change::set_string("key", "value"), T1).unwrap();
        let first = Record::new("2", T1, r#"{"key":"value"}"#, None).unwrap();
        assert_eq!(log_text(&dir), first.to_text());
        assert_eq!(dir.read_string("hash0").unwrap(), first.final_hash());
        assert!(!dir.exists("hash1"));
        assert_eq!(engine.next_slot(), HashSlot::Hash1);

        engine.apply_change_at(&Change::set_long("n", 1), T2).unwrap();
        let second = Record::new("2", T2, r#"{"n":1}"#, Some(&first.hash)).unwrap();
        assert_eq!(log_text(&dir), first.to_text() + &second.to_text());
        assert_eq!(dir.read_string("hash1").unwrap(), second.final_hash());
        assert!(!dir.exists("hash0"));
        assert_eq!(engine.last_hash(), Some(second.hash.as_str()));
    }

    #[test]
    fn reopen_replays_records() {
        let dir = MemoryDirectory::new();
        {
            let mut engine = open(&dir).unwrap();
            engine.apply_change(&Change::set_string("k", "v1")).unwrap();
            engine.apply_change(&Change::set_long("n", 7)).unwrap();
            engine.apply_change(&Change::unset("k")).unwrap();
        }

        let before = dir.read(APPEND_LOG);
        let engine = open(&dir).unwrap();
        assert_eq!(engine.data().unwrap().get_string("k").unwrap(), None);
        assert_eq!(engine.data().unwrap().get_long("n").unwrap(), Some(7));
        assert_eq!(engine.record_count(), 3);
        assert_eq!(engine.next_slot(), HashSlot::Hash1);
        assert_eq!(dir.read(APPEND_LOG), before);
    }

    #[test]
    fn trailing_record_without_slot_is_discarded() {
        let dir = MemoryDirectory::new();
        let first = Record::new("2", T1, r#"{"a":"1"}"#, None).unwrap();
        let second = Record::new("2", T2, r#"{"a":"2"}"#, Some(&first.hash)).unwrap();
        dir.write(APPEND_LOG, (first.to_text() + &second.to_text()).as_bytes());
        dir.write("hash0", first.final_hash().as_bytes());

        let engine = open(&dir).unwrap();
        assert_eq!(engine.data().unwrap().get_string("a").unwrap(), Some("1"));
        assert_eq!(log_text(&dir), first.to_text());
        assert!(dir.exists("hash0"));
        assert!(!dir.exists("hash1"));
        assert_eq!(engine.next_slot(), HashSlot::Hash1);
    }

    #[test]
    fn hash_mismatch_leaves_directory_untouched() {
        let dir = MemoryDirectory::new();
        let record = Record::new("2", T1, r#"{"a":"1"}"#, None).unwrap();
        let tampered = record.to_text().replace(r#""1""#, r#""2""#);
        dir.write(APPEND_LOG, tampered.as_bytes());
        dir.write("hash0", record.final_hash().as_bytes());
        dir.write("hash1", b"short");

        let err = open(&dir).unwrap_err();
        assert!(matches!(err, CoreError::HashMismatch { index: 1, .. }));
        assert_eq!(log_text(&dir), tampered);
        assert!(dir.exists("hash1"));
    }

    #[test]
    fn unmatched_slot_leaves_log_untouched() {
        let dir = MemoryDirectory::new();
        let first = Record::new("2", T1, r#"{"a":"1"}"#, None).unwrap();
        let text = first.to_text() + "torn";
        dir.write(APPEND_LOG, text.as_bytes());
        dir.write("hash0", final_hash("unknown").as_bytes());

        assert!(matches!(
            open(&dir),
            Err(CoreError::UnmatchedFinalHash { slot: "hash0" })
        ));
        assert_eq!(log_text(&dir), text);
    }

    #[test]
    fn reset_backs_up_log() {
        let dir = MemoryDirectory::new();
        let mut engine = open(&dir).unwrap();
        engine.apply_change_at(&Change::set_string("k", "v"), T1).unwrap();
        let text = log_text(&dir);

        engine.reset().unwrap();
        assert!(engine.data().unwrap().is_empty());
        assert_eq!(engine.last_hash(), None);
        assert_eq!(dir.file_names(), ["backup-append.log-1"]);
        assert_eq!(dir.read_string("backup-append.log-1").unwrap(), text);

        engine.apply_change_at(&Change::set_string("k", "w"), T2).unwrap();
        let fresh = Record::new("2", T2, r#"{"k":"w"}"#, None).unwrap();
        assert_eq!(log_text(&dir), fresh.to_text());
    }

    #[test]
    fn reset_with_discard_deletes_log() {
        let dir = MemoryDirectory::new();
        let config = Config::new().discard_log_on_reset(true);
        let mut engine =
            LogEngine::open(Box::new(dir.clone()), JsonMapper::new(), config).unwrap();
        engine.apply_change(&Change::set_long("n", 1)).unwrap();
        engine.reset().unwrap();
        assert!(dir.file_names().is_empty());
    }

    /// Fails the next hash slot creation once armed.
    struct FailingSlotWrite {
        inner: MemoryDirectory,
        armed: Arc<AtomicBool>,
    }

    impl Directory for FailingSlotWrite {
        fn open_file(&self, name: &str) -> StorageResult<Option<Box<dyn FileData>>> {
            self.inner.open_file(name)
        }

        fn create_file(&self, name: &str, append: bool) -> StorageResult<Box<dyn FileData>> {
            if name.starts_with("hash") && self.armed.swap(false, Ordering::SeqCst) {
                return Err(StorageError::Io(io::Error::other("slot write failed")));
            }
            self.inner.create_file(name, append)
        }

        fn delete(&self, name: &str) -> StorageResult<()> {
            self.inner.delete(name)
        }

        fn backup(&self, name: &str) -> StorageResult<()> {
            self.inner.backup(name)
        }

        fn lock(&self) -> StorageResult<Box<dyn DirectoryLock>> {
            self.inner.lock()
        }
    }

    #[test]
    fn failed_append_poisons_engine() {
        let dir = MemoryDirectory::new();
        let mut engine = open(&dir).unwrap();
        dir.fail();
        assert!(engine.apply_change(&Change::set_long("n", 1)).is_err());
        dir.recover();

        assert!(engine.is_poisoned());
        assert!(matches!(engine.data(), Err(CoreError::Poisoned)));
        assert!(matches!(
            engine.apply_change(&Change::set_long("n", 2)),
            Err(CoreError::Poisoned)
        ));
        assert!(matches!(engine.reset(), Err(CoreError::Poisoned)));
    }

    #[test]
    fn failed_slot_write_blocks_further_writes() {
        let dir = MemoryDirectory::new();
        let armed = Arc::new(AtomicBool::new(false));
        let directory = FailingSlotWrite {
            inner: dir.clone(),
            armed: Arc::clone(&armed),
        };
        let mut engine =
            LogEngine::open(Box::new(directory), JsonMapper::new(), Config::default()).unwrap();
        engine.apply_change_at(&Change::set_long("n", 1), T1).unwrap();

        armed.store(true, Ordering::SeqCst);
        let err = engine
            .apply_change_at(&Change::set_long("n", 2), T2)
            .unwrap_err();
        assert!(matches!(err, CoreError::Storage(StorageError::Io(_))));
        let files = (log_text(&dir), dir.file_names());

        assert!(matches!(
            engine.apply_change_at(&Change::set_long("n", 3), T2),
            Err(CoreError::Poisoned)
        ));
        assert!(matches!(engine.reset(), Err(CoreError::Poisoned)));
        assert_eq!((log_text(&dir), dir.file_names()), files);
        drop(engine);

        let mut engine = open(&dir).unwrap();
        assert_eq!(engine.data().unwrap().get_long("n").unwrap(), Some(1));
        assert_eq!(engine.record_count(), 1);
        engine.apply_change_at(&Change::set_long("n", 3), T2).unwrap();
        drop(engine);

        let engine = open(&dir).unwrap();
        assert_eq!(engine.data().unwrap().get_long("n").unwrap(), Some(3));
        assert_eq!(engine.record_count(), 2);
    }

    #[test]
    fn unsupported_record_version_fails_open() {
        let dir = MemoryDirectory::new();
        let record = Record::new("99", T1, r#"{"a":"1"}"#, None).unwrap();
        dir.write(APPEND_LOG, record.to_text().as_bytes());
        dir.write("hash0", record.final_hash().as_bytes());
        assert!(matches!(open(&dir), Err(CoreError::InvalidPayload { .. })));
    }
}

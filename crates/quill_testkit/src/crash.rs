//! Crash and corruption simulation.
//!
//! A write goes through three durable steps: append the record, write the
//! inactive hash slot, delete the stale slot. [`simulate_crash`] lays out
//! the files a writer leaves when it dies at each point, so recovery can be
//! checked against the state the log should come back with.
//!
//! ## Usage
//!
//! ```rust
//! use quill_core::Change;
//! use quill_storage::MemoryDirectory;
//! use quill_testkit::crash::{simulate_crash, CrashPoint};
//! use quill_testkit::{open_memory_store, LogBuilder};
//!
//! let log = LogBuilder::new()
//!     .record(&Change::set_long("n", 1))
//!     .record(&Change::set_long("n", 2));
//!
//! let dir = MemoryDirectory::new();
//! let expected = simulate_crash(&dir, &log, CrashPoint::AfterRecordWrite);
//! let store = open_memory_store(&dir).unwrap();
//! assert_eq!(store.snapshot().unwrap(), expected);
//! ```

use crate::fixtures::{slot_for, LogBuilder};
use quill_core::log::APPEND_LOG;
use quill_core::Document;
use quill_storage::{Directory, MemoryDirectory};

/// Points at which the write of the last record can be interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Part of the record reached the log.
    DuringRecordWrite,
    /// The record is complete but its closing empty line is missing.
    BeforeRecordTerminator,
    /// The record is complete, no slot was written.
    AfterRecordWrite,
    /// Part of the new slot value was written.
    DuringSlotWrite,
    /// The new slot is complete, the stale slot still exists.
    AfterSlotWrite,
    /// The write finished.
    Complete,
}

impl CrashPoint {
    /// All crash points, in write order.
    pub const ALL: [CrashPoint; 6] = [
        CrashPoint::DuringRecordWrite,
        CrashPoint::BeforeRecordTerminator,
        CrashPoint::AfterRecordWrite,
        CrashPoint::DuringSlotWrite,
        CrashPoint::AfterSlotWrite,
        CrashPoint::Complete,
    ];

    /// Returns whether the interrupted record survives recovery.
    pub fn record_survives(self) -> bool {
        matches!(self, CrashPoint::AfterSlotWrite | CrashPoint::Complete)
    }
}

/// Lays out the files of a writer that wrote every record of `log` and
/// crashed at `point` while writing the last one.
///
/// Returns the document recovery must produce.
///
/// # Panics
///
/// Panics if `log` is empty.
pub fn simulate_crash(dir: &MemoryDirectory, log: &LogBuilder, point: CrashPoint) -> Document {
    assert!(!log.is_empty(), "simulate_crash needs at least one record");
    let last = log.len() - 1;
    let mut data = log.text_through(last).into_bytes();
    let record = log.get(last).to_text().into_bytes();

    let written = match point {
        CrashPoint::DuringRecordWrite => record.len() / 2,
        CrashPoint::BeforeRecordTerminator => record.len() - 1,
        _ => record.len(),
    };
    data.extend_from_slice(&record[..written]);
    dir.write(APPEND_LOG, &data);

    if last > 0 {
        dir.write(slot_for(last - 1), log.final_hash(last - 1).as_bytes());
    }

    let new_hash = log.final_hash(last);
    match point {
        CrashPoint::DuringSlotWrite => {
            dir.write(slot_for(last), &new_hash.as_bytes()[..new_hash.len() / 2]);
        }
        CrashPoint::AfterSlotWrite => {
            dir.write(slot_for(last), new_hash.as_bytes());
        }
        CrashPoint::Complete => {
            dir.write(slot_for(last), new_hash.as_bytes());
            if last > 0 {
                dir.delete(slot_for(last - 1))
                    .expect("Failed to delete stale slot");
            }
        }
        _ => {}
    }

    if point.record_survives() {
        log.state_after(log.len())
    } else {
        log.state_after(last)
    }
}

/// Replaces the byte at `offset` of file `name` with `byte`.
///
/// # Panics
///
/// Panics if the file does not exist or is too short.
pub fn overwrite_byte(dir: &MemoryDirectory, name: &str, offset: usize, byte: u8) {
    let mut data = dir.read(name).expect("file must exist");
    data[offset] = byte;
    dir.write(name, &data);
}

/// Replaces the first occurrence of `from` in file `name` with `to`.
///
/// # Panics
///
/// Panics if the file does not exist or does not contain `from`.
pub fn replace_in_file(dir: &MemoryDirectory, name: &str, from: &str, to: &str) {
    let text = dir.read_string(name).expect("file must exist");
    assert!(text.contains(from), "{name} does not contain {from:?}");
    dir.write(name, text.replacen(from, to, 1).as_bytes());
}

/// Cuts file `name` down to `len` bytes.
///
/// # Panics
///
/// Panics if the file does not exist.
pub fn truncate_file(dir: &MemoryDirectory, name: &str, len: usize) {
    let mut data = dir.read(name).expect("file must exist");
    data.truncate(len);
    dir.write(name, &data);
}

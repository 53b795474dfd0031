//! Recovery scenarios: the store opened over hand-built directory states.

use quill_core::log::{chain_hash, final_hash, APPEND_LOG};
use quill_core::{generate_hash, Change, CoreError, Document};
use quill_storage::MemoryDirectory;
use quill_testkit::prelude::*;

fn set(key: &str, value: &str) -> Change {
    Change::set_string(key, value)
}

fn two_values() -> LogBuilder {
    LogBuilder::new()
        .record(&set("key", "value1"))
        .record(&set("key", "value2"))
}

/// Opens the store, expecting failure, and checks no file was touched.
fn open_and_fail(dir: &MemoryDirectory) -> CoreError {
    init_test_logging();
    let before = snapshot_files(dir);
    let err = open_memory_store(dir).unwrap_err();
    assert_eq!(snapshot_files(dir), before, "failed open modified files");
    err
}

fn open_and_read(dir: &MemoryDirectory) -> Document {
    init_test_logging();
    let store = open_memory_store(dir).unwrap();
    let state = store.snapshot().unwrap();
    store.close().unwrap();
    state
}

#[test]
fn empty_directory() {
    let dir = MemoryDirectory::new();
    assert!(open_and_read(&dir).is_empty());
    assert_no_files(&dir, &[APPEND_LOG, "hash0", "hash1"]);
}

#[test]
fn hash_without_append_log() {
    let dir = MemoryDirectory::new();
    dir.write("hash0", NO_MATCH_HASH.as_bytes());
    assert!(matches!(
        open_and_fail(&dir),
        CoreError::UnmatchedFinalHash { slot: "hash0" }
    ));
}

#[test]
fn single_record() {
    let dir = MemoryDirectory::new();
    let log = LogBuilder::new().record(&set("key", "value"));
    log.write_to(&dir, 1);

    let state = open_and_read(&dir);
    assert_eq!(state.get_string("key").unwrap(), Some("value"));
    assert_file(&dir, APPEND_LOG, &log.text());
    assert_file(&dir, "hash0", &log.final_hash(0));
    assert_no_files(&dir, &["hash1"]);
}

#[test]
fn overwrite_with_hash_in_second_slot() {
    let dir = MemoryDirectory::new();
    let log = two_values();
    log.write_to(&dir, 2);

    let state = open_and_read(&dir);
    assert_eq!(state.get_string("key").unwrap(), Some("value2"));
    assert_file(&dir, APPEND_LOG, &log.text());
    assert_file(&dir, "hash1", &log.final_hash(1));
    assert_no_files(&dir, &["hash0"]);
}

#[test]
fn edited_record_is_detected() {
    let dir = MemoryDirectory::new();
    LogBuilder::new().record(&set("key", "value1")).write_to(&dir, 1);
    replace_in_file(&dir, APPEND_LOG, "value1", "value2");

    assert!(matches!(
        open_and_fail(&dir),
        CoreError::HashMismatch { index: 1, .. }
    ));
}

#[test]
fn zeroed_record_hash_is_detected() {
    let dir = MemoryDirectory::new();
    let log = LogBuilder::new().record(&set("k", "v1"));
    log.write_to(&dir, 1);
    replace_in_file(&dir, APPEND_LOG, &log.get(0).hash, NO_MATCH_HASH);

    assert!(open_and_fail(&dir).is_integrity());
}

#[test]
fn single_record_without_hash_is_discarded() {
    let dir = MemoryDirectory::new();
    LogBuilder::new().record(&set("key", "value1")).write_to(&dir, 0);

    assert!(open_and_read(&dir).is_empty());
    assert_no_files(&dir, &[APPEND_LOG, "hash0", "hash1"]);
}

#[test]
fn record_after_last_hash_is_discarded() {
    let dir = MemoryDirectory::new();
    let log = two_values();
    log.write_to(&dir, 1);

    let state = open_and_read(&dir);
    assert_eq!(state.get_string("key").unwrap(), Some("value1"));
    assert_file(&dir, APPEND_LOG, &log.text_through(1));
    assert_file(&dir, "hash0", &log.final_hash(0));
    assert_no_files(&dir, &["hash1"]);
}

#[test]
fn two_records_without_hash_fail() {
    let dir = MemoryDirectory::new();
    two_values().write_to(&dir, 0);
    assert!(matches!(
        open_and_fail(&dir),
        CoreError::HashAfterLastRecorded
    ));
}

#[test]
fn hash_matching_no_record_fails() {
    for records in 1..=2 {
        let dir = MemoryDirectory::new();
        let mut log = LogBuilder::new();
        for i in 0..records {
            log = log.record(&set("key", &format!("value{i}")));
        }
        dir.write(APPEND_LOG, log.text().as_bytes());
        dir.write("hash0", NO_MATCH_HASH.as_bytes());

        assert!(open_and_fail(&dir).is_integrity(), "{records} records");
    }
}

#[test]
fn partial_trailing_record_is_truncated() {
    let dir = MemoryDirectory::new();
    let log = two_values();
    log.write_to(&dir, 2);
    dir.write(APPEND_LOG, (log.text() + "2018-").as_bytes());

    let state = open_and_read(&dir);
    assert_eq!(state.get_string("key").unwrap(), Some("value2"));
    assert_file(&dir, APPEND_LOG, &log.text());
    assert_file(&dir, "hash1", &log.final_hash(1));
    assert_no_files(&dir, &["hash0"]);
}

#[test]
fn invalid_payload_fails() {
    let dir = MemoryDirectory::new();
    let timestamp = "2018-12-05T17:15:28";
    let hash = chain_hash(None, timestamp, "json");
    assert_eq!(hash, generate_hash(format!("{timestamp}\njson").as_bytes()));
    dir.write(APPEND_LOG, format!("{timestamp}\njson\n{hash}\n\n").as_bytes());
    dir.write("hash0", final_hash(&hash).as_bytes());

    assert!(matches!(open_and_fail(&dir), CoreError::Json(_)));
}

#[test]
fn missing_final_newline_drops_last_record() {
    let dir = MemoryDirectory::new();
    let log = two_values();
    log.write_to(&dir, 1);
    let text = log.text();
    truncate_file(&dir, APPEND_LOG, text.len() - 1);

    let state = open_and_read(&dir);
    assert_eq!(state.get_string("key").unwrap(), Some("value1"));
    assert_file(&dir, APPEND_LOG, &log.text_through(1));
    assert_file(&dir, "hash0", &log.final_hash(0));
    assert_no_files(&dir, &["hash1"]);
}

#[test]
fn partial_final_hash_is_ignored() {
    let dir = MemoryDirectory::new();
    let log = two_values();
    log.write_to(&dir, 1);
    dir.write("hash1", &log.final_hash(1).as_bytes()[..39]);

    let state = open_and_read(&dir);
    assert_eq!(state.get_string("key").unwrap(), Some("value1"));
    assert_file(&dir, APPEND_LOG, &log.text_through(1));
    assert_file(&dir, "hash0", &log.final_hash(0));
    assert_no_files(&dir, &["hash1"]);
}

#[test]
fn overlong_or_malformed_hash_is_ignored() {
    for bad in [
        format!("{}\n", "a".repeat(40)),
        "A".repeat(40),
        "not a hash at all, but forty bytes long!".to_string(),
    ] {
        let dir = MemoryDirectory::new();
        let log = LogBuilder::new().record(&set("key", "value1"));
        log.write_to(&dir, 1);
        dir.write("hash1", bad.as_bytes());

        let state = open_and_read(&dir);
        assert_eq!(state.get_string("key").unwrap(), Some("value1"));
        assert_no_files(&dir, &["hash1"]);
    }
}

#[test]
fn two_full_hashes_keep_later_one() {
    let dir = MemoryDirectory::new();
    let log = two_values();
    log.write_to(&dir, 1);
    dir.write("hash1", log.final_hash(1).as_bytes());

    let state = open_and_read(&dir);
    assert_eq!(state.get_string("key").unwrap(), Some("value2"));
    assert_file(&dir, APPEND_LOG, &log.text());
    assert_file(&dir, "hash1", &log.final_hash(1));
    assert_no_files(&dir, &["hash0"]);
}

#[test]
fn unmatched_hash_in_other_slot_fails() {
    let dir = MemoryDirectory::new();
    let log = two_values();
    dir.write(APPEND_LOG, log.text().as_bytes());
    dir.write("hash0", log.final_hash(1).as_bytes());
    dir.write("hash1", NO_MATCH_HASH.as_bytes());

    assert!(matches!(
        open_and_fail(&dir),
        CoreError::UnmatchedFinalHash { slot: "hash1" }
    ));
}

#[test]
fn record_between_slot_values_fails() {
    let dir = MemoryDirectory::new();
    let log = two_values().record(&set("key", "value3"));
    dir.write(APPEND_LOG, log.text().as_bytes());
    dir.write("hash0", log.final_hash(0).as_bytes());
    dir.write("hash1", log.final_hash(2).as_bytes());

    assert!(matches!(open_and_fail(&dir), CoreError::ExtraHash));
}

#[test]
fn legacy_records_replay() {
    let dir = MemoryDirectory::new();
    let log = LogBuilder::legacy()
        .record(&set("key", "old"))
        .record(&Change::set_long("n", 5));
    log.write_to(&dir, 2);

    let mut store = open_memory_store(&dir).unwrap();
    assert_eq!(store.get_string("key").unwrap().as_deref(), Some("old"));
    store.set_string("key", "new").unwrap();
    store.close().unwrap();

    let text = dir.read_string(APPEND_LOG).unwrap();
    assert!(text.starts_with(&log.text()));
    assert!(text[log.text().len()..].starts_with("format version: 2\n"));

    let state = open_and_read(&dir);
    assert_eq!(state.get_string("key").unwrap(), Some("new"));
    assert_eq!(state.get_long("n").unwrap(), Some(5));
}

#[test]
fn version_one_records_replay() {
    let dir = MemoryDirectory::new();
    LogBuilder::with_version("1")
        .record(&set("key", "v"))
        .write_to(&dir, 1);
    assert_eq!(open_and_read(&dir).get_string("key").unwrap(), Some("v"));
}

#[test]
fn crash_at_every_point_recovers() {
    for records in 1..=3 {
        for point in CrashPoint::ALL {
            let mut log = LogBuilder::new();
            for i in 0..records {
                log = log.record(&Change::set_long("n", i as i64));
            }
            let dir = MemoryDirectory::new();
            let expected = simulate_crash(&dir, &log, point);

            let state = open_and_read(&dir);
            assert_eq!(state, expected, "{records} records, crash {point:?}");

            let surviving = if point.record_survives() {
                records
            } else {
                records - 1
            };
            if surviving == 0 {
                assert_no_files(&dir, &[APPEND_LOG, "hash0", "hash1"]);
            } else {
                assert_file(&dir, APPEND_LOG, &log.text_through(surviving));
                assert_file(&dir, slot_for(surviving - 1), &log.final_hash(surviving - 1));
                assert_no_files(&dir, &[slot_for(surviving)]);
            }
        }
    }
}

#[test]
fn reopen_after_crash_keeps_writing() {
    let dir = MemoryDirectory::new();
    let log = two_values();
    simulate_crash(&dir, &log, CrashPoint::AfterSlotWrite);

    let mut store = open_memory_store(&dir).unwrap();
    store.set_string("key", "value3").unwrap();
    store.close().unwrap();

    let state = open_and_read(&dir);
    assert_eq!(state.get_string("key").unwrap(), Some("value3"));
    assert_no_files(&dir, &["hash1"]);
    assert!(dir.exists("hash0"));
}

#[test]
fn flipped_payload_character_is_detected() {
    let log = LogBuilder::new()
        .record(&set("alpha", "one"))
        .record(&set("beta", "two"))
        .record(&set("gamma", "three"));
    let text = log.text();

    for record in 0..log.len() {
        let payload = &log.get(record).payload;
        let start = text.find(payload.as_str()).unwrap();

        for offset in start..start + payload.len() {
            let dir = MemoryDirectory::new();
            log.write_to(&dir, log.len());
            let original = text.as_bytes()[offset];
            let replacement = if original == b'x' { b'y' } else { b'x' };
            overwrite_byte(&dir, APPEND_LOG, offset, replacement);

            let err = open_and_fail(&dir);
            let index = record as u64 + 1;
            assert!(
                matches!(&err, CoreError::HashMismatch { index: i, .. } if *i == index),
                "record {record}, offset {offset}: {err}"
            );
        }
    }
}

//! Property-based test generators using proptest.
//!
//! Keys come from a small alphabet so that generated change sequences
//! overwrite and remove each other's keys often.

use proptest::prelude::*;
use quill_core::{Change, Document};

/// Strategy for generating document keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e]{1,2}").expect("Invalid regex")
}

/// Strategy for generating string values, including line breaks and
/// non-ASCII text.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[a-zA-Z0-9 ]{0,16}").expect("Invalid regex"),
        any::<String>(),
        Just("line one\n\nline three\r\n".to_string()),
    ]
}

/// Strategy for generating documents nested up to two levels.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    let leaf = prop::collection::vec((key_strategy(), text_strategy()), 0..4).prop_map(|pairs| {
        let mut doc = Document::new();
        for (key, value) in pairs {
            doc.set_string(key, value);
        }
        doc
    });

    leaf.prop_recursive(2, 16, 4, |inner| {
        prop::collection::vec(
            (
                key_strategy(),
                prop_oneof![
                    text_strategy().prop_map(Entry::Text),
                    any::<i64>().prop_map(Entry::Long),
                    inner.prop_map(Entry::Object),
                ],
            ),
            0..4,
        )
        .prop_map(|pairs| {
            let mut doc = Document::new();
            for (key, entry) in pairs {
                match entry {
                    Entry::Text(s) => doc.set_string(key, s),
                    Entry::Long(n) => doc.set_long(key, n),
                    Entry::Object(o) => doc.set_object(key, o),
                }
            }
            doc
        })
    })
}

#[derive(Debug, Clone)]
enum Entry {
    Text(String),
    Long(i64),
    Object(Document),
}

/// Strategy for generating a single non-composite change.
pub fn simple_change_strategy() -> impl Strategy<Value = Change> {
    prop_oneof![
        (key_strategy(), text_strategy()).prop_map(|(k, v)| Change::set_string(k, v)),
        (key_strategy(), any::<i64>()).prop_map(|(k, v)| Change::set_long(k, v)),
        (key_strategy(), document_strategy()).prop_map(|(k, v)| Change::set_object(k, v)),
        key_strategy().prop_map(Change::unset),
    ]
}

/// Strategy for generating a change, composite ones included.
pub fn change_strategy() -> impl Strategy<Value = Change> {
    prop_oneof![
        3 => simple_change_strategy(),
        1 => prop::collection::vec(simple_change_strategy(), 0..4).prop_map(Change::Composite),
    ]
}

/// Strategy for generating a sequence of changes.
pub fn change_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Change>> {
    prop::collection::vec(change_strategy(), 1..=max_len.max(1))
}

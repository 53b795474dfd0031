//! Matching replayed records against the hash slots.

use crate::error::{CoreError, CoreResult};

/// One of the two hash slot files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashSlot {
    /// The `hash0` file.
    Hash0,
    /// The `hash1` file.
    Hash1,
}

impl HashSlot {
    /// Returns the slot's file name.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Hash0 => "hash0",
            Self::Hash1 => "hash1",
        }
    }

    /// Returns the other slot.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Hash0 => Self::Hash1,
            Self::Hash1 => Self::Hash0,
        }
    }
}

/// Validates the final hash of each replayed record against the slot values.
///
/// Records before the first slot match are accepted. Each slot value must
/// match exactly one record, and when both slots are present no record may
/// fall between the two matches. One record after the last match is
/// tolerated but not accepted: it was appended before a crash prevented its
/// slot write.
#[derive(Debug)]
pub struct HashChecker {
    supplied: Vec<HashSlot>,
    pending: Vec<(HashSlot, String)>,
    first_matched: Option<HashSlot>,
    passed_last: bool,
}

impl HashChecker {
    /// Creates a checker from the values read from `hash0` and `hash1`.
    #[must_use]
    pub fn new(hash0: Option<String>, hash1: Option<String>) -> Self {
        let pending: Vec<_> = [(HashSlot::Hash0, hash0), (HashSlot::Hash1, hash1)]
            .into_iter()
            .filter_map(|(slot, hash)| hash.map(|h| (slot, h)))
            .collect();

        Self {
            supplied: pending.iter().map(|(slot, _)| *slot).collect(),
            pending,
            first_matched: None,
            passed_last: false,
        }
    }

    /// Checks the final hash of the next record.
    ///
    /// Returns whether the record is accepted into the replayed state.
    ///
    /// # Errors
    ///
    /// - [`CoreError::HashAfterLastRecorded`] on the second record after
    ///   every slot value matched
    /// - [`CoreError::ExtraHash`] if a record between two slot matches
    ///   matches neither
    pub fn check(&mut self, hash: &str) -> CoreResult<bool> {
        if self.pending.is_empty() {
            if self.passed_last {
                return Err(CoreError::HashAfterLastRecorded);
            }
            self.passed_last = true;
            return Ok(false);
        }

        if let Some(i) = self.pending.iter().position(|(_, h)| h == hash) {
            let (slot, _) = self.pending.remove(i);
            self.first_matched.get_or_insert(slot);
            return Ok(true);
        }

        if self.first_matched.is_some() {
            return Err(CoreError::ExtraHash);
        }
        Ok(true)
    }

    /// Finishes validation.
    ///
    /// Returns the stale slot to delete: the first matched one when both
    /// slots were present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnmatchedFinalHash`] if a slot value matched no
    /// record.
    pub fn done(&self) -> CoreResult<Option<HashSlot>> {
        if let Some((slot, _)) = self.pending.first() {
            return Err(CoreError::UnmatchedFinalHash {
                slot: slot.file_name(),
            });
        }

        if self.supplied.len() == 2 {
            Ok(self.first_matched)
        } else {
            Ok(None)
        }
    }

    /// Returns the slot the next write goes to.
    #[must_use]
    pub fn next_slot(&self) -> HashSlot {
        match self.supplied.as_slice() {
            [] => HashSlot::Hash0,
            [only] => only.other(),
            _ => self.first_matched.unwrap_or(HashSlot::Hash0),
        }
    }
}

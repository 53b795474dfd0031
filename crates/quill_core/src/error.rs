//! Error types for quill core.

use crate::document::ValueKind;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in quill core operations.
///
/// Every public operation of the store surfaces this one type. Integrity and
/// I/O errors are fatal to the store instance that produced them.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage collaborator error.
    #[error("storage error: {0}")]
    Storage(quill_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error from the mapper.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record or payload is malformed.
    #[error("invalid log format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A stored record hash does not match the hash computed from its content.
    ///
    /// Only the stored hash is reported, never the expected one.
    #[error("hash mismatch in record {index}: {stored}")]
    HashMismatch {
        /// One-based index of the record in the log.
        index: u64,
        /// Hash stored in the record.
        stored: String,
    },

    /// A hash slot holds a value that no record in the log produced.
    #[error("hash existed but no matching record: {slot}")]
    UnmatchedFinalHash {
        /// File name of the slot.
        slot: &'static str,
    },

    /// A record between the two recorded final hashes matched neither.
    #[error("extra hash between final hashes")]
    ExtraHash,

    /// More than one record follows the last recorded final hash.
    #[error("found hashes after the last recorded hash")]
    HashAfterLastRecorded,

    /// A value was read as the wrong kind.
    #[error("type mismatch for key {key}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The key that was read.
        key: String,
        /// The requested kind.
        expected: ValueKind,
        /// The stored kind.
        found: ValueKind,
    },

    /// The payload could not be mapped to or from a change.
    #[error("invalid payload: {message}")]
    InvalidPayload {
        /// Description of the mapping issue.
        message: String,
    },

    /// The store is held by another owner.
    #[error("store locked: another owner has exclusive access")]
    DirectoryLocked,

    /// A previous failure left the store unusable.
    #[error("store unusable after a previous failure")]
    Poisoned,
}

impl From<quill_storage::StorageError> for CoreError {
    fn from(e: quill_storage::StorageError) -> Self {
        match e {
            quill_storage::StorageError::Locked { .. } => Self::DirectoryLocked,
            other => Self::Storage(other),
        }
    }
}

impl CoreError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(key: &str, expected: ValueKind, found: ValueKind) -> Self {
        Self::TypeMismatch {
            key: key.to_string(),
            expected,
            found,
        }
    }

    /// Returns whether this error reports damaged or inconsistent log content.
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::HashMismatch { .. }
                | Self::UnmatchedFinalHash { .. }
                | Self::ExtraHash
                | Self::HashAfterLastRecorded
        )
    }
}

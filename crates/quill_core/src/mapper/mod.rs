//! Payload mapping between changes and record text.
//!
//! The log engine owns record framing (version header, timestamp, hash and
//! blank-line delimiters) but never encodes keys and values itself. Every
//! payload goes through a [`Mapper`].

mod json;

pub use json::{document_to_json, JsonMapper, CURRENT_FORMAT_VERSION};

use crate::change::Change;
use crate::document::{Document, Value};
use crate::error::CoreResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts changes to record payloads and back.
///
/// # Invariants
///
/// - `to_payload` never produces an empty line, since a blank line ends a
///   record
/// - applying the payload of a change to a document has the same effect on
///   key values as [`Change::apply_to`]
pub trait Mapper {
    /// Returns the format version written into new record headers.
    fn current_format_version(&self) -> &str;

    /// Encodes a change as payload text.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be encoded.
    fn to_payload(&self, change: &Change) -> CoreResult<String>;

    /// Decodes payload text written with format `version` and applies it to
    /// `target`.
    ///
    /// An empty `version` denotes the legacy unversioned record format.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is unknown or the text is malformed.
    fn apply_payload(&self, text: &str, version: &str, target: &mut Document) -> CoreResult<()>;

    /// Converts an arbitrary value into the neutral form stored in
    /// [`Value::External`].
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented.
    fn to_external<T>(&self, value: &T, version: Option<&str>) -> CoreResult<serde_json::Value>
    where
        T: Serialize + ?Sized;

    /// Converts a stored value into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value does not describe a `T`.
    fn map<T>(&self, value: &Value, version: Option<&str>) -> CoreResult<T>
    where
        T: DeserializeOwned;
}

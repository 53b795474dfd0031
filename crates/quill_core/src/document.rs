//! The in-memory document tree.
//!
//! A [`Document`] is an insertion-ordered mapping from string keys to
//! [`Value`]s. Documents are plain owned values: handing one to the store or
//! receiving one from it always moves or clones the whole subtree, so no
//! caller can reach into the stored state.

use crate::error::{CoreError, CoreResult};
use crate::mapper::Mapper;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// A value stored under a document key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Text value.
    String(String),
    /// Signed 64-bit integer.
    Long(i64),
    /// Nested document.
    Object(Document),
    /// A value opaque to the tree, in the mapper's neutral form.
    External(serde_json::Value),
}

impl Value {
    /// Returns the kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::Long(_) => ValueKind::Long,
            Self::Object(_) => ValueKind::Object,
            Self::External(_) => ValueKind::External,
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Self::Object(value)
    }
}

/// The kind of a [`Value`], used in type mismatch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// [`Value::String`]
    String,
    /// [`Value::Long`]
    Long,
    /// [`Value::Object`]
    Object,
    /// [`Value::External`]
    External,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Long => "long",
            Self::Object => "object",
            Self::External => "external",
        };
        f.write_str(name)
    }
}

/// Receives the entries of a document, see [`Document::accept`].
pub trait Visitor {
    /// Called once per entry, in insertion order.
    fn visit(&mut self, key: &str, value: &Value);
}

impl<F> Visitor for F
where
    F: FnMut(&str, &Value),
{
    fn visit(&mut self, key: &str, value: &Value) {
        self(key, value);
    }
}

/// An ordered mapping of unique string keys to values.
///
/// Setting an existing key replaces its value in place; new keys are
/// appended, so iteration follows first-insertion order.
///
/// # Example
///
/// ```rust
/// use quill_core::Document;
///
/// let mut node = Document::new();
/// node.set_string("hostname", "node-1");
/// node.set_long("port", 9410);
///
/// assert_eq!(node.get_string("hostname").unwrap(), Some("node-1"));
/// assert_eq!(node.get_long("port").unwrap(), Some(9410));
/// assert!(node.get_long("hostname").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the document has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Returns the raw value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Emits every entry to `visitor`, in insertion order.
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        for (key, value) in &self.entries {
            visitor.visit(key, value);
        }
    }

    /// Returns the string stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] if the key holds another kind.
    pub fn get_string(&self, key: &str) -> CoreResult<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(CoreError::type_mismatch(key, ValueKind::String, other.kind())),
        }
    }

    /// Returns the integer stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] if the key holds another kind.
    pub fn get_long(&self, key: &str) -> CoreResult<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Long(n)) => Ok(Some(*n)),
            Some(other) => Err(CoreError::type_mismatch(key, ValueKind::Long, other.kind())),
        }
    }

    /// Returns the nested document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] if the key holds another kind.
    pub fn get_object(&self, key: &str) -> CoreResult<Option<&Document>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(doc)) => Ok(Some(doc)),
            Some(other) => Err(CoreError::type_mismatch(key, ValueKind::Object, other.kind())),
        }
    }

    /// Converts the value stored under `key` into `T` through `mapper`.
    ///
    /// Works both for values stored with [`Document::set_external`] and for
    /// values that came back from the log as plain strings, integers or
    /// nested documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapper cannot convert the stored value.
    pub fn get_external<T, M>(
        &self,
        key: &str,
        mapper: &M,
        version: Option<&str>,
    ) -> CoreResult<Option<T>>
    where
        T: DeserializeOwned,
        M: Mapper,
    {
        self.get(key)
            .map(|value| mapper.map(value, version))
            .transpose()
    }

    /// Stores a string.
    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, Value::String(value.into()));
    }

    /// Stores an integer.
    pub fn set_long(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, Value::Long(value));
    }

    /// Stores a nested document.
    pub fn set_object(&mut self, key: impl Into<String>, value: Document) {
        self.set(key, Value::Object(value));
    }

    /// Stores an arbitrary value in the mapper's neutral form.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapper cannot represent `value`.
    pub fn set_external<T, M>(
        &mut self,
        key: impl Into<String>,
        value: &T,
        mapper: &M,
        version: Option<&str>,
    ) -> CoreResult<()>
    where
        T: Serialize + ?Sized,
        M: Mapper,
    {
        let external = mapper.to_external(value, version)?;
        self.set(key, Value::External(external));
        Ok(())
    }

    /// Stores a raw value, replacing any previous value in place.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove_key(&mut self, key: &str) -> Option<Value> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

//! Changes applied to the document tree.
//!
//! A [`Change`] is an instruction, not a value: the same representation is
//! applied to the in-memory tree and handed to the mapper to become a record
//! payload.

use crate::document::Document;

/// One mutation of the root document.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Store a string under `key`.
    SetString {
        /// Target key.
        key: String,
        /// New value.
        value: String,
    },
    /// Store an integer under `key`.
    SetLong {
        /// Target key.
        key: String,
        /// New value.
        value: i64,
    },
    /// Store a nested document under `key`.
    SetObject {
        /// Target key.
        key: String,
        /// New value.
        value: Document,
    },
    /// Remove `key`.
    Unset {
        /// Target key.
        key: String,
    },
    /// Apply every change in order as one record.
    Composite(Vec<Change>),
}

impl Change {
    /// Creates a [`Change::SetString`].
    pub fn set_string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::SetString {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a [`Change::SetLong`].
    pub fn set_long(key: impl Into<String>, value: i64) -> Self {
        Self::SetLong {
            key: key.into(),
            value,
        }
    }

    /// Creates a [`Change::SetObject`].
    pub fn set_object(key: impl Into<String>, value: Document) -> Self {
        Self::SetObject {
            key: key.into(),
            value,
        }
    }

    /// Creates a [`Change::Unset`].
    pub fn unset(key: impl Into<String>) -> Self {
        Self::Unset { key: key.into() }
    }

    /// Emits this change to `visitor`, flattening composites in order.
    pub fn accept<V: ChangeVisitor + ?Sized>(&self, visitor: &mut V) {
        match self {
            Self::SetString { key, value } => visitor.visit_string(key, value),
            Self::SetLong { key, value } => visitor.visit_long(key, *value),
            Self::SetObject { key, value } => visitor.visit_object(key, value),
            Self::Unset { key } => visitor.visit_unset(key),
            Self::Composite(changes) => {
                for change in changes {
                    change.accept(visitor);
                }
            }
        }
    }

    /// Applies this change to `target`.
    ///
    /// Stored documents are cloned, so `self` stays reusable and shares
    /// nothing with the target.
    pub fn apply_to(&self, target: &mut Document) {
        self.accept(target);
    }
}

/// Receives the primitive mutations of a [`Change`].
pub trait ChangeVisitor {
    /// A string is stored under `key`.
    fn visit_string(&mut self, key: &str, value: &str);
    /// An integer is stored under `key`.
    fn visit_long(&mut self, key: &str, value: i64);
    /// A document is stored under `key`.
    fn visit_object(&mut self, key: &str, value: &Document);
    /// `key` is removed.
    fn visit_unset(&mut self, key: &str);
}

impl ChangeVisitor for Document {
    fn visit_string(&mut self, key: &str, value: &str) {
        self.set_string(key, value);
    }

    fn visit_long(&mut self, key: &str, value: i64) {
        self.set_long(key, value);
    }

    fn visit_object(&mut self, key: &str, value: &Document) {
        self.set_object(key, value.clone());
    }

    fn visit_unset(&mut self, key: &str) {
        self.remove_key(key);
    }
}

/// Builds a [`Change::Composite`].
///
/// # Example
///
/// ```rust
/// use quill_core::{ChangeBuilder, Document};
///
/// let change = ChangeBuilder::new()
///     .set_string("mode", "ACCEPTING")
///     .set_long("version", 3)
///     .unset("pending")
///     .build();
///
/// let mut root = Document::new();
/// change.apply_to(&mut root);
/// assert_eq!(root.get_long("version").unwrap(), Some(3));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChangeBuilder {
    changes: Vec<Change>,
}

impl ChangeBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a string assignment.
    #[must_use]
    pub fn set_string(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(Change::set_string(key, value))
    }

    /// Adds an integer assignment.
    #[must_use]
    pub fn set_long(self, key: impl Into<String>, value: i64) -> Self {
        self.add(Change::set_long(key, value))
    }

    /// Adds a nested document assignment.
    #[must_use]
    pub fn set_object(self, key: impl Into<String>, value: Document) -> Self {
        self.add(Change::set_object(key, value))
    }

    /// Adds a key removal.
    #[must_use]
    pub fn unset(self, key: impl Into<String>) -> Self {
        self.add(Change::unset(key))
    }

    /// Adds an arbitrary change. A composite is spliced in, one level deep.
    #[must_use]
    pub fn add(mut self, change: Change) -> Self {
        match change {
            Change::Composite(changes) => self.changes.extend(changes),
            other => self.changes.push(other),
        }
        self
    }

    /// Returns whether no changes were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Finishes the composite change.
    #[must_use]
    pub fn build(self) -> Change {
        Change::Composite(self.changes)
    }
}

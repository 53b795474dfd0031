//! # Quill Testkit
//!
//! Test utilities for quill.
//!
//! This crate provides:
//! - Test fixtures: temporary on-disk stores and test logging
//! - A [`LogBuilder`] producing byte-exact log text and hash slot values
//! - Crash and corruption helpers for recovery tests
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use quill_core::{Change, LogStore, JsonMapper};
//! use quill_storage::MemoryDirectory;
//! use quill_testkit::prelude::*;
//!
//! let dir = MemoryDirectory::new();
//! let log = LogBuilder::new()
//!     .record(&Change::set_string("key", "value1"))
//!     .record(&Change::set_string("key", "value2"));
//! log.write_to(&dir, 1);
//!
//! let store = LogStore::open(dir, JsonMapper::new()).unwrap();
//! assert_eq!(store.get_string("key").unwrap().as_deref(), Some("value1"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;

//! # Quill Core
//!
//! Embedded, single-writer, crash-safe document store.
//!
//! This crate provides:
//! - A hash-chained append log with two rotating hash slots
//! - Replay that recovers the last verified state after any crash
//! - An ordered document tree and the changes applied to it
//! - A [`Mapper`] contract for payload encoding, with a JSON implementation
//! - The [`LogStore`] facade holding the directory lock
//!
//! ## Example
//!
//! ```rust
//! use quill_core::{Document, JsonMapper, LogStore};
//! use quill_storage::MemoryDirectory;
//!
//! let dir = MemoryDirectory::new();
//! let mut store = LogStore::open(dir, JsonMapper::new()).unwrap();
//!
//! let mut node = Document::new();
//! node.set_string("hostname", "node-1");
//! node.set_long("port", 9410);
//! store.set_object("node", &node).unwrap();
//!
//! let read = store.get_object("node").unwrap().unwrap();
//! assert_eq!(read.get_long("port").unwrap(), Some(9410));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod config;
mod document;
mod error;
mod hash;
pub mod log;
mod mapper;
mod owner;
mod store;

pub use change::{Change, ChangeBuilder, ChangeVisitor};
pub use config::Config;
pub use document::{Document, Value, ValueKind, Visitor};
pub use error::{CoreError, CoreResult};
pub use hash::{generate_hash, generate_hash_parts, is_hash, HASH_HEX_LEN};
pub use mapper::{document_to_json, JsonMapper, Mapper, CURRENT_FORMAT_VERSION};
pub use owner::{Closeable, Owner};
pub use store::LogStore;

//! # Quill Storage
//!
//! Filesystem collaborator for the quill append log.
//!
//! This crate provides the lowest-level storage abstraction the log engine
//! talks to. Files are **opaque byte stores** - nothing here knows about
//! records, hashes or documents.
//!
//! ## Design Principles
//!
//! - A [`Directory`] hands out named [`FileData`] handles, deletes and backs
//!   up files, and grants the single-writer [`DirectoryLock`]
//! - File handles are simple byte stores (read, append, truncate, force)
//! - The engine owns all file format interpretation
//!
//! ## Available Directories
//!
//! - [`FsDirectory`] - Persistent storage using OS file APIs
//! - [`MemoryDirectory`] - For testing, with I/O failure injection
//!
//! ## Example
//!
//! ```rust
//! use quill_storage::{Directory, MemoryDirectory};
//!
//! let dir = MemoryDirectory::new();
//! let mut file = dir.create_file("hash0", false).unwrap();
//! file.append(b"hello world").unwrap();
//! let data = file.read_at(0, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod directory;
mod error;
mod fs;
mod memory;

pub use directory::{Directory, DirectoryLock, FileData};
pub use error::{StorageError, StorageResult};
pub use fs::{FsDirectory, FsFile};
pub use memory::{MemoryDirectory, MemoryFile};

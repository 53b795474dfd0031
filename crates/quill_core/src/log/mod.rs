//! The hash-chained append log.
//!
//! A store directory holds three files:
//!
//! ```text
//! <store>/
//! ├─ append.log   # records, oldest first
//! ├─ hash0        # final hash of the last record (one of the two slots)
//! └─ hash1        # the other slot
//! ```
//!
//! ## Record Format
//!
//! ```text
//! format version: <v>
//! <timestamp>
//! <payload line 1>
//! ...
//! <payload line n>
//! <hash>
//! <empty line>
//! ```
//!
//! The version header is absent in legacy records. The hash of the first
//! record covers `timestamp LS payload`; every later hash covers
//! `previous LS LS timestamp LS payload`. A slot file holds the hash of the
//! last record's hash, as exactly 40 hex characters.
//!
//! ## Write Order
//!
//! 1. Append the record to `append.log` and force it
//! 2. Write the final hash to the inactive slot and force it
//! 3. Delete the other slot
//!
//! A crash between any two steps leaves a file set from which [`LogEngine`]
//! recovers the last record that reached step 2.
//!
//! ## Recovery Policy
//!
//! ### Tolerated (discarded on open)
//!
//! - A torn trailing record with no terminating empty line
//! - One complete record written after the last recorded final hash
//! - A slot file of the wrong length or shape
//!
//! ### Fatal (open fails, nothing is modified)
//!
//! - A stored record hash that does not match the chain
//! - A slot value that no record produced
//! - A record between the two slot values that matches neither
//! - More than one record after the last recorded final hash

mod checker;
mod engine;
mod grouper;
mod parser;
mod record;

pub use checker::{HashChecker, HashSlot};
pub use engine::LogEngine;
pub use grouper::RecordGrouper;
pub use parser::{FileReader, LineParser};
pub use record::{chain_hash, final_hash, Record};

/// Name of the append log file.
pub const APPEND_LOG: &str = "append.log";

/// Line separator used for writing and hashing.
pub const LS: &str = "\n";

/// Prefix of the version header line.
pub const FORMAT_VERSION_PREFIX: &str = "format version: ";

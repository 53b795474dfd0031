//! Record framing and the hash chain.

use super::{FORMAT_VERSION_PREFIX, LS};
use crate::error::{CoreError, CoreResult};
use crate::hash::{generate_hash, generate_hash_parts};

/// One entry of the append log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Payload format version. Empty for legacy records.
    pub format_version: String,
    /// Time the record was written, ISO-8601.
    pub timestamp: String,
    /// Mapper output, possibly spanning several lines.
    pub payload: String,
    /// Chained hash of this record.
    pub hash: String,
}

/// Computes the chained hash of a record.
///
/// `previous` is the hash of the preceding record, or `None` for the first.
#[must_use]
pub fn chain_hash(previous: Option<&str>, timestamp: &str, payload: &str) -> String {
    match previous {
        None => generate_hash_parts(&[timestamp, LS, payload]),
        Some(previous) => generate_hash_parts(&[previous, LS, LS, timestamp, LS, payload]),
    }
}

/// Computes the value stored in a hash slot for a record hash.
#[must_use]
pub fn final_hash(record_hash: &str) -> String {
    generate_hash(record_hash.as_bytes())
}

impl Record {
    /// Creates a record chained to `previous`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPayload`] if the payload contains an
    /// empty line or a carriage return, since either would break framing.
    pub fn new(
        format_version: impl Into<String>,
        timestamp: impl Into<String>,
        payload: impl Into<String>,
        previous: Option<&str>,
    ) -> CoreResult<Self> {
        let format_version = format_version.into();
        let timestamp = timestamp.into();
        let payload = payload.into();

        if payload.split(LS).any(str::is_empty) || payload.contains('\r') {
            return Err(CoreError::invalid_payload(
                "payload must not contain empty lines or carriage returns",
            ));
        }
        if timestamp.is_empty() || timestamp.contains(['\r', '\n']) {
            return Err(CoreError::invalid_format("timestamp must be a single line"));
        }
        if format_version.contains(['\r', '\n']) {
            return Err(CoreError::invalid_format("format version must be a single line"));
        }

        let hash = chain_hash(previous, &timestamp, &payload);
        Ok(Self {
            format_version,
            timestamp,
            payload,
            hash,
        })
    }

    /// Parses a record from its lines, without verifying the hash.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if there are fewer than three
    /// lines.
    pub fn from_lines(mut lines: Vec<String>) -> CoreResult<Self> {
        if lines.len() < 3 {
            return Err(CoreError::invalid_format(format!(
                "invalid record: {} lines",
                lines.len()
            )));
        }

        let hash = lines.pop().unwrap_or_default();
        let mut rest = lines.into_iter();
        let first = rest.next().unwrap_or_default();

        let (format_version, timestamp) = match first.strip_prefix(FORMAT_VERSION_PREFIX) {
            Some(version) => {
                let timestamp = rest
                    .next()
                    .ok_or_else(|| CoreError::invalid_format("invalid record: no timestamp"))?;
                (version.to_string(), timestamp)
            }
            None => (String::new(), first),
        };

        let payload = rest.collect::<Vec<_>>().join(LS);
        Ok(Self {
            format_version,
            timestamp,
            payload,
            hash,
        })
    }

    /// Returns the hash this record should carry after `previous`.
    #[must_use]
    pub fn expected_hash(&self, previous: Option<&str>) -> String {
        chain_hash(previous, &self.timestamp, &self.payload)
    }

    /// Returns the value a hash slot holds when this is the last record.
    #[must_use]
    pub fn final_hash(&self) -> String {
        final_hash(&self.hash)
    }

    /// Renders the record as it is appended, including the closing empty line.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        if !self.format_version.is_empty() {
            text.push_str(FORMAT_VERSION_PREFIX);
            text.push_str(&self.format_version);
            text.push_str(LS);
        }
        for part in [&self.timestamp, &self.payload, &self.hash] {
            text.push_str(part);
            text.push_str(LS);
        }
        text.push_str(LS);
        text
    }
}

//! Store configuration.

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether forcing a write also forces file metadata.
    pub force_metadata: bool,

    /// Whether `reset` deletes the append log instead of moving it aside.
    ///
    /// Off by default. Turning it on makes `reset` destroy every stored
    /// record with no backup.
    pub discard_log_on_reset: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            force_metadata: false,
            discard_log_on_reset: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether forced writes include file metadata.
    #[must_use]
    pub const fn force_metadata(mut self, value: bool) -> Self {
        self.force_metadata = value;
        self
    }

    /// Sets whether `reset` deletes the append log without a backup.
    #[must_use]
    pub const fn discard_log_on_reset(mut self, value: bool) -> Self {
        self.discard_log_on_reset = value;
        self
    }
}

//! Engine configuration.

use serde::{Deserialize, Serialize};

/// What a committed write survives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// No log. Commits are atomic while the process lives and lost on exit.
    Volatile,
    /// Write-ahead log flushed to the OS on commit. Survives a process
    /// crash, not a power loss.
    Buffered,
    /// Write-ahead log synced to the medium on every commit.
    #[default]
    Synced,
}

impl Durability {
    /// Returns true if commits go through the write-ahead log.
    #[must_use]
    pub const fn is_logged(self) -> bool {
        !matches!(self, Self::Volatile)
    }

    /// Returns true if commits fsync the log.
    #[must_use]
    pub const fn syncs_on_commit(self) -> bool {
        matches!(self, Self::Synced)
    }
}

/// Configuration for opening an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Whether to create the data directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Commit durability.
    pub durability: Durability,

    /// Entries fetched per read-lock acquisition during scans.
    pub scan_chunk: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            durability: Durability::Synced,
            scan_chunk: 256,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the data directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets commit durability.
    #[must_use]
    pub const fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Sets the scan chunk size. Zero is treated as one.
    #[must_use]
    pub const fn scan_chunk(mut self, entries: usize) -> Self {
        self.scan_chunk = entries;
        self
    }
}

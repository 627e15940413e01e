//! Error types for the folio store engine.

use std::{io, path::PathBuf};

use snafu::Snafu;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Write transaction already in progress.
    #[snafu(display("Write transaction already in progress"))]
    WriteTransactionInProgress,

    /// A compare-and-swap write found a different slot version.
    #[snafu(display(
        "Slot version mismatch in table {table}: expected {expected}, found {actual}"
    ))]
    SlotVersionMismatch {
        /// Name of the table holding the slot.
        table: &'static str,
        /// Version the caller expected (0 = absent).
        expected: u16,
        /// Version actually stored (0 = absent).
        actual: u16,
    },

    /// Key exceeds the configured size limit.
    #[snafu(display("Key too large: {size} bytes (max {max})"))]
    KeyTooLarge {
        /// Actual size of the key in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// Internal lock was poisoned (another thread panicked while holding it).
    #[snafu(display("Internal lock poisoned"))]
    Poisoned,

    /// I/O error on the commit log.
    #[snafu(display("I/O error on {}: {source}", path.display()))]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Commit log is damaged or not a commit log at all.
    #[snafu(display("Corrupted commit log {}: {reason}", path.display()))]
    Corrupted {
        /// File being replayed.
        path: PathBuf,
        /// Description of what was corrupted.
        reason: String,
    },

    /// A commit record could not be serialized.
    #[snafu(display("Failed to encode commit record: {source}"))]
    Encoding {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// A single commit exceeds the largest frame the commit log can hold.
    #[snafu(display("Commit of {size} bytes exceeds the commit log frame limit"))]
    CommitTooLarge {
        /// Encoded size of the commit record.
        size: usize,
    },
}

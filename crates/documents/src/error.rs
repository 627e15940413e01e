//! Error types for document storage.
//!
//! Not-found is never an error: reads return `Ok(None)`. The remaining
//! outcomes split into caller mistakes ([`DocumentError::Validation`]), lost
//! races ([`DocumentError::Concurrency`]) and storage inconsistencies
//! ([`DocumentError::Corruption`], [`DocumentError::CompressedWithoutCodec`]).

use std::fmt;

use folio_types::{CodecError, ErrorCode, Etag, ValidationError, config::ConfigError};
use snafu::{Location, Snafu};

use crate::codec::TransformError;

/// Result type for document storage operations.
pub type Result<T, E = DocumentError> = std::result::Result<T, E>;

/// Write operation named in concurrency conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOperation {
    /// Add, insert or overwrite.
    Put,
    /// Delete.
    Delete,
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put => f.write_str("PUT"),
            Self::Delete => f.write_str("DELETE"),
        }
    }
}

/// Document storage error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DocumentError {
    /// Malformed input (empty or oversized key, empty prefix).
    #[snafu(display("Invalid argument: {source}"))]
    Validation {
        /// The violated constraint.
        source: ValidationError,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// The expected etag does not match the document's current etag.
    #[snafu(display(
        "{operation} attempted on document '{key}' using a non current etag (current: {actual}, expected: {expected})"
    ))]
    Concurrency {
        /// Operation that lost the race.
        operation: WriteOperation,
        /// Key the operation targeted.
        key: String,
        /// Current etag ([`Etag::INVALID`] when the document does not exist).
        actual: Etag,
        /// Etag the caller expected ([`Etag::EMPTY`] for "must not exist").
        expected: Etag,
    },

    /// A cross-table invariant is violated for `key`.
    #[snafu(display("Document '{key}' is corrupted: {reason}"))]
    Corruption {
        /// Offending document key.
        key: String,
        /// What was found inconsistent.
        reason: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// The payload carries the compression header but no codec can decode it.
    #[snafu(display(
        "Document '{key}' is compressed, but the compression codec is not installed"
    ))]
    CompressedWithoutCodec {
        /// Offending document key.
        key: String,
    },

    /// A codec failed to encode a payload.
    #[snafu(display("Failed to encode document '{key}': {source}"))]
    Codec {
        /// Document being written.
        key: String,
        /// The underlying codec error.
        source: TransformError,
    },

    /// Payload or metadata could not be serialized.
    #[snafu(display("Failed to serialize document '{key}': {source}"))]
    Serialization {
        /// Document being written.
        key: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// A bookkeeping record could not be encoded or decoded.
    #[snafu(display("Bookkeeping record error at {location}: {source}"))]
    Record {
        /// The underlying postcard error.
        source: CodecError,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Storage configuration is invalid.
    #[snafu(display("Configuration error: {source}"))]
    Config {
        /// The underlying validation error.
        source: ConfigError,
    },

    /// Storage engine error from folio-store.
    #[snafu(display("Storage error at {location}: {source}"))]
    Storage {
        /// The underlying storage error.
        source: folio_store::Error,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },
}

impl DocumentError {
    /// Returns the machine-readable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::DocumentInvalidArgument,
            Self::Concurrency { .. } => ErrorCode::DocumentConcurrency,
            Self::Corruption { .. } => ErrorCode::DocumentCorruption,
            Self::CompressedWithoutCodec { .. } => ErrorCode::DocumentCodecMissing,
            Self::Codec { .. } | Self::Serialization { .. } | Self::Record { .. } => {
                ErrorCode::DocumentSerialization
            },
            Self::Config { .. } => ErrorCode::DocumentConfig,
            Self::Storage { source, .. } => match source {
                folio_store::Error::WriteTransactionInProgress => ErrorCode::StoreTransaction,
                folio_store::Error::SlotVersionMismatch { .. } => ErrorCode::StoreSlotVersion,
                folio_store::Error::KeyTooLarge { .. } => ErrorCode::StoreKeyTooLarge,
                folio_store::Error::Io { .. } => ErrorCode::StoreIo,
                folio_store::Error::Encoding { .. } | folio_store::Error::CommitTooLarge { .. } => {
                    ErrorCode::StoreCommitRejected
                },
                folio_store::Error::Poisoned | folio_store::Error::Corrupted { .. } => {
                    ErrorCode::StoreCorruption
                },
            },
        }
    }

    /// Whether retrying (after re-reading current state) may succeed.
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Suggested recovery action for operators and callers.
    pub fn suggested_action(&self) -> &'static str {
        self.code().suggested_action()
    }

    /// Whether this error reports inconsistent storage rather than a caller problem.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. } | Self::CompressedWithoutCodec { .. })
    }
}

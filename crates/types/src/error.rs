//! Machine-readable error codes shared by every folio crate.
//!
//! Each error variant across the store and document layers maps to an
//! [`ErrorCode`] with a unique numeric identifier, retryability classification,
//! and suggested recovery action.

use core::fmt;

/// Machine-readable error codes for programmatic error handling.
///
/// Codes are organized into ranges:
///
/// | Range       | Domain    | Examples                                      |
/// |-------------|-----------|-----------------------------------------------|
/// | 1000–1099   | Store     | Transactions, slot versions, key limits, I/O  |
/// | 1100–1199   | Store     | Corruption                                    |
/// | 3000–3099   | Documents | Validation, concurrency                       |
/// | 3100–3199   | Documents | Corruption, missing codec                     |
/// | 3200–3299   | Documents | Serialization, config, internal               |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // --- Store errors (1000–1199) ---
    /// Another write transaction holds the writer lock.
    StoreTransaction = 1000,
    /// A slot's version did not match the expected compare-and-swap version.
    StoreSlotVersion = 1001,
    /// Key exceeds the store's size limit.
    StoreKeyTooLarge = 1002,
    /// Reading or appending the commit log failed.
    StoreIo = 1003,
    /// A commit could not be framed for the commit log.
    StoreCommitRejected = 1004,
    /// Store state is unusable (poisoned lock, damaged commit log).
    StoreCorruption = 1100,

    // --- Document errors (3000–3299) ---
    /// Invalid request argument (empty key, oversized key, empty prefix).
    DocumentInvalidArgument = 3000,
    /// Expected etag did not match the document's current etag.
    DocumentConcurrency = 3001,
    /// Cross-table invariant violated (metadata without data, etag mismatch).
    DocumentCorruption = 3100,
    /// Payload is compressed but no compression codec is installed.
    DocumentCodecMissing = 3101,
    /// Payload or record (de)serialization failed.
    DocumentSerialization = 3200,
    /// Configuration error.
    DocumentConfig = 3201,
    /// Wrapper for a store-layer error at the document level.
    DocumentStorage = 3202,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::StoreTransaction),
            1001 => Some(Self::StoreSlotVersion),
            1002 => Some(Self::StoreKeyTooLarge),
            1003 => Some(Self::StoreIo),
            1004 => Some(Self::StoreCommitRejected),
            1100 => Some(Self::StoreCorruption),
            3000 => Some(Self::DocumentInvalidArgument),
            3001 => Some(Self::DocumentConcurrency),
            3100 => Some(Self::DocumentCorruption),
            3101 => Some(Self::DocumentCodecMissing),
            3200 => Some(Self::DocumentSerialization),
            3201 => Some(Self::DocumentConfig),
            3202 => Some(Self::DocumentStorage),
            _ => None,
        }
    }

    /// Whether this error is retryable.
    ///
    /// Retryable errors may succeed on a subsequent attempt, typically after
    /// re-reading current state. Non-retryable errors require corrective action.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::StoreTransaction | Self::StoreSlotVersion | Self::DocumentConcurrency)
    }

    /// Suggested recovery action for this error code.
    #[must_use]
    pub const fn suggested_action(self) -> &'static str {
        match self {
            Self::StoreTransaction => {
                "Retry the transaction with backoff. Only one write transaction can be active at a time."
            },
            Self::StoreSlotVersion => "Re-read the record and retry the write.",
            Self::StoreKeyTooLarge => "Shorten the key.",
            Self::StoreIo => "Check the disk holding the commit log, then reopen the database.",
            Self::StoreCommitRejected => "Split the write into smaller transactions.",
            Self::StoreCorruption => {
                "Restart the process. If reopening fails, restore the commit log from backup."
            },
            Self::DocumentInvalidArgument => "Fix the request argument and resubmit.",
            Self::DocumentConcurrency => {
                "Re-read the document to obtain its current etag, then retry the write."
            },
            Self::DocumentCorruption => {
                "Storage is inconsistent. Do not retry; restore the affected document from backup."
            },
            Self::DocumentCodecMissing => {
                "Install the compression codec the document was written with, then retry the read."
            },
            Self::DocumentSerialization => "Check the document payload and metadata are valid JSON.",
            Self::DocumentConfig => "Correct the configuration value and restart.",
            Self::DocumentStorage => "Inspect the wrapped store error for details.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    const ALL: [ErrorCode; 13] = [
        ErrorCode::StoreTransaction,
        ErrorCode::StoreSlotVersion,
        ErrorCode::StoreKeyTooLarge,
        ErrorCode::StoreIo,
        ErrorCode::StoreCommitRejected,
        ErrorCode::StoreCorruption,
        ErrorCode::DocumentInvalidArgument,
        ErrorCode::DocumentConcurrency,
        ErrorCode::DocumentCorruption,
        ErrorCode::DocumentCodecMissing,
        ErrorCode::DocumentSerialization,
        ErrorCode::DocumentConfig,
        ErrorCode::DocumentStorage,
    ];

    #[test]
    fn test_error_code_numeric_roundtrip() {
        for code in ALL {
            assert_eq!(ErrorCode::from_u16(code.as_u16()), Some(code));
        }
        assert_eq!(ErrorCode::from_u16(9999), None);
    }

    #[test]
    fn test_error_codes_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.as_u16()), "duplicate code {code}");
        }
    }

    #[test]
    fn test_retryability() {
        assert!(ErrorCode::DocumentConcurrency.is_retryable());
        assert!(ErrorCode::StoreTransaction.is_retryable());
        assert!(!ErrorCode::DocumentCorruption.is_retryable());
        assert!(!ErrorCode::DocumentCodecMissing.is_retryable());
        assert!(!ErrorCode::DocumentInvalidArgument.is_retryable());
        assert!(!ErrorCode::StoreIo.is_retryable());
    }

    #[test]
    fn test_suggested_action_non_empty() {
        for code in ALL {
            assert!(!code.suggested_action().is_empty());
        }
    }

    #[test]
    fn test_display_is_numeric() {
        assert_eq!(ErrorCode::DocumentConcurrency.to_string(), "3001");
    }
}

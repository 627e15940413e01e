//! Input validation for document keys and enumeration arguments.
//!
//! Keys are free-form UTF-8; the only structural limits are that they are
//! non-empty and that their encoded form fits the metadata record's
//! 16-bit length budget.

use std::fmt;

/// Document keys must be strictly shorter than this many UTF-8 bytes.
pub const MAX_DOCUMENT_KEY_BYTES: usize = u16::MAX as usize;

/// Validation error with structured context.
///
/// Contains the specific constraint that was violated and the field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the violated constraint.
    pub constraint: String,
}

impl ValidationError {
    /// Creates a validation error for `field`.
    pub fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self { field: field.into(), constraint: constraint.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

impl std::error::Error for ValidationError {}

/// Validates a document key for writing.
///
/// Keys must:
/// - Be non-empty
/// - Be shorter than [`MAX_DOCUMENT_KEY_BYTES`] in UTF-8 byte length
///
/// # Errors
///
/// Returns [`ValidationError`] if the key is empty or too long.
pub fn validate_document_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::new("key", "must not be empty"));
    }
    if key.len() >= MAX_DOCUMENT_KEY_BYTES {
        return Err(ValidationError::new(
            "key",
            format!(
                "length {} bytes exceeds maximum {} bytes",
                key.len(),
                MAX_DOCUMENT_KEY_BYTES - 1
            ),
        ));
    }
    Ok(())
}

/// Validates the prefix argument of a prefix scan.
///
/// # Errors
///
/// Returns [`ValidationError`] if the prefix is empty.
pub fn validate_prefix(prefix: &str) -> Result<(), ValidationError> {
    if prefix.is_empty() {
        return Err(ValidationError::new("prefix", "must not be empty"));
    }
    Ok(())
}

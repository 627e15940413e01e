//! Core types, configuration and errors for the folio document store.
//!
//! This crate provides the foundational types shared by every folio crate:
//! - [`Etag`] version tokens and the [`EtagGenerator`] that issues them
//! - [`config::DocumentStorageConfig`] and its validation
//! - Machine-readable [`ErrorCode`]s
//! - Postcard helpers for small persisted records
//! - Key and argument validation

pub mod codec;
pub mod config;
pub mod error;
pub mod etag;
pub mod validation;

// Re-export commonly used types at crate root
pub use codec::{CodecError, decode, encode};
pub use error::ErrorCode;
pub use etag::{ETAG_SIZE, Etag, EtagCategory, EtagGenerator, EtagParseError, SequentialEtagGenerator};
pub use validation::{MAX_DOCUMENT_KEY_BYTES, ValidationError, validate_document_key, validate_prefix};

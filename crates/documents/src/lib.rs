//! folio-documents: keyed JSON document storage over folio-store.
//!
//! Documents are addressed by case-insensitive string keys and versioned by
//! [`Etag`]s. Each document lives in three tables that always change
//! together:
//!
//! - **documents**: normalized key to the codec-encoded JSON payload
//! - **document_metadata**: normalized key to etag, original key, last-modified
//!   time and the metadata object
//! - **documents_by_etag**: etag to normalized key, for change-ordered walks
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 DocumentStorage                  │
//! │  (config, codec chain, cache, etag generator)    │
//! └───────────┬─────────────────────────┬────────────┘
//!             │                         │
//! ┌───────────▼───────────┐ ┌───────────▼────────────┐
//! │  DocumentTransaction  │ │     DocumentReader     │
//! │ add, insert, delete,  │ │ by key, metadata, raw, │
//! │ touch, etag checks    │ │ enumeration, stats     │
//! └───────────┬───────────┘ └───────────┬────────────┘
//!             │                         │
//! ┌───────────▼─────────────────────────▼────────────┐
//! │           folio-store transactions               │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use folio_documents::{DocumentStorage, JsonObject};
//! use folio_store::Database;
//! use serde_json::json;
//!
//! let storage = DocumentStorage::builder().db(Arc::new(Database::open_in_memory())).build()?;
//! let data: JsonObject = json!({"name": "Oren"}).as_object().cloned().unwrap_or_default();
//!
//! let written = storage.with_write(|txn| {
//!     txn.add_document("Users/1", None, &data, &JsonObject::new())
//! })?;
//!
//! let doc = storage.with_read(|reader| reader.document_by_key("users/1"))?;
//! assert_eq!(doc.map(|doc| doc.etag), Some(written.etag));
//! # Ok::<(), folio_documents::DocumentError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod codec;
pub mod concurrency;
pub mod document;
pub mod enumerate;
pub mod error;
pub mod keys;
mod metadata;
pub mod reader;
pub mod stats;
pub mod storage;
pub mod transaction;

pub use cache::{CacheStats, CachedDocument, DocumentCache, InMemoryDocumentCache};
pub use codec::{COMPRESSION_MAGIC, CodecChain, CompressionCodec, DocumentCodec, TransformError};
pub use concurrency::{EtagRedirects, ensure_etag_match};
pub use document::{
    AddDocumentResult, DeletedDocument, Document, DocumentMetadata, JsonObject, TouchResult,
};
pub use enumerate::{
    CancellationFlag, EtagScanIter, EtagScanOptions, PrefixIter, ReverseEtagIter, StopReason,
};
pub use error::{DocumentError, Result, WriteOperation};
pub use folio_types::{Etag, EtagCategory, EtagGenerator};
pub use keys::normalize_key;
pub use reader::DocumentReader;
pub use stats::{CollectionStats, DocumentSize, DocumentStats};
pub use storage::DocumentStorage;
pub use transaction::DocumentTransaction;

//! Document value types returned by reads and writes.

use chrono::{DateTime, Utc};
use folio_types::Etag;

/// A JSON object: document payloads and metadata are both objects.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// A fully decoded document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Key in the case of the document's first write.
    pub key: String,
    /// Lowercase storage key.
    pub normalized_key: String,
    /// Current etag.
    pub etag: Etag,
    /// Decoded payload.
    pub data: JsonObject,
    /// Document metadata.
    pub metadata: JsonObject,
    /// Time of the last write, if recorded.
    pub last_modified: Option<DateTime<Utc>>,
    /// Payload bytes plus metadata record bytes.
    pub size_on_disk: u64,
}

/// Metadata of a document, read without touching its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMetadata {
    /// Key in the case of the document's first write.
    pub key: String,
    /// Lowercase storage key.
    pub normalized_key: String,
    /// Current etag.
    pub etag: Etag,
    /// Time of the last write, if recorded.
    pub last_modified: Option<DateTime<Utc>>,
    /// Document metadata.
    pub metadata: JsonObject,
}

/// Outcome of a successful add or insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddDocumentResult {
    /// Etag assigned by this write.
    pub etag: Etag,
    /// Etag the document had before this write, if it existed.
    pub prev_etag: Option<Etag>,
    /// Timestamp stored as the document's last-modified time.
    pub saved_at: DateTime<Utc>,
    /// Whether an existing document was overwritten.
    pub updated: bool,
}

/// A document removed by a delete.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedDocument {
    /// Key in the case of the document's first write.
    pub key: String,
    /// Metadata the document had when deleted.
    pub metadata: JsonObject,
    /// The caller's expected etag if one was given, otherwise the stored etag.
    pub etag: Etag,
}

/// Etags before and after a touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchResult {
    /// Etag the document had before the touch.
    pub previous: Etag,
    /// Etag issued by the touch.
    pub current: Etag,
}

/// Whether `metadata` flags the document as a delete marker.
pub(crate) fn is_delete_marker(metadata: &JsonObject, field: &str) -> bool {
    metadata.get(field).and_then(serde_json::Value::as_bool).unwrap_or(false)
}

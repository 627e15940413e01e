//! Read path: point lookups against one transaction's view.
//!
//! A [`DocumentReader`] pairs a transaction (read or write) with the storage
//! it belongs to. Lookups go metadata first, then data, then the cache, and
//! only decode the payload on a cache miss:
//!
//! ```text
//!   key ──▶ normalize ──▶ metadata table ──▶ documents table
//!                                │                  │
//!                                ▼                  ▼
//!                        cache (key, etag) ──miss──▶ codec chain ──▶ JSON
//! ```

use std::sync::Arc;

use folio_store::{
    ReadableTables, SeekTarget,
    tables::{DocumentMetadata as MetadataTable, Documents, DocumentsByEtag},
};
use folio_types::{Etag, validate_document_key};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::{
    cache::CachedDocument,
    codec::COMPRESSION_MAGIC,
    document::{Document, DocumentMetadata, JsonObject},
    error::{CorruptionSnafu, DocumentError, Result, ValidationSnafu},
    keys::normalize_key,
    metadata::{self, MetadataHeader},
    storage::DocumentStorage,
};

/// Document lookups over one transaction.
pub struct DocumentReader<'a, R> {
    tables: &'a R,
    storage: &'a DocumentStorage,
}

impl<R> Clone for DocumentReader<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for DocumentReader<'_, R> {}

impl<'a, R: ReadableTables> DocumentReader<'a, R> {
    /// Creates a reader over `tables`.
    pub fn new(tables: &'a R, storage: &'a DocumentStorage) -> Self {
        Self { tables, storage }
    }

    /// The transaction this reader reads from.
    pub fn tables(&self) -> &'a R {
        self.tables
    }

    /// The storage this reader belongs to.
    pub fn storage(&self) -> &'a DocumentStorage {
        self.storage
    }

    /// Loads a document by key.
    ///
    /// An empty key is treated as not found. The returned key keeps the case
    /// of the document's first write, whatever the case of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Corruption`] if metadata exists without data or
    /// the payload cannot be decoded, and [`DocumentError::CompressedWithoutCodec`]
    /// if the payload is compressed but no installed codec handles it.
    pub fn document_by_key(&self, key: &str) -> Result<Option<Document>> {
        if key.is_empty() {
            return Ok(None);
        }
        self.document_by_normalized_key(&normalize_key(key))
    }

    /// Loads document metadata without touching the payload.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Validation`] for an empty or oversized key and
    /// [`DocumentError::Corruption`] for an unreadable metadata record.
    pub fn document_metadata_by_key(&self, key: &str) -> Result<Option<DocumentMetadata>> {
        validate_document_key(key).context(ValidationSnafu)?;
        self.read_metadata(&normalize_key(key))
    }

    /// Returns the stored payload bytes, before any codec runs.
    pub fn raw_document_by_key(&self, key: &str) -> Option<&'a [u8]> {
        if key.is_empty() {
            return None;
        }
        self.tables.get::<Documents>(normalize_key(key).as_bytes())
    }

    /// Number of stored documents.
    pub fn documents_count(&self) -> u64 {
        self.tables.len::<Documents>()
    }

    /// Returns the first indexed etag greater than `etag`, or `etag` if none is.
    pub fn best_next_etag(&self, etag: Etag) -> Etag {
        let mut cursor = self.tables.cursor::<DocumentsByEtag>();
        let from = etag.to_bytes();
        if !cursor.seek(SeekTarget::Key(&from)) && !cursor.seek(SeekTarget::BeforeAll) {
            return etag;
        }
        loop {
            if let Some(indexed) = cursor.key().and_then(Etag::from_bytes) {
                if indexed > etag {
                    return indexed;
                }
            }
            if !cursor.move_next() {
                return etag;
            }
        }
    }

    // ========================================================================
    // Internals shared with the write path and enumeration
    // ========================================================================

    pub(crate) fn document_by_normalized_key(&self, normalized: &str) -> Result<Option<Document>> {
        let Some((header, record)) = self.read_header(normalized)? else {
            debug!(key = normalized, "Document not found");
            return Ok(None);
        };

        let Some(raw) = self.tables.get::<Documents>(normalized.as_bytes()) else {
            warn!(
                key = %header.key,
                etag = %header.etag,
                "Metadata record exists without document data"
            );
            return CorruptionSnafu {
                key: header.key,
                reason: "metadata record exists but document data is missing",
            }
            .fail();
        };

        let cache = self.storage.cache();
        let cached = cache.and_then(|cache| cache.get(normalized, header.etag));
        let (data, metadata, size) = match cached {
            Some(cached) => (
                Arc::unwrap_or_clone(cached.data),
                Arc::unwrap_or_clone(cached.metadata),
                cached.size,
            ),
            None => {
                let metadata = self.decode_metadata(&header, record)?;
                let (data, size) = self.decode_payload(&header.key, normalized, raw, &metadata)?;
                if let Some(cache) = cache {
                    cache.set(
                        normalized,
                        header.etag,
                        CachedDocument {
                            data: Arc::new(data.clone()),
                            metadata: Arc::new(metadata.clone()),
                            size,
                        },
                    );
                }
                (data, metadata, size)
            },
        };

        Ok(Some(Document {
            key: header.key,
            normalized_key: normalized.to_string(),
            etag: header.etag,
            data,
            metadata,
            last_modified: header.last_modified,
            size_on_disk: size + record.len() as u64,
        }))
    }

    pub(crate) fn read_metadata(&self, normalized: &str) -> Result<Option<DocumentMetadata>> {
        let Some((header, record)) = self.read_header(normalized)? else {
            return Ok(None);
        };
        let metadata = self.decode_metadata(&header, record)?;
        Ok(Some(DocumentMetadata {
            key: header.key,
            normalized_key: normalized.to_string(),
            etag: header.etag,
            last_modified: header.last_modified,
            metadata,
        }))
    }

    /// Key case recorded by the document's first write.
    pub(crate) fn stored_key(&self, normalized: &str) -> Result<Option<String>> {
        Ok(self.read_header(normalized)?.map(|(header, _)| header.key))
    }

    /// Resolves a version index entry to its document.
    pub(crate) fn document_for_index_entry(
        &self,
        etag_bytes: &[u8],
        key_bytes: &[u8],
    ) -> Result<(Etag, Option<Document>)> {
        let Ok(normalized) = std::str::from_utf8(key_bytes) else {
            return CorruptionSnafu {
                key: String::from_utf8_lossy(key_bytes),
                reason: "version index entry holds a non UTF-8 key",
            }
            .fail();
        };
        let Some(etag) = Etag::from_bytes(etag_bytes) else {
            return CorruptionSnafu {
                key: normalized,
                reason: "version index entry holds a short etag",
            }
            .fail();
        };
        Ok((etag, self.document_by_normalized_key(normalized)?))
    }

    fn read_header(&self, normalized: &str) -> Result<Option<(MetadataHeader, &'a [u8])>> {
        let Some(record) = self.tables.get::<MetadataTable>(normalized.as_bytes()) else {
            return Ok(None);
        };
        match metadata::decode_header(record) {
            Ok(header) => Ok(Some((header, record))),
            Err(err) => CorruptionSnafu {
                key: normalized,
                reason: format!("unreadable metadata record: {err}"),
            }
            .fail(),
        }
    }

    fn decode_metadata(&self, header: &MetadataHeader, record: &[u8]) -> Result<JsonObject> {
        metadata::decode_metadata(record, header).map_err(|err| {
            CorruptionSnafu {
                key: header.key.as_str(),
                reason: format!("unreadable metadata record: {err}"),
            }
            .build()
        })
    }

    /// Decodes a payload, returning it with its size in bytes.
    fn decode_payload(
        &self,
        key: &str,
        normalized: &str,
        raw: &[u8],
        metadata: &JsonObject,
    ) -> Result<(JsonObject, u64)> {
        let decoded = self
            .storage
            .codecs()
            .decode(key, raw.to_vec(), metadata)
            .map_err(|err| err.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<JsonObject>(&bytes)
                    .map(|data| (data, bytes.len()))
                    .map_err(|err| err.to_string())
            });

        match decoded {
            Ok((data, decoded_len)) => Ok((data, raw.len().max(decoded_len) as u64)),
            Err(reason) => Err(self.diagnose_decode_failure(key, normalized, reason)),
        }
    }

    /// Tells a missing compression codec apart from plain corruption.
    fn diagnose_decode_failure(
        &self,
        key: &str,
        normalized: &str,
        reason: String,
    ) -> DocumentError {
        match self.tables.get::<Documents>(normalized.as_bytes()) {
            Some(raw)
                if raw.starts_with(&COMPRESSION_MAGIC)
                    && !self.storage.codecs().handles_magic(&COMPRESSION_MAGIC) =>
            {
                DocumentError::CompressedWithoutCodec { key: key.to_string() }
            },
            Some(_) => CorruptionSnafu { key, reason: format!("failed to decode payload: {reason}") }
                .build(),
            None => {
                warn!(key, "Could not re-read document data to diagnose decode failure");
                CorruptionSnafu { key, reason: format!("failed to decode payload: {reason}") }
                    .build()
            },
        }
    }
}

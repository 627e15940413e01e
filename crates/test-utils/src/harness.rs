//! In-memory document storage harness.

// Test utilities are expected to panic on failure - that's their purpose
#![allow(clippy::expect_used)]

use std::{ops::Deref, sync::Arc};

use folio_documents::{
    AddDocumentResult, CodecChain, CompressionCodec, DeletedDocument, Document, DocumentStorage,
    JsonObject,
};
use folio_store::Database;
use folio_types::{SequentialEtagGenerator, config::DocumentStorageConfig};
use serde_json::Value;

use crate::config::test_storage_config;

/// Document storage over a fresh in-memory database.
///
/// Etags come from a [`SequentialEtagGenerator`] with restart generation 1,
/// so the n-th write in a test always gets change counter n. Convenience
/// methods run each call in its own unit of work and panic on failure.
pub struct TestStorage {
    storage: DocumentStorage,
    etags: Arc<SequentialEtagGenerator>,
}

impl TestStorage {
    /// Creates a harness with no codecs and [`test_storage_config`].
    #[must_use]
    pub fn new() -> Self {
        Self::with(CodecChain::new(), test_storage_config())
    }

    /// Creates a harness whose payloads are compressed.
    #[must_use]
    pub fn compressed() -> Self {
        let config = test_storage_config();
        let codecs = CodecChain::new().with(CompressionCodec::from_config(&config));
        Self::with(codecs, config)
    }

    /// Creates a harness with explicit codecs and configuration.
    #[must_use]
    pub fn with(codecs: CodecChain, config: DocumentStorageConfig) -> Self {
        crate::init_tracing();
        let etags = Arc::new(SequentialEtagGenerator::new(1));
        let storage = DocumentStorage::builder()
            .db(Arc::new(Database::open_in_memory()))
            .config(config)
            .codecs(codecs)
            .etag_generator(etags.clone())
            .build()
            .expect("test storage configuration is valid");
        Self { storage, etags }
    }

    /// The etag generator feeding this storage.
    pub fn etags(&self) -> &SequentialEtagGenerator {
        &self.etags
    }

    /// Writes `data` with empty metadata.
    pub fn put(&self, key: &str, data: Value) -> AddDocumentResult {
        self.put_with_metadata(key, data, Value::Object(JsonObject::new()))
    }

    /// Writes `data` and `metadata`; both must be JSON objects.
    pub fn put_with_metadata(&self, key: &str, data: Value, metadata: Value) -> AddDocumentResult {
        let data = object(data);
        let metadata = object(metadata);
        self.storage
            .with_write(|txn| txn.add_document(key, None, &data, &metadata))
            .expect("put succeeds")
    }

    /// Reads a document.
    pub fn get(&self, key: &str) -> Option<Document> {
        self.storage.with_read(|reader| reader.document_by_key(key)).expect("get succeeds")
    }

    /// Deletes a document without an etag check.
    pub fn delete(&self, key: &str) -> Option<DeletedDocument> {
        self.storage.with_write(|txn| txn.delete_document(key, None)).expect("delete succeeds")
    }
}

impl Default for TestStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TestStorage {
    type Target = DocumentStorage;

    fn deref(&self) -> &DocumentStorage {
        &self.storage
    }
}

/// Unwraps a JSON object literal.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

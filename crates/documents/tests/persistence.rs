//! Documents over a file-backed database, across close and reopen.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods, missing_docs)]

use std::{path::Path, sync::Arc};

use folio_documents::{CodecChain, CompressionCodec, DocumentStorage, Etag, JsonObject};
use folio_store::Database;
use folio_test_utils::{assert_tables_consistent, object};
use folio_types::config::DocumentStorageConfig;
use serde_json::json;

fn open(path: &Path, create: bool) -> DocumentStorage {
    let db = if create { Database::create(path) } else { Database::open(path) };
    let config = DocumentStorageConfig::default();
    DocumentStorage::builder()
        .db(Arc::new(db.unwrap()))
        .codecs(CodecChain::new().with(CompressionCodec::from_config(&config)))
        .config(config)
        .build()
        .unwrap()
}

#[test]
fn test_documents_survive_reopen_and_etags_keep_rising() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("documents.log");
    let metadata = object(json!({"@collection": "Users"}));

    let (kept, deleted) = {
        let storage = open(&path, true);
        let kept = storage
            .with_write(|txn| {
                txn.add_document("Users/1", None, &object(json!({"name": "a"})), &metadata)
            })
            .unwrap();
        let deleted = storage
            .with_write(|txn| txn.add_document("users/2", None, &JsonObject::new(), &metadata))
            .unwrap();
        storage.with_write(|txn| txn.delete_document("users/2", Some(deleted.etag))).unwrap();
        (kept, deleted)
    };

    let storage = open(&path, false);
    let doc = storage.with_read(|reader| reader.document_by_key("users/1")).unwrap().unwrap();
    assert_eq!(doc.key, "Users/1");
    assert_eq!(doc.etag, kept.etag);
    assert_eq!(doc.data, object(json!({"name": "a"})));
    assert_eq!(doc.metadata, metadata);
    assert_eq!(doc.last_modified, Some(kept.saved_at));
    assert!(storage.with_read(|reader| reader.document_by_key("users/2")).unwrap().is_none());

    let next = storage
        .with_write(|txn| txn.add_document("users/3", None, &JsonObject::new(), &metadata))
        .unwrap();
    assert!(next.etag > deleted.etag);
    assert!(next.etag.restarts() > kept.etag.restarts());

    let txn = storage.begin_read();
    let feed: Vec<Etag> = storage
        .reader(&txn)
        .documents_after(Etag::EMPTY, 10, None)
        .map(|doc| doc.unwrap().etag)
        .collect();
    assert_eq!(feed, [kept.etag, next.etag]);
    assert_tables_consistent(&storage);
}

#[test]
fn test_uncommitted_unit_is_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("documents.log");
    {
        let storage = open(&path, true);
        let mut txn = storage.begin_write().unwrap();
        txn.add_document("draft/1", None, &JsonObject::new(), &JsonObject::new()).unwrap();
    }

    let storage = open(&path, false);
    assert!(storage.with_read(|reader| reader.document_by_key("draft/1")).unwrap().is_none());
    assert_eq!(storage.with_read(|reader| Ok(reader.documents_count())).unwrap(), 0);
}

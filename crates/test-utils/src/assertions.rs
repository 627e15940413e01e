//! Test assertion helpers for document storage invariants.

use std::collections::HashSet;

use folio_documents::DocumentStorage;
use folio_store::{
    ReadableTables, SeekTarget,
    tables::{DocumentMetadata, Documents, DocumentsByEtag},
};
use folio_types::Etag;

/// Asserts that `etags` is strictly increasing.
///
/// # Panics
///
/// Panics with the offending pair if two neighbours are out of order or equal.
pub fn assert_strictly_increasing(etags: &[Etag]) {
    for pair in etags.windows(2) {
        assert!(pair[0] < pair[1], "etags out of order: {} is not before {}", pair[0], pair[1]);
    }
}

/// Asserts that the three document tables agree with each other.
///
/// Every document has a metadata record and the other way round, and the
/// etag index holds exactly one entry per document, keyed by its current etag.
///
/// # Panics
///
/// Panics describing the first inconsistency found.
pub fn assert_tables_consistent(storage: &DocumentStorage) {
    let txn = storage.begin_read();
    let documents = txn.len::<Documents>();
    let metadata = txn.len::<DocumentMetadata>();
    let indexed = txn.len::<DocumentsByEtag>();
    assert_eq!(documents, metadata, "documents and metadata tables differ in size");
    assert_eq!(documents, indexed, "etag index size differs from document count");

    let reader = storage.reader(&txn);
    let mut seen = HashSet::new();
    let mut cursor = txn.cursor::<DocumentsByEtag>();
    let mut positioned = cursor.seek(SeekTarget::BeforeAll);
    while positioned {
        let (Some(etag_bytes), Some(key_bytes)) = (cursor.key(), cursor.value()) else {
            panic!("positioned cursor without an entry");
        };
        let Some(etag) = Etag::from_bytes(etag_bytes) else {
            panic!("etag index key is not an etag: {etag_bytes:?}");
        };
        let key = String::from_utf8_lossy(key_bytes).into_owned();
        assert!(txn.contains::<Documents>(key_bytes), "indexed key {key} has no data");
        match reader.document_metadata_by_key(&key) {
            Ok(Some(meta)) => assert_eq!(meta.etag, etag, "index etag differs for {key}"),
            Ok(None) => panic!("indexed key {key} has no metadata"),
            Err(err) => panic!("metadata for {key} is unreadable: {err}"),
        }
        assert!(seen.insert(key.clone()), "key {key} is indexed more than once");
        positioned = cursor.move_next();
    }
}

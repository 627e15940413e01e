//! Write path: one unit of work over a write transaction.
//!
//! A [`DocumentTransaction`] keeps the three document tables in step:
//!
//! ```text
//!   documents           normalized key ──▶ encoded payload
//!   document_metadata   normalized key ──▶ etag | key | last-modified | metadata
//!   documents_by_etag   etag           ──▶ normalized key
//! ```
//!
//! Every write replaces the etag index entry of the version it supersedes, so
//! each live document has exactly one index entry once the unit commits.

use chrono::{DateTime, SubsecRound, Utc};
use folio_store::{
    ReadableTables, TableId, WriteTransaction,
    tables::{DocumentMetadata as MetadataTable, Documents, DocumentsByEtag, Sequences},
};
use folio_types::{Etag, EtagCategory, validate_document_key};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    concurrency::{EtagRedirects, ensure_etag_match},
    document::{AddDocumentResult, DeletedDocument, JsonObject, TouchResult},
    error::{
        CodecSnafu, CorruptionSnafu, DocumentError, Result, SerializationSnafu, StorageSnafu,
        ValidationSnafu, WriteOperation,
    },
    keys::normalize_key,
    metadata::encode_record,
    reader::DocumentReader,
    storage::{DocumentStorage, LAST_ETAG_KEY},
};

/// A unit of work: reads see its own writes, and nothing is visible to
/// others until [`commit`](Self::commit).
///
/// Dropping it without committing discards every change.
pub struct DocumentTransaction<'db> {
    storage: &'db DocumentStorage,
    txn: WriteTransaction<'db>,
    redirects: EtagRedirects,
}

impl<'db> DocumentTransaction<'db> {
    pub(crate) fn new(storage: &'db DocumentStorage, txn: WriteTransaction<'db>) -> Self {
        Self { storage, txn, redirects: EtagRedirects::new() }
    }

    /// A reader that sees this unit's uncommitted writes.
    pub fn reader(&self) -> DocumentReader<'_, WriteTransaction<'db>> {
        DocumentReader::new(&self.txn, self.storage)
    }

    /// Etag redirects recorded by touches in this unit.
    pub fn redirects(&self) -> &EtagRedirects {
        &self.redirects
    }

    /// Stores `data` and `metadata` under `key`.
    ///
    /// With `expected = Some(etag)` the write only succeeds if `etag` (after
    /// following touch redirects) is the document's current etag. Expecting
    /// a specific etag of a document that does not exist always fails.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Validation`] for an empty or oversized key,
    /// [`DocumentError::Concurrency`] on etag mismatch, and codec, serialization
    /// or storage errors if the payload cannot be stored.
    pub fn add_document(
        &mut self,
        key: &str,
        expected: Option<Etag>,
        data: &JsonObject,
        metadata: &JsonObject,
    ) -> Result<AddDocumentResult> {
        validate_document_key(key).context(ValidationSnafu)?;
        let normalized = normalize_key(key);
        let storage_key = normalized.as_bytes();

        let data_version = self.txn.table(TableId::Documents).version(storage_key);
        let mut stored_key = None;
        let prev_etag = if data_version != 0 {
            stored_key = self.reader().stored_key(&normalized)?;
            let current = ensure_etag_match(
                &self.reader(),
                &self.redirects,
                &normalized,
                expected,
                WriteOperation::Put,
            )?;
            self.txn.delete::<DocumentsByEtag>(&current.to_bytes()).context(StorageSnafu)?;
            Some(current)
        } else {
            if let Some(expected) = expected.filter(|etag| !etag.is_empty()) {
                return Err(DocumentError::Concurrency {
                    operation: WriteOperation::Put,
                    key: key.to_string(),
                    actual: Etag::INVALID,
                    expected,
                });
            }
            None
        };

        let payload = serde_json::to_vec(data).context(SerializationSnafu { key })?;
        let encoded =
            self.storage.codecs().encode(key, payload, metadata).context(CodecSnafu { key })?;
        self.txn
            .put::<Documents>(storage_key, encoded, Some(data_version))
            .context(StorageSnafu)?;

        let etag = self.issue_etag()?;
        let saved_at = now_micros();
        let updated = self.txn.contains::<MetadataTable>(storage_key);
        let record_key = stored_key.as_deref().unwrap_or(key);
        let record = encode_record(etag, record_key, Some(saved_at), metadata)
            .context(SerializationSnafu { key })?;
        self.txn.insert::<MetadataTable>(storage_key, record).context(StorageSnafu)?;
        self.txn
            .insert::<DocumentsByEtag>(&etag.to_bytes(), storage_key.to_vec())
            .context(StorageSnafu)?;

        debug!(key, %etag, updated, "Document written");
        Ok(AddDocumentResult { etag, prev_etag, saved_at, updated })
    }

    /// Stores a document without an etag check.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Concurrency`] if the document exists and
    /// `overwrite` is false, otherwise as [`add_document`](Self::add_document).
    pub fn insert_document(
        &mut self,
        key: &str,
        data: &JsonObject,
        metadata: &JsonObject,
        overwrite: bool,
    ) -> Result<AddDocumentResult> {
        validate_document_key(key).context(ValidationSnafu)?;
        if !overwrite {
            let normalized = normalize_key(key);
            if self.txn.contains::<Documents>(normalized.as_bytes()) {
                let actual = self
                    .reader()
                    .read_metadata(&normalized)?
                    .map_or(Etag::INVALID, |current| current.etag);
                return Err(DocumentError::Concurrency {
                    operation: WriteOperation::Put,
                    key: key.to_string(),
                    actual,
                    expected: Etag::EMPTY,
                });
            }
        }
        self.add_document(key, None, data, metadata)
    }

    /// Deletes the document at `key`.
    ///
    /// Returns `None` if there was nothing to delete. The returned etag is
    /// `expected` when given, otherwise the etag the document had.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Concurrency`] on etag mismatch and
    /// [`DocumentError::Corruption`] if data exists without metadata.
    pub fn delete_document(
        &mut self,
        key: &str,
        expected: Option<Etag>,
    ) -> Result<Option<DeletedDocument>> {
        validate_document_key(key).context(ValidationSnafu)?;
        let normalized = normalize_key(key);
        let storage_key = normalized.as_bytes();

        if expected.is_some() {
            ensure_etag_match(
                &self.reader(),
                &self.redirects,
                &normalized,
                expected,
                WriteOperation::Delete,
            )?;
        }

        let Some((_, data_version)) = self.txn.get_with_version::<Documents>(storage_key) else {
            debug!(key, "Document not found, considered deleted");
            return Ok(None);
        };
        let Some(current) = self.reader().read_metadata(&normalized)? else {
            return CorruptionSnafu {
                key,
                reason: "document data exists but its metadata record is missing",
            }
            .fail();
        };

        self.txn
            .delete_versioned::<Documents>(storage_key, Some(data_version))
            .context(StorageSnafu)?;
        self.txn.delete::<MetadataTable>(storage_key).context(StorageSnafu)?;
        self.txn.delete::<DocumentsByEtag>(&current.etag.to_bytes()).context(StorageSnafu)?;
        if let Some(cache) = self.storage.cache() {
            cache.remove(&normalized, expected);
        }

        debug!(key, etag = %current.etag, "Document deleted");
        Ok(Some(DeletedDocument {
            key: current.key,
            metadata: current.metadata,
            etag: expected.unwrap_or(current.etag),
        }))
    }

    /// Re-stamps the document at `key` with a fresh etag, keeping its content.
    ///
    /// Later etag checks in this unit against the old etag resolve to the new
    /// one. Returns `None` if the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Corruption`] if data exists without metadata.
    pub fn touch_document(&mut self, key: &str) -> Result<Option<TouchResult>> {
        validate_document_key(key).context(ValidationSnafu)?;
        let normalized = normalize_key(key);
        let storage_key = normalized.as_bytes();

        if !self.txn.contains::<Documents>(storage_key) {
            return Ok(None);
        }
        let Some(current) = self.reader().read_metadata(&normalized)? else {
            return CorruptionSnafu {
                key,
                reason: "document data exists but its metadata record is missing",
            }
            .fail();
        };

        let etag = self.issue_etag()?;
        let record = encode_record(etag, &current.key, current.last_modified, &current.metadata)
            .context(SerializationSnafu { key })?;
        self.txn.insert::<MetadataTable>(storage_key, record).context(StorageSnafu)?;
        self.txn.delete::<DocumentsByEtag>(&current.etag.to_bytes()).context(StorageSnafu)?;
        self.txn
            .insert::<DocumentsByEtag>(&etag.to_bytes(), storage_key.to_vec())
            .context(StorageSnafu)?;
        if let Some(cache) = self.storage.cache() {
            cache.remove(&normalized, Some(current.etag));
        }
        self.redirects.insert(current.etag, etag);

        debug!(key, previous = %current.etag, current = %etag, "Document touched");
        Ok(Some(TouchResult { previous: current.etag, current: etag }))
    }

    /// Checks `expected` against the current etag of `key`.
    ///
    /// See [`ensure_etag_match`].
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Concurrency`] on mismatch.
    pub fn ensure_etag_match(
        &self,
        key: &str,
        expected: Option<Etag>,
        operation: WriteOperation,
    ) -> Result<Etag> {
        ensure_etag_match(&self.reader(), &self.redirects, &normalize_key(key), expected, operation)
    }

    /// Issues the etag for the next write of this unit.
    ///
    /// Every storage over a database owns its own generator, so the generator's
    /// etag is raised above the newest etag recorded in the database. Units of
    /// work are serialized by the write lock, which makes that record a total
    /// order across storages and restarts.
    fn issue_etag(&mut self) -> Result<Etag> {
        let issued = self.storage.etag_generator().next_etag(EtagCategory::Documents);
        let etag = match self.txn.get::<Sequences>(LAST_ETAG_KEY).and_then(Etag::from_bytes) {
            Some(last) if issued <= last => {
                debug!(%issued, %last, "Etag generator behind the database, advancing");
                last.increment()
            },
            _ => issued,
        };
        self.txn
            .insert::<Sequences>(LAST_ETAG_KEY, etag.to_bytes().to_vec())
            .context(StorageSnafu)?;
        Ok(etag)
    }

    /// Whether this unit has written anything.
    pub fn is_dirty(&self) -> bool {
        self.txn.is_dirty()
    }

    /// Publishes every change atomically.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the commit fails; nothing is published then.
    pub fn commit(self) -> Result<()> {
        self.txn.commit().context(StorageSnafu)
    }

    /// Discards every change.
    pub fn abort(self) {
        self.txn.abort();
    }
}

/// Current time at the microsecond precision metadata records keep.
fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::sync::Arc;

    use folio_store::Database;
    use folio_types::{SequentialEtagGenerator, ValidationError};
    use serde_json::json;

    use super::*;

    fn object(value: serde_json::Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    fn storage() -> DocumentStorage {
        DocumentStorage::builder()
            .db(Arc::new(Database::open_in_memory()))
            .etag_generator(Arc::new(SequentialEtagGenerator::new(1)))
            .build()
            .unwrap()
    }

    fn index_entries(storage: &DocumentStorage) -> Vec<(Etag, String)> {
        let txn = storage.begin_read();
        let mut cursor = txn.cursor::<DocumentsByEtag>();
        let mut out = Vec::new();
        if cursor.seek(folio_store::SeekTarget::BeforeAll) {
            loop {
                out.push((
                    Etag::from_bytes(cursor.key().unwrap()).unwrap(),
                    String::from_utf8(cursor.value().unwrap().to_vec()).unwrap(),
                ));
                if !cursor.move_next() {
                    break;
                }
            }
        }
        out
    }

    #[test]
    fn test_add_then_update_replaces_index_entry() {
        let storage = storage();
        let mut txn = storage.begin_write().unwrap();
        let data = object(json!({"v": 1}));
        let first = txn.add_document("Users/1", None, &data, &JsonObject::new()).unwrap();
        assert!(!first.updated);
        assert_eq!(first.prev_etag, None);

        let second = txn
            .add_document("users/1", Some(first.etag), &object(json!({"v": 2})), &JsonObject::new())
            .unwrap();
        assert!(second.updated);
        assert_eq!(second.prev_etag, Some(first.etag));
        assert!(second.etag > first.etag);
        txn.commit().unwrap();

        assert_eq!(index_entries(&storage), vec![(second.etag, "users/1".to_string())]);
        let doc = storage.with_read(|r| r.document_by_key("USERS/1")).unwrap().unwrap();
        assert_eq!(doc.key, "Users/1", "the first write's case is kept");
        assert_eq!(doc.data, object(json!({"v": 2})));
    }

    #[test]
    fn test_put_with_stale_etag_conflicts() {
        let storage = storage();
        let mut txn = storage.begin_write().unwrap();
        let first = txn.add_document("a", None, &JsonObject::new(), &JsonObject::new()).unwrap();
        let second = txn.add_document("a", None, &JsonObject::new(), &JsonObject::new()).unwrap();

        let err = txn
            .add_document("a", Some(first.etag), &JsonObject::new(), &JsonObject::new())
            .unwrap_err();
        match err {
            DocumentError::Concurrency { operation, actual, expected, .. } => {
                assert_eq!(operation, WriteOperation::Put);
                assert_eq!(actual, second.etag);
                assert_eq!(expected, first.etag);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_put_with_etag_on_missing_document_conflicts() {
        let storage = storage();
        let mut txn = storage.begin_write().unwrap();
        let etag = Etag::new(EtagCategory::Documents, 1, 99);
        let empty = JsonObject::new();
        let err = txn.add_document("ghost", Some(etag), &empty, &empty).unwrap_err();
        assert!(matches!(err, DocumentError::Concurrency { actual, .. } if actual == Etag::INVALID));

        // An empty etag means "must not exist", which holds.
        txn.add_document("ghost", Some(Etag::EMPTY), &empty, &empty).unwrap();
    }

    #[test]
    fn test_key_validation() {
        let storage = storage();
        let mut txn = storage.begin_write().unwrap();
        let err = txn.add_document("", None, &JsonObject::new(), &JsonObject::new()).unwrap_err();
        assert!(matches!(err, DocumentError::Validation { .. }));

        let oversized = "k".repeat(u16::MAX as usize);
        let err =
            txn.add_document(&oversized, None, &JsonObject::new(), &JsonObject::new()).unwrap_err();
        match err {
            DocumentError::Validation { source: ValidationError { field, .. }, .. } => {
                assert_eq!(field, "key");
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(!txn.is_dirty());
    }

    #[test]
    fn test_insert_without_overwrite() {
        let storage = storage();
        let mut txn = storage.begin_write().unwrap();
        let empty = JsonObject::new();
        let first = txn.insert_document("a", &empty, &empty, false).unwrap();

        let err = txn.insert_document("A", &empty, &empty, false).unwrap_err();
        assert!(matches!(err, DocumentError::Concurrency { actual, .. } if actual == first.etag));

        let replaced = txn.insert_document("a", &empty, &empty, true).unwrap();
        assert!(replaced.updated);
    }

    #[test]
    fn test_delete_returns_prior_state() {
        let storage = storage();
        let meta = object(json!({"@collection": "Users"}));
        let mut txn = storage.begin_write().unwrap();
        let written = txn.add_document("Users/1", None, &JsonObject::new(), &meta).unwrap();

        let deleted = txn.delete_document("users/1", None).unwrap().unwrap();
        assert_eq!(deleted.key, "Users/1");
        assert_eq!(deleted.metadata, meta);
        assert_eq!(deleted.etag, written.etag);
        assert!(txn.delete_document("users/1", None).unwrap().is_none());
        txn.commit().unwrap();

        assert!(index_entries(&storage).is_empty());
        assert_eq!(storage.with_read(|r| Ok(r.documents_count())).unwrap(), 0);
    }

    #[test]
    fn test_delete_with_wrong_etag_fails_before_deleting() {
        let storage = storage();
        let mut txn = storage.begin_write().unwrap();
        txn.add_document("a", None, &JsonObject::new(), &JsonObject::new()).unwrap();
        let stale = Etag::new(EtagCategory::Documents, 1, 500);

        let err = txn.delete_document("a", Some(stale)).unwrap_err();
        assert!(matches!(
            err,
            DocumentError::Concurrency { operation: WriteOperation::Delete, .. }
        ));
        assert!(txn.reader().document_by_key("a").unwrap().is_some());
    }

    #[test]
    fn test_touch_redirects_old_etag() {
        let storage = storage();
        let meta = object(json!({"tag": "x"}));
        let data = object(json!({"v": 1}));
        let mut txn = storage.begin_write().unwrap();
        let written = txn.add_document("a", None, &data, &meta).unwrap();

        let touched = txn.touch_document("A").unwrap().unwrap();
        assert_eq!(touched.previous, written.etag);
        assert!(touched.current > written.etag);
        assert_eq!(txn.redirects().resolve(written.etag), touched.current);

        let doc = txn.reader().document_by_key("a").unwrap().unwrap();
        assert_eq!((doc.etag, doc.data, doc.metadata), (touched.current, data.clone(), meta));
        assert_eq!(
            txn.ensure_etag_match("a", Some(written.etag), WriteOperation::Put).unwrap(),
            touched.current
        );

        // The redirect lets one write through; the old etag is stale afterwards.
        txn.add_document("a", Some(written.etag), &data, &JsonObject::new()).unwrap();
        let err = txn.add_document("a", Some(written.etag), &data, &JsonObject::new()).unwrap_err();
        assert!(matches!(err, DocumentError::Concurrency { .. }));

        assert!(txn.touch_document("missing").unwrap().is_none());
    }

    #[test]
    fn test_redirects_do_not_outlive_unit() {
        let storage = storage();
        let written = storage
            .with_write(|txn| txn.add_document("a", None, &JsonObject::new(), &JsonObject::new()))
            .unwrap();
        storage.with_write(|txn| txn.touch_document("a")).unwrap();

        let txn = storage.begin_write().unwrap();
        assert!(txn.redirects().is_empty());
        assert!(txn.ensure_etag_match("a", Some(written.etag), WriteOperation::Put).is_err());
    }

    #[test]
    fn test_empty_etag_matches_delete_marker() {
        let storage = storage();
        let marker = object(json!({"@delete-marker": true}));
        let mut txn = storage.begin_write().unwrap();
        txn.add_document("a", None, &JsonObject::new(), &marker).unwrap();

        assert!(txn.ensure_etag_match("a", Some(Etag::EMPTY), WriteOperation::Delete).is_ok());
        txn.add_document("b", None, &JsonObject::new(), &JsonObject::new()).unwrap();
        assert!(txn.ensure_etag_match("b", Some(Etag::EMPTY), WriteOperation::Delete).is_err());
        assert_eq!(
            txn.ensure_etag_match("missing", Some(Etag::EMPTY), WriteOperation::Delete).unwrap(),
            Etag::INVALID
        );
    }

    #[test]
    fn test_saved_at_matches_stored_last_modified() {
        let storage = storage();
        let written = storage
            .with_write(|txn| txn.add_document("a", None, &JsonObject::new(), &JsonObject::new()))
            .unwrap();

        assert_eq!(written.saved_at.timestamp_subsec_nanos() % 1_000, 0);
        let doc = storage.with_read(|r| r.document_by_key("a")).unwrap().unwrap();
        assert_eq!(doc.last_modified, Some(written.saved_at));
    }

    #[test]
    fn test_lagging_generator_issues_above_recorded_etag() {
        let db = Arc::new(Database::open_in_memory());
        let ahead = DocumentStorage::builder()
            .db(Arc::clone(&db))
            .etag_generator(Arc::new(SequentialEtagGenerator::new(5)))
            .build()
            .unwrap();
        let behind = DocumentStorage::builder()
            .db(db)
            .etag_generator(Arc::new(SequentialEtagGenerator::new(2)))
            .build()
            .unwrap();
        let empty = JsonObject::new();

        let first = ahead.with_write(|txn| txn.add_document("a", None, &empty, &empty)).unwrap();
        let second = behind.with_write(|txn| txn.add_document("b", None, &empty, &empty)).unwrap();
        let touched = behind.with_write(|txn| txn.touch_document("a")).unwrap().unwrap();

        assert_eq!(second.etag, first.etag.increment());
        assert_eq!(touched.current, second.etag.increment());
        assert_eq!(
            index_entries(&ahead),
            vec![(second.etag, "b".to_string()), (touched.current, "a".to_string())]
        );
    }

    #[test]
    fn test_aborted_unit_does_not_advance_recorded_etag() {
        let storage = storage();
        let empty = JsonObject::new();
        let mut txn = storage.begin_write().unwrap();
        txn.add_document("a", None, &empty, &empty).unwrap();
        txn.abort();

        let txn = storage.begin_read();
        assert!(txn.get::<Sequences>(LAST_ETAG_KEY).is_none());
    }

    #[test]
    fn test_abort_discards() {
        let storage = storage();
        let mut txn = storage.begin_write().unwrap();
        txn.add_document("a", None, &JsonObject::new(), &JsonObject::new()).unwrap();
        assert!(txn.is_dirty());
        txn.abort();
        assert!(storage.with_read(|r| r.document_by_key("a")).unwrap().is_none());
    }
}

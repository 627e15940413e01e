//! Lazy document enumeration.
//!
//! Three walks, each a single-pass iterator borrowing the transaction it
//! reads, so a walk cannot outlive its snapshot and stops cleanly when the
//! caller drops it:
//!
//! | Walk                  | Table               | Order            | Unresolvable entry |
//! |-----------------------|---------------------|------------------|--------------------|
//! | [`ReverseEtagIter`]   | `documents_by_etag` | newest first     | corruption error   |
//! | [`EtagScanIter`]      | `documents_by_etag` | oldest first     | corruption error   |
//! | [`PrefixIter`]        | `documents`         | key order        | skipped            |
//!
//! Items are `Result<Document>`; after the first error an iterator is fused.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use folio_store::{
    Cursor, ReadableTables, SeekTarget,
    tables::{Documents, DocumentsByEtag},
};
use folio_types::{Etag, validate_prefix};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    document::Document,
    error::{CorruptionSnafu, Result, ValidationSnafu},
    keys::normalize_key,
    reader::DocumentReader,
};

fn skip_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

// ============================================================================
// Cancellation
// ============================================================================

/// Shared flag that stops an [`EtagScanIter`] at its next step.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ============================================================================
// Reverse walk
// ============================================================================

/// Documents from newest etag to oldest.
pub struct ReverseEtagIter<'a, R> {
    reader: DocumentReader<'a, R>,
    cursor: Cursor<'a>,
    start: usize,
    remaining: usize,
    started: bool,
    done: bool,
}

impl<R: ReadableTables> Iterator for ReverseEtagIter<'_, R> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            return None;
        }
        let positioned = if self.started {
            self.cursor.move_prev()
        } else {
            self.started = true;
            self.cursor.seek(SeekTarget::AfterAll) && self.cursor.skip(-skip_count(self.start))
        };
        let (true, Some(etag_bytes), Some(key_bytes)) =
            (positioned, self.cursor.key(), self.cursor.value())
        else {
            self.done = true;
            return None;
        };

        let item = match self.reader.document_for_index_entry(etag_bytes, key_bytes) {
            Ok((_, Some(document))) => Ok(document),
            Ok((etag, None)) => CorruptionSnafu {
                key: String::from_utf8_lossy(key_bytes),
                reason: format!("etag {etag} is indexed but the document does not exist"),
            }
            .fail(),
            Err(err) => Err(err),
        };
        self.remaining -= 1;
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}

// ============================================================================
// Forward walk with constraints
// ============================================================================

/// Why an [`EtagScanIter`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The index has no more entries.
    Exhausted,
    /// `take` documents were returned.
    TakeReached,
    /// Returned documents reached `max_size` bytes in total.
    MaxSizeReached,
    /// An entry beyond `until` was reached.
    UntilReached,
    /// The walk ran longer than `timeout`.
    TimedOut,
    /// The cancellation flag was set.
    Cancelled,
}

/// Constraints for a forward etag walk.
#[derive(Debug, Clone, bon::Builder)]
pub struct EtagScanOptions {
    /// Exclusive lower bound.
    pub after: Etag,
    /// Only keys starting with this prefix (case-insensitive) are returned.
    #[builder(into)]
    pub prefix: Option<String>,
    /// Maximum number of documents.
    #[builder(default = usize::MAX)]
    pub take: usize,
    /// Stop once returned documents total at least this many bytes on disk.
    pub max_size: Option<u64>,
    /// Stop at the first entry whose etag is greater than this.
    pub until: Option<Etag>,
    /// Stop once this much time has passed since the walk started.
    pub timeout: Option<Duration>,
    /// Checked before every entry.
    pub cancellation: Option<CancellationFlag>,
}

impl EtagScanOptions {
    /// Every document after `after`, without further constraints.
    pub fn after(after: Etag) -> Self {
        Self::builder().after(after).build()
    }
}

type ProgressCallback<'a> = Box<dyn FnOnce(Option<Etag>) + 'a>;

/// Documents in ascending etag order, strictly after a starting etag.
///
/// Tracks the last index entry it examined, including entries filtered out
/// by prefix, so a caller can resume from there. That etag is handed to the
/// [`on_last_considered`](Self::on_last_considered) callback once the walk
/// ends without error, or when the iterator is dropped early. A walk with
/// `take == 0` never invokes it.
///
/// The timeout clock starts when the iterator is created.
pub struct EtagScanIter<'a, R> {
    reader: DocumentReader<'a, R>,
    cursor: Cursor<'a>,
    options: EtagScanOptions,
    prefix: Option<String>,
    started_at: Instant,
    seeked: bool,
    returned: usize,
    total_size: u64,
    last_considered: Option<Etag>,
    pending_stop: Option<StopReason>,
    stop_reason: Option<StopReason>,
    failed: bool,
    on_last_considered: Option<ProgressCallback<'a>>,
}

impl<'a, R: ReadableTables> EtagScanIter<'a, R> {
    pub(crate) fn new(reader: DocumentReader<'a, R>, options: EtagScanOptions) -> Self {
        let prefix = options.prefix.as_deref().map(normalize_key);
        Self {
            reader,
            cursor: reader.tables().cursor::<DocumentsByEtag>(),
            options,
            prefix,
            started_at: Instant::now(),
            seeked: false,
            returned: 0,
            total_size: 0,
            last_considered: None,
            pending_stop: None,
            stop_reason: None,
            failed: false,
            on_last_considered: None,
        }
    }

    /// Registers a callback receiving the last examined etag when the walk ends.
    #[must_use]
    pub fn on_last_considered(mut self, callback: impl FnOnce(Option<Etag>) + 'a) -> Self {
        self.on_last_considered = Some(Box::new(callback));
        self
    }

    /// Why the walk stopped, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Etag of the last examined index entry.
    pub fn last_considered(&self) -> Option<Etag> {
        self.last_considered
    }

    fn finish(&mut self, reason: StopReason) -> Option<Result<Document>> {
        if self.stop_reason.is_none() {
            self.stop_reason = Some(reason);
            debug!(
                ?reason,
                returned = self.returned,
                last_considered = ?self.last_considered,
                "Etag scan finished"
            );
            if let Some(callback) = self.on_last_considered.take() {
                callback(self.last_considered);
            }
        }
        None
    }

    fn fail(&mut self, err: crate::DocumentError) -> Option<Result<Document>> {
        self.failed = true;
        self.on_last_considered = None;
        Some(Err(err))
    }

    /// Moves to the next candidate, seeking on the first call.
    fn advance(&mut self) -> bool {
        if self.seeked {
            return self.cursor.move_next();
        }
        self.seeked = true;
        let after = self.options.after.to_bytes();
        if !self.cursor.seek(SeekTarget::Key(&after)) {
            return false;
        }
        if self.cursor.key() == Some(&after[..]) {
            return self.cursor.move_next();
        }
        true
    }
}

impl<R: ReadableTables> Iterator for EtagScanIter<'_, R> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.stop_reason.is_some() {
            return None;
        }
        if let Some(reason) = self.pending_stop {
            return self.finish(reason);
        }
        if self.options.take == 0 {
            // Nothing is examined, so there is no progress to report.
            self.on_last_considered = None;
            self.stop_reason = Some(StopReason::TakeReached);
            return None;
        }

        loop {
            if self.options.cancellation.as_ref().is_some_and(CancellationFlag::is_cancelled) {
                return self.finish(StopReason::Cancelled);
            }
            if !self.advance() {
                return self.finish(StopReason::Exhausted);
            }
            if self.options.timeout.is_some_and(|timeout| self.started_at.elapsed() > timeout) {
                return self.finish(StopReason::TimedOut);
            }

            let (Some(etag_bytes), Some(key_bytes)) = (self.cursor.key(), self.cursor.value())
            else {
                return self.finish(StopReason::Exhausted);
            };
            let Some(etag) = Etag::from_bytes(etag_bytes) else {
                let err = CorruptionSnafu {
                    key: String::from_utf8_lossy(key_bytes),
                    reason: "version index entry holds a short etag",
                }
                .build();
                return self.fail(err);
            };
            if self.options.until.is_some_and(|until| etag > until) {
                return self.finish(StopReason::UntilReached);
            }

            self.last_considered = Some(etag);
            if let Some(prefix) = &self.prefix {
                if !key_bytes.starts_with(prefix.as_bytes()) {
                    continue;
                }
            }

            let document = match self.reader.document_for_index_entry(etag_bytes, key_bytes) {
                Ok((_, Some(document))) => document,
                Ok((_, None)) => {
                    let err = CorruptionSnafu {
                        key: String::from_utf8_lossy(key_bytes),
                        reason: format!("etag {etag} is indexed but the document does not exist"),
                    }
                    .build();
                    return self.fail(err);
                },
                Err(err) => return self.fail(err),
            };
            if document.etag != etag {
                let err = CorruptionSnafu {
                    key: document.key,
                    reason: format!("indexed under etag {etag} but carries etag {}", document.etag),
                }
                .build();
                return self.fail(err);
            }

            self.returned += 1;
            self.total_size += document.size_on_disk;
            if self.options.max_size.is_some_and(|max| self.total_size >= max) {
                self.pending_stop = Some(StopReason::MaxSizeReached);
            } else if self.returned >= self.options.take {
                self.pending_stop = Some(StopReason::TakeReached);
            }
            return Some(Ok(document));
        }
    }
}

impl<R> Drop for EtagScanIter<'_, R> {
    fn drop(&mut self) {
        if let Some(callback) = self.on_last_considered.take() {
            callback(self.last_considered);
        }
    }
}

impl<R> fmt::Debug for EtagScanIter<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EtagScanIter")
            .field("options", &self.options)
            .field("returned", &self.returned)
            .field("last_considered", &self.last_considered)
            .field("stop_reason", &self.stop_reason)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Prefix scan
// ============================================================================

/// Documents whose key starts with a prefix, in key order.
///
/// Entries that no longer resolve to a document are skipped.
pub struct PrefixIter<'a, R> {
    reader: DocumentReader<'a, R>,
    cursor: Cursor<'a>,
    seek_from: String,
    resume: bool,
    start: usize,
    remaining: usize,
    started: bool,
    done: bool,
}

impl<R: ReadableTables> PrefixIter<'_, R> {
    fn position(&mut self) -> bool {
        if self.started {
            return self.cursor.move_next();
        }
        self.started = true;
        if !self.cursor.seek(SeekTarget::Key(self.seek_from.as_bytes())) {
            return false;
        }
        if !self.cursor.skip(skip_count(self.start)) {
            return false;
        }
        // Resuming is exclusive of the resume key.
        !self.resume || self.cursor.move_next()
    }
}

impl<R: ReadableTables> Iterator for PrefixIter<'_, R> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.remaining > 0 {
            if !self.position() {
                self.done = true;
                break;
            }
            let Some(key_bytes) = self.cursor.key() else {
                self.done = true;
                break;
            };
            let Ok(normalized) = std::str::from_utf8(key_bytes) else {
                continue;
            };
            match self.reader.document_by_normalized_key(normalized) {
                Ok(Some(document)) => {
                    self.remaining -= 1;
                    return Some(Ok(document));
                },
                Ok(None) => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                },
            }
        }
        None
    }
}

// ============================================================================
// Reader entry points
// ============================================================================

impl<'a, R: ReadableTables> DocumentReader<'a, R> {
    /// Documents from newest to oldest etag, skipping the newest `start`.
    pub fn documents_by_reverse_etag(&self, start: usize, take: usize) -> ReverseEtagIter<'a, R> {
        ReverseEtagIter {
            reader: *self,
            cursor: self.tables().cursor::<DocumentsByEtag>(),
            start,
            remaining: take,
            started: false,
            done: false,
        }
    }

    /// Documents with etags strictly greater than `after`, oldest first.
    pub fn documents_after(
        &self,
        after: Etag,
        take: usize,
        max_size: Option<u64>,
    ) -> EtagScanIter<'a, R> {
        let options = EtagScanOptions::builder()
            .after(after)
            .take(take)
            .maybe_max_size(max_size)
            .build();
        EtagScanIter::new(*self, options)
    }

    /// Forward etag walk with the full set of constraints.
    pub fn documents_after_with(&self, options: EtagScanOptions) -> EtagScanIter<'a, R> {
        EtagScanIter::new(*self, options)
    }

    /// Documents whose key starts with `prefix`, in key order.
    ///
    /// Skips the first `start` matches. With `skip_after`, the scan seeks to
    /// that key instead of the start of the prefix, applies `start`, then
    /// steps one entry further.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Validation`](crate::DocumentError::Validation)
    /// if `prefix` is empty.
    pub fn documents_with_prefix(
        &self,
        prefix: &str,
        start: usize,
        take: usize,
        skip_after: Option<&str>,
    ) -> Result<PrefixIter<'a, R>> {
        validate_prefix(prefix).context(ValidationSnafu)?;
        let required = normalize_key(prefix);
        let seek_from = skip_after.map_or_else(|| required.clone(), normalize_key);
        Ok(PrefixIter {
            reader: *self,
            cursor: self.tables().cursor::<Documents>().with_required_prefix(required),
            seek_from,
            resume: skip_after.is_some(),
            start,
            remaining: take,
            started: false,
            done: false,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::{cell::Cell, sync::Arc};

    use folio_store::Database;
    use folio_types::SequentialEtagGenerator;
    use serde_json::json;

    use super::*;
    use crate::{DocumentError, DocumentStorage, JsonObject};

    fn storage_with(keys: &[&str]) -> (DocumentStorage, Vec<Etag>) {
        let storage = DocumentStorage::builder()
            .db(Arc::new(Database::open_in_memory()))
            .etag_generator(Arc::new(SequentialEtagGenerator::new(1)))
            .build()
            .unwrap();
        let etags = keys
            .iter()
            .map(|key| {
                let data = json!({ "key": key }).as_object().cloned().unwrap();
                storage
                    .with_write(|txn| txn.add_document(key, None, &data, &JsonObject::new()))
                    .unwrap()
                    .etag
            })
            .collect();
        (storage, etags)
    }

    fn keys(items: impl Iterator<Item = Result<Document>>) -> Vec<String> {
        items.map(|doc| doc.unwrap().key).collect()
    }

    #[test]
    fn test_reverse_walk_pages() {
        let (storage, _) = storage_with(&["a", "b", "c", "d"]);
        let txn = storage.begin_read();
        let reader = storage.reader(&txn);

        assert_eq!(keys(reader.documents_by_reverse_etag(0, 10)), ["d", "c", "b", "a"]);
        assert_eq!(keys(reader.documents_by_reverse_etag(1, 2)), ["c", "b"]);
        assert!(keys(reader.documents_by_reverse_etag(4, 10)).is_empty());
        assert!(keys(reader.documents_by_reverse_etag(0, 0)).is_empty());
    }

    #[test]
    fn test_reverse_walk_fails_on_dangling_index_entry() {
        let (storage, etags) = storage_with(&["a"]);
        {
            let mut txn = storage.db().write().unwrap();
            txn.insert::<DocumentsByEtag>(&etags[0].increment().to_bytes(), b"ghost".to_vec())
                .unwrap();
            txn.commit().unwrap();
        }
        let txn = storage.begin_read();
        let mut iter = storage.reader(&txn).documents_by_reverse_etag(0, 10);
        assert!(matches!(iter.next(), Some(Err(DocumentError::Corruption { .. }))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_forward_walk_is_exclusive_and_resumable() {
        let (storage, etags) = storage_with(&["a", "b", "c"]);
        let txn = storage.begin_read();
        let reader = storage.reader(&txn);

        let reported = Cell::new(None);
        let first: Vec<_> = reader
            .documents_after(Etag::EMPTY, 2, None)
            .on_last_considered(|etag| reported.set(etag))
            .map(|doc| doc.unwrap().etag)
            .collect();
        assert_eq!(first, etags[..2]);
        assert_eq!(reported.get(), Some(etags[1]));

        assert_eq!(keys(reader.documents_after(etags[1], 10, None)), ["c"]);
        assert!(keys(reader.documents_after(etags[2], 10, None)).is_empty());
    }

    #[test]
    fn test_forward_walk_prefix_still_advances_marker() {
        let (storage, etags) = storage_with(&["Users/1", "orders/1", "users/2", "orders/2"]);
        let txn = storage.begin_read();
        let options = EtagScanOptions::builder().after(Etag::EMPTY).prefix("USERS/").build();
        let mut iter = storage.reader(&txn).documents_after_with(options);

        assert_eq!(keys(iter.by_ref()), ["Users/1", "users/2"]);
        assert_eq!(iter.stop_reason(), Some(StopReason::Exhausted));
        assert_eq!(iter.last_considered(), Some(etags[3]));
    }

    #[test]
    fn test_forward_walk_stops_at_until_and_max_size() {
        let (storage, etags) = storage_with(&["a", "b", "c"]);
        let txn = storage.begin_read();
        let reader = storage.reader(&txn);

        let options = EtagScanOptions::builder().after(Etag::EMPTY).until(etags[1]).build();
        let mut iter = reader.documents_after_with(options);
        assert_eq!(keys(iter.by_ref()), ["a", "b"]);
        assert_eq!(iter.stop_reason(), Some(StopReason::UntilReached));
        assert_eq!(iter.last_considered(), Some(etags[1]));

        let mut iter = reader.documents_after(Etag::EMPTY, 10, Some(1));
        assert_eq!(keys(iter.by_ref()), ["a"]);
        assert_eq!(iter.stop_reason(), Some(StopReason::MaxSizeReached));
    }

    #[test]
    fn test_forward_walk_cancellation_reports_progress() {
        let (storage, etags) = storage_with(&["a", "b", "c"]);
        let txn = storage.begin_read();
        let flag = CancellationFlag::new();
        let options = EtagScanOptions::builder()
            .after(Etag::EMPTY)
            .cancellation(flag.clone())
            .build();

        let reported = Cell::new(None);
        let mut iter = storage
            .reader(&txn)
            .documents_after_with(options)
            .on_last_considered(|etag| reported.set(etag));
        assert!(iter.next().unwrap().is_ok());
        flag.cancel();
        assert!(iter.next().is_none());
        assert_eq!(iter.stop_reason(), Some(StopReason::Cancelled));
        drop(iter);
        assert_eq!(reported.get(), Some(etags[0]));
    }

    #[test]
    fn test_forward_walk_zero_timeout() {
        let (storage, _) = storage_with(&["a", "b"]);
        let txn = storage.begin_read();
        let options = EtagScanOptions::builder()
            .after(Etag::EMPTY)
            .timeout(Duration::ZERO)
            .build();
        let mut iter = storage.reader(&txn).documents_after_with(options);
        std::thread::sleep(Duration::from_millis(2));
        assert!(keys(iter.by_ref()).is_empty());
        assert_eq!(iter.stop_reason(), Some(StopReason::TimedOut));
    }

    #[test]
    fn test_forward_walk_dropped_early_still_reports() {
        let (storage, etags) = storage_with(&["a", "b", "c"]);
        let txn = storage.begin_read();
        let reported = Cell::new(None);
        {
            let mut iter = storage
                .reader(&txn)
                .documents_after(Etag::EMPTY, 10, None)
                .on_last_considered(|etag| reported.set(etag));
            iter.next();
        }
        assert_eq!(reported.get(), Some(etags[0]));
    }

    #[test]
    fn test_forward_walk_take_zero_reports_nothing() {
        let (storage, _) = storage_with(&["a", "b"]);
        let txn = storage.begin_read();
        let called = Cell::new(false);
        {
            let mut iter = storage
                .reader(&txn)
                .documents_after(Etag::EMPTY, 0, None)
                .on_last_considered(|_| called.set(true));
            assert!(iter.next().is_none());
            assert_eq!(iter.stop_reason(), Some(StopReason::TakeReached));
            assert_eq!(iter.last_considered(), None);
        }
        assert!(!called.get());
    }

    #[test]
    fn test_forward_walk_fails_on_dangling_index_entry() {
        let (storage, etags) = storage_with(&["a"]);
        let dangling = etags[0].increment();
        {
            let mut txn = storage.db().write().unwrap();
            txn.insert::<DocumentsByEtag>(&dangling.to_bytes(), b"ghost".to_vec()).unwrap();
            txn.commit().unwrap();
        }
        let txn = storage.begin_read();
        let called = Cell::new(false);
        let mut iter = storage
            .reader(&txn)
            .documents_after(Etag::EMPTY, 10, None)
            .on_last_considered(|_| called.set(true));

        assert_eq!(iter.next().unwrap().unwrap().key, "a");
        match iter.next() {
            Some(Err(DocumentError::Corruption { key, reason, .. })) => {
                assert_eq!(key, "ghost");
                assert!(reason.contains("does not exist"), "{reason}");
            },
            other => panic!("expected corruption, got {other:?}"),
        }
        assert!(iter.next().is_none());
        assert_eq!(iter.last_considered(), Some(dangling));
        drop(iter);
        assert!(!called.get(), "a failed walk reports no progress");
    }

    #[test]
    fn test_forward_walk_fails_when_index_and_metadata_etags_differ() {
        let (storage, etags) = storage_with(&["a", "b"]);
        let stray = etags[1].increment();
        {
            let mut txn = storage.db().write().unwrap();
            txn.insert::<DocumentsByEtag>(&stray.to_bytes(), b"a".to_vec()).unwrap();
            txn.commit().unwrap();
        }
        let txn = storage.begin_read();
        let mut iter = storage.reader(&txn).documents_after(etags[1], 10, None);

        match iter.next() {
            Some(Err(DocumentError::Corruption { key, reason, .. })) => {
                assert_eq!(key, "a");
                assert!(reason.contains(&stray.to_string()), "{reason}");
                assert!(reason.contains(&etags[0].to_string()), "{reason}");
            },
            other => panic!("expected corruption, got {other:?}"),
        }
        assert!(iter.next().is_none());
        assert_eq!(iter.stop_reason(), None);
    }

    #[test]
    fn test_prefix_scan_skips_data_without_metadata() {
        let (storage, _) = storage_with(&["a/1", "a/3"]);
        {
            let mut txn = storage.db().write().unwrap();
            txn.insert::<Documents>(b"a/2", b"{}".to_vec()).unwrap();
            txn.insert::<Documents>(b"a/4", b"{}".to_vec()).unwrap();
            txn.commit().unwrap();
        }
        let txn = storage.begin_read();
        let reader = storage.reader(&txn);

        assert_eq!(keys(reader.documents_with_prefix("a/", 0, 10, None).unwrap()), ["a/1", "a/3"]);
        // Skipped entries do not count against `take`.
        assert_eq!(keys(reader.documents_with_prefix("a/", 0, 2, None).unwrap()), ["a/1", "a/3"]);
    }

    #[test]
    fn test_prefix_scan_and_resume() {
        let (storage, _) = storage_with(&["a/1", "a/2", "b/1"]);
        let txn = storage.begin_read();
        let reader = storage.reader(&txn);

        assert_eq!(keys(reader.documents_with_prefix("A/", 0, 10, None).unwrap()), ["a/1", "a/2"]);
        assert_eq!(keys(reader.documents_with_prefix("a/", 0, 10, Some("a/1")).unwrap()), ["a/2"]);
        assert_eq!(keys(reader.documents_with_prefix("a/", 1, 10, None).unwrap()), ["a/2"]);
        assert_eq!(keys(reader.documents_with_prefix("a/", 0, 1, None).unwrap()), ["a/1"]);
        // Resuming always steps past the landing position.
        assert_eq!(keys(reader.documents_with_prefix("a/", 0, 10, Some("a/0")).unwrap()), ["a/2"]);
        assert!(keys(reader.documents_with_prefix("a/", 0, 10, Some("b/0")).unwrap()).is_empty());
        assert!(keys(reader.documents_with_prefix("c/", 0, 10, None).unwrap()).is_empty());
        assert!(matches!(
            reader.documents_with_prefix("", 0, 10, None),
            Err(DocumentError::Validation { .. })
        ));
    }
}

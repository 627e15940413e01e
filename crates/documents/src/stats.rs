//! Diagnostic document statistics.
//!
//! Computing them walks the whole version index and decodes every document,
//! so this is meant for debugging endpoints, never for hot paths.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use folio_store::ReadableTables;
use folio_types::Etag;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    document::Document, error::Result, keys::starts_with_ignore_case, reader::DocumentReader,
};

/// A document and its size, as listed in [`CollectionStats::top_documents`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSize {
    /// Document key.
    pub key: String,
    /// Size on disk in bytes.
    pub size: u64,
}

/// Counters for one bucket of documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    /// Number of documents.
    pub count: u64,
    /// Total size on disk in bytes.
    pub total_size: u64,
    /// Largest documents, biggest first.
    pub top_documents: Vec<DocumentSize>,
}

impl CollectionStats {
    fn record(&mut self, key: &str, size: u64, top: usize) {
        self.count += 1;
        self.total_size += size;

        let position = self.top_documents.partition_point(|entry| entry.size >= size);
        if position < top {
            self.top_documents.insert(position, DocumentSize { key: key.to_string(), size });
            self.top_documents.truncate(top);
        }
    }
}

/// Result of a full statistics scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    /// Number of stored documents.
    pub total: u64,
    /// Total size on disk of every document.
    pub total_size: u64,
    /// Documents carrying the delete marker field.
    pub tombstones: u64,
    /// Documents under the system key prefix.
    pub system: CollectionStats,
    /// Documents without a collection name.
    pub no_collection: CollectionStats,
    /// Documents by collection name.
    pub collections: BTreeMap<String, CollectionStats>,
    /// How long the scan took.
    pub time_to_generate: Duration,
}

impl<R: ReadableTables> DocumentReader<'_, R> {
    /// Walks every document and aggregates sizes by collection.
    ///
    /// System documents are counted in [`DocumentStats::system`] and again in
    /// their collection bucket, or the no-collection bucket if they have none.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if an indexed document cannot be loaded.
    pub fn stats(&self) -> Result<DocumentStats> {
        let started = Instant::now();
        let config = self.storage().config();
        let top = config.stats_top_documents;

        let mut stats = DocumentStats { total: self.documents_count(), ..DocumentStats::default() };
        for document in self.documents_after(Etag::EMPTY, usize::MAX, None) {
            let Document { key, metadata, size_on_disk: size, .. } = document?;
            stats.total_size += size;

            if starts_with_ignore_case(&key, &config.system_key_prefix) {
                stats.system.record(&key, size, top);
            }
            match metadata.get(&config.collection_field).and_then(|value| value.as_str()) {
                Some(collection) if !collection.is_empty() => {
                    let bucket = stats.collections.entry(collection.to_string()).or_default();
                    bucket.record(&key, size, top);
                },
                _ => stats.no_collection.record(&key, size, top),
            }
            if metadata.contains_key(&config.delete_marker_field) {
                stats.tombstones += 1;
            }
        }

        stats.time_to_generate = started.elapsed();
        if stats.time_to_generate > config.slow_scan_threshold {
            warn!(
                elapsed_ms = stats.time_to_generate.as_millis() as u64,
                total = stats.total,
                "Slow document stats scan"
            );
        } else {
            info!(
                elapsed_ms = stats.time_to_generate.as_millis() as u64,
                total = stats.total,
                collections = stats.collections.len(),
                "Document stats computed"
            );
        }
        Ok(stats)
    }
}

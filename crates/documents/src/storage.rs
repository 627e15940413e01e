//! Document storage: the entry point tying the database, codecs, cache and
//! etag generator together.

use std::sync::Arc;

use folio_store::{Database, ReadTransaction, ReadableTables, tables::Sequences};
use folio_types::{
    EtagGenerator, SequentialEtagGenerator, config::DocumentStorageConfig, decode, encode,
};
use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    cache::{DocumentCache, InMemoryDocumentCache},
    codec::CodecChain,
    error::{ConfigSnafu, RecordSnafu, Result, StorageSnafu},
    reader::DocumentReader,
    transaction::DocumentTransaction,
};

/// Sequences table key holding the etag generator's restart counter.
const ETAG_RESTARTS_KEY: &[u8] = b"etag/restarts";

/// Sequences table key holding the newest etag any unit of work has issued.
pub(crate) const LAST_ETAG_KEY: &[u8] = b"etag/last";

/// Document storage over a [`Database`].
///
/// Cheap to share behind an `Arc`: all state lives in the database, the cache
/// and the etag generator, each of which is thread-safe.
pub struct DocumentStorage {
    db: Arc<Database>,
    config: DocumentStorageConfig,
    codecs: CodecChain,
    cache: Option<Arc<dyn DocumentCache>>,
    etags: Arc<dyn EtagGenerator>,
}

#[bon::bon]
impl DocumentStorage {
    /// Creates document storage over `db`.
    ///
    /// Without an explicit `cache`, an [`InMemoryDocumentCache`] sized by
    /// `config.cache_capacity` is installed (none when the capacity is 0).
    /// Without an explicit `etag_generator`, a [`SequentialEtagGenerator`] is
    /// started one restart generation above the last one recorded in `db`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Config`](crate::DocumentError::Config) if
    /// `config` is invalid, or a storage error if the restart counter cannot
    /// be persisted.
    #[builder]
    pub fn new(
        db: Arc<Database>,
        #[builder(default)] config: DocumentStorageConfig,
        #[builder(default)] codecs: CodecChain,
        cache: Option<Arc<dyn DocumentCache>>,
        etag_generator: Option<Arc<dyn EtagGenerator>>,
    ) -> Result<Self> {
        config.validate().context(ConfigSnafu)?;

        let cache = cache.or_else(|| {
            (config.cache_capacity > 0).then(|| {
                let cache: Arc<dyn DocumentCache> =
                    Arc::new(InMemoryDocumentCache::new(config.cache_capacity));
                cache
            })
        });
        let etags: Arc<dyn EtagGenerator> = match etag_generator {
            Some(etags) => etags,
            None => Arc::new(resume_etag_generator(&db)?),
        };

        debug!(
            codecs = ?codecs.names(),
            cached = cache.is_some(),
            "Document storage opened"
        );
        Ok(Self { db, config, codecs, cache, etags })
    }
}

impl DocumentStorage {
    /// The underlying database.
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Storage configuration.
    pub fn config(&self) -> &DocumentStorageConfig {
        &self.config
    }

    /// Installed codecs.
    pub fn codecs(&self) -> &CodecChain {
        &self.codecs
    }

    /// Installed document cache, if any.
    pub fn cache(&self) -> Option<&dyn DocumentCache> {
        self.cache.as_deref()
    }

    /// Etag source for writes and touches.
    pub fn etag_generator(&self) -> &dyn EtagGenerator {
        self.etags.as_ref()
    }

    /// Creates a reader over an open transaction.
    pub fn reader<'a, R: ReadableTables>(&'a self, tables: &'a R) -> DocumentReader<'a, R> {
        DocumentReader::new(tables, self)
    }

    /// Begins a read transaction on the current snapshot.
    pub fn begin_read(&self) -> ReadTransaction {
        self.db.read()
    }

    /// Begins a unit of work. Blocks while another one is in progress.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the writer lock is poisoned.
    pub fn begin_write(&self) -> Result<DocumentTransaction<'_>> {
        let txn = self.db.write().context(StorageSnafu)?;
        Ok(DocumentTransaction::new(self, txn))
    }

    /// Runs `f` against a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn with_read<T>(
        &self,
        f: impl FnOnce(&DocumentReader<'_, ReadTransaction>) -> Result<T>,
    ) -> Result<T> {
        let txn = self.db.read();
        f(&self.reader(&txn))
    }

    /// Runs `f` in a unit of work, committing if it succeeds.
    ///
    /// The unit of work is discarded if `f` fails.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a storage error from begin or commit.
    pub fn with_write<T>(
        &self,
        f: impl FnOnce(&mut DocumentTransaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut txn = self.begin_write()?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            },
            Err(err) => {
                txn.abort();
                Err(err)
            },
        }
    }
}

impl std::fmt::Debug for DocumentStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStorage")
            .field("config", &self.config)
            .field("codecs", &self.codecs)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Starts a generator one restart generation above the last recorded one.
fn resume_etag_generator(db: &Database) -> Result<SequentialEtagGenerator> {
    let mut txn = db.write().context(StorageSnafu)?;
    let previous = match txn.get::<Sequences>(ETAG_RESTARTS_KEY) {
        Some(bytes) => decode::<u64>(bytes).context(RecordSnafu)?,
        None => 0,
    };
    let restarts = previous + 1;
    txn.insert::<Sequences>(ETAG_RESTARTS_KEY, encode(&restarts).context(RecordSnafu)?)
        .context(StorageSnafu)?;
    txn.commit().context(StorageSnafu)?;

    info!(restarts, "Etag generator resumed");
    Ok(SequentialEtagGenerator::new(restarts))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use folio_types::{EtagCategory, config::DocumentStorageConfig};
    use serde_json::json;

    use super::*;
    use crate::{DocumentError, JsonObject};

    #[test]
    fn test_restart_generation_increases_per_open() {
        let db = Arc::new(Database::open_in_memory());
        let first = DocumentStorage::builder().db(db.clone()).build().unwrap();
        let second = DocumentStorage::builder().db(db.clone()).build().unwrap();

        let a = first.etag_generator().next_etag(EtagCategory::Documents);
        let b = second.etag_generator().next_etag(EtagCategory::Documents);
        assert_eq!(a.restarts() & 0x00FF_FFFF_FFFF_FFFF, 1);
        assert!(b > a, "a reopened storage never reissues older etags");
    }

    #[test]
    fn test_default_cache_follows_capacity() {
        let db = Arc::new(Database::open_in_memory());
        let cached = DocumentStorage::builder().db(db.clone()).build().unwrap();
        assert!(cached.cache().is_some());

        let config = DocumentStorageConfig::builder().cache_capacity(0).build().unwrap();
        let uncached = DocumentStorage::builder().db(db).config(config).build().unwrap();
        assert!(uncached.cache().is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = DocumentStorageConfig { compression_level: 0, ..Default::default() };
        let err = DocumentStorage::builder()
            .db(Arc::new(Database::open_in_memory()))
            .config(config)
            .build()
            .unwrap_err();
        assert!(matches!(err, DocumentError::Config { .. }));
    }

    #[test]
    fn test_with_write_discards_on_error() {
        let storage =
            DocumentStorage::builder().db(Arc::new(Database::open_in_memory())).build().unwrap();
        let data = json!({"v": 1}).as_object().cloned().unwrap();

        let result: Result<()> = storage.with_write(|txn| {
            txn.add_document("a", None, &data, &JsonObject::new())?;
            txn.insert_document("a", &data, &JsonObject::new(), false)?;
            Ok(())
        });
        assert!(matches!(result, Err(DocumentError::Concurrency { .. })));
        assert!(storage.with_read(|reader| reader.document_by_key("a")).unwrap().is_none());
    }
}

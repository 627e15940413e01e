//! Database and transaction management for the folio store.
//!
//! Provides atomic transactions over the 4 fixed tables. Uses a single-writer
//! model: any number of read transactions run against immutable snapshots
//! while at most one write transaction buffers changes.
//!
//! Each table is a copy-on-write [`BTree`]: a commit copies only the nodes on
//! the paths it changes and shares everything else with the previous
//! snapshot. A file-backed database also appends every commit to a
//! [commit log](crate::commit_log) before publishing it, and replays that log
//! on open.
//!
//! # Example
//!
//! ```no_run
//! use folio_store::{Database, ReadableTables, tables};
//!
//! let db = Database::open_in_memory();
//!
//! // Write transaction
//! {
//!     let mut txn = db.write()?;
//!     txn.insert::<tables::Sequences>(b"counter", vec![1, 2, 3])?;
//!     txn.commit()?;
//! }
//!
//! // Read transaction
//! {
//!     let txn = db.read();
//!     let value = txn.get::<tables::Sequences>(b"counter");
//!     assert_eq!(value, Some(&[1u8, 2, 3][..]));
//! }
//! # Ok::<(), folio_store::Error>(())
//! ```

use std::{
    collections::BTreeMap,
    ops::Bound,
    path::Path,
    sync::{
        Arc, Mutex, MutexGuard, TryLockError,
        atomic::{AtomicU64, Ordering},
    },
};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::{
    btree::BTree,
    commit_log::{Change, CommitLog, CommitRecord},
    cursor::Cursor,
    error::{Error, Result},
    tables::{Table, TableId},
};

/// Default maximum key size: 128 KiB.
pub const DEFAULT_MAX_KEY_SIZE: usize = 128 * 1024;

pub(crate) type TableMap = BTree;
pub(crate) type PendingMap = BTreeMap<Vec<u8>, Option<Slot>>;

/// A stored value together with its compare-and-swap version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Slot {
    pub(crate) value: Vec<u8>,
    pub(crate) version: u16,
}

impl Slot {
    /// Version assigned by the next write to a slot at `current` (0 = absent).
    fn next_version(current: u16) -> u16 {
        match current.wrapping_add(1) {
            0 => 1,
            version => version,
        }
    }
}

/// Database configuration options.
#[derive(Debug, Clone, bon::Builder)]
pub struct DatabaseConfig {
    /// Maximum key size in bytes (default 128 KiB).
    #[builder(default = DEFAULT_MAX_KEY_SIZE)]
    pub max_key_size: usize,
    /// Whether to sync the commit log on every commit (default true for
    /// durability). Ignored by in-memory databases.
    #[builder(default = true)]
    pub sync_on_commit: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { max_key_size: DEFAULT_MAX_KEY_SIZE, sync_on_commit: true }
    }
}

/// Immutable state published by each commit.
#[derive(Debug, Clone)]
pub(crate) struct CommittedState {
    tables: [TableMap; TableId::COUNT],
    snapshot_id: u64,
}

impl CommittedState {
    fn empty() -> Self {
        Self { tables: std::array::from_fn(|_| TableMap::new()), snapshot_id: 0 }
    }
}

/// The main database handle.
///
/// Thread-safe with interior mutability. Supports concurrent reads
/// and exclusive writes (single-writer model).
///
/// # Transaction Isolation
///
/// - Read transactions capture an immutable snapshot at start (no locks held)
/// - Write transactions buffer changes on top of the snapshot they started from
/// - Commit applies the buffer to the touched tables, copying only the tree
///   nodes it changes, and swaps the published state atomically
///
/// Readers never block writers and writers don't block readers.
pub struct Database {
    /// Current committed state (atomically swapped on commit).
    committed_state: ArcSwap<CommittedState>,
    /// Configuration.
    config: DatabaseConfig,
    /// Ensures only one write transaction at a time.
    write_lock: Mutex<()>,
    /// Total commits since the database was opened.
    commits: AtomicU64,
    /// Durable record of every commit; `None` for in-memory databases.
    log: Option<CommitLog>,
}

impl Database {
    /// Creates an empty in-memory database with default configuration.
    pub fn open_in_memory() -> Self {
        Self::open_in_memory_with_config(DatabaseConfig::default())
    }

    /// Creates an empty in-memory database with the given configuration.
    ///
    /// Data is lost on drop.
    pub fn open_in_memory_with_config(config: DatabaseConfig) -> Self {
        Self::from_parts(CommittedState::empty(), config, None)
    }

    /// Creates a new file-backed database at `path` with default configuration,
    /// replacing any file already there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be created.
    ///
    /// ```no_run
    /// use folio_store::{Database, tables::Documents};
    ///
    /// let db = Database::create("/var/lib/folio/documents.log")?;
    /// let mut txn = db.write()?;
    /// txn.insert::<Documents>(b"users/1", b"{}".to_vec())?;
    /// txn.commit()?;
    /// # Ok::<(), folio_store::Error>(())
    /// ```
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_config(path, DatabaseConfig::default())
    }

    /// Creates a new file-backed database with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be created.
    pub fn create_with_config<P: AsRef<Path>>(path: P, config: DatabaseConfig) -> Result<Self> {
        let log = CommitLog::create(path.as_ref(), config.sync_on_commit)?;
        Ok(Self::from_parts(CommittedState::empty(), config, Some(log)))
    }

    /// Opens an existing file-backed database, replaying its commit log.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or [`Error::Corrupted`]
    /// if the log is damaged anywhere but its last frame.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, DatabaseConfig::default())
    }

    /// Opens an existing file-backed database with custom configuration.
    ///
    /// # Errors
    ///
    /// Same as [`Self::open`].
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: DatabaseConfig) -> Result<Self> {
        let (log, recovered) = CommitLog::open(path.as_ref(), config.sync_on_commit)?;
        let state =
            CommittedState { tables: recovered.tables, snapshot_id: recovered.snapshot_id };
        Ok(Self::from_parts(state, config, Some(log)))
    }

    fn from_parts(state: CommittedState, config: DatabaseConfig, log: Option<CommitLog>) -> Self {
        Self {
            committed_state: ArcSwap::from_pointee(state),
            config,
            write_lock: Mutex::new(()),
            commits: AtomicU64::new(0),
            log,
        }
    }

    /// Whether commits are written to a commit log.
    pub fn is_persistent(&self) -> bool {
        self.log.is_some()
    }

    /// Returns the database configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Begin a read-only transaction.
    ///
    /// Captures an immutable snapshot of the database state. No locks are held
    /// after this returns, allowing full concurrency with write transactions.
    pub fn read(&self) -> ReadTransaction {
        // load_full() returns the Arc directly; a Guard would hold up writers
        ReadTransaction { snapshot: self.committed_state.load_full() }
    }

    /// Begin a write transaction, waiting for any active writer to finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Poisoned`] if the write lock is poisoned.
    pub fn write(&self) -> Result<WriteTransaction<'_>> {
        let write_guard = self.write_lock.lock().map_err(|_| Error::Poisoned)?;
        Ok(self.begin_write(write_guard))
    }

    /// Begin a write transaction without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteTransactionInProgress`] if another write transaction
    /// is active, or [`Error::Poisoned`] if the write lock is poisoned.
    pub fn try_write(&self) -> Result<WriteTransaction<'_>> {
        let write_guard = match self.write_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(Error::WriteTransactionInProgress),
            Err(TryLockError::Poisoned(_)) => return Err(Error::Poisoned),
        };
        Ok(self.begin_write(write_guard))
    }

    fn begin_write<'db>(&'db self, write_guard: MutexGuard<'db, ()>) -> WriteTransaction<'db> {
        WriteTransaction {
            db: self,
            base: self.committed_state.load_full(),
            pending: std::array::from_fn(|_| PendingMap::new()),
            _write_guard: write_guard,
        }
    }

    /// Rewrites the commit log as a single frame holding the current state.
    ///
    /// Waits for any active writer. Returns the new log size in bytes, or
    /// `None` for an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Poisoned`] if the write lock is poisoned, or
    /// [`Error::Io`] if the new log cannot be written.
    pub fn compact(&self) -> Result<Option<u64>> {
        let Some(log) = &self.log else {
            return Ok(None);
        };
        let _write_guard = self.write_lock.lock().map_err(|_| Error::Poisoned)?;
        let state = self.committed_state.load_full();
        log.compact(state.snapshot_id, &state.tables).map(Some)
    }

    /// Returns database statistics.
    pub fn stats(&self) -> DatabaseStats {
        let state = self.committed_state.load();
        let table_entries = TableId::all().map(|id| (id, state.tables[id as usize].len() as u64));
        DatabaseStats {
            snapshot_id: state.snapshot_id,
            commits: self.commits.load(Ordering::Relaxed),
            table_entries,
            log_bytes: self.log.as_ref().map(CommitLog::len),
        }
    }
}

/// Database statistics.
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Identifier of the latest committed snapshot.
    pub snapshot_id: u64,
    /// Total commits since the database was opened.
    pub commits: u64,
    /// Committed entry count per table.
    pub table_entries: [(TableId, u64); TableId::COUNT],
    /// Size of the commit log in bytes; `None` for in-memory databases.
    pub log_bytes: Option<u64>,
}

impl DatabaseStats {
    /// Committed entry count of `table`.
    pub fn entries(&self, table: TableId) -> u64 {
        self.table_entries[table as usize].1
    }
}

// ============================================================================
// Table Access
// ============================================================================

/// Read access shared by read and write transactions.
///
/// A write transaction sees its own uncommitted changes.
pub trait ReadableTables {
    /// Returns a view over `table` as seen by this transaction.
    fn table(&self, id: TableId) -> TableView<'_>;

    /// Returns a value by key from a table.
    fn get<T: Table>(&self, key: &[u8]) -> Option<&[u8]> {
        self.table(T::ID).get(key)
    }

    /// Returns a value and its slot version.
    fn get_with_version<T: Table>(&self, key: &[u8]) -> Option<(&[u8], u16)> {
        self.table(T::ID).get_with_version(key)
    }

    /// Checks if a key exists in a table.
    fn contains<T: Table>(&self, key: &[u8]) -> bool {
        self.table(T::ID).contains(key)
    }

    /// Returns the number of entries in a table.
    fn len<T: Table>(&self) -> u64 {
        self.table(T::ID).len()
    }

    /// Opens an unpositioned cursor over a table.
    fn cursor<T: Table>(&self) -> Cursor<'_> {
        Cursor::new(self.table(T::ID))
    }
}

/// A borrowed view of one table: the snapshot plus any pending changes.
#[derive(Debug, Clone, Copy)]
pub struct TableView<'a> {
    id: TableId,
    base: &'a TableMap,
    pending: Option<&'a PendingMap>,
}

impl<'a> TableView<'a> {
    /// Table this view reads.
    pub fn id(&self) -> TableId {
        self.id
    }

    fn slot(&self, key: &[u8]) -> Option<&'a Slot> {
        if let Some(entry) = self.pending.and_then(|pending| pending.get(key)) {
            return entry.as_ref();
        }
        self.base.get(key)
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Option<&'a [u8]> {
        self.slot(key).map(|slot| slot.value.as_slice())
    }

    /// Returns the value stored under `key` and its slot version.
    pub fn get_with_version(&self, key: &[u8]) -> Option<(&'a [u8], u16)> {
        self.slot(key).map(|slot| (slot.value.as_slice(), slot.version))
    }

    /// Slot version of `key`, or 0 if absent.
    pub fn version(&self, key: &[u8]) -> u16 {
        self.slot(key).map_or(0, |slot| slot.version)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.slot(key).is_some()
    }

    /// Number of entries visible through this view.
    pub fn len(&self) -> u64 {
        let mut len = self.base.len() as u64;
        if let Some(pending) = self.pending {
            for (key, entry) in pending {
                match (self.base.contains_key(key), entry.is_some()) {
                    (true, false) => len -= 1,
                    (false, true) => len += 1,
                    _ => {},
                }
            }
        }
        len
    }

    /// Whether the view has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First visible entry whose key is within `start`.
    pub(crate) fn first_from(&self, start: Bound<&[u8]>) -> Option<(&'a [u8], &'a Slot)> {
        let (base, pending) = (self.base, self.pending);
        let shadowed = |key: &[u8]| pending.is_some_and(|p| p.contains_key(key));

        let from_base = base.range_from(start).find(|(key, _)| !shadowed(key));
        let from_pending = pending.and_then(|p| {
            p.range::<[u8], _>((start, Bound::Unbounded))
                .find_map(|(key, entry)| entry.as_ref().map(|slot| (key.as_slice(), slot)))
        });

        match (from_base, from_pending) {
            (Some(b), Some(p)) => Some(if p.0 < b.0 { p } else { b }),
            (b, p) => b.or(p),
        }
    }

    /// Last visible entry whose key is within `end`.
    pub(crate) fn last_before(&self, end: Bound<&[u8]>) -> Option<(&'a [u8], &'a Slot)> {
        let (base, pending) = (self.base, self.pending);
        let shadowed = |key: &[u8]| pending.is_some_and(|p| p.contains_key(key));

        let from_base = base.range_to(end).find(|(key, _)| !shadowed(key));
        let from_pending = pending.and_then(|p| {
            p.range::<[u8], _>((Bound::Unbounded, end))
                .rev()
                .find_map(|(key, entry)| entry.as_ref().map(|slot| (key.as_slice(), slot)))
        });

        match (from_base, from_pending) {
            (Some(b), Some(p)) => Some(if p.0 > b.0 { p } else { b }),
            (b, p) => b.or(p),
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// A read-only transaction.
///
/// Holds the snapshot that was current when it began. No locks are held,
/// and the snapshot stays valid for as long as the transaction lives.
pub struct ReadTransaction {
    snapshot: Arc<CommittedState>,
}

impl ReadTransaction {
    /// Identifier of the snapshot this transaction reads.
    pub fn snapshot_id(&self) -> u64 {
        self.snapshot.snapshot_id
    }
}

impl ReadableTables for ReadTransaction {
    fn table(&self, id: TableId) -> TableView<'_> {
        TableView { id, base: &self.snapshot.tables[id as usize], pending: None }
    }
}

/// A write transaction.
///
/// Changes are buffered until commit and are visible to this transaction's
/// own reads. On commit, all changes become visible to new read transactions
/// at once.
///
/// **Drop behavior:** If a `WriteTransaction` is dropped without calling
/// `commit()`, the buffered changes are discarded and the database state
/// remains unchanged.
pub struct WriteTransaction<'db> {
    db: &'db Database,
    base: Arc<CommittedState>,
    pending: [PendingMap; TableId::COUNT],
    _write_guard: MutexGuard<'db, ()>,
}

impl<'db> WriteTransaction<'db> {
    /// Identifier of the snapshot this transaction builds on.
    pub fn snapshot_id(&self) -> u64 {
        self.base.snapshot_id
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        let max = self.db.config.max_key_size;
        if key.len() > max {
            return Err(Error::KeyTooLarge { size: key.len(), max });
        }
        Ok(())
    }

    /// Stores `value` under `key`, returning the new slot version.
    ///
    /// With `expected_version = Some(v)` the write only succeeds if the slot's
    /// current version is `v`, where 0 means "absent".
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyTooLarge`] if the key exceeds the configured limit, or
    /// [`Error::SlotVersionMismatch`] if `expected_version` does not match.
    pub fn put<T: Table>(
        &mut self,
        key: &[u8],
        value: Vec<u8>,
        expected_version: Option<u16>,
    ) -> Result<u16> {
        self.check_key(key)?;
        let current = self.table(T::ID).version(key);
        if let Some(expected) = expected_version {
            if expected != current {
                return Err(Error::SlotVersionMismatch {
                    table: T::ID.name(),
                    expected,
                    actual: current,
                });
            }
        }
        let version = Slot::next_version(current);
        self.pending[T::ID as usize].insert(key.to_vec(), Some(Slot { value, version }));
        Ok(version)
    }

    /// Stores `value` under `key` unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyTooLarge`] if the key exceeds the configured limit.
    pub fn insert<T: Table>(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.put::<T>(key, value, None).map(|_| ())
    }

    /// Removes `key`, returning whether it was present.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature matches [`Self::delete_versioned`].
    pub fn delete<T: Table>(&mut self, key: &[u8]) -> Result<bool> {
        self.delete_versioned::<T>(key, None)
    }

    /// Removes `key` if its slot version matches `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SlotVersionMismatch`] if `expected_version` does not match.
    pub fn delete_versioned<T: Table>(
        &mut self,
        key: &[u8],
        expected_version: Option<u16>,
    ) -> Result<bool> {
        let current = self.table(T::ID).version(key);
        if let Some(expected) = expected_version {
            if expected != current {
                return Err(Error::SlotVersionMismatch {
                    table: T::ID.name(),
                    expected,
                    actual: current,
                });
            }
        }
        if current == 0 {
            return Ok(false);
        }
        self.pending[T::ID as usize].insert(key.to_vec(), None);
        Ok(true)
    }

    /// Whether the transaction has buffered any change.
    pub fn is_dirty(&self) -> bool {
        self.pending.iter().any(|changes| !changes.is_empty())
    }

    /// Publishes all buffered changes atomically.
    ///
    /// A file-backed database appends the changes to its commit log first; if
    /// that fails nothing is published.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Encoding`] if the commit log append
    /// fails. Never fails for an in-memory database.
    pub fn commit(self) -> Result<()> {
        let Self { db, base, pending, _write_guard } = self;
        let snapshot_id = base.snapshot_id + 1;

        if let Some(log) = &db.log {
            let changes = TableId::all()
                .into_iter()
                .zip(&pending)
                .flat_map(|(table, changes)| {
                    changes.iter().map(move |(key, entry)| Change {
                        table: table as u8,
                        key: key.clone(),
                        slot: entry.as_ref().map(|slot| (slot.value.clone(), slot.version)),
                    })
                })
                .collect();
            log.append(&CommitRecord { snapshot_id, changes })?;
        }

        let mut tables = base.tables.clone();
        let mut tables_touched = 0usize;
        for (map, changes) in tables.iter_mut().zip(pending) {
            if changes.is_empty() {
                continue;
            }
            tables_touched += 1;
            for (key, entry) in changes {
                match entry {
                    Some(slot) => {
                        map.insert(key, slot);
                    },
                    None => {
                        map.remove(&key);
                    },
                }
            }
        }

        db.committed_state.store(Arc::new(CommittedState { tables, snapshot_id }));
        db.commits.fetch_add(1, Ordering::Relaxed);
        debug!(snapshot_id, tables_touched, "Committed write transaction");
        Ok(())
    }

    /// Discards all buffered changes.
    pub fn abort(self) {
        debug!(snapshot_id = self.base.snapshot_id, "Aborted write transaction");
    }
}

impl ReadableTables for WriteTransaction<'_> {
    fn table(&self, id: TableId) -> TableView<'_> {
        TableView {
            id,
            base: &self.base.tables[id as usize],
            pending: Some(&self.pending[id as usize]),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::thread;

    use super::*;
    use crate::tables::{Documents, DocumentsByEtag, Sequences};

    #[test]
    fn test_read_sees_committed_writes_only() {
        let db = Database::open_in_memory();
        let before = db.read();

        let mut txn = db.write().unwrap();
        txn.insert::<Documents>(b"users/1", b"one".to_vec()).unwrap();
        assert_eq!(txn.get::<Documents>(b"users/1"), Some(&b"one"[..]));
        assert!(db.read().get::<Documents>(b"users/1").is_none());
        txn.commit().unwrap();

        assert!(before.get::<Documents>(b"users/1").is_none(), "old snapshot is immutable");
        assert_eq!(db.read().get::<Documents>(b"users/1"), Some(&b"one"[..]));
    }

    #[test]
    fn test_drop_discards_changes() {
        let db = Database::open_in_memory();
        {
            let mut txn = db.write().unwrap();
            txn.insert::<Documents>(b"a", b"1".to_vec()).unwrap();
        }
        assert!(!db.read().contains::<Documents>(b"a"));

        let mut txn = db.write().unwrap();
        txn.insert::<Documents>(b"a", b"1".to_vec()).unwrap();
        txn.abort();
        assert!(!db.read().contains::<Documents>(b"a"));
    }

    #[test]
    fn test_slot_versions_advance() {
        let db = Database::open_in_memory();
        let mut txn = db.write().unwrap();
        assert_eq!(txn.put::<Documents>(b"k", b"v1".to_vec(), Some(0)).unwrap(), 1);
        assert_eq!(txn.put::<Documents>(b"k", b"v2".to_vec(), Some(1)).unwrap(), 2);
        assert_eq!(txn.get_with_version::<Documents>(b"k"), Some((&b"v2"[..], 2)));
        txn.commit().unwrap();
        assert_eq!(db.read().table(TableId::Documents).version(b"k"), 2);
    }

    #[test]
    fn test_put_version_mismatch() {
        let db = Database::open_in_memory();
        let mut txn = db.write().unwrap();
        txn.insert::<Documents>(b"k", b"v".to_vec()).unwrap();

        let err = txn.put::<Documents>(b"k", b"again".to_vec(), Some(0)).unwrap_err();
        assert!(matches!(
            err,
            Error::SlotVersionMismatch { table: "documents", expected: 0, actual: 1 }
        ));

        let err = txn.delete_versioned::<Documents>(b"k", Some(7)).unwrap_err();
        assert!(matches!(err, Error::SlotVersionMismatch { expected: 7, actual: 1, .. }));
    }

    #[test]
    fn test_slot_version_wraps_past_zero() {
        assert_eq!(Slot::next_version(0), 1);
        assert_eq!(Slot::next_version(41), 42);
        assert_eq!(Slot::next_version(u16::MAX), 1);
    }

    #[test]
    fn test_delete_reports_presence() {
        let db = Database::open_in_memory();
        let mut txn = db.write().unwrap();
        assert!(!txn.delete::<Documents>(b"missing").unwrap());
        txn.insert::<Documents>(b"k", b"v".to_vec()).unwrap();
        txn.commit().unwrap();

        let mut txn = db.write().unwrap();
        assert!(txn.delete::<Documents>(b"k").unwrap());
        assert!(!txn.contains::<Documents>(b"k"));
        assert!(!txn.delete::<Documents>(b"k").unwrap());
        txn.commit().unwrap();
        assert!(!db.read().contains::<Documents>(b"k"));
    }

    #[test]
    fn test_key_too_large() {
        let config = DatabaseConfig::builder().max_key_size(4).build();
        let db = Database::open_in_memory_with_config(config);
        let mut txn = db.write().unwrap();
        let err = txn.insert::<Documents>(b"12345", Vec::new()).unwrap_err();
        assert!(matches!(err, Error::KeyTooLarge { size: 5, max: 4 }));
    }

    #[test]
    fn test_len_merges_pending() {
        let db = Database::open_in_memory();
        let mut txn = db.write().unwrap();
        for key in [&b"a"[..], b"b", b"c"] {
            txn.insert::<DocumentsByEtag>(key, Vec::new()).unwrap();
        }
        txn.commit().unwrap();

        let mut txn = db.write().unwrap();
        txn.delete::<DocumentsByEtag>(b"a").unwrap();
        txn.insert::<DocumentsByEtag>(b"b", b"updated".to_vec()).unwrap();
        txn.insert::<DocumentsByEtag>(b"d", Vec::new()).unwrap();
        txn.insert::<DocumentsByEtag>(b"e", Vec::new()).unwrap();
        txn.delete::<DocumentsByEtag>(b"e").unwrap();
        assert_eq!(txn.len::<DocumentsByEtag>(), 3);
        assert_eq!(db.read().len::<DocumentsByEtag>(), 3);
        txn.commit().unwrap();
        assert_eq!(db.stats().entries(TableId::DocumentsByEtag), 3);
    }

    #[test]
    fn test_try_write_while_writer_active() {
        let db = Database::open_in_memory();
        let txn = db.write().unwrap();
        assert!(matches!(db.try_write(), Err(Error::WriteTransactionInProgress)));
        drop(txn);
        assert!(db.try_write().is_ok());
    }

    #[test]
    fn test_stats_track_commits() {
        let db = Database::open_in_memory();
        for i in 0..3u8 {
            let mut txn = db.write().unwrap();
            txn.insert::<Sequences>(&[i], vec![i]).unwrap();
            txn.commit().unwrap();
        }
        let stats = db.stats();
        assert_eq!(stats.commits, 3);
        assert_eq!(stats.snapshot_id, 3);
        assert_eq!(stats.entries(TableId::Sequences), 3);
        assert_eq!(stats.entries(TableId::Documents), 0);
    }

    #[test]
    fn test_commit_copies_only_changed_paths() {
        let db = Database::open_in_memory();
        let mut txn = db.write().unwrap();
        for i in 0..20_000u32 {
            txn.insert::<Documents>(format!("users/{i:08}").as_bytes(), vec![0; 16]).unwrap();
        }
        txn.commit().unwrap();
        let before = db.read();

        let mut txn = db.write().unwrap();
        txn.insert::<Documents>(b"users/00010000", b"changed".to_vec()).unwrap();
        txn.commit().unwrap();

        let after = db.read();
        let documents = &after.snapshot.tables[TableId::Documents as usize];
        assert!(documents.depth() >= 3);
        assert_eq!(documents.exclusive_nodes(), documents.depth());
        assert_eq!(before.get::<Documents>(b"users/00010000"), Some(&[0u8; 16][..]));
        assert_eq!(after.get::<Documents>(b"users/00010000"), Some(&b"changed"[..]));
    }

    // ========================================================================
    // File-backed databases
    // ========================================================================

    fn write_two_commits(db: &Database) {
        let mut txn = db.write().unwrap();
        txn.insert::<Documents>(b"a", b"1".to_vec()).unwrap();
        txn.insert::<Sequences>(b"s", b"9".to_vec()).unwrap();
        txn.commit().unwrap();

        let mut txn = db.write().unwrap();
        txn.put::<Documents>(b"a", b"2".to_vec(), Some(1)).unwrap();
        txn.delete::<Sequences>(b"s").unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.log");
        {
            let db = Database::create(&path).unwrap();
            assert!(db.is_persistent());
            write_two_commits(&db);
        }

        let db = Database::open(&path).unwrap();
        let txn = db.read();
        assert_eq!(txn.snapshot_id(), 2);
        assert_eq!(txn.get_with_version::<Documents>(b"a"), Some((&b"2"[..], 2)));
        assert!(!txn.contains::<Sequences>(b"s"));
    }

    #[test]
    fn test_reopen_discards_torn_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.log");
        let clean_len = {
            let db = Database::create(&path).unwrap();
            write_two_commits(&db);
            db.stats().log_bytes.unwrap()
        };
        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[40, 0, 0, 0, 7, 7]).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.stats().log_bytes, Some(clean_len));
        assert_eq!(db.read().snapshot_id(), 2);

        let mut txn = db.write().unwrap();
        txn.insert::<Documents>(b"b", b"3".to_vec()).unwrap();
        txn.commit().unwrap();
        drop(db);

        let db = Database::open(&path).unwrap();
        assert_eq!(db.read().snapshot_id(), 3);
        assert_eq!(db.read().get::<Documents>(b"b"), Some(&b"3"[..]));
    }

    #[test]
    fn test_compact_shrinks_log_and_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.log");
        let config = DatabaseConfig::builder().sync_on_commit(false).build();
        let db = Database::create_with_config(&path, config).unwrap();
        for i in 0..50u8 {
            let mut txn = db.write().unwrap();
            txn.insert::<Documents>(b"hot", vec![i; 64]).unwrap();
            txn.commit().unwrap();
        }
        let before = db.stats().log_bytes.unwrap();

        let after = db.compact().unwrap().unwrap();
        assert!(after < before / 10, "{after} vs {before}");
        let mut txn = db.write().unwrap();
        txn.insert::<Documents>(b"cold", b"x".to_vec()).unwrap();
        txn.commit().unwrap();
        drop(db);

        let db = Database::open(&path).unwrap();
        let txn = db.read();
        assert_eq!(txn.snapshot_id(), 51);
        assert_eq!(txn.get::<Documents>(b"hot"), Some(&[49u8; 64][..]));
        assert_eq!(txn.get::<Documents>(b"cold"), Some(&b"x"[..]));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Database::open(dir.path().join("missing.log"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_in_memory_database_has_no_log() {
        let db = Database::open_in_memory();
        assert!(!db.is_persistent());
        assert_eq!(db.compact().unwrap(), None);
        assert_eq!(db.stats().log_bytes, None);
    }

    #[test]
    fn test_concurrent_writers_serialize() {
        let db = Arc::new(Database::open_in_memory());
        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    for i in 0..25u8 {
                        let mut txn = db.write().unwrap();
                        txn.insert::<Documents>(&[t, i], vec![i]).unwrap();
                        txn.commit().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(db.read().len::<Documents>(), 100);
        assert_eq!(db.stats().commits, 100);
    }
}

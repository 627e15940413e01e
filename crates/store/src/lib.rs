//! folio-store: the ordered transactional key-value engine under the folio
//! document store.
//!
//! The engine is deliberately small and tailored to the document layer:
//!
//! - **Fixed schema**: 4 tables known at compile time
//! - **Single writer**: one write transaction at a time, unlimited concurrent readers
//! - **Snapshot reads**: readers hold an immutable, atomically published state
//! - **Own-write visibility**: a write transaction reads through its pending changes
//! - **Slot versions**: every value carries a version for compare-and-swap writes
//! - **Structural sharing**: tables are copy-on-write B+ trees, so a commit copies
//!   only the paths it changes
//! - **Optional durability**: file-backed databases append each commit to a
//!   checksummed log and replay it on open
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                Database API                  │
//! │       (read, write, try_write, stats)        │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │             Transaction Layer                │
//! │ (ReadTxn: snapshot, WriteTxn: pending+commit)│
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │           Table Views and Cursors            │
//! │   (get, contains, len, seek, next, prev)     │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │            Committed State                   │
//! │   (one CoW B+ tree per table, ArcSwap)       │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │       Commit Log (file-backed only)          │
//! │   (append + fsync on commit, replay on open) │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use folio_store::{Database, ReadableTables, SeekTarget};
//! use folio_store::tables::Documents;
//!
//! let db = Database::open_in_memory();
//!
//! let mut txn = db.write()?;
//! txn.insert::<Documents>(b"users/1", b"{}".to_vec())?;
//! txn.commit()?;
//!
//! let txn = db.read();
//! let mut cursor = txn.cursor::<Documents>();
//! assert!(cursor.seek(SeekTarget::BeforeAll));
//! assert_eq!(cursor.key(), Some(&b"users/1"[..]));
//! # Ok::<(), folio_store::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod btree;
pub mod commit_log;
pub mod cursor;
pub mod db;
pub mod error;
pub mod tables;
pub mod types;

// Re-export commonly used types
pub use cursor::{Cursor, SeekTarget};
pub use db::{
    DEFAULT_MAX_KEY_SIZE, Database, DatabaseConfig, DatabaseStats, ReadTransaction,
    ReadableTables, TableView, WriteTransaction,
};
pub use error::{Error, Result};
pub use tables::{Table, TableId};

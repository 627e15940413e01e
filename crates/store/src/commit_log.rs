//! Append-only commit log backing a file-based [`Database`](crate::Database).
//!
//! Every commit appends one checksummed frame describing the entries it
//! changed. Opening a database replays the frames in order to rebuild the
//! committed tables.
//!
//! # File layout
//!
//! ```text
//! ┌──────────────────┬────────────────┐
//! │ magic "FOLIOLOG" │ format (u16 BE)│   header, 10 bytes
//! ├────────────┬─────┴────────┬───────┴───────────────┐
//! │ len (u32)  │ xxh3 (u64)   │ postcard CommitRecord │   frame 1
//! ├────────────┼──────────────┼───────────────────────┤
//! │ ...        │              │                       │   frame n
//! └────────────┴──────────────┴───────────────────────┘
//! ```
//!
//! Frame lengths and checksums are little-endian.
//!
//! # Recovery
//!
//! A crash mid-append leaves a torn last frame: too short to hold its length
//! prefix or payload, or failing its checksum. Recovery truncates it away,
//! since the commit it carried never returned success. Any damage before the
//! last frame is reported as [`Error::Corrupted`] and never repaired.

use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    ops::Bound,
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::{
    btree::BTree,
    db::{Slot, TableMap},
    error::{CorruptedSnafu, EncodingSnafu, Error, IoSnafu, Result},
    tables::TableId,
};

/// Magic bytes opening every commit log.
pub const MAGIC: &[u8; 8] = b"FOLIOLOG";

/// Current commit log format version.
pub const FORMAT_VERSION: u16 = 1;

/// Header size: magic plus format version.
pub const HEADER_SIZE: usize = MAGIC.len() + 2;

/// Frame prefix size: payload length plus checksum.
const FRAME_PREFIX_SIZE: usize = 4 + 8;

/// One committed write transaction.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CommitRecord {
    pub(crate) snapshot_id: u64,
    pub(crate) changes: Vec<Change>,
}

/// A single entry written (`slot = Some`) or removed (`slot = None`).
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Change {
    pub(crate) table: u8,
    pub(crate) key: Vec<u8>,
    pub(crate) slot: Option<(Vec<u8>, u16)>,
}

/// Tables rebuilt by replaying a commit log.
pub(crate) struct Recovered {
    pub(crate) tables: [TableMap; TableId::COUNT],
    pub(crate) snapshot_id: u64,
}

struct LogFile {
    file: File,
    /// Offset just past the last complete frame.
    end: u64,
}

/// Handle on an open commit log.
pub(crate) struct CommitLog {
    path: PathBuf,
    sync_on_commit: bool,
    inner: Mutex<LogFile>,
}

impl CommitLog {
    /// Creates an empty log at `path`, replacing any existing file.
    pub(crate) fn create(path: &Path, sync_on_commit: bool) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .context(IoSnafu { path })?;
        file.write_all(&header()).context(IoSnafu { path })?;
        file.sync_all().context(IoSnafu { path })?;

        info!(path = %path.display(), "Created commit log");
        Ok(Self {
            path: path.to_path_buf(),
            sync_on_commit,
            inner: Mutex::new(LogFile { file, end: HEADER_SIZE as u64 }),
        })
    }

    /// Opens the log at `path` and replays it.
    pub(crate) fn open(path: &Path, sync_on_commit: bool) -> Result<(Self, Recovered)> {
        let mut file =
            OpenOptions::new().read(true).write(true).open(path).context(IoSnafu { path })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).context(IoSnafu { path })?;

        let (recovered, end, frames) = replay(path, &bytes)?;
        if end < bytes.len() as u64 {
            warn!(
                path = %path.display(),
                offset = end,
                discarded = bytes.len() as u64 - end,
                "Truncating torn commit log tail"
            );
            file.set_len(end).context(IoSnafu { path })?;
            file.sync_all().context(IoSnafu { path })?;
        }

        info!(
            path = %path.display(),
            frames,
            snapshot_id = recovered.snapshot_id,
            "Replayed commit log"
        );
        let log = Self {
            path: path.to_path_buf(),
            sync_on_commit,
            inner: Mutex::new(LogFile { file, end }),
        };
        Ok((log, recovered))
    }

    /// Appends one commit, syncing it to disk when configured to.
    ///
    /// A failed append is rolled back so the log still ends on a complete frame.
    pub(crate) fn append(&self, record: &CommitRecord) -> Result<()> {
        let frame = encode_frame(record)?;
        let mut inner = self.inner.lock();
        let end = inner.end;
        let path = self.path.as_path();

        let written = write_at(&mut inner.file, end, &frame)
            .and_then(|()| if self.sync_on_commit { inner.file.sync_data() } else { Ok(()) });
        if let Err(source) = written {
            if let Err(rollback) = inner.file.set_len(end) {
                warn!(path = %path.display(), error = %rollback, "Commit log rollback failed");
            }
            return Err(Error::Io { path: self.path.clone(), source });
        }

        inner.end = end + frame.len() as u64;
        debug!(snapshot_id = record.snapshot_id, bytes = frame.len(), "Appended commit frame");
        Ok(())
    }

    /// Rewrites the log as a single frame holding `tables` at `snapshot_id`.
    ///
    /// The new log is written beside the old one and renamed over it, so a
    /// crash leaves one of the two intact.
    pub(crate) fn compact(
        &self,
        snapshot_id: u64,
        tables: &[TableMap; TableId::COUNT],
    ) -> Result<u64> {
        let mut changes = Vec::new();
        for (id, table) in TableId::all().into_iter().zip(tables) {
            for (key, slot) in table.range_from(Bound::Unbounded) {
                changes.push(Change {
                    table: id as u8,
                    key: key.to_vec(),
                    slot: Some((slot.value.clone(), slot.version)),
                });
            }
        }
        let frame = encode_frame(&CommitRecord { snapshot_id, changes })?;

        let mut inner = self.inner.lock();
        let staging = self.path.with_extension("compacting");
        let path = staging.as_path();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .context(IoSnafu { path })?;
        file.write_all(&header()).context(IoSnafu { path })?;
        file.write_all(&frame).context(IoSnafu { path })?;
        file.sync_all().context(IoSnafu { path })?;
        fs::rename(path, &self.path).context(IoSnafu { path: &self.path })?;

        let before = inner.end;
        let end = (HEADER_SIZE + frame.len()) as u64;
        *inner = LogFile { file, end };
        info!(
            path = %self.path.display(),
            snapshot_id,
            before,
            after = end,
            "Compacted commit log"
        );
        Ok(end)
    }

    /// Bytes of the log covering committed frames.
    pub(crate) fn len(&self) -> u64 {
        self.inner.lock().end
    }
}

fn header() -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..MAGIC.len()].copy_from_slice(MAGIC);
    BigEndian::write_u16(&mut header[MAGIC.len()..], FORMAT_VERSION);
    header
}

fn encode_frame(record: &CommitRecord) -> Result<Vec<u8>> {
    let payload = postcard::to_allocvec(record).context(EncodingSnafu)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::CommitTooLarge { size: payload.len() })?;

    let checksum = xxhash_rust::xxh3::xxh3_64(&payload);
    let mut frame = vec![0u8; FRAME_PREFIX_SIZE];
    LittleEndian::write_u32(&mut frame[..4], len);
    LittleEndian::write_u64(&mut frame[4..FRAME_PREFIX_SIZE], checksum);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)
}

/// Rebuilds the tables from a log image.
///
/// Returns the recovered state, the offset just past the last good frame,
/// and the number of frames applied.
fn replay(path: &Path, bytes: &[u8]) -> Result<(Recovered, u64, u64)> {
    if bytes.len() < HEADER_SIZE || &bytes[..MAGIC.len()] != MAGIC {
        return CorruptedSnafu { path, reason: "missing commit log header" }.fail();
    }
    let version = BigEndian::read_u16(&bytes[MAGIC.len()..HEADER_SIZE]);
    if version != FORMAT_VERSION {
        let reason = format!("unsupported format version {version}");
        return CorruptedSnafu { path, reason }.fail();
    }

    let mut recovered =
        Recovered { tables: std::array::from_fn(|_| BTree::new()), snapshot_id: 0 };
    let mut offset = HEADER_SIZE;
    let mut frames = 0u64;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < FRAME_PREFIX_SIZE {
            break;
        }
        let len = LittleEndian::read_u32(&rest[..4]) as usize;
        let checksum = LittleEndian::read_u64(&rest[4..FRAME_PREFIX_SIZE]);
        let Some(payload) = rest.get(FRAME_PREFIX_SIZE..FRAME_PREFIX_SIZE + len) else {
            break;
        };
        let frame_end = offset + FRAME_PREFIX_SIZE + len;

        if xxhash_rust::xxh3::xxh3_64(payload) != checksum {
            if frame_end == bytes.len() {
                break;
            }
            let reason = format!("checksum mismatch at offset {offset}");
            return CorruptedSnafu { path, reason }.fail();
        }
        let record: CommitRecord = match postcard::from_bytes(payload) {
            Ok(record) => record,
            Err(err) => {
                let reason = format!("undecodable frame at offset {offset}: {err}");
                return CorruptedSnafu { path, reason }.fail();
            },
        };
        if frames > 0 && record.snapshot_id != recovered.snapshot_id + 1 {
            return CorruptedSnafu {
                path,
                reason: format!(
                    "snapshot {} follows snapshot {}",
                    record.snapshot_id, recovered.snapshot_id
                ),
            }
            .fail();
        }

        for change in record.changes {
            let Some(table) = TableId::from_u8(change.table) else {
                let reason = format!("unknown table {}", change.table);
                return CorruptedSnafu { path, reason }.fail();
            };
            let map = &mut recovered.tables[table as usize];
            match change.slot {
                Some((value, version)) => {
                    map.insert(change.key, Slot { value, version });
                },
                None => {
                    map.remove(&change.key);
                },
            }
        }
        recovered.snapshot_id = record.snapshot_id;
        frames += 1;
        offset = frame_end;
    }

    Ok((recovered, offset as u64, frames))
}

//! Document version tokens ("etags") and their generator.
//!
//! An [`Etag`] is a 128-bit, totally ordered token assigned on every content
//! change. It is split into two 64-bit halves:
//!
//! ```text
//! | 8 bits: category | 56 bits: restarts | 64 bits: changes |
//! ```
//!
//! - **Category**: the [`EtagCategory`] the token was issued for
//! - **Restarts**: bumped every time a generator is started over a database
//! - **Changes**: counter within one generator lifetime
//!
//! The on-disk form is 16 big-endian bytes, so lexicographic byte order equals
//! numeric order and the version index can be walked as an ordered table.

use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

/// Size of the serialized etag in bytes.
pub const ETAG_SIZE: usize = 16;

/// Number of bits reserved for the restarts counter inside the high half.
const RESTARTS_BITS: u32 = 56;

/// Mask for extracting the restarts counter from the high half.
const RESTARTS_MASK: u64 = (1 << RESTARTS_BITS) - 1;

/// Category an etag is issued for.
///
/// The category is stored in the most significant byte, so tokens of one
/// category sort together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EtagCategory {
    /// Document content writes and touches.
    Documents = 1,
    /// Attachment writes.
    Attachments = 2,
    /// Index bookkeeping.
    Indexing = 3,
    /// Transaction markers.
    Transactions = 4,
}

impl EtagCategory {
    /// Converts from the stored discriminant.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Documents),
            2 => Some(Self::Attachments),
            3 => Some(Self::Indexing),
            4 => Some(Self::Transactions),
            _ => None,
        }
    }
}

/// A totally ordered document version token.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Etag {
    restarts: u64,
    changes: u64,
}

impl Etag {
    /// "Document must not exist yet."
    pub const EMPTY: Etag = Etag { restarts: 0, changes: 0 };

    /// Returned by lookups that found no metadata record.
    pub const INVALID: Etag = Etag { restarts: u64::MAX, changes: u64::MAX };

    /// Builds an etag from its raw halves.
    #[must_use]
    pub const fn from_parts(restarts: u64, changes: u64) -> Self {
        Self { restarts, changes }
    }

    /// Builds an etag for `category`.
    #[must_use]
    pub const fn new(category: EtagCategory, restarts: u64, changes: u64) -> Self {
        Self { restarts: ((category as u64) << RESTARTS_BITS) | (restarts & RESTARTS_MASK), changes }
    }

    /// Returns the high half (category and restarts).
    #[must_use]
    pub const fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Returns the low half (change counter).
    #[must_use]
    pub const fn changes(&self) -> u64 {
        self.changes
    }

    /// Returns the category, if the high byte holds a known one.
    #[must_use]
    pub fn category(&self) -> Option<EtagCategory> {
        EtagCategory::from_u8((self.restarts >> RESTARTS_BITS) as u8)
    }

    /// Whether this is [`Etag::EMPTY`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Serializes to the 16-byte big-endian form used as an index key.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ETAG_SIZE] {
        let mut buf = [0u8; ETAG_SIZE];
        buf[..8].copy_from_slice(&self.restarts.to_be_bytes());
        buf[8..].copy_from_slice(&self.changes.to_be_bytes());
        buf
    }

    /// Deserializes from the 16-byte big-endian form.
    ///
    /// Returns `None` if `buf` is shorter than [`ETAG_SIZE`].
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < ETAG_SIZE {
            return None;
        }
        let restarts = u64::from_be_bytes(buf[..8].try_into().ok()?);
        let changes = u64::from_be_bytes(buf[8..ETAG_SIZE].try_into().ok()?);
        Some(Self { restarts, changes })
    }

    /// Returns the etag immediately following this one in total order.
    #[must_use]
    pub fn increment(&self) -> Self {
        match self.changes.checked_add(1) {
            Some(changes) => Self { restarts: self.restarts, changes },
            None => Self { restarts: self.restarts.wrapping_add(1), changes: 0 },
        }
    }
}

impl fmt::Display for Etag {
    /// Formats as `RRRRRRRR-RRRR-RRRR-CCCC-CCCCCCCCCCCC` (hex).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes();
        write!(
            f,
            "{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13],
            b[14], b[15]
        )
    }
}

impl fmt::Debug for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Etag({self})")
    }
}

/// Error parsing the textual etag form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtagParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl fmt::Display for EtagParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid etag {:?}: {}", self.input, self.reason)
    }
}

impl std::error::Error for EtagParseError {}

impl FromStr for Etag {
    type Err = EtagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason| EtagParseError { input: s.to_string(), reason };

        let groups: Vec<&str> = s.split('-').collect();
        let lengths: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        if lengths != [8, 4, 4, 4, 12] {
            return Err(fail("expected 8-4-4-4-12 hex groups"));
        }

        let hex: String = groups.concat();
        let mut bytes = [0u8; ETAG_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = hex.get(i * 2..i * 2 + 2).ok_or_else(|| fail("truncated hex"))?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| fail("non-hex digit"))?;
        }
        Etag::from_bytes(&bytes).ok_or_else(|| fail("truncated hex"))
    }
}

/// Source of strictly increasing etags.
///
/// Implementations must never hand out the same token twice, and tokens of
/// one category must compare greater than every token issued before them.
pub trait EtagGenerator: Send + Sync {
    /// Issues the next etag for `category`.
    fn next_etag(&self, category: EtagCategory) -> Etag;
}

/// Counter-based etag generator.
///
/// `restarts` is fixed for the generator's lifetime and must be larger than
/// that of any previous generator used over the same data, which keeps
/// tokens increasing across process restarts.
#[derive(Debug)]
pub struct SequentialEtagGenerator {
    restarts: u64,
    changes: AtomicU64,
}

impl SequentialEtagGenerator {
    /// Creates a generator for the given restart generation.
    #[must_use]
    pub fn new(restarts: u64) -> Self {
        Self { restarts, changes: AtomicU64::new(0) }
    }

    /// Returns the restart generation this generator issues under.
    #[must_use]
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Returns the last issued change counter (0 if none yet).
    #[must_use]
    pub fn last_change(&self) -> u64 {
        self.changes.load(Ordering::Acquire)
    }
}

impl EtagGenerator for SequentialEtagGenerator {
    fn next_etag(&self, category: EtagCategory) -> Etag {
        let changes = self.changes.fetch_add(1, Ordering::AcqRel) + 1;
        Etag::new(category, self.restarts, changes)
    }
}

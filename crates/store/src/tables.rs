//! Fixed table definitions for the store engine.
//!
//! The store has exactly 4 tables, all known at compile time.
//! This enables type-safe access and eliminates dynamic table lookup overhead.

/// Compile-time table identifier. All tables are statically defined; dynamic creation is not
/// supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TableId {
    // ========================================================================
    // Document Tables
    // ========================================================================
    /// Encoded document payloads: normalized key -> codec chain output.
    Documents = 0,

    /// Metadata records: normalized key -> {etag, original key, last modified, metadata}.
    DocumentMetadata = 1,

    /// Etag index: 16-byte big-endian etag -> normalized key.
    DocumentsByEtag = 2,

    // ========================================================================
    // Bookkeeping Tables
    // ========================================================================
    /// Named counters and generator checkpoints.
    Sequences = 3,
}

impl TableId {
    /// Total number of tables.
    pub const COUNT: usize = 4;

    /// Returns the human-readable name for this table.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::DocumentMetadata => "document_metadata",
            Self::DocumentsByEtag => "documents_by_etag",
            Self::Sequences => "sequences",
        }
    }

    /// Returns all table IDs.
    pub const fn all() -> [TableId; Self::COUNT] {
        [Self::Documents, Self::DocumentMetadata, Self::DocumentsByEtag, Self::Sequences]
    }

    /// Converts from u8 to TableId.
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Documents),
            1 => Some(Self::DocumentMetadata),
            2 => Some(Self::DocumentsByEtag),
            3 => Some(Self::Sequences),
            _ => None,
        }
    }
}

// ============================================================================
// Type-Safe Table Trait
// ============================================================================

/// Trait for compile-time type-safe table access.
///
/// Keys and values are raw bytes; each table documents its own layout.
pub trait Table {
    /// The table identifier.
    const ID: TableId;
}

// ============================================================================
// Table Definitions
// ============================================================================

/// Documents table: encoded payloads keyed by normalized document key.
pub struct Documents;
impl Table for Documents {
    const ID: TableId = TableId::Documents;
}

/// Document metadata table: metadata records keyed by normalized document key.
pub struct DocumentMetadata;
impl Table for DocumentMetadata {
    const ID: TableId = TableId::DocumentMetadata;
}

/// Etag index: one entry per live document, ordered by etag.
pub struct DocumentsByEtag;
impl Table for DocumentsByEtag {
    const ID: TableId = TableId::DocumentsByEtag;
}

/// Sequences table: named counters.
pub struct Sequences;
impl Table for Sequences {
    const ID: TableId = TableId::Sequences;
}

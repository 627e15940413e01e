//! Metadata record layout.
//!
//! ```text
//! ┌──────────────┬──────────────────────┬───────────────────┬────────────────┐
//! │ etag (16 BE) │ varint len + key     │ last-modified i64 │ metadata JSON  │
//! │              │ (original case)      │ BE micros, 0=none │ (rest)         │
//! └──────────────┴──────────────────────┴───────────────────┴────────────────┘
//! ```
//!
//! The header can be decoded without parsing the JSON tail, which lets the
//! read path reuse cached metadata.

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};
use folio_store::types::{decode_length_prefixed, encode_length_prefixed};
use folio_types::{ETAG_SIZE, Etag};
use snafu::{ResultExt, Snafu};

use crate::document::JsonObject;

const TIMESTAMP_SIZE: usize = 8;

/// Errors decoding a metadata record.
#[derive(Debug, Snafu)]
pub enum RecordError {
    /// The record ended before `field` was complete.
    #[snafu(display("metadata record truncated while reading {field}"))]
    Truncated {
        /// Field being read.
        field: &'static str,
    },

    /// The stored key is not valid UTF-8.
    #[snafu(display("metadata record key is not valid UTF-8: {source}"))]
    InvalidKey {
        /// The underlying UTF-8 error.
        source: std::str::Utf8Error,
    },

    /// The stored timestamp is outside the representable range.
    #[snafu(display("metadata record timestamp {micros} is out of range"))]
    InvalidTimestamp {
        /// Raw stored value.
        micros: i64,
    },

    /// The metadata tail is not a JSON object.
    #[snafu(display("metadata record JSON is invalid: {source}"))]
    InvalidMetadata {
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// Fixed-layout prefix of a metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MetadataHeader {
    pub(crate) etag: Etag,
    pub(crate) key: String,
    pub(crate) last_modified: Option<DateTime<Utc>>,
    /// Offset of the JSON tail.
    pub(crate) metadata_offset: usize,
}

/// Serializes a metadata record.
pub(crate) fn encode_record(
    etag: Etag,
    key: &str,
    last_modified: Option<DateTime<Utc>>,
    metadata: &JsonObject,
) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::with_capacity(ETAG_SIZE + key.len() + 64);
    buf.extend_from_slice(&etag.to_bytes());
    encode_length_prefixed(key.as_bytes(), &mut buf);

    let mut timestamp = [0u8; TIMESTAMP_SIZE];
    BigEndian::write_i64(&mut timestamp, last_modified.map_or(0, |at| at.timestamp_micros()));
    buf.extend_from_slice(&timestamp);

    serde_json::to_writer(&mut buf, metadata)?;
    Ok(buf)
}

/// Decodes everything but the JSON tail.
pub(crate) fn decode_header(record: &[u8]) -> Result<MetadataHeader, RecordError> {
    let etag = Etag::from_bytes(record).ok_or(RecordError::Truncated { field: "etag" })?;

    let rest = &record[ETAG_SIZE..];
    let (key, consumed) =
        decode_length_prefixed(rest).ok_or(RecordError::Truncated { field: "key" })?;
    let key = std::str::from_utf8(key).context(InvalidKeySnafu)?.to_string();

    let timestamp_offset = ETAG_SIZE + consumed;
    let timestamp = record
        .get(timestamp_offset..timestamp_offset + TIMESTAMP_SIZE)
        .ok_or(RecordError::Truncated { field: "last_modified" })?;
    let micros = BigEndian::read_i64(timestamp);
    let last_modified = match micros {
        0 => None,
        micros => Some(
            DateTime::<Utc>::from_timestamp_micros(micros)
                .ok_or(RecordError::InvalidTimestamp { micros })?,
        ),
    };

    Ok(MetadataHeader {
        etag,
        key,
        last_modified,
        metadata_offset: timestamp_offset + TIMESTAMP_SIZE,
    })
}

/// Parses the JSON tail located by `header`.
pub(crate) fn decode_metadata(
    record: &[u8],
    header: &MetadataHeader,
) -> Result<JsonObject, RecordError> {
    let tail = record
        .get(header.metadata_offset..)
        .ok_or(RecordError::Truncated { field: "metadata" })?;
    serde_json::from_slice(tail).context(InvalidMetadataSnafu)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use chrono::TimeZone;
    use folio_types::EtagCategory;
    use serde_json::json;

    use super::*;

    fn sample_metadata() -> JsonObject {
        json!({"@collection": "Users", "nested": {"a": [1, 2]}}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_record_roundtrip() {
        let etag = Etag::new(EtagCategory::Documents, 2, 40);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let record = encode_record(etag, "Users/Ayende", Some(at), &sample_metadata()).unwrap();

        let header = decode_header(&record).unwrap();
        assert_eq!(header.etag, etag);
        assert_eq!(header.key, "Users/Ayende");
        assert_eq!(header.last_modified, Some(at));
        assert_eq!(decode_metadata(&record, &header).unwrap(), sample_metadata());
    }

    #[test]
    fn test_zero_timestamp_means_none() {
        let record = encode_record(Etag::EMPTY, "k", None, &JsonObject::new()).unwrap();
        let header = decode_header(&record).unwrap();
        assert_eq!(header.last_modified, None);
        assert!(decode_metadata(&record, &header).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_records() {
        let record =
            encode_record(Etag::EMPTY, "users/1", None, &JsonObject::new()).unwrap();

        assert!(matches!(
            decode_header(&record[..10]),
            Err(RecordError::Truncated { field: "etag" })
        ));
        assert!(matches!(
            decode_header(&record[..ETAG_SIZE + 3]),
            Err(RecordError::Truncated { field: "key" })
        ));
        assert!(matches!(
            decode_header(&record[..ETAG_SIZE + 8 + 4]),
            Err(RecordError::Truncated { field: "last_modified" })
        ));
    }

    #[test]
    fn test_invalid_metadata_json() {
        let mut record = encode_record(Etag::EMPTY, "k", None, &JsonObject::new()).unwrap();
        record.truncate(record.len() - 1);
        record.extend_from_slice(b"not json");
        let header = decode_header(&record).unwrap();
        let err = decode_metadata(&record, &header).unwrap_err();
        assert!(matches!(err, RecordError::InvalidMetadata { .. }));
    }

    #[test]
    fn test_invalid_key_utf8() {
        let mut record = Etag::EMPTY.to_bytes().to_vec();
        encode_length_prefixed(&[0xFF, 0xFE], &mut record);
        record.extend_from_slice(&[0u8; 8]);
        record.extend_from_slice(b"{}");
        assert!(matches!(decode_header(&record), Err(RecordError::InvalidKey { .. })));
    }
}

//! Payload codec chain.
//!
//! A [`CodecChain`] is an ordered list of [`DocumentCodec`]s. Encoding feeds
//! the payload through the chain from the last codec to the first, so the
//! first codec produces the stored bytes; decoding walks the chain in order.
//!
//! ```text
//!   encode:  json ──▶ Cn ──▶ … ──▶ C2 ──▶ C1 ──▶ stored
//!   decode:  stored ──▶ C1 ──▶ C2 ──▶ … ──▶ Cn ──▶ json
//! ```

use std::{fmt, io, sync::Arc};

use folio_types::config::DocumentStorageConfig;
use snafu::{ResultExt, Snafu};

use crate::document::JsonObject;

/// Leading signature of payloads written by [`CompressionCodec`].
pub const COMPRESSION_MAGIC: [u8; 4] = *b"FDZ1";

/// Error produced by a codec.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// The codec's underlying reader or writer failed.
    #[snafu(display("{codec} codec I/O failed: {source}"))]
    Io {
        /// Name of the failing codec.
        codec: String,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The input is not something this codec produced.
    #[snafu(display("{codec} codec rejected input: {message}"))]
    InvalidInput {
        /// Name of the failing codec.
        codec: String,
        /// What was wrong.
        message: String,
    },
}

/// A reversible payload transform (compression, encryption, ...).
///
/// `decode(encode(x)) == x` must hold for every payload and metadata pair.
pub trait DocumentCodec: Send + Sync {
    /// Short name used in errors and logs.
    fn name(&self) -> &str;

    /// Leading signature this codec writes, if any.
    ///
    /// The read path uses it to tell "codec missing" apart from corruption.
    fn magic(&self) -> Option<[u8; 4]> {
        None
    }

    /// Transforms a payload on its way to storage.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] if the payload cannot be transformed.
    fn encode(
        &self,
        key: &str,
        data: Vec<u8>,
        metadata: &JsonObject,
    ) -> Result<Vec<u8>, TransformError>;

    /// Reverses [`DocumentCodec::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] if the stored bytes cannot be decoded.
    fn decode(
        &self,
        key: &str,
        data: Vec<u8>,
        metadata: &JsonObject,
    ) -> Result<Vec<u8>, TransformError>;
}

/// Ordered list of codecs applied to every payload.
#[derive(Clone, Default)]
pub struct CodecChain {
    codecs: Vec<Arc<dyn DocumentCodec>>,
}

impl CodecChain {
    /// Creates an empty chain (payloads are stored as plain JSON).
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `codec` to the chain.
    #[must_use]
    pub fn with(mut self, codec: impl DocumentCodec + 'static) -> Self {
        self.codecs.push(Arc::new(codec));
        self
    }

    /// Appends an already shared codec.
    #[must_use]
    pub fn with_shared(mut self, codec: Arc<dyn DocumentCodec>) -> Self {
        self.codecs.push(codec);
        self
    }

    /// Number of codecs.
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    /// Whether the chain has no codecs.
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Names of the codecs, in chain order.
    pub fn names(&self) -> Vec<&str> {
        self.codecs.iter().map(|codec| codec.name()).collect()
    }

    /// Whether some codec in the chain writes `magic`.
    pub fn handles_magic(&self, magic: &[u8]) -> bool {
        self.codecs.iter().any(|codec| codec.magic().is_some_and(|own| own[..] == *magic))
    }

    /// Runs `data` through the chain from last codec to first.
    ///
    /// # Errors
    ///
    /// Returns the first [`TransformError`] raised by a codec.
    pub fn encode(
        &self,
        key: &str,
        data: Vec<u8>,
        metadata: &JsonObject,
    ) -> Result<Vec<u8>, TransformError> {
        self.codecs.iter().rev().try_fold(data, |buf, codec| codec.encode(key, buf, metadata))
    }

    /// Runs stored bytes through the chain from first codec to last.
    ///
    /// # Errors
    ///
    /// Returns the first [`TransformError`] raised by a codec.
    pub fn decode(
        &self,
        key: &str,
        data: Vec<u8>,
        metadata: &JsonObject,
    ) -> Result<Vec<u8>, TransformError> {
        self.codecs.iter().try_fold(data, |buf, codec| codec.decode(key, buf, metadata))
    }
}

impl fmt::Debug for CodecChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecChain").field("codecs", &self.names()).finish()
    }
}

// ============================================================================
// Compression
// ============================================================================

/// Zstd compression codec.
///
/// Output is [`COMPRESSION_MAGIC`] followed by a zstd frame.
#[derive(Debug, Clone, Copy)]
pub struct CompressionCodec {
    level: i32,
}

impl CompressionCodec {
    const NAME: &'static str = "compression";

    /// Creates a codec compressing at `level` (1-22).
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    /// Creates a codec using the configured compression level.
    pub fn from_config(config: &DocumentStorageConfig) -> Self {
        Self::new(config.compression_level)
    }
}

impl Default for CompressionCodec {
    fn default() -> Self {
        Self::new(zstd::DEFAULT_COMPRESSION_LEVEL)
    }
}

impl DocumentCodec for CompressionCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn magic(&self) -> Option<[u8; 4]> {
        Some(COMPRESSION_MAGIC)
    }

    fn encode(
        &self,
        _key: &str,
        data: Vec<u8>,
        _metadata: &JsonObject,
    ) -> Result<Vec<u8>, TransformError> {
        let compressed =
            zstd::encode_all(data.as_slice(), self.level).context(IoSnafu { codec: Self::NAME })?;
        let mut out = Vec::with_capacity(COMPRESSION_MAGIC.len() + compressed.len());
        out.extend_from_slice(&COMPRESSION_MAGIC);
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    fn decode(
        &self,
        _key: &str,
        data: Vec<u8>,
        _metadata: &JsonObject,
    ) -> Result<Vec<u8>, TransformError> {
        let Some(frame) = data.strip_prefix(&COMPRESSION_MAGIC[..]) else {
            return InvalidInputSnafu { codec: Self::NAME, message: "missing compression header" }
                .fail();
        };
        zstd::decode_all(frame).context(IoSnafu { codec: Self::NAME })
    }
}

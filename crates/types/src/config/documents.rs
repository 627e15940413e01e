//! Document storage configuration: cache sizing, compression, and the
//! metadata conventions the stats scan relies on.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Maximum zstd compression level.
const MAX_COMPRESSION_LEVEL: i32 = 22;

/// Minimum zstd compression level.
const MIN_COMPRESSION_LEVEL: i32 = 1;

/// Upper bound on the per-bucket "largest documents" list in stats.
const MAX_STATS_TOP_DOCUMENTS: usize = 1000;

/// Document storage configuration.
///
/// # Validation Rules
///
/// - `compression_level` must be 1-22 (zstd valid range)
/// - `system_key_prefix`, `collection_field` and `delete_marker_field` must be non-empty
/// - `stats_top_documents` must be 1-1000
///
/// # Example
///
/// ```no_run
/// # use folio_types::config::DocumentStorageConfig;
/// let config = DocumentStorageConfig::builder()
///     .cache_capacity(16_384)
///     .compression_level(6)
///     .build()
///     .expect("valid document storage config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentStorageConfig {
    /// Maximum number of decoded documents held by the in-memory cache.
    ///
    /// Zero disables caching.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Zstd compression level for the compression codec (1-22, 3 recommended).
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    /// Keys starting with this prefix (case-insensitive) are counted as system documents.
    #[serde(default = "default_system_key_prefix")]
    pub system_key_prefix: String,
    /// Metadata field holding a document's collection name.
    #[serde(default = "default_collection_field")]
    pub collection_field: String,
    /// Metadata field flagging a document as a delete marker (tombstone).
    #[serde(default = "default_delete_marker_field")]
    pub delete_marker_field: String,
    /// Number of largest documents reported per stats bucket.
    #[serde(default = "default_stats_top_documents")]
    pub stats_top_documents: usize,
    /// Stats scans running longer than this are logged at warn level.
    #[serde(default = "default_slow_scan_threshold")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub slow_scan_threshold: Duration,
}

#[bon::bon]
impl DocumentStorageConfig {
    /// Creates a new document storage configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if:
    /// - `compression_level` outside 1-22
    /// - any field name or the system prefix is empty
    /// - `stats_top_documents` outside 1-1000
    #[builder]
    pub fn new(
        #[builder(default = default_cache_capacity())] cache_capacity: usize,
        #[builder(default = default_compression_level())] compression_level: i32,
        #[builder(default = default_system_key_prefix(), into)] system_key_prefix: String,
        #[builder(default = default_collection_field(), into)] collection_field: String,
        #[builder(default = default_delete_marker_field(), into)] delete_marker_field: String,
        #[builder(default = default_stats_top_documents())] stats_top_documents: usize,
        #[builder(default = default_slow_scan_threshold())] slow_scan_threshold: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            cache_capacity,
            compression_level,
            system_key_prefix,
            collection_field,
            delete_marker_field,
            stats_top_documents,
            slow_scan_threshold,
        };
        config.validate()?;
        Ok(config)
    }
}

impl DocumentStorageConfig {
    /// Validates the configuration values.
    ///
    /// Call after deserialization to ensure values are within valid ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_COMPRESSION_LEVEL..=MAX_COMPRESSION_LEVEL).contains(&self.compression_level) {
            return Err(ConfigError::Validation {
                message: format!(
                    "compression_level must be {}-{}, got {}",
                    MIN_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL, self.compression_level
                ),
            });
        }
        for (name, value) in [
            ("system_key_prefix", &self.system_key_prefix),
            ("collection_field", &self.collection_field),
            ("delete_marker_field", &self.delete_marker_field),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Validation {
                    message: format!("{name} must not be empty"),
                });
            }
        }
        if self.stats_top_documents == 0 || self.stats_top_documents > MAX_STATS_TOP_DOCUMENTS {
            return Err(ConfigError::Validation {
                message: format!(
                    "stats_top_documents must be 1-{}, got {}",
                    MAX_STATS_TOP_DOCUMENTS, self.stats_top_documents
                ),
            });
        }
        Ok(())
    }
}

impl Default for DocumentStorageConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            compression_level: default_compression_level(),
            system_key_prefix: default_system_key_prefix(),
            collection_field: default_collection_field(),
            delete_marker_field: default_delete_marker_field(),
            stats_top_documents: default_stats_top_documents(),
            slow_scan_threshold: default_slow_scan_threshold(),
        }
    }
}

fn default_cache_capacity() -> usize {
    4096
}

fn default_compression_level() -> i32 {
    3 // Good balance of speed/ratio
}

fn default_system_key_prefix() -> String {
    "sys/".to_string()
}

fn default_collection_field() -> String {
    "@collection".to_string()
}

fn default_delete_marker_field() -> String {
    "@delete-marker".to_string()
}

fn default_stats_top_documents() -> usize {
    10
}

fn default_slow_scan_threshold() -> Duration {
    Duration::from_secs(5)
}

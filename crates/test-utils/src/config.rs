//! Test configuration helpers.
//!
//! Centralizes the configuration values tests rely on, so individual test
//! modules do not scatter magic numbers.

use std::{sync::Once, time::Duration};

use folio_types::config::DocumentStorageConfig;
use tracing_subscriber::EnvFilter;

/// Returns a document storage configuration suitable for tests.
///
/// - `cache_capacity`: 64 (small, so eviction is reachable)
/// - `compression_level`: 1 (fast)
/// - `stats_top_documents`: 3
/// - `slow_scan_threshold`: 1s
#[must_use]
pub fn test_storage_config() -> DocumentStorageConfig {
    DocumentStorageConfig {
        cache_capacity: 64,
        compression_level: 1,
        stats_top_documents: 3,
        slow_scan_threshold: Duration::from_secs(1),
        ..DocumentStorageConfig::default()
    }
}

static TRACING: Once = Once::new();

/// Installs a test tracing subscriber once per process.
///
/// Honors `RUST_LOG`, defaulting to `warn`. Output goes through the test
/// writer so it is captured per test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        // Another harness may have installed a global subscriber already.
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

//! Shared test utilities for folio crates.
//!
//! - [`TestStorage`] - Document storage over a fresh in-memory database
//! - [`assert_tables_consistent`] - Cross-table invariant check
//! - [`assert_strictly_increasing`] - Etag ordering check
//! - [`test_storage_config`] - Default storage configuration for tests
//! - [`strategies`] - Proptest generators for keys, JSON objects and etags

#![deny(unsafe_code)]
// Test utilities are allowed to use unwrap for simplicity
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod harness;
pub use harness::{TestStorage, object};

mod assertions;
pub use assertions::{assert_strictly_increasing, assert_tables_consistent};

mod config;
pub use config::{init_tracing, test_storage_config};

pub mod strategies;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use folio_types::Etag;
    use serde_json::json;

    use super::*;

    // ============================================
    // TestStorage tests
    // ============================================

    #[test]
    fn test_harness_issues_sequential_etags() {
        let storage = TestStorage::new();
        let first = storage.put("a", json!({"v": 1}));
        let second = storage.put("b", json!({"v": 2}));
        assert_eq!(first.etag.changes(), 1);
        assert_eq!(second.etag.changes(), 2);
        assert_eq!(storage.etags().last_change(), 2);
        assert_strictly_increasing(&[Etag::EMPTY, first.etag, second.etag]);
    }

    #[test]
    fn test_harness_roundtrip_and_delete() {
        let storage = TestStorage::compressed();
        storage.put_with_metadata("Users/1", json!({"name": "x"}), json!({"@collection": "Users"}));
        let doc = storage.get("users/1").unwrap();
        assert_eq!(doc.data, object(json!({"name": "x"})));
        assert_tables_consistent(&storage);

        assert!(storage.delete("USERS/1").is_some());
        assert!(storage.get("users/1").is_none());
        assert_tables_consistent(&storage);
    }

    // ============================================
    // Assertion tests
    // ============================================

    #[test]
    #[should_panic(expected = "etags out of order")]
    fn test_strictly_increasing_rejects_duplicates() {
        let etag = Etag::from_parts(1, 1);
        assert_strictly_increasing(&[etag, etag]);
    }

    #[test]
    #[should_panic(expected = "expected a JSON object")]
    fn test_object_rejects_arrays() {
        object(json!([1, 2]));
    }

    // ============================================
    // Config helper tests
    // ============================================

    #[test]
    fn test_storage_config_is_valid() {
        let config = test_storage_config();
        assert!(config.validate().is_ok());
        assert!(config.cache_capacity > 0, "tests exercise the cache");
    }
}

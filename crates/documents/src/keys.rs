//! Document key normalization.
//!
//! Keys are case-insensitive: every table is keyed by the lowercase form,
//! while the metadata record keeps the case of the first write.

/// Returns the storage form of `key`.
pub fn normalize_key(key: &str) -> String {
    key.to_lowercase()
}

/// Case-insensitive prefix test.
pub fn starts_with_ignore_case(key: &str, prefix: &str) -> bool {
    normalize_key(key).starts_with(&normalize_key(prefix))
}

//! Proptest strategies for folio domain types.
//!
//! Reusable generators for property-based testing across crates.
//!
//! # Usage
//!
//! ```no_run
//! use folio_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(key in strategies::arb_document_key()) {
//!         // test invariant with a randomly generated key
//!     }
//! }
//! ```

use folio_documents::JsonObject;
use folio_types::{Etag, EtagCategory};
use proptest::prelude::*;
use serde_json::Value;

/// Generates a collection-style key such as `users/42` or `Orders/a7`.
pub fn arb_document_key() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["users", "Users", "orders", "ORDERS", "sys", "companies"]),
        "[a-zA-Z0-9]{1,12}",
    )
        .prop_map(|(collection, id)| format!("{collection}/{id}"))
}

/// Generates a JSON scalar.
pub fn arb_json_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,24}".prop_map(Value::String),
    ]
}

/// Generates a JSON object of up to 8 fields, nested at most two levels.
pub fn arb_json_object() -> impl Strategy<Value = JsonObject> {
    let leaf = arb_json_scalar();
    let value = leaf.prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    });
    prop::collection::btree_map("[a-zA-Z@][a-zA-Z0-9-]{0,11}", value, 0..8)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Generates a document etag with a small restart generation.
pub fn arb_etag() -> impl Strategy<Value = Etag> {
    (1u64..16, 1u64..1_000_000)
        .prop_map(|(restarts, changes)| Etag::new(EtagCategory::Documents, restarts, changes))
}

//! Property-based tests using proptest
//!
//! These tests pin the invariants of path extraction, content hashing, and
//! state comparison against randomized JSON documents.

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::{json, Value};

use gqlsync::extract::{content_hash, extract_values};
use gqlsync::state::compare::{diff, values_equal, DEFAULT_DIFF_EXCLUSIONS};

/// Generate a JSON object key that is safe to use inside a dot-path.
fn arb_key() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,11}"
}

/// Generate an arbitrary JSON value of bounded depth.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[ -~]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(arb_key(), inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Generate a JSON object (for diff, which operates on maps).
fn arb_json_object() -> impl Strategy<Value = serde_json::Map<String, Value>> {
    prop::collection::btree_map(arb_key(), arb_json(), 0..5)
        .prop_map(|map| map.into_iter().collect())
}

proptest! {
    #[test]
    fn extraction_finds_scalar_leaves_under_data(
        field in arb_key(),
        value in "[ -~]{0,16}",
    ) {
        let mut todo = serde_json::Map::new();
        todo.insert(field.clone(), Value::String(value.clone()));
        let response = json!({"data": {"todo": todo}}).to_string();
        let mut key_paths = BTreeMap::new();
        key_paths.insert("wanted".to_string(), format!("todo.{field}"));

        let extracted = extract_values(&key_paths, &response).unwrap();
        prop_assert_eq!(&extracted["wanted"], &value);
    }

    #[test]
    fn extraction_coerces_bool_leaves(field in arb_key(), value: bool) {
        let mut todo = serde_json::Map::new();
        todo.insert(field.clone(), Value::Bool(value));
        let response = json!({"data": {"todo": todo}}).to_string();
        let mut key_paths = BTreeMap::new();
        key_paths.insert("flag".to_string(), format!("todo.{field}"));

        let extracted = extract_values(&key_paths, &response).unwrap();
        prop_assert_eq!(&extracted["flag"], &value.to_string());
    }

    #[test]
    fn hash_is_deterministic_and_non_negative(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let first = content_hash(&bytes);
        let second = content_hash(&bytes);
        prop_assert_eq!(first, second);
        prop_assert!(first >= 0);
    }

    #[test]
    fn equality_is_reflexive(value in arb_json()) {
        prop_assert!(values_equal(&value, &value));
    }

    #[test]
    fn diff_of_a_document_with_itself_is_empty(desired in arb_json_object()) {
        let changed = diff(&desired, &desired, DEFAULT_DIFF_EXCLUSIONS);
        prop_assert!(changed.is_empty(), "unexpected drift: {changed:?}");
    }

    #[test]
    fn diff_never_reports_excluded_keys(
        desired in arb_json_object(),
        current in arb_json_object(),
    ) {
        let changed = diff(&desired, &current, DEFAULT_DIFF_EXCLUSIONS);
        for excluded in DEFAULT_DIFF_EXCLUSIONS {
            prop_assert!(!changed.contains_key(*excluded));
        }
    }

    #[test]
    fn string_arrays_compare_order_insensitively(
        mut items in prop::collection::vec("[a-z]{1,8}", 0..6),
    ) {
        let forward = Value::Array(items.iter().cloned().map(Value::String).collect());
        items.reverse();
        let reversed = Value::Array(items.into_iter().map(Value::String).collect());
        prop_assert!(values_equal(&forward, &reversed));
    }

    #[test]
    fn extra_remote_fields_are_never_drift(
        desired in arb_json_object(),
        extra_key in arb_key(),
        extra_value in arb_json(),
    ) {
        prop_assume!(!desired.contains_key(&extra_key));
        let mut current = desired.clone();
        current.insert(extra_key, extra_value);

        let changed = diff(&desired, &current, DEFAULT_DIFF_EXCLUSIONS);
        prop_assert!(changed.is_empty());
    }
}

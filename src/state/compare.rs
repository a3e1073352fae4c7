//! Desired-vs-remote state comparison
//!
//! Drift detection and patch construction both reduce to one question: is
//! the remote value for a caller-managed field still what the caller
//! declared? Comparison is asymmetric on purpose. Only keys present in the
//! desired document are checked, extra remote fields are never drift, and
//! a write-only sentinel on the remote side always compares equal since
//! the API will never echo the real value back.

use serde_json::{Map, Value};

/// Remote-side marker for write-only fields. APIs that redact secrets
/// return this instead of the stored value.
pub const SECRET_SENTINEL: &str = "__secret_content__";

/// Keys never reported by [`diff`], regardless of value. `type` is
/// immutable on every backend this was built against.
pub const DEFAULT_DIFF_EXCLUSIONS: &[&str] = &["type"];

/// Deep equality between a desired value and a remote value.
pub fn values_equal(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::Null, Value::Null) => true,
        (Value::Null, other) | (other, Value::Null) => is_effectively_null(other),
        _ if current.as_str() == Some(SECRET_SENTINEL) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => objects_equal(a, b),
        (Value::Array(a), Value::Array(b)) => arrays_equal(a, b),
        _ => canonical(desired) == canonical(current),
    }
}

/// Changed fields between desired and remote state: for each non-excluded
/// desired key, the desired value if it is absent or unequal remotely.
/// Keys only the remote side has are never reported.
pub fn diff(
    desired: &Map<String, Value>,
    current: &Map<String, Value>,
    exclusions: &[&str],
) -> Map<String, Value> {
    let mut changed = Map::new();
    for (key, desired_value) in desired {
        if exclusions.contains(&key.as_str()) {
            continue;
        }
        let unchanged = current
            .get(key)
            .is_some_and(|current_value| values_equal(desired_value, current_value));
        if !unchanged {
            tracing::debug!(field = %key, "field drifted");
            changed.insert(key.clone(), desired_value.clone());
        }
    }
    changed
}

/// Empty containers and containers of nothing but nulls count as null.
fn is_effectively_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.values().all(Value::is_null),
        Value::Array(items) => items.iter().all(Value::is_null),
        _ => false,
    }
}

fn objects_equal(desired: &Map<String, Value>, current: &Map<String, Value>) -> bool {
    desired.iter().all(|(key, desired_value)| {
        current
            .get(key)
            .is_some_and(|current_value| values_equal(desired_value, current_value))
    })
}

fn arrays_equal(desired: &[Value], current: &[Value]) -> bool {
    if desired.len() != current.len() {
        return false;
    }

    // String sets are order-insensitive; anything else compares by position.
    match (all_strings(desired), all_strings(current)) {
        (Some(mut a), Some(mut b)) => {
            a.sort_unstable();
            b.sort_unstable();
            a == b
        }
        _ => desired
            .iter()
            .zip(current)
            .all(|(d, c)| values_equal(d, c)),
    }
}

fn all_strings(items: &[Value]) -> Option<Vec<&str>> {
    items.iter().map(Value::as_str).collect()
}

/// Canonical form for the mixed-type fallback: strings trimmed, string
/// arrays sorted, then serialized.
fn canonical(value: &Value) -> String {
    serde_json::to_string(&normalize(value)).unwrap_or_default()
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, nested)| (key.clone(), normalize(nested)))
                .collect(),
        ),
        Value::Array(items) => {
            if let Some(mut strings) = all_strings(items) {
                strings.sort_unstable();
                Value::Array(strings.iter().map(|s| Value::String(s.to_string())).collect())
            } else {
                Value::Array(items.iter().map(normalize).collect())
            }
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equality_is_reflexive() {
        for value in [
            json!(null),
            json!(true),
            json!(42),
            json!("text"),
            json!(["a", "b"]),
            json!({"nested": {"deep": [1, 2, 3]}}),
        ] {
            assert!(values_equal(&value, &value), "not reflexive: {value}");
        }
    }

    #[test]
    fn secret_sentinel_matches_any_desired_value() {
        assert!(values_equal(&json!("hunter2"), &json!(SECRET_SENTINEL)));
        assert!(values_equal(
            &json!({"password": "hunter2"}),
            &json!({"password": SECRET_SENTINEL})
        ));
        // Only the remote side is sentinel-aware.
        assert!(!values_equal(&json!(SECRET_SENTINEL), &json!("hunter2")));
    }

    #[test]
    fn null_matches_effectively_null_containers() {
        assert!(values_equal(&json!(null), &json!({})));
        assert!(values_equal(&json!(null), &json!({"a": null, "b": null})));
        assert!(values_equal(&json!([]), &json!(null)));
        assert!(!values_equal(&json!(null), &json!({"a": 1})));
    }

    #[test]
    fn extra_remote_object_fields_are_ignored() {
        assert!(values_equal(
            &json!({"name": "x"}),
            &json!({"name": "x", "extra": "y"})
        ));
    }

    #[test]
    fn string_arrays_compare_as_sets() {
        assert!(values_equal(&json!(["b", "a"]), &json!(["a", "b"])));
        assert!(!values_equal(&json!(["a"]), &json!(["a", "a"])));
    }

    #[test]
    fn mixed_arrays_compare_by_position() {
        assert!(values_equal(&json!([1, "a"]), &json!([1, "a"])));
        assert!(!values_equal(&json!([1, "a"]), &json!(["a", 1])));
    }

    #[test]
    fn diff_of_identical_maps_is_empty() {
        let desired = json!({"name": "x", "enabled": true});
        let changed = diff(
            desired.as_object().unwrap(),
            desired.as_object().unwrap(),
            DEFAULT_DIFF_EXCLUSIONS,
        );
        assert!(changed.is_empty());
    }

    #[test]
    fn diff_ignores_extra_remote_fields() {
        let desired = json!({"name": "x"});
        let current = json!({"name": "x", "extra": "y"});
        let changed = diff(
            desired.as_object().unwrap(),
            current.as_object().unwrap(),
            DEFAULT_DIFF_EXCLUSIONS,
        );
        assert!(changed.is_empty());
    }

    #[test]
    fn diff_reports_the_desired_value_for_changed_fields() {
        let desired = json!({"name": "new"});
        let current = json!({"name": "old"});
        let changed = diff(
            desired.as_object().unwrap(),
            current.as_object().unwrap(),
            DEFAULT_DIFF_EXCLUSIONS,
        );
        assert_eq!(Value::Object(changed), json!({"name": "new"}));
    }

    #[test]
    fn diff_reports_fields_missing_remotely() {
        let desired = json!({"name": "x", "enabled": true});
        let current = json!({"name": "x"});
        let changed = diff(
            desired.as_object().unwrap(),
            current.as_object().unwrap(),
            DEFAULT_DIFF_EXCLUSIONS,
        );
        assert_eq!(Value::Object(changed), json!({"enabled": true}));
    }

    #[test]
    fn excluded_keys_never_appear_in_a_diff() {
        let desired = json!({"type": "http", "name": "new"});
        let current = json!({"type": "grpc", "name": "old"});
        let changed = diff(
            desired.as_object().unwrap(),
            current.as_object().unwrap(),
            DEFAULT_DIFF_EXCLUSIONS,
        );
        assert_eq!(Value::Object(changed), json!({"name": "new"}));
    }

    #[test]
    fn mismatched_types_fall_back_to_canonical_comparison() {
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(!values_equal(&json!({"a": 1}), &json!([1])));
    }
}

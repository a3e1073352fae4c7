//! Auto-generation of extraction key maps
//!
//! When `compute_from_read` / `compute_from_create` is enabled the caller
//! does not declare key paths; instead the response's `data` object is
//! flattened into `leaf-key -> dot-path` pairs. Traversal is depth-first
//! in key order and the first occurrence of a leaf key wins.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ExtractError;

/// Flatten the `data` object of a response into a key/path map suitable
/// for [`crate::extract::extract_values`].
pub fn generate_keys_from_response(
    response_bytes: &[u8],
) -> Result<BTreeMap<String, String>, ExtractError> {
    let doc: Value = serde_json::from_slice(response_bytes)?;
    let data = doc
        .get("data")
        .and_then(Value::as_object)
        .ok_or(ExtractError::MissingData)?;

    let mut generated = BTreeMap::new();
    for (key, value) in data {
        flatten(key, value, &mut generated);
    }
    Ok(generated)
}

fn flatten(prefix: &str, value: &Value, key_map: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten(&format!("{prefix}.{key}"), nested, key_map);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten(&format!("{prefix}.{index}"), nested, key_map);
            }
        }
        _ => {
            let leaf_key = prefix.rsplit('.').next().unwrap_or(prefix);
            if !key_map.contains_key(leaf_key) {
                tracing::debug!(key = leaf_key, path = prefix, "auto-generated key");
                key_map.insert(leaf_key.to_string(), prefix.to_string());
            }
        }
    }
}

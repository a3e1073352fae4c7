//! Dot-path value extraction and content hashing
//!
//! Paths are plain dot-separated keys, not a query language. Numeric
//! segments index arrays; everything else indexes object fields. Each
//! configured path is tried at four locations in a fixed order, first hit
//! wins:
//!
//! 1. `data.<path>`
//! 2. `data.paginatedData.0.<path>`
//! 3. `<path>`
//! 4. `paginatedData.0.<path>`
//!
//! Extraction is all-or-nothing per invocation: a single unresolvable key
//! fails the whole call, with every tried path and the document's actual
//! top-level keys in the error.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ExtractError;

/// Extract the configured `key -> path` map from a raw response body.
pub fn extract_values(
    key_paths: &BTreeMap<String, String>,
    response_json: &str,
) -> Result<BTreeMap<String, String>, ExtractError> {
    let doc: Value = serde_json::from_str(response_json)?;

    let mut values = BTreeMap::new();
    for (key, path) in key_paths {
        let tried = vec![
            format!("data.{path}"),
            format!("data.paginatedData.0.{path}"),
            path.clone(),
            format!("paginatedData.0.{path}"),
        ];

        let hit = tried.iter().find_map(|full| resolve_path(&doc, full));
        match hit {
            Some(leaf) => match leaf_to_string(leaf) {
                Some(text) => {
                    tracing::debug!(key = %key, path = %path, value = %text, "extracted value");
                    values.insert(key.clone(), text);
                }
                None => {
                    return Err(ExtractError::NotScalar {
                        path: path.clone(),
                        kind: kind_of(leaf),
                    })
                }
            },
            None => {
                let available_keys = top_level_keys(&doc);
                tracing::debug!(
                    path = %path,
                    ?available_keys,
                    "path not found in response"
                );
                return Err(ExtractError::PathNotFound {
                    path: path.clone(),
                    tried,
                    available_keys,
                });
            }
        }
    }

    Ok(values)
}

/// Walk a dot-path against a document. Numeric segments index arrays,
/// other segments index object fields; any mismatch fails the walk.
pub(crate) fn resolve_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| {
        match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)
            }
            _ => None,
        }
    })
}

/// Coerce a scalar leaf to its string form. Objects, arrays, and null are
/// not scalars and yield `None`.
pub(crate) fn leaf_to_string(leaf: &Value) -> Option<String> {
    match leaf {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Top-level keys of a document, for extraction diagnostics.
pub(crate) fn top_level_keys(doc: &Value) -> Vec<String> {
    match doc {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Stable content hash for resource identity: CRC32 (IEEE) over the raw
/// response bytes, never a re-serialized form, so key ordering cannot
/// change the identity. The sign bit is folded to keep the result
/// non-negative; the degenerate minimum-integer case maps to zero.
pub fn content_hash(bytes: &[u8]) -> i64 {
    let v = crc32fast::hash(bytes) as i32;
    if v >= 0 {
        v as i64
    } else if v == i32::MIN {
        0
    } else {
        -(v as i64)
    }
}

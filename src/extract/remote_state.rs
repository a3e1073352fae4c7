//! Heuristic remote-state location
//!
//! Finding "the managed resource" inside an arbitrary read response takes
//! two passes over the `data` object: paginated connections expose it as
//! the first element of a `nodes` array, and flat responses are scored by
//! how resource-shaped each top-level object looks. When neither pass
//! finds a candidate the whole document is returned unchanged so the
//! comparator still has something to work with.

use serde_json::{Map, Value};

/// Fields assigned by the server, stripped from extracted candidates so
/// drift comparison only sees caller-controlled values.
const SERVER_ONLY_FIELDS: &[&str] = &["id", "createdAt", "updatedAt", "status"];

/// Locate the remote resource state within a parsed read response.
pub fn extract_current_state(response: &Value) -> Value {
    let root = match response.get("data").and_then(Value::as_object) {
        Some(data) => data,
        None => match response.as_object() {
            Some(map) => map,
            None => return response.clone(),
        },
    };

    // Paginated connections: the resource is the first node.
    for (key, value) in root {
        let nodes = value
            .as_object()
            .and_then(|obj| obj.get("nodes"))
            .and_then(Value::as_array);
        if let Some(first) = nodes.and_then(|items| items.first()) {
            if let Some(node) = first.as_object() {
                tracing::debug!(key = %key, "remote state taken from first node");
                return strip_server_fields(node);
            }
        }
    }

    // Flat responses: score every top-level object and keep the best.
    let mut best: Option<(&str, i64, &Map<String, Value>)> = None;
    for (key, value) in root {
        if let Some(candidate) = value.as_object() {
            let score = score_candidate(candidate);
            tracing::debug!(key = %key, score, "evaluating remote state candidate");
            if score > best.map(|(_, s, _)| s).unwrap_or(0) {
                best = Some((key, score, candidate));
            }
        }
    }
    if let Some((key, score, candidate)) = best {
        tracing::debug!(key = %key, score, "remote state taken from best candidate");
        return strip_server_fields(candidate);
    }

    tracing::debug!("no remote state candidate found, using whole response");
    response.clone()
}

/// Score how resource-shaped an object is. Well-known field names carry
/// fixed weights; everything else scores by JSON type.
fn score_candidate(data: &Map<String, Value>) -> i64 {
    let mut score = 0;

    for (key, value) in data {
        score += match key.as_str() {
            "id" => non_empty_string(value) as i64 * 20,
            "name" => non_empty_string(value) as i64 * 15,
            "enabled" => value.is_boolean() as i64 * 10,
            "status" => non_empty_string(value) as i64 * 10,
            "type" => non_empty_string(value) as i64 * 8,
            "config" => value.is_object() as i64 * 12,
            "authParams" => value.is_object() as i64 * 10,
            "extraConfig" => value.is_object() as i64 * 10,
            _ => match value {
                Value::String(s) if !s.is_empty() => 3,
                Value::Bool(_) => 5,
                Value::Object(_) => 8,
                Value::Array(_) => 4,
                _ => 0,
            },
        };
    }

    if data.len() > 3 {
        score += 5;
    }
    score
}

fn non_empty_string(value: &Value) -> bool {
    value.as_str().is_some_and(|s| !s.is_empty())
}

fn strip_server_fields(data: &Map<String, Value>) -> Value {
    let mut stripped = data.clone();
    for field in SERVER_ONLY_FIELDS {
        stripped.remove(*field);
    }
    Value::Object(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_node_wins_over_scoring() {
        let response = json!({
            "data": {
                "connectors": {
                    "nodes": [
                        {"id": "c1", "name": "alpha", "enabled": true},
                        {"id": "c2", "name": "beta"}
                    ]
                },
                "other": {"id": "x", "name": "decoy", "config": {}}
            }
        });
        let state = extract_current_state(&response);
        assert_eq!(state, json!({"name": "alpha", "enabled": true}));
    }

    #[test]
    fn server_only_fields_are_stripped_from_candidates() {
        let response = json!({
            "data": {
                "connector": {
                    "id": "c1",
                    "name": "alpha",
                    "status": "ACTIVE",
                    "createdAt": "2024-01-01",
                    "updatedAt": "2024-01-02",
                    "enabled": false
                }
            }
        });
        let state = extract_current_state(&response);
        assert_eq!(state, json!({"name": "alpha", "enabled": false}));
    }

    #[test]
    fn scoring_prefers_the_resource_shaped_object() {
        let response = json!({
            "data": {
                "meta": {"requestId": "r-1"},
                "connector": {"id": "c1", "name": "alpha", "type": "http", "config": {}}
            }
        });
        let state = extract_current_state(&response);
        assert_eq!(state, json!({"name": "alpha", "type": "http", "config": {}}));
    }

    #[test]
    fn empty_well_known_strings_score_nothing() {
        // "id" only counts when non-empty, so the generic object wins.
        assert_eq!(
            score_candidate(json!({"id": ""}).as_object().unwrap()),
            0
        );
        assert_eq!(
            score_candidate(json!({"id": "x"}).as_object().unwrap()),
            20
        );
    }

    #[test]
    fn bonus_applies_past_three_fields() {
        let small = json!({"a": "x", "b": "y", "c": "z"});
        let large = json!({"a": "x", "b": "y", "c": "z", "d": "w"});
        assert_eq!(score_candidate(small.as_object().unwrap()), 9);
        assert_eq!(score_candidate(large.as_object().unwrap()), 17);
    }

    #[test]
    fn ties_keep_the_first_candidate_in_key_order() {
        let response = json!({
            "data": {
                "alpha": {"name": "first"},
                "beta": {"name": "second"}
            }
        });
        let state = extract_current_state(&response);
        assert_eq!(state, json!({"name": "first"}));
    }

    #[test]
    fn unrecognized_shapes_fall_back_to_the_whole_response() {
        let response = json!({"data": {"count": 3}});
        assert_eq!(extract_current_state(&response), response);

        let scalar = json!("not even an object");
        assert_eq!(extract_current_state(&scalar), scalar);
    }

    #[test]
    fn documents_without_data_are_searched_at_top_level() {
        let response = json!({"connector": {"id": "c1", "name": "alpha"}});
        let state = extract_current_state(&response);
        assert_eq!(state, json!({"name": "alpha"}));
    }
}

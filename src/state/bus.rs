//! Resource state bus
//!
//! The engine never owns resource state. It reads desired configuration
//! from, and writes computed results back to, a bus scoped to a single
//! resource instance. Attribute names are shared constants so the engine
//! and every bus implementation agree on the vocabulary.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Attribute names understood by the engine.
pub mod attr {
    pub const READ_QUERY: &str = "read_query";
    pub const CREATE_MUTATION: &str = "create_mutation";
    pub const UPDATE_MUTATION: &str = "update_mutation";
    pub const DELETE_MUTATION: &str = "delete_mutation";

    pub const MUTATION_VARIABLES: &str = "mutation_variables";
    pub const READ_QUERY_VARIABLES: &str = "read_query_variables";
    pub const DELETE_MUTATION_VARIABLES: &str = "delete_mutation_variables";

    pub const COMPUTE_MUTATION_KEYS: &str = "compute_mutation_keys";
    pub const READ_COMPUTE_KEYS: &str = "read_compute_keys";
    pub const COMPUTE_FROM_READ: &str = "compute_from_read";
    pub const COMPUTE_FROM_CREATE: &str = "compute_from_create";

    pub const WRAP_UPDATE_IN_PATCH: &str = "wrap_update_in_patch";
    pub const FORCE_REPLACE: &str = "force_replace";
    pub const PAGINATED: &str = "paginated";
    pub const CREATE_ONLY_FIELDS: &str = "create_only_fields";

    pub const COMPUTED_VALUES: &str = "computed_values";
    pub const COMPUTED_READ_OPERATION_VARIABLES: &str = "computed_read_operation_variables";
    pub const COMPUTED_CREATE_OPERATION_VARIABLES: &str = "computed_create_operation_variables";
    pub const COMPUTED_UPDATE_OPERATION_VARIABLES: &str = "computed_update_operation_variables";
    pub const COMPUTED_DELETE_OPERATION_VARIABLES: &str = "computed_delete_operation_variables";

    pub const QUERY_RESPONSE: &str = "query_response";
    pub const EXISTING_HASH: &str = "existing_hash";
}

/// A bus implementation could not persist or represent an attribute.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to persist attribute '{key}': {reason}")]
    Persist { key: String, reason: String },
}

/// One resource instance's attribute store.
///
/// `has_changed` answers against the last applied configuration, which is
/// what patch construction compares new desired variables to.
pub trait StateBus {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value) -> Result<(), StateError>;
    fn has_changed(&self, key: &str) -> bool;

    /// The resource identity, if one has been assigned.
    fn id(&self) -> Option<String>;
    fn set_id(&mut self, id: Option<String>);

    fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|value| value.as_str().map(str::to_string))
    }

    fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    /// An object attribute whose values are all strings, as a plain map.
    /// Non-string values are skipped.
    fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(Value::Object(map)) = self.get(key) {
            for (name, value) in map {
                if let Some(text) = value.as_str() {
                    out.insert(name, text.to_string());
                }
            }
        }
        out
    }

    fn get_string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// In-memory bus with an applied-state snapshot, used by the engine's tests
/// and by callers without an external store.
#[derive(Debug, Default)]
pub struct MemoryStateBus {
    current: BTreeMap<String, Value>,
    applied: BTreeMap<String, Value>,
    id: Option<String>,
}

impl MemoryStateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current attributes as the applied configuration, so
    /// `has_changed` reports false until the next write.
    pub fn mark_applied(&mut self) {
        self.applied = self.current.clone();
    }
}

impl StateBus for MemoryStateBus {
    fn get(&self, key: &str) -> Option<Value> {
        self.current.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StateError> {
        self.current.insert(key.to_string(), value);
        Ok(())
    }

    fn has_changed(&self, key: &str) -> bool {
        self.applied.get(key) != self.current.get(key)
    }

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_attributes() {
        let mut bus = MemoryStateBus::new();
        bus.set(attr::READ_QUERY, json!("query { todo { id } }"))
            .unwrap();
        assert_eq!(
            bus.get_str(attr::READ_QUERY).as_deref(),
            Some("query { todo { id } }")
        );
        assert!(bus.get(attr::CREATE_MUTATION).is_none());
    }

    #[test]
    fn has_changed_tracks_the_applied_snapshot() {
        let mut bus = MemoryStateBus::new();
        bus.set(attr::MUTATION_VARIABLES, json!({"name": "a"})).unwrap();
        assert!(bus.has_changed(attr::MUTATION_VARIABLES));

        bus.mark_applied();
        assert!(!bus.has_changed(attr::MUTATION_VARIABLES));

        bus.set(attr::MUTATION_VARIABLES, json!({"name": "b"})).unwrap();
        assert!(bus.has_changed(attr::MUTATION_VARIABLES));
    }

    #[test]
    fn typed_getters_ignore_mismatched_shapes() {
        let mut bus = MemoryStateBus::new();
        bus.set(attr::PAGINATED, json!("yes")).unwrap();
        assert!(!bus.get_bool(attr::PAGINATED));

        bus.set(
            attr::COMPUTE_MUTATION_KEYS,
            json!({"id": "todo.id", "count": 3}),
        )
        .unwrap();
        let keys = bus.get_string_map(attr::COMPUTE_MUTATION_KEYS);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys["id"], "todo.id");
    }

    #[test]
    fn identity_is_separate_from_attributes() {
        let mut bus = MemoryStateBus::new();
        assert!(bus.id().is_none());
        bus.set_id(Some("12345".to_string()));
        assert_eq!(bus.id().as_deref(), Some("12345"));
        bus.set_id(None);
        assert!(bus.id().is_none());
    }
}

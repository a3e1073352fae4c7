//! CRUD reconciliation state machine
//!
//! Orchestrates the client, extractors, and comparator to keep a single
//! remote resource aligned with its desired state. Each operation reads
//! desired configuration from a [`StateBus`], talks to the API, and writes
//! computed values, derived operation variables, and the raw response back
//! to the bus. Nothing is persisted before an operation succeeds, so a
//! failure partway through leaves prior state untouched.
//!
//! Deletion detection during Read is heuristic by design: a matching error
//! substring, a null primary data object, or an empty extraction all count
//! as "the resource is gone", clear the identity, and return success. A
//! false positive makes the caller recreate a resource that still exists.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::client::{GraphqlClient, OpClass};
use crate::error::{ClientError, EngineError};
use crate::extract::{self, keys, paths, remote_state};
use crate::state::bus::{attr, StateBus};
use crate::state::compare;

pub struct ReconciliationEngine<'a> {
    client: &'a GraphqlClient,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(client: &'a GraphqlClient) -> Self {
        Self { client }
    }

    /// Create the resource, assign its identity from the response hash,
    /// then refresh state with a Read.
    pub async fn create(&self, bus: &mut dyn StateBus) -> Result<(), EngineError> {
        let raw = self.run_create(bus).await?;
        bus.set_id(Some(paths::content_hash(&raw).to_string()));
        self.read(bus).await
    }

    /// Read the resource and refresh computed values, treating the
    /// documented "resource is gone" signals as a successful removal.
    pub async fn read(&self, bus: &mut dyn StateBus) -> Result<(), EngineError> {
        let query = require(bus, attr::READ_QUERY)?;

        let mut variables = stringified_object(bus, attr::READ_QUERY_VARIABLES)?;
        for (key, value) in bus.get_string_map(attr::COMPUTED_VALUES) {
            variables.insert(key, Value::String(value));
        }
        if let Some(id) = bus.id() {
            variables
                .entry("id".to_string())
                .or_insert(Value::String(id));
        }
        let variables = Value::Object(variables);
        bus.set(attr::COMPUTED_READ_OPERATION_VARIABLES, variables.clone())?;

        let matchers = &self.client.config().matchers;
        let result = if bus.get_bool(attr::PAGINATED) {
            self.client.execute_paginated(&query, &variables).await
        } else {
            self.client
                .execute(&query, &variables, OpClass::Query)
                .await
        };

        let (response, raw) = match result {
            Ok(ok) => ok,
            Err(err) => {
                if matchers.is_deletion_indicator(&err.to_string()) {
                    tracing::warn!(error = %err, "resource not found remotely, clearing state");
                    clear_remote_state(bus)?;
                    return Ok(());
                }
                return Err(err.into());
            }
        };

        if response.has_errors() {
            let messages = response.error_messages();
            if messages.iter().all(|m| matchers.is_deletion_indicator(m)) {
                tracing::warn!(?messages, "all errors indicate deletion, clearing state");
                clear_remote_state(bus)?;
                return Ok(());
            }
            return Err(EngineError::Graphql { messages });
        }

        if response.primary_data_is_null() {
            tracing::warn!("primary data object is null, clearing state");
            clear_remote_state(bus)?;
            return Ok(());
        }

        bus.set(
            attr::QUERY_RESPONSE,
            Value::String(String::from_utf8_lossy(&raw).into_owned()),
        )?;

        let key_paths = self.select_key_paths(bus, &raw);
        let computed = match store_computed_state(bus, &raw, &key_paths) {
            Ok(computed) => computed,
            Err(EngineError::Extract(err)) => {
                tracing::warn!(error = %err, "extraction found nothing, treating resource as gone");
                clear_remote_state(bus)?;
                return Ok(());
            }
            Err(other) => return Err(other),
        };
        if !key_paths.is_empty() && computed.values().all(String::is_empty) {
            tracing::warn!("all computed values are empty, treating resource as gone");
            clear_remote_state(bus)?;
            return Ok(());
        }

        self.log_drift(bus, &raw)?;
        Ok(())
    }

    /// Update the resource. With force-replace the resource is deleted and
    /// recreated instead; otherwise a patch or full payload is sent, with a
    /// one-shot fallback to the full payload when the API rejects the patch
    /// shape. Either way a Read refreshes state afterwards.
    pub async fn update(&self, bus: &mut dyn StateBus) -> Result<(), EngineError> {
        if bus.get_bool(attr::FORCE_REPLACE) {
            tracing::debug!("force_replace set, replacing resource");
            self.run_delete(bus).await?;
            self.run_create(bus).await?;
            return self.read(bus).await;
        }

        let mutation = require(bus, attr::UPDATE_MUTATION)?;
        let (variables, wrapped) = build_update_variables(bus)?;
        bus.set(attr::COMPUTED_UPDATE_OPERATION_VARIABLES, variables.clone())?;

        let matchers = &self.client.config().matchers;
        let rejected = match self
            .client
            .execute(&mutation, &variables, OpClass::Mutation)
            .await
        {
            Ok((response, _raw)) => {
                if !response.has_errors() {
                    return self.read(bus).await;
                }
                let messages = response.error_messages();
                if wrapped && messages.iter().any(|m| matchers.is_patch_rejection(m)) {
                    messages.join("; ")
                } else {
                    return Err(EngineError::Graphql { messages });
                }
            }
            Err(err) => {
                if wrapped && is_patch_rejection(&err, matchers) {
                    err.to_string()
                } else {
                    return Err(err.into());
                }
            }
        };

        tracing::warn!(error = %rejected, "patch shape rejected, retrying with full variables");
        let full = full_update_variables(bus)?;
        bus.set(attr::COMPUTED_UPDATE_OPERATION_VARIABLES, full.clone())?;
        let (response, _raw) = self
            .client
            .execute(&mutation, &full, OpClass::Mutation)
            .await?;
        if response.has_errors() {
            return Err(EngineError::Graphql {
                messages: response.error_messages(),
            });
        }

        self.read(bus).await
    }

    /// Delete the resource and clear its identity and computed values.
    pub async fn delete(&self, bus: &mut dyn StateBus) -> Result<(), EngineError> {
        self.run_delete(bus).await?;
        clear_remote_state(bus)?;
        Ok(())
    }

    /// Seed state from an externally known identity. A subsequent Read
    /// populates computed values and the raw response.
    pub fn import(&self, bus: &mut dyn StateBus, id: &str) -> Result<(), EngineError> {
        bus.set_id(Some(id.to_string()));
        bus.set(attr::COMPUTED_VALUES, Value::Object(Map::new()))?;
        Ok(())
    }

    async fn run_create(&self, bus: &mut dyn StateBus) -> Result<Vec<u8>, EngineError> {
        let mutation = require(bus, attr::CREATE_MUTATION)?;
        let variables = bus.get(attr::MUTATION_VARIABLES).unwrap_or(Value::Null);
        bus.set(attr::COMPUTED_CREATE_OPERATION_VARIABLES, variables.clone())?;

        let (response, raw) = self
            .client
            .execute(&mutation, &variables, OpClass::Mutation)
            .await?;
        if response.has_errors() {
            return Err(EngineError::Graphql {
                messages: response.error_messages(),
            });
        }

        bus.set(
            attr::EXISTING_HASH,
            Value::String(paths::content_hash(&raw).to_string()),
        )?;

        let key_paths = bus.get_string_map(attr::COMPUTE_MUTATION_KEYS);
        let key_paths = if bus.get_bool(attr::COMPUTE_FROM_CREATE) {
            auto_keys_or(&raw, key_paths)
        } else {
            key_paths
        };
        store_computed_state(bus, &raw, &key_paths)?;
        Ok(raw)
    }

    async fn run_delete(&self, bus: &mut dyn StateBus) -> Result<(), EngineError> {
        let mutation = require(bus, attr::DELETE_MUTATION)?;
        let variables = resolve_delete_variables(bus)?;
        bus.set(attr::COMPUTED_DELETE_OPERATION_VARIABLES, variables.clone())?;

        let (response, _raw) = self
            .client
            .execute(&mutation, &variables, OpClass::Mutation)
            .await?;
        if response.has_errors() {
            return Err(EngineError::Graphql {
                messages: response.error_messages(),
            });
        }
        Ok(())
    }

    /// Which key/path map drives extraction from a Read response:
    /// explicit read keys win, then auto-generation, then the create keys.
    fn select_key_paths(&self, bus: &dyn StateBus, raw: &[u8]) -> BTreeMap<String, String> {
        let read_keys = bus.get_string_map(attr::READ_COMPUTE_KEYS);
        if !read_keys.is_empty() {
            tracing::debug!("using read_compute_keys for extraction");
            return read_keys;
        }

        let mutation_keys = bus.get_string_map(attr::COMPUTE_MUTATION_KEYS);
        if bus.get_bool(attr::COMPUTE_FROM_READ) {
            return auto_keys_or(raw, mutation_keys);
        }
        mutation_keys
    }

    /// Compare desired fields against the extracted remote state. Read
    /// only logs drift; Update consumes the same comparison when building
    /// its patch.
    fn log_drift(&self, bus: &dyn StateBus, raw: &[u8]) -> Result<(), EngineError> {
        let desired = desired_fields(bus)?;
        if desired.is_empty() {
            return Ok(());
        }

        let document: Value = match serde_json::from_slice(raw) {
            Ok(document) => document,
            Err(_) => return Ok(()),
        };
        let remote = remote_state::extract_current_state(&document);
        let remote = remote.as_object().cloned().unwrap_or_default();

        let changed = compare::diff(&desired, &remote, compare::DEFAULT_DIFF_EXCLUSIONS);
        if !changed.is_empty() {
            let fields: Vec<&String> = changed.keys().collect();
            tracing::warn!(?fields, "drift detected between desired and remote state");
        }
        Ok(())
    }
}

fn require(bus: &dyn StateBus, key: &'static str) -> Result<String, EngineError> {
    bus.get_str(key)
        .filter(|value| !value.is_empty())
        .ok_or(EngineError::MissingAttribute(key))
}

/// A variables attribute as a JSON object. String attributes are parsed,
/// missing or null attributes become an empty object.
fn variables_object(
    bus: &dyn StateBus,
    key: &'static str,
) -> Result<Map<String, Value>, EngineError> {
    match bus.get(key) {
        Some(Value::Object(map)) => Ok(map),
        Some(Value::String(text)) if !text.trim().is_empty() => {
            serde_json::from_str(&text).map_err(|source| EngineError::InvalidAttribute {
                key,
                source,
            })
        }
        _ => Ok(Map::new()),
    }
}

/// Like [`variables_object`], but non-string values are JSON-encoded so
/// they travel as strings and are re-inflated at request time.
fn stringified_object(
    bus: &dyn StateBus,
    key: &'static str,
) -> Result<Map<String, Value>, EngineError> {
    let mut out = Map::new();
    for (name, value) in variables_object(bus, key)? {
        let text = match value {
            Value::String(text) => text,
            other => serde_json::to_string(&other)
                .map_err(|source| EngineError::InvalidAttribute { key, source })?,
        };
        out.insert(name, Value::String(text));
    }
    Ok(out)
}

fn auto_keys_or(raw: &[u8], fallback: BTreeMap<String, String>) -> BTreeMap<String, String> {
    match keys::generate_keys_from_response(raw) {
        Ok(auto) if !auto.is_empty() => {
            tracing::debug!(count = auto.len(), "auto-generated extraction keys");
            auto
        }
        Ok(_) => fallback,
        Err(err) => {
            tracing::warn!(error = %err, "failed to auto-generate keys, keeping configured keys");
            fallback
        }
    }
}

/// Extract computed values from a response and derive the read and delete
/// operation variables that depend on them.
fn store_computed_state(
    bus: &mut dyn StateBus,
    raw: &[u8],
    key_paths: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, EngineError> {
    let computed = if key_paths.is_empty() {
        BTreeMap::new()
    } else {
        extract::extract_values(key_paths, &String::from_utf8_lossy(raw))?
    };

    let computed_json: Map<String, Value> = computed
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    bus.set(attr::COMPUTED_VALUES, Value::Object(computed_json))?;

    let mut read_vars = stringified_object(bus, attr::READ_QUERY_VARIABLES)?;
    for (key, value) in &computed {
        read_vars.insert(key.clone(), Value::String(value.clone()));
    }
    bus.set(
        attr::COMPUTED_READ_OPERATION_VARIABLES,
        Value::Object(read_vars),
    )?;

    let mut delete_vars = variables_object(bus, attr::DELETE_MUTATION_VARIABLES)?;
    if let Some(id) = computed.get("id") {
        inject_id(&mut delete_vars, id);
    }
    bus.set(
        attr::COMPUTED_DELETE_OPERATION_VARIABLES,
        Value::Object(delete_vars),
    )?;

    Ok(computed)
}

/// Build the delete variables, resolving the identity from the first of:
/// an id embedded in the configured delete variables, computed values, or
/// the stored identity.
fn resolve_delete_variables(bus: &dyn StateBus) -> Result<Value, EngineError> {
    let mut variables = variables_object(bus, attr::DELETE_MUTATION_VARIABLES)?;

    let embedded = variables
        .get("input")
        .and_then(|input| input.get("id"))
        .or_else(|| variables.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let id = embedded
        .or_else(|| bus.get_string_map(attr::COMPUTED_VALUES).get("id").cloned())
        .or_else(|| bus.id())
        .ok_or(EngineError::MissingIdentity)?;

    inject_id(&mut variables, &id);
    Ok(Value::Object(variables))
}

/// The update variables and whether they were patch-wrapped.
///
/// With patch wrapping, the patch holds the fields whose desired value
/// differs from the remote state captured by the last Read; when the
/// desired variables have not changed since the last apply the patch is
/// empty but the payload still carries the id, so the operation stays a
/// well-formed no-op.
fn build_update_variables(bus: &dyn StateBus) -> Result<(Value, bool), EngineError> {
    let desired = variables_object(bus, attr::MUTATION_VARIABLES)?;
    let id = bus
        .get_string_map(attr::COMPUTED_VALUES)
        .get("id")
        .cloned()
        .or_else(|| bus.id());

    let wrap = bus.get_bool(attr::WRAP_UPDATE_IN_PATCH);
    match (wrap, id) {
        (true, Some(id)) => {
            let mut patch = if bus.has_changed(attr::MUTATION_VARIABLES) {
                changed_fields(bus, &desired)?
            } else {
                tracing::debug!("desired variables unchanged, sending empty patch");
                Map::new()
            };
            remove_create_only_fields(bus, &mut patch);
            Ok((json!({"input": {"id": id, "patch": patch}}), true))
        }
        (_, id) => {
            let mut variables = desired;
            if let Some(id) = id {
                inject_id(&mut variables, &id);
            }
            if let Some(Value::Object(input)) = variables.get_mut("input") {
                remove_create_only_fields(bus, input);
            }
            Ok((Value::Object(variables), false))
        }
    }
}

/// Full desired variables with the id injected, used as the patch-shape
/// rejection fallback.
fn full_update_variables(bus: &dyn StateBus) -> Result<Value, EngineError> {
    let mut variables = variables_object(bus, attr::MUTATION_VARIABLES)?;
    let id = bus
        .get_string_map(attr::COMPUTED_VALUES)
        .get("id")
        .cloned()
        .or_else(|| bus.id());
    if let Some(id) = id {
        inject_id(&mut variables, &id);
    }
    if let Some(Value::Object(input)) = variables.get_mut("input") {
        remove_create_only_fields(bus, input);
    }
    Ok(Value::Object(variables))
}

/// Fields whose desired value differs from the remote state in the stored
/// read response. A missing or unparsable stored response degrades to a
/// full diff against nothing, which sends every desired field.
fn changed_fields(
    bus: &dyn StateBus,
    desired: &Map<String, Value>,
) -> Result<Map<String, Value>, EngineError> {
    let desired_fields = match desired.get("input") {
        Some(Value::Object(input)) => input.clone(),
        _ => desired.clone(),
    };

    let remote = bus
        .get_str(attr::QUERY_RESPONSE)
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .map(|document| remote_state::extract_current_state(&document))
        .and_then(|state| state.as_object().cloned())
        .unwrap_or_default();

    Ok(compare::diff(
        &desired_fields,
        &remote,
        compare::DEFAULT_DIFF_EXCLUSIONS,
    ))
}

fn desired_fields(bus: &dyn StateBus) -> Result<Map<String, Value>, EngineError> {
    let desired = variables_object(bus, attr::MUTATION_VARIABLES)?;
    Ok(match desired.get("input") {
        Some(Value::Object(input)) => input.clone(),
        _ => desired,
    })
}

fn remove_create_only_fields(bus: &dyn StateBus, fields: &mut Map<String, Value>) {
    for path in bus.get_string_list(attr::CREATE_ONLY_FIELDS) {
        remove_nested_key(fields, &path);
    }
}

fn remove_nested_key(fields: &mut Map<String, Value>, path: &str) {
    let mut segments = path.split('.').peekable();
    let mut current = fields;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.remove(segment);
            return;
        }
        match current.get_mut(segment) {
            Some(Value::Object(nested)) => current = nested,
            _ => return,
        }
    }
}

fn inject_id(variables: &mut Map<String, Value>, id: &str) {
    match variables.get_mut("input") {
        Some(Value::Object(input)) => {
            input.insert("id".to_string(), Value::String(id.to_string()));
        }
        _ => {
            variables.insert("input".to_string(), json!({"id": id}));
        }
    }
}

fn clear_remote_state(bus: &mut dyn StateBus) -> Result<(), EngineError> {
    bus.set_id(None);
    bus.set(attr::COMPUTED_VALUES, Value::Object(Map::new()))?;
    Ok(())
}

fn is_patch_rejection(err: &ClientError, matchers: &crate::config::ErrorMatchers) -> bool {
    match err {
        ClientError::Status { status, body } => {
            status.as_u16() == 422 || matchers.is_patch_rejection(body)
        }
        ClientError::Graphql { messages } => {
            messages.iter().any(|m| matchers.is_patch_rejection(m))
        }
        _ => false,
    }
}

//! Error taxonomy for the reconciliation engine
//!
//! Failures are split along the boundaries that matter for retry and
//! deletion handling: transport/HTTP failures, GraphQL-level errors carried
//! in a 200 response, extraction failures, and engine-level faults. Every
//! variant keeps the underlying message text for operator diagnosis.

use std::time::Duration;

use thiserror::Error;

use crate::config::ErrorMatchers;

/// Errors produced while talking to the GraphQL endpoint.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never completed (DNS, TLS, timeout, connection reset).
    #[error("failed to send request to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("API request failed with HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response body was not a well-formed GraphQL response document.
    #[error("unable to parse graphql server response: {source} ---> {body}")]
    Parse {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    /// A 200 response carrying a non-empty `errors` array.
    #[error("graphql server returned errors: {}", messages.join("; "))]
    Graphql { messages: Vec<String> },

    /// Serializing a merged pagination document failed.
    #[error("error marshaling merged response: {0}")]
    Encode(#[source] serde_json::Error),

    /// The underlying HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// Provider configuration was rejected before any request was made.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// OAuth2 token acquisition failed.
    #[error("OAuth2 login failed: {0}")]
    Auth(String),
}

/// Invalid provider configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid endpoint URL '{url}': {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("incomplete OAuth2 configuration: {0}")]
    IncompleteOAuth2(&'static str),
}

/// A configured extraction path could not be resolved.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(
        "the path '{path}' does not exist in the response (tried: {}). \
         Available top-level keys: {available_keys:?}",
        tried.join(", ")
    )]
    PathNotFound {
        path: String,
        tried: Vec<String>,
        available_keys: Vec<String>,
    },

    #[error("value at path '{path}' is not a scalar (found {kind})")]
    NotScalar { path: String, kind: &'static str },

    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("response JSON does not contain a 'data' object")]
    MissingData,
}

/// Failures surfaced by the CRUD state machine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    State(#[from] crate::state::bus::StateError),

    #[error("graphql server error: {}", messages.join("; "))]
    Graphql { messages: Vec<String> },

    #[error("missing required attribute '{0}'")]
    MissingAttribute(&'static str),

    #[error("failed to decode attribute '{key}' as JSON: {source}")]
    InvalidAttribute {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "no resource id available for delete: checked delete variables, \
         computed values, and the stored identity"
    )]
    MissingIdentity,
}

/// How a request failure should be treated by the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient throttling; retry after the given (or computed) delay.
    RateLimited { retry_after: Option<Duration> },
    /// A semantic rejection by the API; retrying can never succeed.
    BusinessLogic,
    /// Everything else; surfaced to the caller without retry.
    Other,
}

impl ClientError {
    /// Classify this failure for the retry loop. Exactly one class applies.
    pub fn classify(&self, matchers: &ErrorMatchers) -> FailureClass {
        match self {
            ClientError::Status { status, body } => {
                if status.as_u16() == 429 || contains_ci(body, "rate limit") {
                    FailureClass::RateLimited {
                        retry_after: retry_after_hint(body),
                    }
                } else if matchers.is_business_logic(body) {
                    FailureClass::BusinessLogic
                } else {
                    FailureClass::Other
                }
            }
            ClientError::Graphql { messages } => {
                if messages.iter().any(|m| contains_ci(m, "rate limit")) {
                    FailureClass::RateLimited { retry_after: None }
                } else if messages.iter().any(|m| matchers.is_business_logic(m)) {
                    FailureClass::BusinessLogic
                } else {
                    FailureClass::Other
                }
            }
            ClientError::Transport { source, .. } => {
                if contains_ci(&source.to_string(), "rate limit") {
                    FailureClass::RateLimited { retry_after: None }
                } else {
                    FailureClass::Other
                }
            }
            _ => FailureClass::Other,
        }
    }
}

/// Case-insensitive substring check used by all message matching.
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Look for a server-specified `retryAfterNS` nanosecond value anywhere in
/// an error body. Servers that throttle embed it at varying depths, so the
/// whole document is scanned.
pub(crate) fn retry_after_hint(body: &str) -> Option<Duration> {
    let doc: serde_json::Value = serde_json::from_str(body).ok()?;
    find_retry_after(&doc)
}

fn find_retry_after(value: &serde_json::Value) -> Option<Duration> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(ns) = map.get("retryAfterNS").and_then(|v| v.as_u64()) {
                return Some(Duration::from_nanos(ns));
            }
            map.values().find_map(find_retry_after)
        }
        serde_json::Value::Array(items) => items.iter().find_map(find_retry_after),
        _ => None,
    }
}

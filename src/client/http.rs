//! The rate-limited, retrying request executor
//!
//! One `GraphqlClient` per provider configuration. Every operation goes
//! through [`GraphqlClient::execute`]: wait on the token bucket for the
//! operation class, POST `{query, variables}`, classify any failure, and
//! retry only when the failure is rate-limiting.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use super::auth;
use super::rate_limit::{OpClass, RateLimiterRegistry};
use super::response::{GqlRequest, GqlResponse};
use crate::config::ProviderConfig;
use crate::error::{contains_ci, retry_after_hint, ClientError, FailureClass};

/// Maximum number of attempts per logical request.
const MAX_ATTEMPTS: u32 = 5;

/// Linear jitter added per attempt on top of the backoff.
const RETRY_JITTER: Duration = Duration::from_millis(100);

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and masks potentially sensitive patterns
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        format!(
            "{}... [truncated, {} bytes total]",
            &body[..MAX_LOG_BODY_LENGTH],
            body.len()
        )
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for one GraphQL endpoint
pub struct GraphqlClient {
    http: reqwest::Client,
    config: ProviderConfig,
    limiters: RateLimiterRegistry,
}

impl GraphqlClient {
    /// Create a client without resolving any OAuth2 token source.
    pub fn new(config: ProviderConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("gqlsync/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(ClientError::Build)?;

        let limiters = RateLimiterRegistry::new(
            config.query_rate_limit_delay,
            config.mutation_rate_limit_delay,
        );

        Ok(Self {
            http,
            config,
            limiters,
        })
    }

    /// Create a client and, if a token source is configured, perform the
    /// OAuth2 login and install the resulting bearer token.
    pub async fn connect(config: ProviderConfig) -> Result<Self, ClientError> {
        let mut client = Self::new(config)?;

        if let Some(source) = client.config.token_source.clone() {
            let token = auth::fetch_bearer_token(&client, &source).await?;
            client
                .config
                .authorization_headers
                .insert("Authorization".to_string(), format!("Bearer {token}"));
            tracing::debug!("OAuth2 login successful");
        }

        Ok(client)
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Execute a query or mutation with retry.
    ///
    /// Returns the parsed response document together with the raw response
    /// bytes (extraction hashes the raw bytes, never a re-serialized form).
    /// A 200 response with GraphQL errors is returned as a success unless
    /// every attempt reclassifies as rate-limiting.
    pub async fn execute(
        &self,
        query: &str,
        variables: &Value,
        class: OpClass,
    ) -> Result<(GqlResponse, Vec<u8>), ClientError> {
        let prepared = prepare_variables(variables, None);

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiters.acquire(class).await;

            match self.execute_once(query, &prepared).await {
                Ok((response, raw)) => {
                    let rate_limited = response
                        .errors
                        .iter()
                        .any(|e| contains_ci(&e.message, "rate limit"));
                    if rate_limited && attempt < MAX_ATTEMPTS {
                        let delay = retry_after_hint(&String::from_utf8_lossy(&raw))
                            .unwrap_or_else(|| self.backoff(attempt));
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "server reported rate limiting in response errors, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Ok((response, raw));
                }
                Err(err) => match err.classify(&self.config.matchers) {
                    FailureClass::RateLimited { retry_after } if attempt < MAX_ATTEMPTS => {
                        let delay = retry_after.unwrap_or_else(|| self.backoff(attempt));
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "rate limited, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    FailureClass::BusinessLogic => {
                        tracing::debug!(error = %err, "business-logic failure, not retrying");
                        return Err(err);
                    }
                    _ => return Err(err),
                },
            }
        }
    }

    async fn execute_once(
        &self,
        query: &str,
        variables: &Value,
    ) -> Result<(GqlResponse, Vec<u8>), ClientError> {
        let url = &self.config.endpoint;
        tracing::debug!("POST {}", url);

        let body = GqlRequest { query, variables };

        let response = self
            .http
            .post(url)
            .headers(self.layered_headers())
            .json(&body)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let raw = response
            .bytes()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?
            .to_vec();

        if !status.is_success() {
            let text = String::from_utf8_lossy(&raw).into_owned();
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));
            return Err(ClientError::Status { status, body: text });
        }

        let parsed: GqlResponse =
            serde_json::from_slice(&raw).map_err(|source| ClientError::Parse {
                source,
                body: sanitize_for_log(&String::from_utf8_lossy(&raw)),
            })?;

        Ok((parsed, raw))
    }

    /// Headers for one request: statics, then authorization, then
    /// caller-supplied. Insertion replaces, so later layers win on
    /// conflict and at most one value per name goes on the wire.
    fn layered_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        insert_layer(&mut headers, &self.config.authorization_headers);
        insert_layer(&mut headers, &self.config.headers);
        headers
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config.retry_base_delay * attempt + RETRY_JITTER * attempt
    }
}

fn insert_layer(headers: &mut HeaderMap, layer: &BTreeMap<String, String>) {
    for (name, value) in layer {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "skipping invalid configured header"),
        }
    }
}

/// Prepare a variables document for the wire.
///
/// String values that themselves parse as JSON are inflated back into
/// structured values: the state bus stores nested documents and numeric
/// ids as strings, and the API expects them structured. An optional
/// pagination cursor is merged in under `after`.
pub(crate) fn prepare_variables(variables: &Value, cursor: Option<&str>) -> Value {
    let mut prepared = match variables {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => inflate(other),
    };

    if let Some(cursor) = cursor {
        if !cursor.is_empty() {
            if let Value::Object(map) = &mut prepared {
                map.insert("after".to_string(), Value::String(cursor.to_string()));
            }
        }
    }

    prepared
}

fn inflate(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), inflate(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(inflate).collect()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed) => parsed,
            Err(_) => value.clone(),
        },
        other => other.clone(),
    }
}

//! Provider configuration
//!
//! Holds everything shared by all operations against one GraphQL endpoint:
//! the endpoint itself, header layers, rate-limit pacing, retry tuning, and
//! the substring matchers used to classify API error messages. The matcher
//! lists are configuration rather than constants: the defaults are tuned to
//! one family of backends and callers talking to a different API are
//! expected to replace them.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::client::auth::TokenSource;
use crate::error::{contains_ci, ConfigError};

/// Default minimum delay between queries (10/sec).
pub const DEFAULT_QUERY_RATE_LIMIT_DELAY: Duration = Duration::from_millis(100);

/// Default minimum delay between mutations (2.5/sec).
pub const DEFAULT_MUTATION_RATE_LIMIT_DELAY: Duration = Duration::from_millis(400);

/// Bounded timeout applied to every HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Base delay for the retry backoff when the server gives no hint.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Substring lists used to classify API error messages.
///
/// Matching is case-insensitive. These are heuristics, not protocol
/// guarantees: a deletion indicator that matches a genuine failure makes
/// the engine treat a live resource as gone.
#[derive(Debug, Clone)]
pub struct ErrorMatchers {
    /// Messages that mean the request is semantically rejected and a retry
    /// can never succeed.
    pub business_logic: Vec<String>,
    /// Messages that mean the resource no longer exists remotely.
    pub deletion_indicators: Vec<String>,
    /// Messages that mean the API rejected the patch-wrapped update shape.
    pub patch_rejection: Vec<String>,
}

impl Default for ErrorMatchers {
    fn default() -> Self {
        Self {
            business_logic: vec![
                "can't enable multiple versions".to_string(),
                "already enabled".to_string(),
                "already exists".to_string(),
                "conflict".to_string(),
            ],
            deletion_indicators: vec![
                "not found".to_string(),
                "deleted".to_string(),
                "does not exist".to_string(),
                "cannot return null for non-nullable field".to_string(),
            ],
            patch_rejection: vec![
                "unknown field".to_string(),
                "invalid type".to_string(),
                "invalid value".to_string(),
            ],
        }
    }
}

impl ErrorMatchers {
    pub fn is_business_logic(&self, message: &str) -> bool {
        self.business_logic.iter().any(|s| contains_ci(message, s))
    }

    pub fn is_deletion_indicator(&self, message: &str) -> bool {
        self.deletion_indicators
            .iter()
            .any(|s| contains_ci(message, s))
    }

    pub fn is_patch_rejection(&self, message: &str) -> bool {
        self.patch_rejection.iter().any(|s| contains_ci(message, s))
    }
}

/// Configuration for one GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// The URL of the GraphQL server.
    pub endpoint: String,
    /// Additional headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Authorization headers, applied after static headers and before
    /// caller-supplied ones.
    pub authorization_headers: BTreeMap<String, String>,
    /// Optional OAuth2 token source resolved once at connect time.
    pub token_source: Option<TokenSource>,
    /// Minimum delay between queries; zero disables limiting.
    pub query_rate_limit_delay: Duration,
    /// Minimum delay between mutations; zero disables limiting.
    pub mutation_rate_limit_delay: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Base delay for retry backoff.
    pub retry_base_delay: Duration,
    /// Error message classification.
    pub matchers: ErrorMatchers,
}

impl ProviderConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headers: BTreeMap::new(),
            authorization_headers: BTreeMap::new(),
            token_source: None,
            query_rate_limit_delay: DEFAULT_QUERY_RATE_LIMIT_DELAY,
            mutation_rate_limit_delay: DEFAULT_MUTATION_RATE_LIMIT_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            matchers: ErrorMatchers::default(),
        }
    }

    /// Add a header sent with every request (wins over authorization
    /// headers on conflict).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn token_source(mut self, source: TokenSource) -> Self {
        self.token_source = Some(source);
        self
    }

    pub fn query_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.query_rate_limit_delay = delay;
        self
    }

    pub fn mutation_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.mutation_rate_limit_delay = delay;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn matchers(mut self, matchers: ErrorMatchers) -> Self {
        self.matchers = matchers;
        self
    }

    /// Validate the configuration before any request is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.endpoint).map_err(|source| ConfigError::InvalidEndpoint {
            url: self.endpoint.clone(),
            source,
        })?;

        match &self.token_source {
            Some(TokenSource::LoginQuery(login)) if login.token_path.is_empty() => {
                Err(ConfigError::IncompleteOAuth2(
                    "login query requires a token path to extract the token from the response",
                ))
            }
            Some(TokenSource::Rest(rest)) if rest.token_path.is_empty() => Err(
                ConfigError::IncompleteOAuth2("REST token source requires a token path"),
            ),
            _ => Ok(()),
        }
    }
}

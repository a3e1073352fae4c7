//! OAuth2 token acquisition
//!
//! Two ways to obtain a bearer token at connect time: a login query against
//! the same GraphQL endpoint whose response carries the token at a
//! configured path, or a plain REST call (method, URL, headers, body) whose
//! JSON response carries it. REST bodies support `${var.x}` / `$x`
//! placeholders resolved from the environment variable `X` (uppercased),
//! so credentials stay out of configuration files.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::http::GraphqlClient;
use super::rate_limit::OpClass;
use crate::error::ClientError;
use crate::extract::paths;

/// Where the bearer token comes from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    LoginQuery(LoginQuery),
    Rest(RestToken),
}

/// A GraphQL login query executed against the provider endpoint.
#[derive(Debug, Clone)]
pub struct LoginQuery {
    pub query: String,
    pub variables: Value,
    /// Dot-path to the token within the login response.
    pub token_path: String,
}

/// A REST token endpoint.
#[derive(Debug, Clone)]
pub struct RestToken {
    pub url: String,
    /// HTTP method, default POST.
    pub method: String,
    pub headers: BTreeMap<String, String>,
    /// Request body; `${var.x}` / `$x` placeholders are substituted from
    /// the environment.
    pub body: String,
    /// Dot-path to the token within the JSON response.
    pub token_path: String,
}

impl Default for RestToken {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "POST".to_string(),
            headers: BTreeMap::new(),
            body: String::new(),
            token_path: String::new(),
        }
    }
}

/// Resolve a token source to a bearer token string.
pub(crate) async fn fetch_bearer_token(
    client: &GraphqlClient,
    source: &TokenSource,
) -> Result<String, ClientError> {
    let token = match source {
        TokenSource::LoginQuery(login) => login_query_token(client, login).await?,
        TokenSource::Rest(rest) => rest_token(client, rest).await?,
    };

    if token.is_empty() {
        return Err(ClientError::Auth("extracted token is empty".to_string()));
    }
    Ok(token)
}

async fn login_query_token(
    client: &GraphqlClient,
    login: &LoginQuery,
) -> Result<String, ClientError> {
    tracing::debug!("performing OAuth2 login query");

    let (response, raw) = client
        .execute(&login.query, &login.variables, OpClass::Query)
        .await?;

    if response.has_errors() {
        return Err(ClientError::Graphql {
            messages: response.error_messages(),
        });
    }

    let mut key_paths = BTreeMap::new();
    key_paths.insert("token".to_string(), login.token_path.clone());
    let values = paths::extract_values(&key_paths, &String::from_utf8_lossy(&raw))
        .map_err(|err| ClientError::Auth(err.to_string()))?;

    Ok(values.get("token").cloned().unwrap_or_default())
}

async fn rest_token(client: &GraphqlClient, rest: &RestToken) -> Result<String, ClientError> {
    tracing::debug!("performing REST OAuth2 login");

    let method = reqwest::Method::from_bytes(rest.method.to_uppercase().as_bytes())
        .map_err(|_| ClientError::Auth(format!("invalid HTTP method '{}'", rest.method)))?;
    let body = substitute_env_vars(&rest.body);

    let mut request = client.http().request(method, &rest.url);
    if rest.headers.is_empty() {
        request = request
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json");
    } else {
        for (name, value) in &rest.headers {
            request = request.header(name, value);
        }
    }

    let response = request
        .body(body)
        .send()
        .await
        .map_err(|source| ClientError::Transport {
            url: rest.url.clone(),
            source,
        })?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|source| ClientError::Transport {
            url: rest.url.clone(),
            source,
        })?;

    if !status.is_success() {
        return Err(ClientError::Status { status, body: text });
    }

    let doc: Value = serde_json::from_str(&text).map_err(|source| ClientError::Parse {
        source,
        body: text.clone(),
    })?;

    paths::resolve_path(&doc, &rest.token_path)
        .and_then(paths::leaf_to_string)
        .ok_or_else(|| {
            ClientError::Auth(format!(
                "token path '{}' not found in response",
                rest.token_path
            ))
        })
}

/// Replace `${var.name}` and `$name` placeholders with the environment
/// variable `NAME`. Placeholders whose variable is unset are left intact
/// and logged, matching the behavior of the configuration they came from.
pub(crate) fn substitute_env_vars(body: &str) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{var\.([A-Za-z0-9_]+)\}|\$([A-Za-z0-9_]+)").expect("placeholder regex")
    });

    re.replace_all(body, |caps: &regex::Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match std::env::var(name.to_uppercase()) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(placeholder = name, "environment variable not set, leaving placeholder");
                caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default()
            }
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_both_placeholder_styles() {
        std::env::set_var("GQLSYNC_TEST_CLIENT_ID", "id-123");
        let body = "client_id=${var.gqlsync_test_client_id}&again=$gqlsync_test_client_id";
        assert_eq!(
            substitute_env_vars(body),
            "client_id=id-123&again=id-123"
        );
    }

    #[test]
    fn unset_placeholder_is_left_intact() {
        std::env::remove_var("GQLSYNC_TEST_MISSING");
        let body = "secret=${var.gqlsync_test_missing}";
        assert_eq!(substitute_env_vars(body), body);
    }

    #[test]
    fn plain_bodies_pass_through() {
        let body = "grant_type=client_credentials&audience=api";
        assert_eq!(substitute_env_vars(body), body);
    }
}

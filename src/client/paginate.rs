//! Cursor-driven pagination
//!
//! Drives the executor in a loop following a relay-style cursor, merging
//! every page's `data` object into one logical document the extractor can
//! address as `paginatedData.<index>.<path>`.

use serde_json::{Map, Value};

use super::http::{prepare_variables, GraphqlClient};
use super::rate_limit::OpClass;
use super::response::GqlResponse;
use crate::error::ClientError;

impl GraphqlClient {
    /// Execute a query repeatedly, following `pageInfo.endCursor` until the
    /// server reports no further pages.
    ///
    /// A missing or malformed `pageInfo` terminates the loop after the
    /// current page (`hasNextPage` defaults to false, `endCursor` to
    /// empty), so a non-paginated response yields a single-page result
    /// rather than an error.
    pub async fn execute_paginated(
        &self,
        query: &str,
        variables: &Value,
    ) -> Result<(GqlResponse, Vec<u8>), ClientError> {
        let mut pages = Vec::new();
        let mut errors = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let vars = prepare_variables(variables, cursor.as_deref());
            let (response, _raw) = self.execute(query, &vars, OpClass::Query).await?;

            errors.extend(response.errors.iter().cloned());
            if let Some(data) = response.data.clone() {
                pages.push(data);
            }

            let page_info = response.data.as_ref().and_then(find_page_info);
            let has_next = page_info
                .and_then(|info| info.get("hasNextPage"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let end_cursor = page_info
                .and_then(|info| info.get("endCursor"))
                .and_then(Value::as_str)
                .unwrap_or("");

            if !has_next || end_cursor.is_empty() {
                tracing::debug!(pages = pages.len(), "pagination complete");
                break;
            }
            cursor = Some(end_cursor.to_string());
        }

        let merged = GqlResponse {
            data: None,
            errors,
            paginated_data: Some(pages),
        };
        let raw = serde_json::to_vec(&merged).map_err(ClientError::Encode)?;
        Ok((merged, raw))
    }
}

/// Locate the `pageInfo` object in a response document.
///
/// Prefers a map that carries `pageInfo` next to an `edges` sibling (the
/// relay connection shape); falls back to the first `pageInfo` object found
/// at any depth.
fn find_page_info(data: &Value) -> Option<&Map<String, Value>> {
    find_with_sibling(data, true).or_else(|| find_with_sibling(data, false))
}

fn find_with_sibling(value: &Value, require_edges: bool) -> Option<&Map<String, Value>> {
    let map = value.as_object()?;

    if !require_edges || map.contains_key("edges") {
        if let Some(info) = map.get("pageInfo").and_then(Value::as_object) {
            return Some(info);
        }
    }

    map.values()
        .find_map(|nested| find_with_sibling(nested, require_edges))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_page_info_next_to_edges() {
        let data = json!({
            "todos": {
                "edges": [{"node": {"id": "1"}}],
                "pageInfo": {"hasNextPage": true, "endCursor": "c1"}
            }
        });
        let info = find_page_info(&data).unwrap();
        assert_eq!(info["endCursor"], "c1");
    }

    #[test]
    fn falls_back_to_page_info_without_edges() {
        let data = json!({"todos": {"pageInfo": {"hasNextPage": false}}});
        let info = find_page_info(&data).unwrap();
        assert_eq!(info["hasNextPage"], false);
    }

    #[test]
    fn prefers_connection_shaped_page_info() {
        let data = json!({
            "meta": {"pageInfo": {"endCursor": "stray"}},
            "todos": {
                "edges": [],
                "pageInfo": {"endCursor": "real"}
            }
        });
        let info = find_page_info(&data).unwrap();
        assert_eq!(info["endCursor"], "real");
    }

    #[test]
    fn absent_page_info_is_none() {
        assert!(find_page_info(&json!({"todos": []})).is_none());
        assert!(find_page_info(&json!("scalar")).is_none());
    }
}

//! Wire types for GraphQL requests and responses

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The request body sent to the endpoint: `{query, variables}`.
#[derive(Debug, Clone, Serialize)]
pub struct GqlRequest<'a> {
    pub query: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub variables: &'a Value,
}

/// A GraphQL response document.
///
/// The merged document produced by pagination carries the accumulated
/// per-page `data` objects under `paginatedData`, which is where the path
/// extractor's fallback locations look. Some servers spell the field
/// `paginatedResponseData`; both are accepted when parsing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GqlResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GqlError>,

    #[serde(
        default,
        rename = "paginatedData",
        alias = "paginatedResponseData",
        skip_serializing_if = "Option::is_none"
    )]
    pub paginated_data: Option<Vec<Value>>,
}

/// A single GraphQL error message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GqlError {
    #[serde(default)]
    pub message: String,
}

impl GqlResponse {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }

    /// True when the response carries no usable resource data: `data` is
    /// absent, null, an empty object, or an object whose values are all
    /// null (the shape servers return for a query on a deleted resource).
    pub fn primary_data_is_null(&self) -> bool {
        match &self.data {
            None | Some(Value::Null) => self.paginated_data.is_none(),
            Some(Value::Object(map)) => map.is_empty() || map.values().all(Value::is_null),
            Some(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_standard_response() {
        let resp: GqlResponse =
            serde_json::from_str(r#"{"data":{"todo":{"id":"abc"}},"errors":[{"message":"warn"}]}"#)
                .unwrap();
        assert_eq!(resp.data.as_ref().unwrap()["todo"]["id"], "abc");
        assert_eq!(resp.error_messages(), vec!["warn"]);
    }

    #[test]
    fn accepts_both_paginated_field_spellings() {
        let a: GqlResponse =
            serde_json::from_str(r#"{"paginatedData":[{"x":1}]}"#).unwrap();
        let b: GqlResponse =
            serde_json::from_str(r#"{"paginatedResponseData":[{"x":1}]}"#).unwrap();
        assert_eq!(a.paginated_data.unwrap().len(), 1);
        assert_eq!(b.paginated_data.unwrap().len(), 1);
    }

    #[test]
    fn merged_document_serializes_under_paginated_data() {
        let resp = GqlResponse {
            data: None,
            errors: Vec::new(),
            paginated_data: Some(vec![json!({"a": 1})]),
        };
        let raw = serde_json::to_string(&resp).unwrap();
        assert!(raw.contains("\"paginatedData\""));
        assert!(!raw.contains("paginatedResponseData"));
    }

    #[test]
    fn null_and_empty_data_is_primary_null() {
        let null: GqlResponse = serde_json::from_str(r#"{"data":null}"#).unwrap();
        let empty: GqlResponse = serde_json::from_str(r#"{"data":{}}"#).unwrap();
        let nulled: GqlResponse = serde_json::from_str(r#"{"data":{"todo":null}}"#).unwrap();
        let live: GqlResponse = serde_json::from_str(r#"{"data":{"todo":{"id":"1"}}}"#).unwrap();
        assert!(null.primary_data_is_null());
        assert!(empty.primary_data_is_null());
        assert!(nulled.primary_data_is_null());
        assert!(!live.primary_data_is_null());
    }
}

//! GraphQL API interaction module
//!
//! This module provides the core functionality for talking to a GraphQL
//! endpoint: the rate-limited, retrying request executor, cursor
//! pagination, and OAuth2 token acquisition.
//!
//! # Module Structure
//!
//! - [`auth`] - OAuth2 token sources (login query or REST call)
//! - [`http`] - The request executor with retry and failure classification
//! - [`paginate`] - Cursor-driven pagination over the executor
//! - [`rate_limit`] - Per-operation-class token buckets
//! - [`response`] - Wire types for requests and responses

pub mod auth;
pub mod http;
pub mod paginate;
pub mod rate_limit;
pub mod response;

pub use http::GraphqlClient;
pub use rate_limit::{OpClass, RateLimiterRegistry};
pub use response::{GqlError, GqlRequest, GqlResponse};

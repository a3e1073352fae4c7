//! GraphQL resource reconciliation
//!
//! Keeps remote resources managed through an arbitrary GraphQL API in sync
//! with a declared desired state. The API's schema is opaque to this crate:
//! queries and mutations are caller-supplied template strings, responses
//! are traversed dynamically, and named values are extracted by dot-path
//! into a computed-values map that threads server-generated data (ids,
//! tokens) into subsequent operations.
//!
//! # Module Structure
//!
//! - [`config`] - Provider configuration and injectable error matchers
//! - [`client`] - Rate-limited, retrying GraphQL transport with pagination
//!   and OAuth2 token acquisition
//! - [`extract`] - Dot-path value extraction, key auto-generation, and
//!   remote-state location
//! - [`state`] - The resource state bus and desired-vs-remote comparison
//! - [`engine`] - The CRUD reconciliation state machine tying it together
//! - [`error`] - The error taxonomy shared by all of the above

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod state;

pub use client::{GraphqlClient, OpClass};
pub use config::{ErrorMatchers, ProviderConfig};
pub use engine::ReconciliationEngine;
pub use error::{ClientError, ConfigError, EngineError, ExtractError};
pub use state::{MemoryStateBus, StateBus};

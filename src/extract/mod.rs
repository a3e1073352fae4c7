//! Value extraction from schema-less responses
//!
//! Responses have no declared schema, so everything here works over
//! `serde_json::Value` with explicit pattern matching and fails closed.
//!
//! # Module Structure
//!
//! - [`paths`] - Dot-path extraction with layered fallback locations and
//!   the CRC32 content hash used for resource identity
//! - [`keys`] - Auto-generation of key/path maps by flattening a response
//! - [`remote_state`] - Heuristic location of "the managed resource"
//!   within an arbitrary response, for drift comparison

pub mod keys;
pub mod paths;
pub mod remote_state;

pub use keys::generate_keys_from_response;
pub use paths::{content_hash, extract_values};
pub use remote_state::extract_current_state;

//! Resource state handling
//!
//! # Module Structure
//!
//! - [`bus`] - The attribute store the engine reads desired configuration
//!   from and writes computed results to
//! - [`compare`] - Desired-vs-remote equality and diff, feeding drift
//!   detection and patch construction

pub mod bus;
pub mod compare;

pub use bus::{MemoryStateBus, StateBus, StateError};
pub use compare::{diff, values_equal};

//! Data models
//!
//! Shared between dropship-server and API clients.
//! All IDs are `i64`, all money is `i64` minor units, all timestamps are
//! Unix milliseconds.

pub mod catalog;
pub mod dropship;
pub mod order;
pub mod supplier;

// Re-exports
pub use catalog::*;
pub use dropship::*;
pub use order::*;
pub use supplier::*;

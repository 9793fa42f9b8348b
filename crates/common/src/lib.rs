//! Shared identifier types used across the allocator workflow crates.

mod types;

pub use types::{AggregateId, CorrelationId};

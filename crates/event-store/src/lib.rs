//! Append-only event store for event-sourced aggregates.
//!
//! - [`EventStore`] is the storage contract: compare-and-append per aggregate
//!   and ordered history reads.
//! - [`InMemoryEventStore`] and [`PostgresEventStore`] implement it.
//! - [`PublishingEventStore`] persists through an [`EventStore`] and then hands
//!   each stored event, in version order, to an [`EventPublisher`].

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod publisher;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{
    CORRELATION_ID_KEY, EventEnvelope, EventEnvelopeBuilder, EventId, SCHEMA_VERSION_KEY,
    UncommittedEvent, Version,
};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use publisher::{EventPublisher, PublishError, PublishingEventStore};
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream, SKIP_VERSION_CHECK};

use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, UncommittedEvent, Version};

/// Raw expected version that disables the optimistic concurrency check.
pub const SKIP_VERSION_CHECK: i64 = -1;

/// Options for appending events to the store.
///
/// There is deliberately no `Default`: every append states which version it
/// expects, or opts out of the check by calling [`AppendOptions::skip_version_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOptions {
    /// Expected version of the aggregate for optimistic concurrency control.
    /// If None, no version check is performed.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options expecting the aggregate to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the aggregate to not exist (new aggregate).
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }

    /// Creates options that bypass the conflict check.
    ///
    /// Only for read-model-only or at-most-once producer paths.
    pub fn skip_version_check() -> Self {
        Self {
            expected_version: None,
        }
    }

    /// Interprets a raw expected version, where `-1` means "skip the check".
    pub fn from_raw(expected_version: i64) -> Self {
        if expected_version == SKIP_VERSION_CHECK {
            Self::skip_version_check()
        } else {
            Self::expect_version(Version::new(expected_version))
        }
    }
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Core trait for event store implementations.
///
/// An event store is responsible for persisting and retrieving events.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events for one aggregate.
    ///
    /// Reads the last stored version for `aggregate_id` (0 when the aggregate
    /// has no history) and fails with `ConcurrencyConflict` if it differs from
    /// `options.expected_version`. Otherwise the events get sequential versions
    /// starting right after the expected version (or after the stored version
    /// when the check is skipped) and are stored atomically: either all of
    /// them or none.
    ///
    /// Returns the stored envelopes in version order.
    async fn append(
        &self,
        aggregate_id: &AggregateId,
        events: Vec<UncommittedEvent>,
        options: AppendOptions,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves all events for a specific aggregate.
    ///
    /// Events are returned in version order (oldest first). Fails with
    /// `AggregateNotFound` when the aggregate has no history.
    async fn get_events_for_aggregate(&self, aggregate_id: &AggregateId)
    -> Result<Vec<EventEnvelope>>;

    /// Gets the current version of an aggregate.
    ///
    /// Returns None if the aggregate doesn't exist.
    async fn get_aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>>;

    /// Streams all events in the store.
    ///
    /// Events are returned in insertion order.
    async fn stream_all_events(&self) -> Result<EventStream>;
}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    async fn append(
        &self,
        aggregate_id: &AggregateId,
        events: Vec<UncommittedEvent>,
        options: AppendOptions,
    ) -> Result<Vec<EventEnvelope>> {
        (**self).append(aggregate_id, events, options).await
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        (**self).get_events_for_aggregate(aggregate_id).await
    }

    async fn get_aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        (**self).get_aggregate_version(aggregate_id).await
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        (**self).stream_all_events().await
    }
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Checks if an aggregate exists (has any events).
    async fn aggregate_exists(&self, aggregate_id: &AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that every event in a batch belongs to the aggregate being appended to.
pub fn validate_events_for_append(
    aggregate_id: &AggregateId,
    events: &[UncommittedEvent],
) -> Result<()> {
    let Some(first) = events.first() else {
        return Ok(());
    };

    for event in events {
        if &event.aggregate_id != aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "event {} belongs to aggregate {}, not {}",
                event.event_name, event.aggregate_id, aggregate_id
            )));
        }
        if event.aggregate_name != first.aggregate_name {
            return Err(EventStoreError::InvalidAppend(
                "all events must have the same aggregate name".to_string(),
            ));
        }
    }

    Ok(())
}

/// Resolves the expected version against the stored one and returns the
/// version the first new event will receive.
pub fn check_expected_version(
    aggregate_id: &AggregateId,
    current: Version,
    options: AppendOptions,
) -> Result<Version> {
    match options.expected_version {
        Some(expected) if expected != current => Err(EventStoreError::ConcurrencyConflict {
            aggregate_id: aggregate_id.clone(),
            expected,
            actual: current,
        }),
        Some(expected) => Ok(expected.next()),
        None => Ok(current.next()),
    }
}

/// Assigns sequential versions starting at `first_version`.
pub fn assign_versions(events: Vec<UncommittedEvent>, first_version: Version) -> Vec<EventEnvelope> {
    let mut version = first_version;
    let mut envelopes = Vec::with_capacity(events.len());
    for event in events {
        envelopes.push(event.into_envelope(version));
        version = version.next();
    }
    envelopes
}

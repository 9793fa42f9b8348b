use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, UncommittedEvent, Version,
    store::{
        AppendOptions, EventStore, EventStream, assign_versions, check_expected_version,
        validate_events_for_append,
    },
};

/// In-memory event store implementation for testing.
///
/// This implementation stores all events in memory and provides
/// the same interface as the PostgreSQL implementation. The write lock is
/// held across the version check and the append, which makes the pair atomic.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns the number of events stored for one aggregate.
    pub async fn event_count_for(&self, aggregate_id: &AggregateId) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| &e.aggregate_id == aggregate_id)
            .count()
    }

    /// Clears all events.
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        aggregate_id: &AggregateId,
        events: Vec<UncommittedEvent>,
        options: AppendOptions,
    ) -> Result<Vec<EventEnvelope>> {
        validate_events_for_append(aggregate_id, &events)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut store = self.events.write().await;

        let current_version = store
            .iter()
            .filter(|e| &e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(Version::initial());

        let first_version = check_expected_version(aggregate_id, current_version, options)?;
        let envelopes = assign_versions(events, first_version);
        store.extend(envelopes.iter().cloned());

        Ok(envelopes)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| &e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        if events.is_empty() {
            return Err(EventStoreError::AggregateNotFound(aggregate_id.clone()));
        }
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn get_aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        let store = self.events.read().await;
        let version = store
            .iter()
            .filter(|e| &e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max();
        Ok(version)
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.events.read().await.clone();
        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }
}

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, UncommittedEvent, Version,
    store::{AppendOptions, EventStore, EventStream},
};

/// Error returned by an [`EventPublisher`].
#[derive(Debug, Clone)]
pub struct PublishError {
    pub message: String,
}

impl PublishError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "publish error: {}", self.message)
    }
}

impl std::error::Error for PublishError {}

/// Destination for events the store has just persisted.
///
/// Implemented by the event buses; the store only depends on this seam.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        event: &EventEnvelope,
    ) -> std::result::Result<(), PublishError>;
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(
        &self,
        channel: &str,
        event: &EventEnvelope,
    ) -> std::result::Result<(), PublishError> {
        (**self).publish(channel, event).await
    }
}

/// Event store that publishes every persisted event.
///
/// `save_events` appends through the wrapped [`EventStore`] and then hands
/// each stored event, in version order, to the publisher on the configured
/// channel. Nothing is published when the append fails. When publishing
/// fails after a successful append the events stay stored and the error
/// names the first event that was not delivered.
#[derive(Clone)]
pub struct PublishingEventStore<S, P> {
    store: S,
    publisher: P,
    channel: String,
}

impl<S, P> PublishingEventStore<S, P>
where
    S: EventStore,
    P: EventPublisher,
{
    /// Creates a publishing store that publishes on `channel`.
    pub fn new(store: S, publisher: P, channel: impl Into<String>) -> Self {
        Self {
            store,
            publisher,
            channel: channel.into(),
        }
    }

    /// Returns a reference to the underlying storage.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the channel events are published on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Persists a batch for one aggregate and publishes it.
    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    pub async fn save_events(
        &self,
        aggregate_id: &AggregateId,
        events: Vec<UncommittedEvent>,
        options: AppendOptions,
    ) -> Result<Vec<EventEnvelope>> {
        let stored = match self.store.append(aggregate_id, events, options).await {
            Ok(stored) => stored,
            Err(err) => {
                if matches!(err, EventStoreError::ConcurrencyConflict { .. }) {
                    metrics::counter!("event_store_concurrency_conflicts_total").increment(1);
                    tracing::warn!(%aggregate_id, error = %err, "rejected conflicting append");
                }
                return Err(err);
            }
        };

        metrics::counter!("event_store_events_appended_total").increment(stored.len() as u64);

        for event in &stored {
            self.publisher
                .publish(&self.channel, event)
                .await
                .map_err(|source| EventStoreError::Publish {
                    aggregate_id: aggregate_id.clone(),
                    version: event.version,
                    source,
                })?;
        }

        tracing::debug!(
            %aggregate_id,
            last_version = stored.last().map(|e| e.version.as_i64()),
            "events saved and published"
        );

        Ok(stored)
    }
}

#[async_trait]
impl<S, P> EventStore for PublishingEventStore<S, P>
where
    S: EventStore,
    P: EventPublisher,
{
    async fn append(
        &self,
        aggregate_id: &AggregateId,
        events: Vec<UncommittedEvent>,
        options: AppendOptions,
    ) -> Result<Vec<EventEnvelope>> {
        self.save_events(aggregate_id, events, options).await
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.store.get_events_for_aggregate(aggregate_id).await
    }

    async fn get_aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        self.store.get_aggregate_version(aggregate_id).await
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        self.store.stream_all_events().await
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Mutex;

    use super::*;
    use crate::InMemoryEventStore;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, EventEnvelope)>>,
        fail: bool,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(
            &self,
            channel: &str,
            event: &EventEnvelope,
        ) -> std::result::Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::new("broker down"));
            }
            self.published
                .lock()
                .await
                .push((channel.to_string(), event.clone()));
            Ok(())
        }
    }

    fn pending(aggregate_id: &AggregateId, event_name: &str) -> UncommittedEvent {
        UncommittedEvent::new(
            aggregate_id.clone(),
            "DatacapAllocator",
            event_name,
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn publishes_each_stored_event_in_order() {
        let publisher = Arc::new(RecordingPublisher::default());
        let store = PublishingEventStore::new(
            InMemoryEventStore::new(),
            Arc::clone(&publisher),
            "allocator",
        );
        let id = AggregateId::new("alloc-1");

        store
            .save_events(
                &id,
                vec![pending(&id, "KycApproved"), pending(&id, "GovernanceReviewStarted")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        let published = publisher.published.lock().await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].0, "allocator");
        assert_eq!(published[0].1.event_name, "KycApproved");
        assert_eq!(published[0].1.version, Version::new(1));
        assert_eq!(published[1].1.version, Version::new(2));
    }

    #[tokio::test]
    async fn conflict_publishes_nothing() {
        let publisher = Arc::new(RecordingPublisher::default());
        let store = PublishingEventStore::new(
            InMemoryEventStore::new(),
            Arc::clone(&publisher),
            "allocator",
        );
        let id = AggregateId::new("alloc-1");

        store
            .save_events(&id, vec![pending(&id, "A")], AppendOptions::expect_new())
            .await
            .unwrap();
        let result = store
            .save_events(&id, vec![pending(&id, "B")], AppendOptions::expect_new())
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
        assert_eq!(publisher.published.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_reports_undelivered_version() {
        let publisher = RecordingPublisher {
            fail: true,
            ..Default::default()
        };
        let inner = InMemoryEventStore::new();
        let store = PublishingEventStore::new(inner.clone(), publisher, "allocator");
        let id = AggregateId::new("alloc-1");

        let result = store
            .save_events(&id, vec![pending(&id, "A")], AppendOptions::expect_new())
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::Publish { version, .. }) if version == Version::first()
        ));
        assert_eq!(inner.event_count().await, 1);
    }
}

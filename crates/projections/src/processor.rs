//! Feeds stored events to projections.

use std::sync::Arc;

use event_store::{EventEnvelope, EventStore};
use futures_util::StreamExt;

use crate::Result;
use crate::projection::Projection;

/// Delivers events from an event store to registered projections.
///
/// - Catch-up: streams every stored event, skipping the prefix each
///   projection has already consumed
/// - Single event delivery, for live events
/// - Rebuild: resets every projection and catches up from the start
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Arc<dyn Projection>>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    pub fn register(&mut self, projection: Arc<dyn Projection>) {
        tracing::debug!(projection = projection.name(), "registered projection");
        self.projections.push(projection);
    }

    pub fn projections(&self) -> &[Arc<dyn Projection>] {
        &self.projections
    }

    /// Streams all stored events in insertion order into every projection
    /// that has not consumed them yet.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut stream = self.store.stream_all_events().await?;
        let mut index: u64 = 0;

        while let Some(event) = stream.next().await {
            let event = event?;
            index += 1;

            for projection in &self.projections {
                if projection.position().await.events_processed() < index {
                    projection.handle(&event).await?;
                    metrics::counter!("projections_events_processed", "projection" => projection.name())
                        .increment(1);
                }
            }
        }

        tracing::info!(events = index, "projection catch-up complete");
        Ok(index)
    }

    /// Delivers one event to every projection.
    #[tracing::instrument(
        skip(self, event),
        fields(event_name = %event.event_name, aggregate_id = %event.aggregate_id, version = %event.version)
    )]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
            metrics::counter!("projections_events_processed", "projection" => projection.name())
                .increment(1);
        }
        Ok(())
    }

    /// Resets every projection and replays the whole store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{AppendOptions, InMemoryEventStore, UncommittedEvent};

    use super::*;
    use crate::projection::ProjectionPosition;

    #[derive(Default)]
    struct CountingProjection {
        handled: AtomicU64,
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            "CountingProjection"
        }

        fn event_names(&self) -> &'static [&'static str] {
            &["Ping"]
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<()> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            let mut position = ProjectionPosition::zero();
            for _ in 0..self.handled.load(Ordering::SeqCst) {
                position = position.advance();
            }
            position
        }

        async fn reset(&self) -> Result<()> {
            self.handled.store(0, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn store_with(count: usize) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new("alloc-1");
        let events = (0..count)
            .map(|i| UncommittedEvent::new(id.clone(), "DatacapAllocator", "Ping", serde_json::json!({ "i": i })))
            .collect();
        if count > 0 {
            store
                .append(&id, events, AppendOptions::expect_new())
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn catch_up_delivers_every_event() {
        let projection = Arc::new(CountingProjection::default());
        let mut processor = ProjectionProcessor::new(store_with(3).await);
        processor.register(projection.clone());

        let events = processor.run_catch_up().await.unwrap();

        assert_eq!(events, 3);
        assert_eq!(projection.handled.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn second_catch_up_skips_consumed_prefix() {
        let projection = Arc::new(CountingProjection::default());
        let mut processor = ProjectionProcessor::new(store_with(3).await);
        processor.register(projection.clone());

        processor.run_catch_up().await.unwrap();
        processor.run_catch_up().await.unwrap();

        assert_eq!(projection.handled.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rebuild_resets_then_replays() {
        let projection = Arc::new(CountingProjection::default());
        let mut processor = ProjectionProcessor::new(store_with(2).await);
        processor.register(projection.clone());
        processor.run_catch_up().await.unwrap();

        processor.rebuild_all().await.unwrap();

        assert_eq!(projection.handled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_store_is_a_no_op() {
        let projection = Arc::new(CountingProjection::default());
        let mut processor = ProjectionProcessor::new(store_with(0).await);
        processor.register(projection.clone());

        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
        assert_eq!(projection.handled.load(Ordering::SeqCst), 0);
    }
}

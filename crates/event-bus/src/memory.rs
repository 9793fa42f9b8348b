use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use event_store::{EventEnvelope, EventPublisher, PublishError};
use tokio::sync::RwLock;

use crate::{BusError, DeliveryOutcome, EventBus, EventHandler, HandlerRegistry, Result};

/// Event bus that delivers synchronously inside the process.
///
/// Every published event is appended to a per-channel log, then all handlers
/// subscribed to its name run concurrently; `publish` returns once they have
/// all finished. Nothing survives a restart.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    channels: Arc<RwLock<HashMap<String, Vec<EventEnvelope>>>>,
    handlers: HandlerRegistry,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events published on `channel`, oldest first.
    pub async fn events_for_channel(&self, channel: &str) -> Vec<EventEnvelope> {
        self.channels
            .read()
            .await
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Forgets every published event. Handlers stay registered.
    pub async fn clear_all_events(&self) {
        self.channels.write().await.clear();
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    #[tracing::instrument(
        skip(self, event),
        fields(event_name = %event.event_name, aggregate_id = %event.aggregate_id)
    )]
    async fn publish(&self, channel: &str, event: &EventEnvelope) -> Result<()> {
        self.channels
            .write()
            .await
            .entry(channel.to_string())
            .or_default()
            .push(event.clone());
        metrics::counter!("event_bus_published_total").increment(1);

        match self.handlers.dispatch(event).await {
            DeliveryOutcome::Ack { .. } => Ok(()),
            DeliveryOutcome::Reject { failures } => Err(BusError::Handler {
                event_name: event.event_name.clone(),
                failed: failures.len(),
                message: failures
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            }),
        }
    }

    async fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.register(handler).await;
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(
        &self,
        channel: &str,
        event: &EventEnvelope,
    ) -> std::result::Result<(), PublishError> {
        EventBus::publish(self, channel, event)
            .await
            .map_err(PublishError::from)
    }
}

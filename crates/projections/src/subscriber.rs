//! Subscribes projections to an event bus.

use std::sync::Arc;

use async_trait::async_trait;
use event_bus::{EventBus, EventHandler, HandlerError};
use event_store::EventEnvelope;

use crate::projection::Projection;

/// Event bus handler that forwards one event name to a projection.
pub struct ProjectionHandler {
    event_name: &'static str,
    projection: Arc<dyn Projection>,
}

impl ProjectionHandler {
    pub fn new(event_name: &'static str, projection: Arc<dyn Projection>) -> Self {
        Self {
            event_name,
            projection,
        }
    }
}

#[async_trait]
impl EventHandler for ProjectionHandler {
    fn event_name(&self) -> &str {
        self.event_name
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        self.projection
            .handle(event)
            .await
            .map_err(|err| HandlerError::new(self.projection.name(), err.to_string()))
    }
}

/// Registers one handler per event name the projection declares.
pub async fn subscribe_projection<B>(bus: &B, projection: Arc<dyn Projection>)
where
    B: EventBus + ?Sized,
{
    for &event_name in projection.event_names() {
        bus.register_handler(Arc::new(ProjectionHandler::new(
            event_name,
            Arc::clone(&projection),
        )))
        .await;
    }
    tracing::info!(
        projection = projection.name(),
        events = projection.event_names().len(),
        "projection subscribed to event bus"
    );
}

#[cfg(test)]
mod tests {
    use common::AggregateId;
    use domain::{Applicant, ApplicationEvent, DATACAP_ALLOCATOR, DomainEvent};
    use event_bus::InMemoryEventBus;
    use event_store::Version;

    use super::*;
    use crate::ApplicationDetailsView;

    #[tokio::test]
    async fn published_events_reach_the_view() {
        let bus = InMemoryEventBus::new();
        let view = Arc::new(ApplicationDetailsView::new());
        subscribe_projection(&bus, view.clone()).await;

        let created = ApplicationEvent::application_created(
            AggregateId::new("alloc-7"),
            Applicant::new("Acme", "f1acme", "acme"),
        );
        let envelope = EventEnvelope::builder()
            .event_name(created.event_type())
            .aggregate_id("alloc-7")
            .aggregate_name(DATACAP_ALLOCATOR)
            .version(Version::first())
            .payload_raw(created.to_payload().unwrap())
            .build();

        bus.publish("allocator", &envelope).await.unwrap();
        bus.publish("allocator", &envelope).await.unwrap();

        let details = view.get(&AggregateId::new("alloc-7")).await.unwrap();
        assert_eq!(details.last_version, Version::first());
        assert_eq!(view.all().await.len(), 1);
    }
}

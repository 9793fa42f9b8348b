use std::sync::Arc;

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::{EventHandler, Result};

/// Delivers stored events to the handlers subscribed to their name.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a stored event on `channel`.
    async fn publish(&self, channel: &str, event: &EventEnvelope) -> Result<()>;

    /// Subscribes a handler to the event name it declares.
    async fn register_handler(&self, handler: Arc<dyn EventHandler>);
}

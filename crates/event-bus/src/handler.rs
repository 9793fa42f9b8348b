use std::sync::Arc;

use async_trait::async_trait;
use event_store::EventEnvelope;
use futures_util::future::join_all;
use tokio::sync::RwLock;

use crate::HandlerError;

/// Reacts to one kind of stored event.
///
/// Brokers deliver at least once, so implementations must tolerate seeing
/// the same event (same aggregate id and version) more than once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name of the event this handler subscribes to (e.g. `"KycApproved"`).
    fn event_name(&self) -> &str;

    /// Handles a delivered event.
    async fn handle(&self, event: &EventEnvelope) -> std::result::Result<(), HandlerError>;
}

/// What the transport should do with a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Every matching handler succeeded (or none matched).
    Ack { handled: usize },
    /// At least one handler failed; the message must not be redelivered.
    Reject { failures: Vec<HandlerError> },
}

impl DeliveryOutcome {
    pub fn is_ack(&self) -> bool {
        matches!(self, DeliveryOutcome::Ack { .. })
    }
}

/// Registered handlers shared by a bus and its consumer loop.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        tracing::debug!(event_name = handler.event_name(), "registered event handler");
        self.handlers.write().await.push(handler);
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }

    /// Runs every handler subscribed to the event's name concurrently and
    /// waits for all of them, even when some fail.
    pub async fn dispatch(&self, event: &EventEnvelope) -> DeliveryOutcome {
        let matching: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .await
            .iter()
            .filter(|h| h.event_name() == event.event_name)
            .cloned()
            .collect();

        let results = join_all(matching.iter().map(|h| h.handle(event))).await;

        let handled = results.len();
        let failures: Vec<HandlerError> = results.into_iter().filter_map(|r| r.err()).collect();

        if failures.is_empty() {
            DeliveryOutcome::Ack { handled }
        } else {
            for failure in &failures {
                tracing::error!(
                    event_name = %event.event_name,
                    aggregate_id = %event.aggregate_id,
                    version = %event.version,
                    error = %failure,
                    "event handler failed"
                );
            }
            DeliveryOutcome::Reject { failures }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use event_store::Version;

    use super::*;

    struct Counting {
        name: &'static str,
        calls: AtomicUsize,
        fail: bool,
    }

    impl Counting {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl EventHandler for Counting {
        fn event_name(&self) -> &str {
            self.name
        }

        async fn handle(&self, _event: &EventEnvelope) -> std::result::Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(HandlerError::new("Counting", "boom"));
            }
            Ok(())
        }
    }

    fn event(name: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .event_name(name)
            .aggregate_id("alloc-1")
            .aggregate_name("DatacapAllocator")
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .build()
    }

    #[tokio::test]
    async fn dispatches_only_to_matching_handlers() {
        let registry = HandlerRegistry::new();
        let kyc = Counting::new("KycApproved", false);
        let other = Counting::new("KycRejected", false);
        registry.register(kyc.clone()).await;
        registry.register(other.clone()).await;

        let outcome = registry.dispatch(&event("KycApproved")).await;

        assert_eq!(outcome, DeliveryOutcome::Ack { handled: 1 });
        assert_eq!(kyc.calls.load(Ordering::SeqCst), 1);
        assert_eq!(other.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_rejects_but_still_runs_every_handler() {
        let registry = HandlerRegistry::new();
        let failing = Counting::new("KycApproved", true);
        let healthy = Counting::new("KycApproved", false);
        registry.register(failing.clone()).await;
        registry.register(healthy.clone()).await;

        let outcome = registry.dispatch(&event("KycApproved")).await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Reject {
                failures: vec![HandlerError::new("Counting", "boom")],
            }
        );
        assert!(!outcome.is_ack());
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_matching_handler_is_an_ack() {
        let registry = HandlerRegistry::new();
        assert!(registry.dispatch(&event("Unheard")).await.is_ack());
    }
}

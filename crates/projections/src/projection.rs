//! Projection contract and catch-up position.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// Number of events from the global stream a projection has consumed.
///
/// Catch-up uses it to skip the prefix a projection already saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProjectionPosition(u64);

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn events_processed(&self) -> u64 {
        self.0
    }

    pub fn advance(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.0)
    }
}

/// Builds a read model from stored events.
///
/// Events may arrive twice (catch-up after live delivery, broker
/// redelivery); `handle` must leave the read model unchanged for an event it
/// has already applied.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Event names this projection wants from the event bus.
    fn event_names(&self) -> &'static [&'static str];

    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Drops all state so the projection can be rebuilt from the store.
    async fn reset(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_advances_from_zero() {
        let position = ProjectionPosition::zero().advance().advance();
        assert_eq!(position.events_processed(), 2);
        assert_eq!(position.to_string(), "position(2)");
    }
}

//! Projection error types.

use thiserror::Error;

/// Errors that can occur while feeding events to projections.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Reading from the event store failed.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// The stored event could not be decoded into a domain event.
    #[error("Event decoding error: {0}")]
    Decode(#[from] domain::DomainError),

    /// A projection-specific error.
    #[error("Projection {projection} failed: {message}")]
    Projection {
        projection: &'static str,
        message: String,
    },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

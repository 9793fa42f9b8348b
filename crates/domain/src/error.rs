//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::application::ApplicationError;

/// HTTP-style classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    BadRequest,
    NotFound,
    Conflict,
    Unprocessable,
    Internal,
}

impl ErrorStatus {
    pub fn as_u16(&self) -> u16 {
        match self {
            ErrorStatus::BadRequest => 400,
            ErrorStatus::NotFound => 404,
            ErrorStatus::Conflict => 409,
            ErrorStatus::Unprocessable => 422,
            ErrorStatus::Internal => 500,
        }
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// A transition guard of the application aggregate failed.
    #[error("Application error: {0}")]
    Application(#[from] ApplicationError),

    /// No history exists for the aggregate.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// A stored event carries a name the aggregate does not know.
    #[error("Unknown event: {event_name}")]
    UnknownEvent { event_name: String },

    /// Saving an aggregate that has no identity yet.
    #[error("Aggregate {aggregate_type} has no id")]
    MissingAggregateId { aggregate_type: &'static str },

    /// No handler is bound to the command or query name.
    #[error("No handler registered for {name}")]
    HandlerNotRegistered { name: String },

    /// A second handler was registered for the same name.
    #[error("A handler is already registered for {name}")]
    DuplicateHandler { name: String },

    /// Startup check found names with no handler.
    #[error("Missing handlers for: {}", names.join(", "))]
    MissingHandlers { names: Vec<String> },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn status(&self) -> ErrorStatus {
        match self {
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. }) => {
                ErrorStatus::Conflict
            }
            DomainError::EventStore(EventStoreError::AggregateNotFound(_))
            | DomainError::AggregateNotFound { .. } => ErrorStatus::NotFound,
            DomainError::Application(err) => err.status(),
            _ => ErrorStatus::Internal,
        }
    }

    /// Stable short code for callers.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. }) => {
                "CONCURRENCY_CONFLICT"
            }
            DomainError::EventStore(EventStoreError::AggregateNotFound(_))
            | DomainError::AggregateNotFound { .. } => "NOT_FOUND",
            DomainError::EventStore(_) => "EVENT_STORE_ERROR",
            DomainError::Application(err) => err.code(),
            DomainError::UnknownEvent { .. } => "UNKNOWN_EVENT",
            DomainError::MissingAggregateId { .. } => "MISSING_AGGREGATE_ID",
            DomainError::HandlerNotRegistered { .. }
            | DomainError::DuplicateHandler { .. }
            | DomainError::MissingHandlers { .. } => "HANDLER_CONFIGURATION",
            DomainError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. })
        )
    }
}

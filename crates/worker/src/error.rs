//! Worker error types.

use domain::DomainError;
use event_bus::BusError;
use event_store::EventStoreError;
use projections::ProjectionError;
use thiserror::Error;

/// Errors that stop the worker from starting or shutting down cleanly.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    /// Handler registration or the startup handler check failed.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Metrics recorder error: {0}")]
    Metrics(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

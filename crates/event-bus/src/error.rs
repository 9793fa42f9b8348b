use thiserror::Error;

/// Errors raised by the event buses and their transports.
#[derive(Debug, Error)]
pub enum BusError {
    /// The transport was used before `init` completed or after `close`.
    #[error("Event bus not initialized: call init() first")]
    NotInitialized,

    /// `init` was called while the transport was already connecting or ready.
    #[error("Event bus already initialized")]
    AlreadyInitialized,

    /// The broker configuration is unusable.
    #[error("Invalid broker configuration: {0}")]
    Config(String),

    /// Connecting to the broker or declaring its topology failed.
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// The broker refused or never confirmed a publish.
    #[error("Broker publish error: {0}")]
    Publish(String),

    /// Declaring or consuming the durable queue failed.
    #[error("Broker subscribe error: {0}")]
    Subscribe(String),

    /// A message could not be encoded or decoded.
    #[error("Wire codec error: {0}")]
    Codec(String),

    /// One or more handlers failed for an in-process delivery.
    #[error("{failed} handler(s) failed for event {event_name}: {message}")]
    Handler {
        event_name: String,
        failed: usize,
        message: String,
    },
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Error returned by an [`EventHandler`](crate::EventHandler).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{handler}: {message}")]
pub struct HandlerError {
    pub handler: String,
    pub message: String,
}

impl HandlerError {
    pub fn new(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

impl From<BusError> for event_store::PublishError {
    fn from(err: BusError) -> Self {
        event_store::PublishError::new(err.to_string())
    }
}

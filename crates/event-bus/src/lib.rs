//! Event buses that fan stored events out to handlers.
//!
//! - [`InMemoryEventBus`] delivers inside the process and keeps a per-channel
//!   log for inspection.
//! - [`NatsEventBus`] maps a durable topic exchange onto NATS JetStream: the
//!   exchange is a stream, the durable queue a pull consumer. Deliveries are
//!   acknowledged when every handler succeeds and terminated (never
//!   redelivered) when one fails.
//!
//! Both implement [`event_store::EventPublisher`], so either can sit behind a
//! [`event_store::PublishingEventStore`].

pub mod bus;
pub mod error;
pub mod handler;
pub mod memory;
pub mod nats;
pub mod wire;

pub use bus::EventBus;
pub use error::{BusError, HandlerError, Result};
pub use handler::{DeliveryOutcome, EventHandler, HandlerRegistry};
pub use memory::InMemoryEventBus;
pub use nats::{BrokerConfig, ConnectionStatus, NatsEventBus};

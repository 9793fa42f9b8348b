//! Read models built from the allocator event stream.
//!
//! - [`Projection`] turns stored events into a read model
//! - [`ProjectionProcessor`] catches projections up from the event store
//! - [`subscribe_projection`] feeds live events from an event bus
//! - [`ApplicationDetailsView`], the per-application details view

pub mod error;
pub mod processor;
pub mod projection;
pub mod subscriber;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use subscriber::{ProjectionHandler, subscribe_projection};
pub use views::{ApplicationDetails, ApplicationDetailsView, ReadModel};

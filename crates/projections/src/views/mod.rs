//! Read model views.

pub mod application_details;

pub use application_details::{ApplicationDetails, ApplicationDetailsView};

use async_trait::async_trait;

/// Query-side access to a denormalized view.
#[async_trait]
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of entries currently held. Waits for an in-flight write.
    async fn count(&self) -> usize;
}

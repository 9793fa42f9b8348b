//! Workflow error types.

use domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The GitHub side rejected or failed the request.
    #[error("Pull request service error: {0}")]
    PullRequestService(String),

    /// The multisig could not be read.
    #[error("Approval source error: {0}")]
    ApprovalSource(String),

    /// A command issued by a reactor failed, or an event could not be decoded.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

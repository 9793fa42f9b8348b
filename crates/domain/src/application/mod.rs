//! DataCap allocator application aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod queries;
mod service;
mod state;
mod value_objects;

pub use aggregate::{DATACAP_ALLOCATOR, DatacapAllocator};
pub use commands::{ApplicationCommand, CommandKind, CommandOutcome};
pub use events::{
    AllocationInstructionsUpdatedData, ApplicationCreatedData, ApplicationEvent,
    GovernanceReviewApprovedData, GovernanceReviewRejectedData, GovernanceReviewStartedData,
    KycApprovedData, KycRejectedData, MetaAllocatorApprovalCompletedData,
    MetaAllocatorApprovalStartedData, PullRequestUpdatedData, RkhApprovalCompletedData,
    RkhApprovalStartedData, RkhApprovalsUpdatedData,
};
pub use queries::{ApplicationQuery, QueryResult};
pub use service::{
    ApplicationCommandHandler, ApplicationConfig, ApplicationQueryHandler, ApplicationService,
    register_application_handlers,
};
pub use state::{AllocationMethod, ApplicationPhase, PhaseStatus};
pub use value_objects::{
    AllocationInstruction, AllocationInstructions, Applicant, KycResult, PullRequestLink,
};

use thiserror::Error;

use crate::error::ErrorStatus;

/// Transition guard failures of the application aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplicationError {
    /// The application already has a creation event.
    #[error("Application already created")]
    AlreadyCreated,

    /// The application has not been created yet.
    #[error("Application has not been created")]
    NotCreated,

    /// Application ids must be non-empty.
    #[error("Invalid application id: {id:?}")]
    InvalidApplicationId { id: String },

    /// The action is not legal in the current phase/status pair.
    #[error("Cannot {action} while application is {phase}/{status}")]
    InvalidPhase {
        action: &'static str,
        phase: ApplicationPhase,
        status: PhaseStatus,
    },

    /// Governance approval needs at least one allocation instruction.
    #[error("Application has no allocation instructions")]
    MissingAllocationInstructions,

    /// Instruction columns are inconsistent.
    #[error("Malformed allocation instructions: {reason}")]
    MalformedAllocationInstructions { reason: String },

    /// An instruction names a method other than META_ALLOCATOR or RKH.
    #[error("Unknown allocation method: {method}")]
    UnknownAllocationMethod { method: String },

    /// RKH thresholds must be at least one.
    #[error("Invalid approval threshold: {threshold}")]
    InvalidApprovalThreshold { threshold: u32 },

    /// Meta-allocator completion must carry the transaction hash.
    #[error("Transaction hash is required")]
    MissingTransactionHash,

    /// Pull request linkage is incomplete.
    #[error("Invalid pull request: {reason}")]
    InvalidPullRequest { reason: String },
}

impl ApplicationError {
    /// Stable short code for callers.
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationError::AlreadyCreated => "APPLICATION_ALREADY_EXISTS",
            ApplicationError::NotCreated => "APPLICATION_NOT_CREATED",
            ApplicationError::InvalidApplicationId { .. } => "INVALID_APPLICATION_ID",
            ApplicationError::InvalidPhase { .. } => "INVALID_PHASE_TRANSITION",
            ApplicationError::MissingAllocationInstructions => "MISSING_ALLOCATION_INSTRUCTIONS",
            ApplicationError::MalformedAllocationInstructions { .. } => {
                "MALFORMED_ALLOCATION_INSTRUCTIONS"
            }
            ApplicationError::UnknownAllocationMethod { .. } => "UNKNOWN_ALLOCATION_METHOD",
            ApplicationError::InvalidApprovalThreshold { .. } => "INVALID_APPROVAL_THRESHOLD",
            ApplicationError::MissingTransactionHash => "MISSING_TRANSACTION_HASH",
            ApplicationError::InvalidPullRequest { .. } => "INVALID_PULL_REQUEST",
        }
    }

    pub fn status(&self) -> ErrorStatus {
        match self {
            ApplicationError::AlreadyCreated => ErrorStatus::Conflict,
            ApplicationError::NotCreated | ApplicationError::InvalidPhase { .. } => {
                ErrorStatus::Unprocessable
            }
            ApplicationError::InvalidApplicationId { .. }
            | ApplicationError::MissingAllocationInstructions
            | ApplicationError::MalformedAllocationInstructions { .. }
            | ApplicationError::UnknownAllocationMethod { .. }
            | ApplicationError::InvalidApprovalThreshold { .. }
            | ApplicationError::MissingTransactionHash
            | ApplicationError::InvalidPullRequest { .. } => ErrorStatus::BadRequest,
        }
    }
}

//! Application domain events.
//!
//! Every variant carries a payload struct. The stored payload is that struct
//! as a JSON object; the variant name travels beside it as the event name.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{AllocationInstructions, AllocationMethod, Applicant, KycResult, PullRequestLink};

/// Events that can occur on a DataCap allocator application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ApplicationEvent {
    /// Application was submitted; KYC starts immediately.
    ApplicationCreated(ApplicationCreatedData),

    /// Governance replaced the allocation instruction columns.
    AllocationInstructionsUpdated(AllocationInstructionsUpdatedData),

    /// The tracking pull request was opened or moved.
    PullRequestUpdated(PullRequestUpdatedData),

    KycApproved(KycApprovedData),

    KycRejected(KycRejectedData),

    GovernanceReviewStarted(GovernanceReviewStartedData),

    /// Governance accepted the application with the given instruction.
    GovernanceReviewApproved(GovernanceReviewApprovedData),

    GovernanceReviewRejected(GovernanceReviewRejectedData),

    /// Waiting for root key holder signatures.
    RkhApprovalStarted(RkhApprovalStartedData),

    /// Waiting for the meta-allocator contract call.
    MetaAllocatorApprovalStarted(MetaAllocatorApprovalStartedData),

    /// New multisig signatures were observed on chain.
    RkhApprovalsUpdated(RkhApprovalsUpdatedData),

    RkhApprovalCompleted(RkhApprovalCompletedData),

    MetaAllocatorApprovalCompleted(MetaAllocatorApprovalCompletedData),
}

impl DomainEvent for ApplicationEvent {
    const EVENT_NAMES: &'static [&'static str] = &[
        "ApplicationCreated",
        "AllocationInstructionsUpdated",
        "PullRequestUpdated",
        "KycApproved",
        "KycRejected",
        "GovernanceReviewStarted",
        "GovernanceReviewApproved",
        "GovernanceReviewRejected",
        "RkhApprovalStarted",
        "MetaAllocatorApprovalStarted",
        "RkhApprovalsUpdated",
        "RkhApprovalCompleted",
        "MetaAllocatorApprovalCompleted",
    ];

    fn event_type(&self) -> &'static str {
        match self {
            ApplicationEvent::ApplicationCreated(_) => "ApplicationCreated",
            ApplicationEvent::AllocationInstructionsUpdated(_) => "AllocationInstructionsUpdated",
            ApplicationEvent::PullRequestUpdated(_) => "PullRequestUpdated",
            ApplicationEvent::KycApproved(_) => "KycApproved",
            ApplicationEvent::KycRejected(_) => "KycRejected",
            ApplicationEvent::GovernanceReviewStarted(_) => "GovernanceReviewStarted",
            ApplicationEvent::GovernanceReviewApproved(_) => "GovernanceReviewApproved",
            ApplicationEvent::GovernanceReviewRejected(_) => "GovernanceReviewRejected",
            ApplicationEvent::RkhApprovalStarted(_) => "RkhApprovalStarted",
            ApplicationEvent::MetaAllocatorApprovalStarted(_) => "MetaAllocatorApprovalStarted",
            ApplicationEvent::RkhApprovalsUpdated(_) => "RkhApprovalsUpdated",
            ApplicationEvent::RkhApprovalCompleted(_) => "RkhApprovalCompleted",
            ApplicationEvent::MetaAllocatorApprovalCompleted(_) => {
                "MetaAllocatorApprovalCompleted"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationCreatedData {
    pub application_id: AggregateId,
    pub applicant: Applicant,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationInstructionsUpdatedData {
    /// Raw method column, one entry per instruction.
    pub methods: Vec<String>,
    /// Raw amount column, one entry per instruction.
    pub amounts: Vec<u64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestUpdatedData {
    pub number: u64,
    pub url: String,
    pub commit_sha: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycApprovedData {
    pub result: KycResult,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycRejectedData {
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceReviewStartedData {
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceReviewApprovedData {
    /// Method of the last recorded instruction.
    pub method: AllocationMethod,
    pub amount: u64,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceReviewRejectedData {
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RkhApprovalStartedData {
    /// Signatures needed before the allocation is approved.
    pub threshold: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaAllocatorApprovalStartedData {
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RkhApprovalsUpdatedData {
    /// Multisig proposal the approvals belong to.
    pub message_id: u64,
    /// Full set of signer addresses recorded after this update.
    pub approvals: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RkhApprovalCompletedData {
    /// Proposal whose signatures reached the threshold, if one was observed.
    pub message_id: Option<u64>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaAllocatorApprovalCompletedData {
    pub block_number: u64,
    pub tx_hash: String,
    pub completed_at: DateTime<Utc>,
}

// Convenience constructors for events
impl ApplicationEvent {
    pub fn application_created(application_id: AggregateId, applicant: Applicant) -> Self {
        ApplicationEvent::ApplicationCreated(ApplicationCreatedData {
            application_id,
            applicant,
            created_at: Utc::now(),
        })
    }

    pub fn allocation_instructions_updated(instructions: AllocationInstructions) -> Self {
        ApplicationEvent::AllocationInstructionsUpdated(AllocationInstructionsUpdatedData {
            methods: instructions.methods,
            amounts: instructions.amounts,
            updated_at: Utc::now(),
        })
    }

    pub fn pull_request_updated(link: PullRequestLink) -> Self {
        ApplicationEvent::PullRequestUpdated(PullRequestUpdatedData {
            number: link.number,
            url: link.url,
            commit_sha: link.commit_sha,
            updated_at: Utc::now(),
        })
    }

    pub fn kyc_approved(result: KycResult) -> Self {
        ApplicationEvent::KycApproved(KycApprovedData {
            result,
            approved_at: Utc::now(),
        })
    }

    pub fn kyc_rejected(reason: impl Into<String>) -> Self {
        ApplicationEvent::KycRejected(KycRejectedData {
            reason: reason.into(),
            rejected_at: Utc::now(),
        })
    }

    pub fn governance_review_started() -> Self {
        ApplicationEvent::GovernanceReviewStarted(GovernanceReviewStartedData {
            started_at: Utc::now(),
        })
    }

    pub fn governance_review_approved(method: AllocationMethod, amount: u64) -> Self {
        ApplicationEvent::GovernanceReviewApproved(GovernanceReviewApprovedData {
            method,
            amount,
            approved_at: Utc::now(),
        })
    }

    pub fn governance_review_rejected(reason: impl Into<String>) -> Self {
        ApplicationEvent::GovernanceReviewRejected(GovernanceReviewRejectedData {
            reason: reason.into(),
            rejected_at: Utc::now(),
        })
    }

    pub fn rkh_approval_started(threshold: u32) -> Self {
        ApplicationEvent::RkhApprovalStarted(RkhApprovalStartedData {
            threshold,
            started_at: Utc::now(),
        })
    }

    pub fn meta_allocator_approval_started() -> Self {
        ApplicationEvent::MetaAllocatorApprovalStarted(MetaAllocatorApprovalStartedData {
            started_at: Utc::now(),
        })
    }

    pub fn rkh_approvals_updated(message_id: u64, approvals: Vec<String>) -> Self {
        ApplicationEvent::RkhApprovalsUpdated(RkhApprovalsUpdatedData {
            message_id,
            approvals,
            updated_at: Utc::now(),
        })
    }

    pub fn rkh_approval_completed(message_id: Option<u64>) -> Self {
        ApplicationEvent::RkhApprovalCompleted(RkhApprovalCompletedData {
            message_id,
            completed_at: Utc::now(),
        })
    }

    pub fn meta_allocator_approval_completed(block_number: u64, tx_hash: impl Into<String>) -> Self {
        ApplicationEvent::MetaAllocatorApprovalCompleted(MetaAllocatorApprovalCompletedData {
            block_number,
            tx_hash: tx_hash.into(),
            completed_at: Utc::now(),
        })
    }
}

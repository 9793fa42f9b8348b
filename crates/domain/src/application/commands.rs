//! Application commands.

use common::{AggregateId, CorrelationId};
use event_store::Version;

use crate::bus::Command;

use super::{AllocationInstructions, Applicant, KycResult, PullRequestLink};

/// A requested transition of one application.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationCommand {
    pub correlation_id: CorrelationId,
    pub application_id: AggregateId,
    pub kind: CommandKind,
}

/// The transition requested, with its inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    CreateApplication { applicant: Applicant },
    UpdateAllocationInstructions { instructions: AllocationInstructions },
    UpdatePullRequest { link: PullRequestLink },
    ApproveKyc { result: KycResult },
    RejectKyc { reason: String },
    ApproveGovernanceReview,
    RejectGovernanceReview { reason: String },
    UpdateRkhApprovals { message_id: u64, approvals: Vec<String> },
    CompleteRkhApproval,
    CompleteMetaAllocatorApproval { block_number: u64, tx_hash: String },
}

impl CommandKind {
    /// Every command tag, in declaration order.
    pub const NAMES: &'static [&'static str] = &[
        "CreateApplication",
        "UpdateAllocationInstructions",
        "UpdatePullRequest",
        "ApproveKyc",
        "RejectKyc",
        "ApproveGovernanceReview",
        "RejectGovernanceReview",
        "UpdateRkhApprovals",
        "CompleteRkhApproval",
        "CompleteMetaAllocatorApproval",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::CreateApplication { .. } => "CreateApplication",
            CommandKind::UpdateAllocationInstructions { .. } => "UpdateAllocationInstructions",
            CommandKind::UpdatePullRequest { .. } => "UpdatePullRequest",
            CommandKind::ApproveKyc { .. } => "ApproveKyc",
            CommandKind::RejectKyc { .. } => "RejectKyc",
            CommandKind::ApproveGovernanceReview => "ApproveGovernanceReview",
            CommandKind::RejectGovernanceReview { .. } => "RejectGovernanceReview",
            CommandKind::UpdateRkhApprovals { .. } => "UpdateRkhApprovals",
            CommandKind::CompleteRkhApproval => "CompleteRkhApproval",
            CommandKind::CompleteMetaAllocatorApproval { .. } => "CompleteMetaAllocatorApproval",
        }
    }
}

impl ApplicationCommand {
    /// Creates a command with a fresh correlation id.
    pub fn new(application_id: impl Into<AggregateId>, kind: CommandKind) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            application_id: application_id.into(),
            kind,
        }
    }

    /// Keeps the correlation id of the request or event that caused this
    /// command.
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn create(application_id: impl Into<AggregateId>, applicant: Applicant) -> Self {
        Self::new(application_id, CommandKind::CreateApplication { applicant })
    }

    pub fn update_allocation_instructions(
        application_id: impl Into<AggregateId>,
        instructions: AllocationInstructions,
    ) -> Self {
        Self::new(
            application_id,
            CommandKind::UpdateAllocationInstructions { instructions },
        )
    }

    pub fn update_pull_request(application_id: impl Into<AggregateId>, link: PullRequestLink) -> Self {
        Self::new(application_id, CommandKind::UpdatePullRequest { link })
    }

    pub fn approve_kyc(application_id: impl Into<AggregateId>, result: KycResult) -> Self {
        Self::new(application_id, CommandKind::ApproveKyc { result })
    }

    pub fn reject_kyc(application_id: impl Into<AggregateId>, reason: impl Into<String>) -> Self {
        Self::new(
            application_id,
            CommandKind::RejectKyc {
                reason: reason.into(),
            },
        )
    }

    pub fn approve_governance_review(application_id: impl Into<AggregateId>) -> Self {
        Self::new(application_id, CommandKind::ApproveGovernanceReview)
    }

    pub fn reject_governance_review(
        application_id: impl Into<AggregateId>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            application_id,
            CommandKind::RejectGovernanceReview {
                reason: reason.into(),
            },
        )
    }

    pub fn update_rkh_approvals(
        application_id: impl Into<AggregateId>,
        message_id: u64,
        approvals: Vec<String>,
    ) -> Self {
        Self::new(
            application_id,
            CommandKind::UpdateRkhApprovals {
                message_id,
                approvals,
            },
        )
    }

    pub fn complete_rkh_approval(application_id: impl Into<AggregateId>) -> Self {
        Self::new(application_id, CommandKind::CompleteRkhApproval)
    }

    pub fn complete_meta_allocator_approval(
        application_id: impl Into<AggregateId>,
        block_number: u64,
        tx_hash: impl Into<String>,
    ) -> Self {
        Self::new(
            application_id,
            CommandKind::CompleteMetaAllocatorApproval {
                block_number,
                tx_hash: tx_hash.into(),
            },
        )
    }
}

impl Command for ApplicationCommand {
    type Output = CommandOutcome;

    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }
}

/// Result of a handled command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub aggregate_id: AggregateId,
    /// Version of the last stored event after the command.
    pub version: Version,
    /// Number of events the command stored. Zero for idempotent repeats.
    pub events_emitted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_cover_every_kind() {
        let kinds = vec![
            CommandKind::CreateApplication {
                applicant: Applicant::new("A", "f1a", "a"),
            },
            CommandKind::ApproveGovernanceReview,
            CommandKind::CompleteRkhApproval,
            CommandKind::UpdateRkhApprovals {
                message_id: 1,
                approvals: vec![],
            },
        ];
        for kind in kinds {
            assert!(CommandKind::NAMES.contains(&kind.name()));
        }
        assert_eq!(CommandKind::NAMES.len(), 10);
    }

    #[test]
    fn correlation_id_can_be_carried_over() {
        let correlation_id = CorrelationId::new();
        let command =
            ApplicationCommand::reject_kyc("alloc-1", "expired").with_correlation_id(correlation_id);

        assert_eq!(command.correlation_id(), correlation_id);
        assert_eq!(command.name(), "RejectKyc");
        assert_eq!(command.application_id, AggregateId::new("alloc-1"));
    }
}

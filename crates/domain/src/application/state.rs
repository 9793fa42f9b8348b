//! Application workflow position.

use serde::{Deserialize, Serialize};

/// The phase of an application in its approval workflow.
///
/// ```text
/// Submission ──► Kyc ──► GovernanceReview ──┬──► RkhApproval ──┬──► Approved
///                 │            │            └──► MetaApproval ─┘
///                 └────────────┴──► Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationPhase {
    #[default]
    Submission,
    Kyc,
    GovernanceReview,
    RkhApproval,
    MetaApproval,
    Approved,
    Rejected,
}

impl ApplicationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationPhase::Approved | ApplicationPhase::Rejected)
    }

    /// Phases in which allocation instructions may still change.
    pub fn accepts_instructions(&self) -> bool {
        matches!(
            self,
            ApplicationPhase::Kyc | ApplicationPhase::GovernanceReview
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationPhase::Submission => "SUBMISSION",
            ApplicationPhase::Kyc => "KYC",
            ApplicationPhase::GovernanceReview => "GOVERNANCE_REVIEW",
            ApplicationPhase::RkhApproval => "RKH_APPROVAL",
            ApplicationPhase::MetaApproval => "META_APPROVAL",
            ApplicationPhase::Approved => "APPROVED",
            ApplicationPhase::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for ApplicationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress within the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::NotStarted => "NOT_STARTED",
            PhaseStatus::InProgress => "IN_PROGRESS",
            PhaseStatus::Completed => "COMPLETED",
            PhaseStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a granted allocation is executed on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationMethod {
    /// Granted through the meta-allocator contract.
    MetaAllocator,
    /// Granted through the root key holder multisig.
    Rkh,
}

impl AllocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationMethod::MetaAllocator => "META_ALLOCATOR",
            AllocationMethod::Rkh => "RKH",
        }
    }
}

impl std::str::FromStr for AllocationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "META_ALLOCATOR" => Ok(AllocationMethod::MetaAllocator),
            "RKH" => Ok(AllocationMethod::Rkh),
            other => Err(other.to_string()),
        }
    }
}

impl std::fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_phase_is_submission() {
        assert_eq!(ApplicationPhase::default(), ApplicationPhase::Submission);
        assert_eq!(PhaseStatus::default(), PhaseStatus::NotStarted);
    }

    #[test]
    fn terminal_phases() {
        assert!(ApplicationPhase::Approved.is_terminal());
        assert!(ApplicationPhase::Rejected.is_terminal());
        assert!(!ApplicationPhase::RkhApproval.is_terminal());
        assert!(!ApplicationPhase::Kyc.is_terminal());
    }

    #[test]
    fn phases_serialize_screaming_snake() {
        let json = serde_json::to_string(&ApplicationPhase::GovernanceReview).unwrap();
        assert_eq!(json, "\"GOVERNANCE_REVIEW\"");
        assert_eq!(ApplicationPhase::GovernanceReview.to_string(), "GOVERNANCE_REVIEW");
    }

    #[test]
    fn allocation_method_parses_known_names() {
        assert_eq!("RKH".parse(), Ok(AllocationMethod::Rkh));
        assert_eq!("META_ALLOCATOR".parse(), Ok(AllocationMethod::MetaAllocator));
        assert_eq!("LDN".parse::<AllocationMethod>(), Err("LDN".to_string()));
    }
}

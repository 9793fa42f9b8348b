//! DatacapAllocator aggregate implementation.

use common::AggregateId;

use crate::aggregate::{Aggregate, AggregateBase};

use super::{
    AllocationInstruction, AllocationInstructions, AllocationMethod, Applicant, ApplicationError,
    ApplicationEvent, ApplicationPhase, KycResult, PhaseStatus, PullRequestLink,
};

/// Aggregate type name stored beside every application event.
pub const DATACAP_ALLOCATOR: &str = "DatacapAllocator";

/// Application for the DataCap allocator role.
///
/// Transition methods validate against the current phase, then record one or
/// more events through [`Aggregate::apply_change`]. A failed guard records
/// nothing and leaves the state untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatacapAllocator {
    base: AggregateBase<ApplicationEvent>,
    applicant: Option<Applicant>,
    phase: ApplicationPhase,
    status: PhaseStatus,
    instructions: AllocationInstructions,
    pull_request: Option<PullRequestLink>,
    kyc_result: Option<KycResult>,
    allocation: Option<AllocationInstruction>,
    rkh_threshold: u32,
    rkh_message_id: Option<u64>,
    rkh_approvals: Vec<String>,
    rejection_reason: Option<String>,
    block_number: Option<u64>,
    tx_hash: Option<String>,
}

impl Aggregate for DatacapAllocator {
    type Event = ApplicationEvent;

    fn aggregate_type() -> &'static str {
        DATACAP_ALLOCATOR
    }

    fn base(&self) -> &AggregateBase<ApplicationEvent> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AggregateBase<ApplicationEvent> {
        &mut self.base
    }

    fn apply(&mut self, event: &ApplicationEvent) {
        match event {
            ApplicationEvent::ApplicationCreated(data) => {
                self.base.set_id(data.application_id.clone());
                self.applicant = Some(data.applicant.clone());
                self.enter(ApplicationPhase::Kyc);
            }
            ApplicationEvent::AllocationInstructionsUpdated(data) => {
                self.instructions = AllocationInstructions {
                    methods: data.methods.clone(),
                    amounts: data.amounts.clone(),
                };
            }
            ApplicationEvent::PullRequestUpdated(data) => {
                self.pull_request = Some(PullRequestLink {
                    number: data.number,
                    url: data.url.clone(),
                    commit_sha: data.commit_sha.clone(),
                });
            }
            ApplicationEvent::KycApproved(data) => {
                self.kyc_result = Some(data.result.clone());
                self.status = PhaseStatus::Completed;
            }
            ApplicationEvent::KycRejected(data) => self.reject(&data.reason),
            ApplicationEvent::GovernanceReviewStarted(_) => {
                self.enter(ApplicationPhase::GovernanceReview);
            }
            ApplicationEvent::GovernanceReviewApproved(data) => {
                self.allocation = Some(AllocationInstruction {
                    method: data.method,
                    amount: data.amount,
                });
                self.status = PhaseStatus::Completed;
            }
            ApplicationEvent::GovernanceReviewRejected(data) => self.reject(&data.reason),
            ApplicationEvent::RkhApprovalStarted(data) => {
                self.rkh_threshold = data.threshold;
                self.enter(ApplicationPhase::RkhApproval);
            }
            ApplicationEvent::MetaAllocatorApprovalStarted(_) => {
                self.enter(ApplicationPhase::MetaApproval);
            }
            ApplicationEvent::RkhApprovalsUpdated(data) => {
                self.rkh_message_id = Some(data.message_id);
                self.rkh_approvals = data.approvals.clone();
            }
            ApplicationEvent::RkhApprovalCompleted(_) => self.approve(),
            ApplicationEvent::MetaAllocatorApprovalCompleted(data) => {
                self.block_number = Some(data.block_number);
                self.tx_hash = Some(data.tx_hash.clone());
                self.approve();
            }
        }
    }
}

// Query methods
impl DatacapAllocator {
    pub fn applicant(&self) -> Option<&Applicant> {
        self.applicant.as_ref()
    }

    pub fn phase(&self) -> ApplicationPhase {
        self.phase
    }

    pub fn status(&self) -> PhaseStatus {
        self.status
    }

    /// Raw instruction columns as last recorded.
    pub fn instructions(&self) -> &AllocationInstructions {
        &self.instructions
    }

    pub fn pull_request(&self) -> Option<&PullRequestLink> {
        self.pull_request.as_ref()
    }

    pub fn kyc_result(&self) -> Option<&KycResult> {
        self.kyc_result.as_ref()
    }

    /// Instruction accepted by governance, once approved.
    pub fn allocation(&self) -> Option<AllocationInstruction> {
        self.allocation
    }

    pub fn rkh_threshold(&self) -> u32 {
        self.rkh_threshold
    }

    pub fn rkh_message_id(&self) -> Option<u64> {
        self.rkh_message_id
    }

    pub fn rkh_approvals(&self) -> &[String] {
        &self.rkh_approvals
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    /// On-chain proof of a meta-allocator grant.
    pub fn execution_proof(&self) -> Option<(u64, &str)> {
        self.block_number.zip(self.tx_hash.as_deref())
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

// Command methods (record events)
impl DatacapAllocator {
    /// Submits the application; KYC starts immediately.
    pub fn create(
        &mut self,
        application_id: AggregateId,
        applicant: Applicant,
    ) -> Result<(), ApplicationError> {
        if self.base.id().is_some() {
            return Err(ApplicationError::AlreadyCreated);
        }
        if application_id.as_str().trim().is_empty() {
            return Err(ApplicationError::InvalidApplicationId {
                id: application_id.to_string(),
            });
        }

        self.apply_change(ApplicationEvent::application_created(
            application_id,
            applicant,
        ));
        Ok(())
    }

    /// Records passing KYC and opens the governance review.
    pub fn approve_kyc(&mut self, result: KycResult) -> Result<(), ApplicationError> {
        self.require_phase(ApplicationPhase::Kyc, "approve KYC")?;

        self.apply_change(ApplicationEvent::kyc_approved(result));
        self.apply_change(ApplicationEvent::governance_review_started());
        Ok(())
    }

    pub fn reject_kyc(&mut self, reason: impl Into<String>) -> Result<(), ApplicationError> {
        self.require_phase(ApplicationPhase::Kyc, "reject KYC")?;

        self.apply_change(ApplicationEvent::kyc_rejected(reason));
        Ok(())
    }

    /// Replaces the raw instruction columns. Validity is checked on
    /// governance approval, not here.
    pub fn update_allocation_instructions(
        &mut self,
        instructions: AllocationInstructions,
    ) -> Result<(), ApplicationError> {
        self.require_created()?;
        if !self.phase.accepts_instructions() {
            return Err(self.invalid_phase("update allocation instructions"));
        }
        if instructions == self.instructions {
            return Ok(());
        }

        self.apply_change(ApplicationEvent::allocation_instructions_updated(
            instructions,
        ));
        Ok(())
    }

    /// Accepts the application and routes it by the last instruction's
    /// method: RKH approval with `rkh_threshold` signatures, or the
    /// meta-allocator contract.
    pub fn approve_governance_review(&mut self, rkh_threshold: u32) -> Result<(), ApplicationError> {
        self.require_phase(ApplicationPhase::GovernanceReview, "approve governance review")?;
        let last = self.instructions.last_valid()?;
        if last.method == AllocationMethod::Rkh && rkh_threshold == 0 {
            return Err(ApplicationError::InvalidApprovalThreshold {
                threshold: rkh_threshold,
            });
        }

        self.apply_change(ApplicationEvent::governance_review_approved(
            last.method,
            last.amount,
        ));
        match last.method {
            AllocationMethod::Rkh => {
                self.apply_change(ApplicationEvent::rkh_approval_started(rkh_threshold))
            }
            AllocationMethod::MetaAllocator => {
                self.apply_change(ApplicationEvent::meta_allocator_approval_started())
            }
        }
        Ok(())
    }

    pub fn reject_governance_review(
        &mut self,
        reason: impl Into<String>,
    ) -> Result<(), ApplicationError> {
        self.require_phase(ApplicationPhase::GovernanceReview, "reject governance review")?;

        self.apply_change(ApplicationEvent::governance_review_rejected(reason));
        Ok(())
    }

    /// Records multisig approvals observed on chain.
    ///
    /// Approvals for the current proposal are merged into the recorded set;
    /// a different `message_id` starts a new set. Repeating an already
    /// recorded set records nothing. Reaching the threshold completes the
    /// approval in the same call. A no-op once approved.
    pub fn update_rkh_approvals(
        &mut self,
        message_id: u64,
        approvals: Vec<String>,
    ) -> Result<(), ApplicationError> {
        if self.phase == ApplicationPhase::Approved {
            return Ok(());
        }
        self.require_phase(ApplicationPhase::RkhApproval, "update RKH approvals")?;

        let same_proposal = self.rkh_message_id == Some(message_id);
        let mut merged = if same_proposal {
            self.rkh_approvals.clone()
        } else {
            Vec::new()
        };
        for signer in approvals {
            if !merged.contains(&signer) {
                merged.push(signer);
            }
        }

        if same_proposal && merged == self.rkh_approvals {
            return Ok(());
        }

        let reached = merged.len() as u64 >= u64::from(self.rkh_threshold);
        self.apply_change(ApplicationEvent::rkh_approvals_updated(message_id, merged));
        if reached {
            self.apply_change(ApplicationEvent::rkh_approval_completed(Some(message_id)));
        }
        Ok(())
    }

    /// Marks the RKH approval as executed. A no-op once approved.
    pub fn complete_rkh_approval(&mut self) -> Result<(), ApplicationError> {
        if self.phase == ApplicationPhase::Approved {
            return Ok(());
        }
        self.require_phase(ApplicationPhase::RkhApproval, "complete RKH approval")?;

        self.apply_change(ApplicationEvent::rkh_approval_completed(self.rkh_message_id));
        Ok(())
    }

    /// Marks the meta-allocator grant as executed. A no-op once approved.
    pub fn complete_meta_allocator_approval(
        &mut self,
        block_number: u64,
        tx_hash: impl Into<String>,
    ) -> Result<(), ApplicationError> {
        if self.phase == ApplicationPhase::Approved {
            return Ok(());
        }
        self.require_phase(ApplicationPhase::MetaApproval, "complete meta-allocator approval")?;
        let tx_hash = tx_hash.into();
        if tx_hash.trim().is_empty() {
            return Err(ApplicationError::MissingTransactionHash);
        }

        self.apply_change(ApplicationEvent::meta_allocator_approval_completed(
            block_number,
            tx_hash,
        ));
        Ok(())
    }

    /// Records the tracking pull request. Repeating the current linkage
    /// records nothing.
    pub fn update_pull_request(&mut self, link: PullRequestLink) -> Result<(), ApplicationError> {
        self.require_created()?;
        if self.phase.is_terminal() {
            return Err(self.invalid_phase("update pull request"));
        }
        if link.number == 0 {
            return Err(ApplicationError::InvalidPullRequest {
                reason: "number must be positive".to_string(),
            });
        }
        if link.url.trim().is_empty() {
            return Err(ApplicationError::InvalidPullRequest {
                reason: "url is required".to_string(),
            });
        }
        if self.pull_request.as_ref() == Some(&link) {
            return Ok(());
        }

        self.apply_change(ApplicationEvent::pull_request_updated(link));
        Ok(())
    }
}

// Guards and apply helpers
impl DatacapAllocator {
    fn require_created(&self) -> Result<(), ApplicationError> {
        if self.base.id().is_none() {
            return Err(ApplicationError::NotCreated);
        }
        Ok(())
    }

    fn require_phase(
        &self,
        phase: ApplicationPhase,
        action: &'static str,
    ) -> Result<(), ApplicationError> {
        self.require_created()?;
        if self.phase != phase {
            return Err(self.invalid_phase(action));
        }
        Ok(())
    }

    fn invalid_phase(&self, action: &'static str) -> ApplicationError {
        ApplicationError::InvalidPhase {
            action,
            phase: self.phase,
            status: self.status,
        }
    }

    fn enter(&mut self, phase: ApplicationPhase) {
        self.phase = phase;
        self.status = PhaseStatus::InProgress;
    }

    fn reject(&mut self, reason: &str) {
        self.phase = ApplicationPhase::Rejected;
        self.status = PhaseStatus::Failed;
        self.rejection_reason = Some(reason.to_string());
    }

    fn approve(&mut self) {
        self.phase = ApplicationPhase::Approved;
        self.status = PhaseStatus::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DomainEvent;

    fn kyc() -> KycResult {
        KycResult {
            provider: "togggle".to_string(),
            reference: "kyc-42".to_string(),
            score: Some(90),
        }
    }

    fn created() -> DatacapAllocator {
        let mut app = DatacapAllocator::default();
        app.create(
            AggregateId::new("alloc-1"),
            Applicant::new("Acme Storage", "f1acme", "acme"),
        )
        .unwrap();
        app
    }

    fn in_governance(methods: &[&str], amounts: &[u64]) -> DatacapAllocator {
        let mut app = created();
        app.approve_kyc(kyc()).unwrap();
        app.update_allocation_instructions(AllocationInstructions {
            methods: methods.iter().map(|m| m.to_string()).collect(),
            amounts: amounts.to_vec(),
        })
        .unwrap();
        app
    }

    fn event_names(app: &DatacapAllocator) -> Vec<&'static str> {
        app.uncommitted_events()
            .iter()
            .map(|e| e.event_type())
            .collect()
    }

    #[test]
    fn create_moves_to_kyc() {
        let app = created();
        assert_eq!(app.id(), Some(&AggregateId::new("alloc-1")));
        assert_eq!(app.phase(), ApplicationPhase::Kyc);
        assert_eq!(app.status(), PhaseStatus::InProgress);
        assert_eq!(event_names(&app), vec!["ApplicationCreated"]);
    }

    #[test]
    fn create_twice_fails() {
        let mut app = created();
        let result = app.create(
            AggregateId::new("alloc-1"),
            Applicant::new("Acme", "f1acme", "acme"),
        );
        assert_eq!(result, Err(ApplicationError::AlreadyCreated));
        assert_eq!(app.uncommitted_events().len(), 1);
    }

    #[test]
    fn blank_id_is_rejected() {
        let mut app = DatacapAllocator::default();
        let result = app.create(AggregateId::new("  "), Applicant::new("A", "f1a", "a"));
        assert!(matches!(
            result,
            Err(ApplicationError::InvalidApplicationId { .. })
        ));
    }

    #[test]
    fn transitions_before_create_fail() {
        let mut app = DatacapAllocator::default();
        assert_eq!(app.approve_kyc(kyc()), Err(ApplicationError::NotCreated));
        assert!(app.uncommitted_events().is_empty());
    }

    #[test]
    fn approve_kyc_chains_governance_review() {
        let mut app = created();
        app.approve_kyc(kyc()).unwrap();

        assert_eq!(
            event_names(&app),
            vec!["ApplicationCreated", "KycApproved", "GovernanceReviewStarted"]
        );
        assert_eq!(app.phase(), ApplicationPhase::GovernanceReview);
        assert_eq!(app.status(), PhaseStatus::InProgress);
        assert_eq!(app.kyc_result(), Some(&kyc()));
    }

    #[test]
    fn approve_kyc_twice_fails_without_new_events() {
        let mut app = created();
        app.approve_kyc(kyc()).unwrap();
        let before = app.clone();

        let result = app.approve_kyc(kyc());

        assert!(matches!(
            result,
            Err(ApplicationError::InvalidPhase {
                phase: ApplicationPhase::GovernanceReview,
                ..
            })
        ));
        assert_eq!(app, before);
    }

    #[test]
    fn reject_kyc_is_terminal() {
        let mut app = created();
        app.reject_kyc("sanctioned entity").unwrap();

        assert_eq!(app.phase(), ApplicationPhase::Rejected);
        assert_eq!(app.status(), PhaseStatus::Failed);
        assert_eq!(app.rejection_reason(), Some("sanctioned entity"));
        assert!(app.approve_kyc(kyc()).is_err());
    }

    #[test]
    fn instructions_only_change_in_kyc_or_review() {
        let mut app = in_governance(&["RKH"], &[10]);
        app.approve_governance_review(2).unwrap();

        let result = app.update_allocation_instructions(AllocationInstructions::default());

        assert!(matches!(result, Err(ApplicationError::InvalidPhase { .. })));
    }

    #[test]
    fn same_instructions_record_nothing() {
        let mut app = in_governance(&["RKH"], &[10]);
        let pending = app.uncommitted_events().len();

        app.update_allocation_instructions(app.instructions().clone())
            .unwrap();

        assert_eq!(app.uncommitted_events().len(), pending);
    }

    #[test]
    fn governance_approval_routes_to_rkh() {
        let mut app = in_governance(&["META_ALLOCATOR", "RKH"], &[5, 10]);
        app.approve_governance_review(3).unwrap();

        assert_eq!(app.phase(), ApplicationPhase::RkhApproval);
        assert_eq!(app.rkh_threshold(), 3);
        assert_eq!(
            app.allocation(),
            Some(AllocationInstruction {
                method: AllocationMethod::Rkh,
                amount: 10
            })
        );
        let names = event_names(&app);
        assert_eq!(
            &names[names.len() - 2..],
            &["GovernanceReviewApproved", "RkhApprovalStarted"]
        );
    }

    #[test]
    fn governance_approval_routes_to_meta_allocator() {
        let mut app = in_governance(&["RKH", "META_ALLOCATOR"], &[5, 10]);
        app.approve_governance_review(2).unwrap();

        assert_eq!(app.phase(), ApplicationPhase::MetaApproval);
        assert_eq!(
            event_names(&app).last(),
            Some(&"MetaAllocatorApprovalStarted")
        );
    }

    #[test]
    fn governance_approval_without_instructions_fails() {
        let mut app = created();
        app.approve_kyc(kyc()).unwrap();
        let before = app.clone();

        let result = app.approve_governance_review(2);

        assert_eq!(result, Err(ApplicationError::MissingAllocationInstructions));
        assert_eq!(app, before);
    }

    #[test]
    fn zero_threshold_is_rejected_for_rkh() {
        let mut app = in_governance(&["RKH"], &[10]);
        assert_eq!(
            app.approve_governance_review(0),
            Err(ApplicationError::InvalidApprovalThreshold { threshold: 0 })
        );
    }

    #[test]
    fn reject_governance_review_is_terminal() {
        let mut app = in_governance(&["RKH"], &[10]);
        app.reject_governance_review("incomplete due diligence")
            .unwrap();
        assert_eq!(app.phase(), ApplicationPhase::Rejected);
    }

    #[test]
    fn rkh_approvals_accumulate_until_threshold() {
        let mut app = in_governance(&["RKH"], &[10]);
        app.approve_governance_review(2).unwrap();

        app.update_rkh_approvals(7, vec!["f1alice".into()]).unwrap();
        assert_eq!(app.phase(), ApplicationPhase::RkhApproval);
        assert_eq!(app.rkh_approvals(), &["f1alice".to_string()]);

        app.update_rkh_approvals(7, vec!["f1bob".into()]).unwrap();
        assert_eq!(app.phase(), ApplicationPhase::Approved);
        assert_eq!(app.status(), PhaseStatus::Completed);
        assert_eq!(app.rkh_approvals().len(), 2);
        assert_eq!(event_names(&app).last(), Some(&"RkhApprovalCompleted"));
    }

    #[test]
    fn repeated_approval_set_records_nothing() {
        let mut app = in_governance(&["RKH"], &[10]);
        app.approve_governance_review(3).unwrap();
        app.update_rkh_approvals(7, vec!["f1alice".into(), "f1bob".into()])
            .unwrap();
        let pending = app.uncommitted_events().len();

        app.update_rkh_approvals(7, vec!["f1bob".into(), "f1alice".into()])
            .unwrap();

        assert_eq!(app.uncommitted_events().len(), pending);
    }

    #[test]
    fn new_proposal_replaces_approvals() {
        let mut app = in_governance(&["RKH"], &[10]);
        app.approve_governance_review(3).unwrap();
        app.update_rkh_approvals(7, vec!["f1alice".into(), "f1bob".into()])
            .unwrap();

        app.update_rkh_approvals(8, vec!["f1carol".into()]).unwrap();

        assert_eq!(app.rkh_message_id(), Some(8));
        assert_eq!(app.rkh_approvals(), &["f1carol".to_string()]);
    }

    #[test]
    fn approval_is_idempotent_once_approved() {
        let mut app = in_governance(&["RKH"], &[10]);
        app.approve_governance_review(1).unwrap();
        app.update_rkh_approvals(7, vec!["f1alice".into()]).unwrap();
        let pending = app.uncommitted_events().len();

        app.update_rkh_approvals(7, vec!["f1bob".into()]).unwrap();
        app.complete_rkh_approval().unwrap();
        app.complete_meta_allocator_approval(1, "0xabc").unwrap();

        assert_eq!(app.uncommitted_events().len(), pending);
        assert_eq!(app.phase(), ApplicationPhase::Approved);
    }

    #[test]
    fn complete_rkh_approval_from_rkh_phase() {
        let mut app = in_governance(&["RKH"], &[10]);
        app.approve_governance_review(2).unwrap();

        app.complete_rkh_approval().unwrap();

        assert_eq!(app.phase(), ApplicationPhase::Approved);
    }

    #[test]
    fn complete_meta_allocator_records_proof() {
        let mut app = in_governance(&["META_ALLOCATOR"], &[10]);
        app.approve_governance_review(2).unwrap();

        app.complete_meta_allocator_approval(4_200_000, "0xdeadbeef")
            .unwrap();

        assert_eq!(app.phase(), ApplicationPhase::Approved);
        assert_eq!(app.execution_proof(), Some((4_200_000, "0xdeadbeef")));
    }

    #[test]
    fn complete_meta_allocator_requires_tx_hash() {
        let mut app = in_governance(&["META_ALLOCATOR"], &[10]);
        app.approve_governance_review(2).unwrap();

        assert_eq!(
            app.complete_meta_allocator_approval(1, " "),
            Err(ApplicationError::MissingTransactionHash)
        );
    }

    #[test]
    fn completing_the_wrong_route_fails() {
        let mut app = in_governance(&["META_ALLOCATOR"], &[10]);
        app.approve_governance_review(2).unwrap();

        assert!(matches!(
            app.complete_rkh_approval(),
            Err(ApplicationError::InvalidPhase {
                phase: ApplicationPhase::MetaApproval,
                ..
            })
        ));
    }

    #[test]
    fn pull_request_linkage() {
        let mut app = created();
        let link = PullRequestLink {
            number: 12,
            url: "https://github.com/org/registry/pull/12".to_string(),
            commit_sha: "abc123".to_string(),
        };

        app.update_pull_request(link.clone()).unwrap();
        let pending = app.uncommitted_events().len();
        app.update_pull_request(link.clone()).unwrap();

        assert_eq!(app.pull_request(), Some(&link));
        assert_eq!(app.uncommitted_events().len(), pending);
    }

    #[test]
    fn pull_request_rejected_when_terminal() {
        let mut app = created();
        app.reject_kyc("no").unwrap();

        let result = app.update_pull_request(PullRequestLink {
            number: 1,
            url: "https://github.com/org/registry/pull/1".to_string(),
            commit_sha: "abc".to_string(),
        });

        assert!(matches!(result, Err(ApplicationError::InvalidPhase { .. })));
    }
}

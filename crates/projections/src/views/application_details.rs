//! Application details read model.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{
    AllocationMethod, ApplicationEvent, ApplicationPhase, DATACAP_ALLOCATOR, DomainEvent,
    PhaseStatus, PullRequestLink,
};
use event_store::{EventEnvelope, Version};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};

use super::ReadModel;

/// Denormalized view of one application.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationDetails {
    pub application_id: AggregateId,
    pub applicant_name: String,
    pub applicant_address: String,
    pub github_username: String,
    pub phase: ApplicationPhase,
    pub status: PhaseStatus,
    pub pull_request: Option<PullRequestLink>,
    pub allocation_method: Option<AllocationMethod>,
    pub allocation_amount: Option<u64>,
    pub rkh_threshold: Option<u32>,
    pub rkh_approvals: Vec<String>,
    pub rejection_reason: Option<String>,
    pub tx_hash: Option<String>,
    /// Version of the last event folded into this entry.
    pub last_version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Application details keyed by application id.
///
/// Each entry remembers the version of the last event it applied and ignores
/// events at or below it, so redelivered events leave it unchanged.
#[derive(Clone, Default)]
pub struct ApplicationDetailsView {
    applications: Arc<RwLock<HashMap<AggregateId, ApplicationDetails>>>,
    position: Arc<RwLock<ProjectionPosition>>,
}

impl ApplicationDetailsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, application_id: &AggregateId) -> Option<ApplicationDetails> {
        self.applications.read().await.get(application_id).cloned()
    }

    pub async fn all(&self) -> Vec<ApplicationDetails> {
        self.applications.read().await.values().cloned().collect()
    }

    pub async fn by_phase(&self, phase: ApplicationPhase) -> Vec<ApplicationDetails> {
        self.applications
            .read()
            .await
            .values()
            .filter(|a| a.phase == phase)
            .cloned()
            .collect()
    }

    async fn advance(&self) {
        let mut position = self.position.write().await;
        *position = position.advance();
    }
}

#[async_trait]
impl ReadModel for ApplicationDetailsView {
    fn name(&self) -> &'static str {
        "ApplicationDetailsView"
    }

    async fn count(&self) -> usize {
        self.applications.read().await.len()
    }
}

#[async_trait]
impl Projection for ApplicationDetailsView {
    fn name(&self) -> &'static str {
        "ApplicationDetailsView"
    }

    fn event_names(&self) -> &'static [&'static str] {
        ApplicationEvent::EVENT_NAMES
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_name != DATACAP_ALLOCATOR {
            self.advance().await;
            return Ok(());
        }

        let application_event = ApplicationEvent::from_parts(&event.event_name, event.payload.clone())?;
        let application_id = event.aggregate_id.clone();

        {
            let mut applications = self.applications.write().await;

            if let ApplicationEvent::ApplicationCreated(data) = &application_event {
                if !applications.contains_key(&application_id) {
                    applications.insert(
                        application_id.clone(),
                        ApplicationDetails {
                            application_id: application_id.clone(),
                            applicant_name: data.applicant.name.clone(),
                            applicant_address: data.applicant.address.clone(),
                            github_username: data.applicant.github_username.clone(),
                            phase: ApplicationPhase::Kyc,
                            status: PhaseStatus::InProgress,
                            pull_request: None,
                            allocation_method: None,
                            allocation_amount: None,
                            rkh_threshold: None,
                            rkh_approvals: Vec::new(),
                            rejection_reason: None,
                            tx_hash: None,
                            last_version: event.version,
                            created_at: data.created_at,
                            updated_at: event.timestamp,
                        },
                    );
                }
            } else if let Some(details) = applications.get_mut(&application_id) {
                if event.version > details.last_version {
                    if event.version != details.last_version.next() {
                        tracing::warn!(
                            %application_id,
                            expected = %details.last_version.next(),
                            got = %event.version,
                            "gap in application events"
                        );
                    }
                    apply(details, application_event);
                    details.last_version = event.version;
                    details.updated_at = event.timestamp;
                } else {
                    tracing::debug!(%application_id, version = %event.version, "skipping already applied event");
                }
            } else {
                tracing::warn!(
                    %application_id,
                    event_name = %event.event_name,
                    "event for unknown application"
                );
            }
        }

        self.advance().await;
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        self.applications.write().await.clear();
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}

fn apply(details: &mut ApplicationDetails, event: ApplicationEvent) {
    match event {
        // Handled by the caller: creation inserts the entry.
        ApplicationEvent::ApplicationCreated(_) => {}
        ApplicationEvent::AllocationInstructionsUpdated(_) => {}
        ApplicationEvent::PullRequestUpdated(data) => {
            details.pull_request = Some(PullRequestLink {
                number: data.number,
                url: data.url,
                commit_sha: data.commit_sha,
            });
        }
        ApplicationEvent::KycApproved(_) => details.status = PhaseStatus::Completed,
        ApplicationEvent::GovernanceReviewApproved(data) => {
            details.allocation_method = Some(data.method);
            details.allocation_amount = Some(data.amount);
            details.status = PhaseStatus::Completed;
        }
        ApplicationEvent::KycRejected(data) => reject(details, data.reason),
        ApplicationEvent::GovernanceReviewRejected(data) => reject(details, data.reason),
        ApplicationEvent::GovernanceReviewStarted(_) => {
            enter(details, ApplicationPhase::GovernanceReview);
        }
        ApplicationEvent::RkhApprovalStarted(data) => {
            details.rkh_threshold = Some(data.threshold);
            enter(details, ApplicationPhase::RkhApproval);
        }
        ApplicationEvent::MetaAllocatorApprovalStarted(_) => {
            enter(details, ApplicationPhase::MetaApproval);
        }
        ApplicationEvent::RkhApprovalsUpdated(data) => details.rkh_approvals = data.approvals,
        ApplicationEvent::RkhApprovalCompleted(_) => approve(details),
        ApplicationEvent::MetaAllocatorApprovalCompleted(data) => {
            details.tx_hash = Some(data.tx_hash);
            approve(details);
        }
    }
}

fn enter(details: &mut ApplicationDetails, phase: ApplicationPhase) {
    details.phase = phase;
    details.status = PhaseStatus::InProgress;
}

fn reject(details: &mut ApplicationDetails, reason: String) {
    details.phase = ApplicationPhase::Rejected;
    details.status = PhaseStatus::Failed;
    details.rejection_reason = Some(reason);
}

fn approve(details: &mut ApplicationDetails) {
    details.phase = ApplicationPhase::Approved;
    details.status = PhaseStatus::Completed;
}

//! Keeps the registry pull request in step with the application.

use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, CorrelationId};
use domain::{
    Applicant, ApplicationCommand, ApplicationEvent, ApplicationPhase, CommandBus,
    DATACAP_ALLOCATOR, DomainEvent, ErrorStatus,
};
use event_bus::{EventBus, EventHandler, HandlerError};
use event_store::EventEnvelope;

use crate::error::{Result, WorkflowError};
use crate::services::PullRequestService;

/// Opens the pull request for new applications and relabels it on every
/// phase change.
///
/// Safe under redelivery: an existing pull request is reused instead of
/// opened again, and recording the same link twice emits nothing.
pub struct PullRequestReactor<P: PullRequestService> {
    pull_requests: P,
    commands: Arc<CommandBus<ApplicationCommand>>,
}

impl<P: PullRequestService> PullRequestReactor<P> {
    /// Events the reactor subscribes to.
    pub const EVENT_NAMES: &'static [&'static str] = &[
        "ApplicationCreated",
        "KycRejected",
        "GovernanceReviewStarted",
        "GovernanceReviewRejected",
        "RkhApprovalStarted",
        "MetaAllocatorApprovalStarted",
        "RkhApprovalCompleted",
        "MetaAllocatorApprovalCompleted",
    ];

    pub fn new(pull_requests: P, commands: Arc<CommandBus<ApplicationCommand>>) -> Self {
        Self {
            pull_requests,
            commands,
        }
    }

    #[tracing::instrument(
        skip(self, event),
        fields(event_name = %event.event_name, application_id = %event.aggregate_id)
    )]
    pub async fn react(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_name != DATACAP_ALLOCATOR {
            return Ok(());
        }

        let application_event = ApplicationEvent::from_parts(&event.event_name, event.payload.clone())?;
        match application_event {
            ApplicationEvent::ApplicationCreated(data) => {
                self.open(event, &data.applicant).await
            }
            other => match phase_entered(&other) {
                Some(phase) => self.relabel(&event.aggregate_id, phase).await,
                None => Ok(()),
            },
        }
    }

    async fn open(&self, event: &EventEnvelope, applicant: &Applicant) -> Result<()> {
        let application_id = &event.aggregate_id;

        let link = match self.pull_requests.find_pull_request(application_id).await? {
            Some(link) => {
                tracing::debug!(number = link.number, "pull request already open");
                link
            }
            None => {
                let link = self
                    .pull_requests
                    .open_pull_request(application_id, applicant)
                    .await?;
                metrics::counter!("workflow_pull_requests_opened_total").increment(1);
                tracing::info!(number = link.number, url = %link.url, "opened pull request");
                link
            }
        };

        let command = ApplicationCommand::update_pull_request(application_id.clone(), link)
            .with_correlation_id(correlation_of(event));

        match self.commands.send(command).await {
            Ok(_) => Ok(()),
            // The application reached a terminal phase before this delivery.
            Err(err) if err.status() == ErrorStatus::Unprocessable => {
                tracing::warn!(error = %err, "pull request not recorded");
                Ok(())
            }
            Err(err) => Err(WorkflowError::Domain(err)),
        }
    }

    async fn relabel(&self, application_id: &AggregateId, phase: ApplicationPhase) -> Result<()> {
        let Some(link) = self.pull_requests.find_pull_request(application_id).await? else {
            tracing::warn!(%phase, "no pull request to relabel");
            return Ok(());
        };

        self.pull_requests
            .set_phase_label(link.number, phase)
            .await?;
        tracing::info!(number = link.number, %phase, "relabelled pull request");
        Ok(())
    }
}

/// Phase an application is in right after `event`, for events that move it.
fn phase_entered(event: &ApplicationEvent) -> Option<ApplicationPhase> {
    match event {
        ApplicationEvent::GovernanceReviewStarted(_) => Some(ApplicationPhase::GovernanceReview),
        ApplicationEvent::RkhApprovalStarted(_) => Some(ApplicationPhase::RkhApproval),
        ApplicationEvent::MetaAllocatorApprovalStarted(_) => Some(ApplicationPhase::MetaApproval),
        ApplicationEvent::KycRejected(_) | ApplicationEvent::GovernanceReviewRejected(_) => {
            Some(ApplicationPhase::Rejected)
        }
        ApplicationEvent::RkhApprovalCompleted(_)
        | ApplicationEvent::MetaAllocatorApprovalCompleted(_) => Some(ApplicationPhase::Approved),
        _ => None,
    }
}

/// Carries the correlation id of the causing command, or starts a new one.
fn correlation_of(event: &EventEnvelope) -> CorrelationId {
    event
        .correlation_id()
        .and_then(|raw| uuid::Uuid::parse_str(raw).ok())
        .map(CorrelationId::from)
        .unwrap_or_default()
}

struct ReactorHandler<P: PullRequestService> {
    event_name: &'static str,
    reactor: Arc<PullRequestReactor<P>>,
}

#[async_trait]
impl<P: PullRequestService + 'static> EventHandler for ReactorHandler<P> {
    fn event_name(&self) -> &str {
        self.event_name
    }

    async fn handle(&self, event: &EventEnvelope) -> std::result::Result<(), HandlerError> {
        self.reactor
            .react(event)
            .await
            .map_err(|err| HandlerError::new("PullRequestReactor", err.to_string()))
    }
}

/// Registers the reactor for every event it reacts to.
pub async fn subscribe_pull_request_reactor<B, P>(bus: &B, reactor: Arc<PullRequestReactor<P>>)
where
    B: EventBus + ?Sized,
    P: PullRequestService + 'static,
{
    for &event_name in PullRequestReactor::<P>::EVENT_NAMES {
        bus.register_handler(Arc::new(ReactorHandler {
            event_name,
            reactor: Arc::clone(&reactor),
        }))
        .await;
    }
    tracing::info!("pull request reactor subscribed to event bus");
}

#[cfg(test)]
mod tests {
    use event_store::Version;

    use super::*;

    #[test]
    fn phase_entered_covers_moving_events() {
        assert_eq!(
            phase_entered(&ApplicationEvent::rkh_approval_started(2)),
            Some(ApplicationPhase::RkhApproval)
        );
        assert_eq!(
            phase_entered(&ApplicationEvent::governance_review_rejected("spam")),
            Some(ApplicationPhase::Rejected)
        );
        assert_eq!(
            phase_entered(&ApplicationEvent::meta_allocator_approval_completed(1, "0xabc")),
            Some(ApplicationPhase::Approved)
        );
        assert_eq!(
            phase_entered(&ApplicationEvent::rkh_approvals_updated(1, vec![])),
            None
        );
    }

    #[test]
    fn correlation_is_carried_over() {
        let correlation = CorrelationId::new();
        let event = EventEnvelope::builder()
            .event_name("ApplicationCreated")
            .aggregate_id("alloc-1")
            .aggregate_name(DATACAP_ALLOCATOR)
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .metadata("correlation_id", serde_json::json!(correlation.to_string()))
            .build();

        assert_eq!(correlation_of(&event), correlation);
    }

    #[test]
    fn malformed_correlation_starts_a_new_one() {
        let event = EventEnvelope::builder()
            .event_name("ApplicationCreated")
            .aggregate_id("alloc-1")
            .aggregate_name(DATACAP_ALLOCATOR)
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .metadata("correlation_id", serde_json::json!("not-a-uuid"))
            .build();

        assert_ne!(correlation_of(&event).to_string(), "not-a-uuid");
    }
}

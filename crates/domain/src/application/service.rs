//! Application service: loads, transitions and saves applications.

use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, EventStoreExt};

use crate::aggregate::Aggregate;
use crate::bus::{CommandBus, CommandHandler, QueryBus, QueryHandler};
use crate::error::DomainError;
use crate::repository::EventSourcedRepository;

use super::{
    ApplicationCommand, ApplicationError, ApplicationQuery, CommandKind, CommandOutcome,
    DatacapAllocator, QueryResult,
};

/// Tunables of the approval workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationConfig {
    /// Multisig signatures required on the RKH route.
    pub rkh_approval_threshold: u32,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            rkh_approval_threshold: 2,
        }
    }
}

/// Runs application commands against the event store.
///
/// Each command loads the aggregate, applies one transition and saves with
/// the version it was loaded at, so a concurrent writer surfaces as a
/// concurrency conflict. Conflicts are returned to the caller, never retried.
pub struct ApplicationService<S: EventStore> {
    repository: EventSourcedRepository<S, DatacapAllocator>,
    config: ApplicationConfig,
}

impl<S: EventStore> ApplicationService<S> {
    pub fn new(store: S, config: ApplicationConfig) -> Self {
        Self {
            repository: EventSourcedRepository::new(store),
            config,
        }
    }

    pub fn repository(&self) -> &EventSourcedRepository<S, DatacapAllocator> {
        &self.repository
    }

    pub fn config(&self) -> ApplicationConfig {
        self.config
    }

    /// Handles one command end to end.
    #[tracing::instrument(
        skip(self, command),
        fields(
            command = command.kind.name(),
            application_id = %command.application_id,
            correlation_id = %command.correlation_id
        )
    )]
    pub async fn execute(&self, command: ApplicationCommand) -> Result<CommandOutcome, DomainError> {
        let ApplicationCommand {
            correlation_id,
            application_id,
            kind,
        } = command;

        let (mut application, options) = if matches!(kind, CommandKind::CreateApplication { .. }) {
            if self.repository.store().aggregate_exists(&application_id).await? {
                return Err(ApplicationError::AlreadyCreated.into());
            }
            (DatacapAllocator::default(), AppendOptions::expect_new())
        } else {
            let application = self.repository.get_by_id(&application_id).await?;
            let loaded_at = application.version();
            (application, AppendOptions::expect_version(loaded_at))
        };

        self.transition(&mut application, &application_id, kind)?;

        let stored = self
            .repository
            .save_with_correlation(&mut application, options, Some(correlation_id))
            .await?;

        tracing::info!(
            events = stored.len(),
            version = %application.version(),
            phase = %application.phase(),
            "application command handled"
        );

        Ok(CommandOutcome {
            aggregate_id: application_id,
            version: application.version(),
            events_emitted: stored.len(),
        })
    }

    fn transition(
        &self,
        application: &mut DatacapAllocator,
        application_id: &AggregateId,
        kind: CommandKind,
    ) -> Result<(), ApplicationError> {
        match kind {
            CommandKind::CreateApplication { applicant } => {
                application.create(application_id.clone(), applicant)
            }
            CommandKind::UpdateAllocationInstructions { instructions } => {
                application.update_allocation_instructions(instructions)
            }
            CommandKind::UpdatePullRequest { link } => application.update_pull_request(link),
            CommandKind::ApproveKyc { result } => application.approve_kyc(result),
            CommandKind::RejectKyc { reason } => application.reject_kyc(reason),
            CommandKind::ApproveGovernanceReview => {
                application.approve_governance_review(self.config.rkh_approval_threshold)
            }
            CommandKind::RejectGovernanceReview { reason } => {
                application.reject_governance_review(reason)
            }
            CommandKind::UpdateRkhApprovals {
                message_id,
                approvals,
            } => application.update_rkh_approvals(message_id, approvals),
            CommandKind::CompleteRkhApproval => application.complete_rkh_approval(),
            CommandKind::CompleteMetaAllocatorApproval {
                block_number,
                tx_hash,
            } => application.complete_meta_allocator_approval(block_number, tx_hash),
        }
    }

    /// Loads an application by id.
    #[tracing::instrument(skip(self))]
    pub async fn get_application(
        &self,
        application_id: &AggregateId,
    ) -> Result<DatacapAllocator, DomainError> {
        self.repository.get_by_id(application_id).await
    }

    /// Returns the stored events of an application.
    #[tracing::instrument(skip(self))]
    pub async fn get_history(
        &self,
        application_id: &AggregateId,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        self.repository.history(application_id).await
    }
}

/// Command bus handler bound to one command tag.
pub struct ApplicationCommandHandler<S: EventStore> {
    name: &'static str,
    service: Arc<ApplicationService<S>>,
}

impl<S: EventStore> ApplicationCommandHandler<S> {
    pub fn new(name: &'static str, service: Arc<ApplicationService<S>>) -> Self {
        Self { name, service }
    }
}

#[async_trait]
impl<S: EventStore + 'static> CommandHandler<ApplicationCommand> for ApplicationCommandHandler<S> {
    fn command_name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, command: ApplicationCommand) -> Result<CommandOutcome, DomainError> {
        self.service.execute(command).await
    }
}

/// Query bus handler bound to one query tag.
pub struct ApplicationQueryHandler<S: EventStore> {
    name: &'static str,
    service: Arc<ApplicationService<S>>,
}

impl<S: EventStore> ApplicationQueryHandler<S> {
    pub fn new(name: &'static str, service: Arc<ApplicationService<S>>) -> Self {
        Self { name, service }
    }
}

#[async_trait]
impl<S: EventStore + 'static> QueryHandler<ApplicationQuery> for ApplicationQueryHandler<S> {
    fn query_name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, query: ApplicationQuery) -> Result<QueryResult, DomainError> {
        match query {
            ApplicationQuery::GetApplication { application_id } => self
                .service
                .get_application(&application_id)
                .await
                .map(|application| QueryResult::Application(Box::new(application))),
            ApplicationQuery::GetApplicationHistory { application_id } => self
                .service
                .get_history(&application_id)
                .await
                .map(QueryResult::History),
        }
    }
}

/// Binds a handler for every application command and query tag.
pub fn register_application_handlers<S: EventStore + 'static>(
    service: Arc<ApplicationService<S>>,
    commands: &mut CommandBus<ApplicationCommand>,
    queries: &mut QueryBus<ApplicationQuery>,
) -> Result<(), DomainError> {
    for &name in CommandKind::NAMES {
        commands.register_handler(Arc::new(ApplicationCommandHandler::new(
            name,
            Arc::clone(&service),
        )))?;
    }
    for &name in ApplicationQuery::NAMES {
        queries.register_handler(Arc::new(ApplicationQueryHandler::new(
            name,
            Arc::clone(&service),
        )))?;
    }
    Ok(())
}

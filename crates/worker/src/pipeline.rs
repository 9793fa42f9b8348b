//! Wires stores, buses, projections and reactors together.

use std::sync::Arc;

use domain::{
    ApplicationCommand, ApplicationConfig, ApplicationQuery, ApplicationService, CommandBus,
    CommandKind, QueryBus, register_application_handlers,
};
use event_bus::EventBus;
use event_store::{EventPublisher, EventStore, PublishingEventStore};
use projections::{ApplicationDetailsView, ProjectionProcessor, subscribe_projection};
use workflow::{
    InMemoryMultisigApprovalSource, InMemoryPullRequestService, PullRequestReactor,
    RkhApprovalSubscriber, subscribe_pull_request_reactor,
};

use crate::config::Config;
use crate::error::Result;

/// Channel every allocator event is published on.
pub const EVENT_CHANNEL: &str = "allocator";

/// Storage backend chosen at startup.
pub type SharedEventStore = Arc<dyn EventStore>;

/// Everything the worker runs, connected and ready.
pub struct Pipeline {
    pub commands: Arc<CommandBus<ApplicationCommand>>,
    pub queries: Arc<QueryBus<ApplicationQuery>>,
    pub applications: Arc<ApplicationDetailsView>,
    pub processor: ProjectionProcessor<SharedEventStore>,
    pub rkh_approvals: RkhApprovalSubscriber<InMemoryMultisigApprovalSource>,
}

/// Builds the pipeline on top of `store` and `bus`.
///
/// 1. Catches the read model up with the stored history.
/// 2. Subscribes the read model and the pull request reactor to the bus.
/// 3. Registers a handler for every command and query, then verifies none
///    is missing.
///
/// The bus must not deliver yet; start consuming once this returns.
#[tracing::instrument(skip_all)]
pub async fn build_pipeline<B>(store: SharedEventStore, bus: Arc<B>, config: &Config) -> Result<Pipeline>
where
    B: EventBus + EventPublisher + 'static,
{
    let applications = Arc::new(ApplicationDetailsView::new());
    let mut processor = ProjectionProcessor::new(Arc::clone(&store));
    processor.register(applications.clone());
    let replayed = processor.run_catch_up().await?;
    tracing::info!(events = replayed, "read model caught up");

    subscribe_projection(bus.as_ref(), applications.clone()).await;

    let publishing = PublishingEventStore::new(store, Arc::clone(&bus), EVENT_CHANNEL);
    let service = Arc::new(ApplicationService::new(
        publishing,
        ApplicationConfig {
            rkh_approval_threshold: config.rkh_approval_threshold,
        },
    ));

    let mut commands = CommandBus::new();
    let mut queries = QueryBus::new();
    register_application_handlers(service, &mut commands, &mut queries)?;
    commands.ensure_registered(CommandKind::NAMES)?;
    queries.ensure_registered(ApplicationQuery::NAMES)?;
    let commands = Arc::new(commands);

    let reactor = Arc::new(PullRequestReactor::new(
        InMemoryPullRequestService::default(),
        Arc::clone(&commands),
    ));
    subscribe_pull_request_reactor(bus.as_ref(), reactor).await;

    let rkh_approvals = RkhApprovalSubscriber::new(
        InMemoryMultisigApprovalSource::new(),
        applications.clone(),
        Arc::clone(&commands),
    );

    Ok(Pipeline {
        commands,
        queries: Arc::new(queries),
        applications,
        processor,
        rkh_approvals,
    })
}

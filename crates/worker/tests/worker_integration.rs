//! Integration tests for the worker wiring and ops endpoints.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::AggregateId;
use domain::{
    Applicant, ApplicationCommand, ApplicationConfig, ApplicationPhase, ApplicationQuery,
    ApplicationService, QueryResult,
};
use event_bus::{BrokerConfig, InMemoryEventBus, NatsEventBus};
use event_store::InMemoryEventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::ApplicationDetailsView;
use tower::ServiceExt;
use worker::{AppState, Config, build_pipeline};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn app() -> axum::Router {
    let state = Arc::new(AppState {
        broker: Arc::new(NatsEventBus::new(BrokerConfig::default())),
        applications: Arc::new(ApplicationDetailsView::new()),
    });
    worker::create_app(state, metrics_handle())
}

async fn get(app: axum::Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn health_is_degraded_until_the_broker_is_ready() {
    let response = get(app(), "/health").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["broker"], "disconnected");
    assert_eq!(json["applications"], 0);
}

#[tokio::test]
async fn health_reports_applications_and_events_processed() {
    let pipeline = build_pipeline(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryEventBus::new()),
        &Config::default(),
    )
    .await
    .unwrap();
    pipeline
        .commands
        .send(ApplicationCommand::create(
            "alloc-1",
            Applicant::new("Acme Storage", "f1acme", "acme"),
        ))
        .await
        .unwrap();

    let state = Arc::new(AppState {
        broker: Arc::new(NatsEventBus::new(BrokerConfig::default())),
        applications: pipeline.applications.clone(),
    });
    let response = get(worker::create_app(state, metrics_handle()), "/health").await;

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["applications"], 1);
    // ApplicationCreated, then the linked pull request
    assert_eq!(json["events_processed"], 2);
}

#[tokio::test]
async fn metrics_are_exposed_as_prometheus_text() {
    let response = get(app(), "/metrics").await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let response = get(app(), "/applications").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pipeline_replays_history_before_taking_commands() {
    let inner = InMemoryEventStore::new();
    ApplicationService::new(inner.clone(), ApplicationConfig::default())
        .execute(ApplicationCommand::create(
            "alloc-1",
            Applicant::new("Acme Storage", "f1acme", "acme"),
        ))
        .await
        .unwrap();

    let bus = Arc::new(InMemoryEventBus::new());
    let pipeline = build_pipeline(Arc::new(inner), bus.clone(), &Config::default())
        .await
        .unwrap();

    let replayed = pipeline
        .applications
        .get(&AggregateId::new("alloc-1"))
        .await
        .unwrap();
    assert_eq!(replayed.phase, ApplicationPhase::Kyc);
    assert!(replayed.pull_request.is_none());

    pipeline
        .commands
        .send(ApplicationCommand::create(
            "alloc-2",
            Applicant::new("Beta Data", "f1beta", "beta"),
        ))
        .await
        .unwrap();

    let live = pipeline
        .applications
        .get(&AggregateId::new("alloc-2"))
        .await
        .unwrap();
    assert_eq!(live.pull_request.map(|pr| pr.number), Some(1));
    assert_eq!(bus.events_for_channel(worker::EVENT_CHANNEL).await.len(), 2);

    let QueryResult::Application(application) = pipeline
        .queries
        .execute(ApplicationQuery::get_application("alloc-2"))
        .await
        .unwrap()
    else {
        panic!("expected an application");
    };
    assert!(application.pull_request().is_some());
}

#[tokio::test]
async fn pipeline_uses_configured_threshold() {
    let config = Config {
        rkh_approval_threshold: 1,
        ..Config::default()
    };
    let store = InMemoryEventStore::new();
    let pipeline = build_pipeline(Arc::new(store.clone()), Arc::new(InMemoryEventBus::new()), &config)
        .await
        .unwrap();

    let id = AggregateId::new("alloc-1");
    for command in [
        ApplicationCommand::create(id.clone(), Applicant::new("Acme Storage", "f1acme", "acme")),
        ApplicationCommand::approve_kyc(
            id.clone(),
            domain::KycResult {
                provider: "togggle".to_string(),
                reference: "kyc-1".to_string(),
                score: None,
            },
        ),
        ApplicationCommand::update_allocation_instructions(
            id.clone(),
            domain::AllocationInstructions {
                methods: vec!["RKH".to_string()],
                amounts: vec![1_024],
            },
        ),
        ApplicationCommand::approve_governance_review(id.clone()),
        ApplicationCommand::update_rkh_approvals(id.clone(), 1, vec!["f1alice".to_string()]),
    ] {
        pipeline.commands.send(command).await.unwrap();
    }

    let details = pipeline.applications.get(&id).await.unwrap();
    assert_eq!(details.rkh_threshold, Some(1));
    assert_eq!(details.phase, ApplicationPhase::Approved);
}

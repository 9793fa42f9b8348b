//! DataCap allocator worker.
//!
//! Opens the event store, connects the durable broker, replays the read
//! model, registers every command and query handler, starts the reactors and
//! serves `/health` and `/metrics` until SIGINT or SIGTERM.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use event_bus::NatsEventBus;
use event_store::{InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use projections::ApplicationDetailsView;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use config::{Config, LogFormat};
pub use error::{Result, WorkerError};
pub use pipeline::{EVENT_CHANNEL, Pipeline, SharedEventStore, build_pipeline};

/// State shared by the ops endpoints.
pub struct AppState {
    pub broker: Arc<NatsEventBus>,
    pub applications: Arc<ApplicationDetailsView>,
}

/// Creates the ops router.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}

/// Installs the global tracing subscriber.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise in-memory.
pub async fn open_event_store(config: &Config) -> Result<SharedEventStore> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .map_err(event_store::EventStoreError::from)?;
            let store = PostgresEventStore::new(pool);
            store
                .run_migrations()
                .await
                .map_err(event_store::EventStoreError::from)?;
            tracing::info!("using PostgreSQL event store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, events are kept in memory");
            Ok(Arc::new(InMemoryEventStore::new()))
        }
    }
}

/// Runs the worker until a shutdown signal arrives.
pub async fn run(config: Config) -> Result<()> {
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| WorkerError::Metrics(e.to_string()))?;

    let store = open_event_store(&config).await?;

    let broker = Arc::new(NatsEventBus::new(config.broker.clone()));
    broker.init().await?;

    let Pipeline {
        applications,
        rkh_approvals,
        ..
    } = build_pipeline(store, Arc::clone(&broker), &config).await?;
    broker.subscribe_events().await?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let poll_interval = config.rkh_poll_interval;
    let poller = tokio::spawn(async move {
        rkh_approvals
            .run(poll_interval, async move {
                let _ = shutdown_rx.changed().await;
            })
            .await;
    });

    let app = create_app(
        Arc::new(AppState {
            broker: Arc::clone(&broker),
            applications,
        }),
        metrics_handle,
    );

    let addr = config.addr();
    tracing::info!(%addr, "starting allocator worker");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let _ = shutdown_tx.send(true);
    if let Err(err) = poller.await {
        tracing::error!(error = %err, "rkh approval poller panicked");
    }
    broker.close().await?;
    served?;

    tracing::info!("worker shut down gracefully");
    Ok(())
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

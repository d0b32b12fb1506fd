//! # Server Configuration
//!
//! Wires the core together and serves the HTTP API, with the periodic sweep running
//! alongside it until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::handlers::{self, ponies};
use crate::notification::{Dispatcher, HttpMailTransport, HttpWebhookTransport};
use crate::repositories::SeaOrmPonyStore;
use crate::service::PonyService;
use crate::sweep::SweepJob;
use crate::tasks::TaskRunner;
use crate::telemetry;

/// How long shutdown waits for queued notifications to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<PonyService>,
}

/// Build the production service graph: SeaORM store, HTTP transports, worker pool
/// and wall clock. Must be called inside a tokio runtime.
pub fn build_service(config: &AppConfig, db: DatabaseConnection) -> anyhow::Result<Arc<PonyService>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let timeout = config.dispatch.webhook_timeout();

    let webhook = HttpWebhookTransport::new(timeout).context("Failed to build webhook client")?;
    let mail =
        HttpMailTransport::new(&config.mail, timeout).context("Failed to build mail client")?;
    if config.mail.api_url.is_none() {
        tracing::warn!("KEEPER_MAIL_API_URL is not set; e-mail notifications will fail");
    }

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(mail),
        Arc::new(webhook),
        Arc::clone(&clock),
    ));
    let runner = Arc::new(TaskRunner::new(config.dispatch.workers));
    let store = Arc::new(SeaOrmPonyStore::new(db));

    Ok(Arc::new(PonyService::new(store, dispatcher, runner, clock)))
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/api/v1/ponies", post(ponies::create_pony))
        .route(
            "/api/v1/ponies/{name}",
            get(ponies::get_pony)
                .patch(ponies::update_pony)
                .delete(ponies::delete_pony),
        )
        .route(
            "/api/v1/ponies/{name}/hello",
            get(ponies::heartbeat).post(ponies::heartbeat_post),
        )
        .route("/api/v1/ponies/{name}/history", get(ponies::list_history))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
}

/// Serve the API until Ctrl-C, running the sweep loop when enabled.
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .with_context(|| format!("Invalid server address '{}'", config.api_bind_addr))?;

    let config = Arc::new(config);
    let service = build_service(&config, db)?;
    let shutdown = CancellationToken::new();

    let sweep_task = config.sweep.enabled.then(|| {
        let job = SweepJob::new(
            Arc::clone(&service),
            config.sweep.grace_minutes,
            config.sweep.interval(),
        );
        tokio::spawn(job.run(shutdown.child_token()))
    });

    let state = AppState {
        config: Arc::clone(&config),
        service: Arc::clone(&service),
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            signal.cancel();
        })
        .await
        .context("HTTP server error")?;

    shutdown.cancel();
    if let Some(task) = sweep_task {
        if let Err(err) = task.await {
            tracing::error!(error = %err, "Sweep loop terminated abnormally");
        }
    }

    let runner = service.runner();
    if tokio::time::timeout(DRAIN_TIMEOUT, runner.wait_idle())
        .await
        .is_err()
    {
        tracing::warn!(
            pending = runner.in_flight(),
            "Gave up waiting for queued notifications"
        );
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::ponies::create_pony,
        crate::handlers::ponies::heartbeat,
        crate::handlers::ponies::heartbeat_post,
        crate::handlers::ponies::get_pony,
        crate::handlers::ponies::update_pony,
        crate::handlers::ponies::delete_pony,
        crate::handlers::ponies::list_history,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::service::NewPony,
            crate::handlers::ponies::PonyResponse,
            crate::handlers::ponies::HeartbeatResponse,
            crate::handlers::ponies::HistoryEntry,
            crate::handlers::ponies::HistoryResponse,
            crate::handlers::ponies::UpdatePonyRequest,
        )
    ),
    tags(
        (name = "root", description = "Service information"),
        (name = "ponies", description = "Pony registration, heartbeats and history")
    ),
    info(
        title = "Pony Keeper API",
        description = "Dead-man's-switch monitoring: ponies check in, silent ones go missing",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

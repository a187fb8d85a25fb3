use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use secrecy::ExposeSecret;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gatekeeper::adapters::counter::{
    DegradationSupervisor, LocalCounter, RedisCounter, SupervisorConfig,
};
use gatekeeper::adapters::http::{with_admission, AdmissionAppState};
use gatekeeper::application::AdmissionController;
use gatekeeper::config::{AppConfig, ServerConfig};
use gatekeeper::domain::foundation::Timestamp;
use gatekeeper::ports::CounterBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    init_tracing(&config.server);

    info!("Starting Gatekeeper admission control");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(config.admission.registry()?);
    info!(rules = registry.len(), "Rule registry loaded");

    let local = Arc::new(LocalCounter::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (backend, supervisor, background): (_, _, JoinHandle<()>) =
        match &config.redis.url {
            Some(url) => {
                let redis = Arc::new(RedisCounter::new(
                    url.expose_secret(),
                    config.redis.command_timeout(),
                )?);
                let supervisor = Arc::new(DegradationSupervisor::new(
                    redis,
                    local.clone(),
                    SupervisorConfig::default()
                        .with_probe_interval(config.admission.probe_interval()),
                ));

                let mode = supervisor.probe().await;
                info!(mode = %mode, "Distributed counter configured");

                let task = {
                    let supervisor = supervisor.clone();
                    tokio::spawn(async move { supervisor.run(shutdown_rx).await })
                };
                (
                    supervisor.clone() as Arc<dyn CounterBackend>,
                    Some(supervisor),
                    task,
                )
            }
            None => {
                warn!("No Redis URL configured, limits apply per instance only");
                let task = tokio::spawn(sweep_local(
                    local.clone(),
                    config.admission.probe_interval(),
                    shutdown_rx,
                ));
                (local.clone() as Arc<dyn CounterBackend>, None, task)
            }
        };

    let controller = Arc::new(
        AdmissionController::new(registry, backend, config.admission.key_prefix.clone())
            .with_exempt_paths(config.admission.exempt_paths.clone()),
    );

    let mut state = AdmissionAppState::new(controller);
    if let Some(supervisor) = supervisor {
        state = state.with_supervisor(supervisor);
    }
    if let Some(header) = config.admission.user_header()? {
        state = state.with_user_header(header);
    }
    if config.admission.trust_forwarded_headers {
        info!("Client addresses taken from forwarded headers");
        state = state.trusting_forwarded_headers();
    }

    let app = Router::new()
        .route("/health", get(health))
        .fallback(not_found);
    let app = with_admission(app, state)
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown_tx.send(true).ok();
    background.await.ok();

    info!("Gatekeeper stopped");
    Ok(())
}

/// JSON logs in production, human-readable output otherwise.
///
/// `RUST_LOG` takes precedence over the configured filter.
fn init_tracing(server: &ServerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    if server.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
}

/// Idle-key sweep for instances without a distributed backend.
async fn sweep_local(
    local: Arc<LocalCounter>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            _ = interval.tick() => {
                local.prune_idle(Timestamp::now());
            }
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "status": "error",
            "error_code": "NOT_FOUND",
            "message": "No route for this path"
        })),
    )
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

//! wahook-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev),
//!    optionally mirrored to a daily-rolling file.
//! 3. Open the SQLite database and run pending migrations.
//! 4. Build the Graph API client, shared state and outbox worker.
//! 5. Build the Axum router and start the HTTP server with graceful shutdown.
//! 6. Drain the outbox before exiting.

mod config;
mod dispatch;
mod entities;
mod error;
mod middleware;
mod models;
mod pipeline;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::config::Config;
use crate::dispatch::sender::GraphApiClient;
use crate::entities::SqliteStore;
use crate::state::AppState;

/// How long shutdown waits for queued auto-replies and read receipts.
const OUTBOX_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let _log_guard = init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), "wahook-server starting");
    if cfg.app_secret.is_none() {
        warn!("WAHOOK_APP_SECRET is not set; every webhook delivery will be rejected");
    }
    if cfg.verify_token.is_none() {
        warn!("WAHOOK_VERIFY_TOKEN is not set; webhook verification will always fail");
    }
    if cfg.admin_token.is_none() {
        warn!("WAHOOK_ADMIN_TOKEN is not set; the admin API is unauthenticated");
    }

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = SqliteStore::connect(&cfg.database_url).await?;
    info!(database_url = %cfg.database_url, "database ready");

    // ── 4. Shared application state ────────────────────────────────────────────
    let sender = Arc::new(GraphApiClient::new(
        &cfg.graph_api_base,
        &cfg.graph_api_version,
    ));
    let (state, outbox_worker) = AppState::new(cfg.clone(), store, sender);
    let outbox = tokio::spawn(outbox_worker.run());

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    drop(state);
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── 6. Outbox drain ────────────────────────────────────────────────────────
    // The worker stops once the last state handle (held by in-flight webhook
    // tasks) is dropped.
    match tokio::time::timeout(OUTBOX_DRAIN_TIMEOUT, outbox).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "outbox worker panicked"),
        Err(_) => warn!("outbox did not drain in time; pending side effects dropped"),
    }

    info!("wahook-server stopped");
    Ok(())
}

/// Install the global subscriber. The returned guard flushes the log file
/// and must live until exit.
fn init_tracing(cfg: &Config) -> Option<WorkerGuard> {
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: WAHOOK_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let (writer, guard) = match &cfg.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "wahook-server.log");
            let (file, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(std::io::stdout.and(file)), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    guard
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c   => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}

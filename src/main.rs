#![forbid(unsafe_code)]

//! `reminder-scheduler`: task reminder server binary.
//!
//! Bootstraps configuration, opens the task store, and runs the HTTP
//! surface, the notification worker and the reconciliation sweep until
//! SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use reminder_scheduler::api::{self, AppState};
use reminder_scheduler::cache::{MokaTaskCache, ReadThroughCache};
use reminder_scheduler::channels::DispatcherRegistry;
use reminder_scheduler::config::GlobalConfig;
use reminder_scheduler::persistence::db;
use reminder_scheduler::queue::{NotificationQueue, SqliteQueue};
use reminder_scheduler::{reconcile, worker};
use reminder_scheduler::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "reminder-scheduler", about = "Task reminder scheduling server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the HTTP port from the configuration file.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("reminder-scheduler bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    config.load_credentials().await?;
    info!("configuration loaded");

    // ── Initialize database and queue ───────────────────
    let db = Arc::new(db::connect(&config.database_path).await?);
    info!(path = %config.database_path.display(), "database connected");
    let queue: Arc<dyn NotificationQueue> = Arc::new(SqliteQueue::new(Arc::clone(&db)));

    let cache = if config.cache.enabled {
        let backend = Arc::new(MokaTaskCache::new(config.cache.max_entries));
        ReadThroughCache::new(backend, config.cache.ttl())
    } else {
        info!("task cache disabled");
        ReadThroughCache::disabled()
    };

    let dispatchers =
        DispatcherRegistry::from_config(&config.channels, config.worker.dispatch_timeout())?;
    let state = Arc::new(AppState::new(
        Arc::clone(&db),
        queue,
        cache,
        dispatchers,
        &config.worker,
    ));

    // ── Start background tasks ──────────────────────────
    let ct = CancellationToken::new();
    let worker_handle = worker::spawn_worker_task(
        state.worker.clone(),
        config.worker.poll_interval(),
        ct.clone(),
    );
    info!(
        interval_seconds = config.worker.poll_interval_seconds,
        "notification worker started"
    );

    let reconcile_handle = if config.reconciliation.interval_seconds == 0 {
        info!("reconciliation sweep disabled");
        None
    } else {
        let handle = reconcile::spawn_reconciliation_task(
            state.reconciler.clone(),
            Duration::from_secs(config.reconciliation.interval_seconds),
            ct.clone(),
        );
        info!(
            interval_seconds = config.reconciliation.interval_seconds,
            "reconciliation sweep started"
        );
        Some(handle)
    };

    let http_ct = ct.clone();
    let http_state = Arc::clone(&state);
    let port = config.http_port;
    let http_handle = tokio::spawn(async move {
        if let Err(err) = api::serve(http_state, port, http_ct.clone()).await {
            error!(%err, "http surface failed");
            http_ct.cancel();
        }
    });

    // ── Wait for shutdown signal ────────────────────────
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = ct.cancelled() => info!("shutting down after component failure"),
    }
    ct.cancel();

    // ── Wait for background tasks ───────────────────────
    let _ = tokio::join!(worker_handle, http_handle);
    if let Some(handle) = reconcile_handle {
        let _ = handle.await;
    }
    db.close().await;
    info!("reminder-scheduler shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

//! # Tradew Inventory Worker
//!
//! Process wiring for the outbox dispatch workers: configuration, command
//! line, logging and the run loop. The binary in `main.rs` is a thin shell
//! around [`run`].
//!
//! ```text
//! worker [created|updated|locked|all] [--once]
//! ```

use anyhow::Context;
use clap::{Parser, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tradew_inventory_core::environment::SystemClock;
use tradew_inventory_core::{DispatchKind, EventPublisher, ItemStore};
use tradew_inventory_postgres::PostgresItemStore;
use tradew_inventory_redpanda::RedpandaPublisher;
use tradew_inventory_runtime::metrics::MetricsServer;
use tradew_inventory_runtime::{DispatchWorker, RequestContext};

pub mod config;

pub use config::{Config, ConfigError};

/// Which dispatch flows to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// `PendingCreateDispatch` → `ItemsCreated.v1`
    Created,
    /// `PendingUpdateDispatch` → `ItemsUpdated.v1`
    Updated,
    /// `PendingLockDispatch` → `ItemsLockCompleted.v1`
    Locked,
    /// All three
    #[default]
    All,
}

impl KindArg {
    /// The dispatch kinds selected.
    #[must_use]
    pub fn kinds(self) -> Vec<DispatchKind> {
        match self {
            Self::Created => vec![DispatchKind::Created],
            Self::Updated => vec![DispatchKind::Updated],
            Self::Locked => vec![DispatchKind::Locked],
            Self::All => DispatchKind::ALL.to_vec(),
        }
    }
}

/// Outbox dispatch worker for the Tradew inventory.
#[derive(Debug, Parser)]
#[command(name = "worker", version, about)]
pub struct Cli {
    /// Dispatch flow to run
    #[arg(value_enum, default_value_t = KindArg::All)]
    pub kind: KindArg,

    /// Run each selected worker once and exit
    #[arg(long)]
    pub once: bool,
}

/// Install the global tracing subscriber.
///
/// JSON lines when `LOG_FORMAT=json`, human-readable otherwise.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.observability.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Build one worker per selected kind over shared store and publisher.
#[must_use]
pub fn build_workers(
    config: &Config,
    kinds: &[DispatchKind],
    store: &Arc<dyn ItemStore>,
    publisher: &Arc<dyn EventPublisher>,
) -> Vec<DispatchWorker> {
    kinds
        .iter()
        .map(|&kind| {
            DispatchWorker::new(
                kind,
                config.topic_for(kind),
                Arc::clone(store),
                Arc::clone(publisher),
                Arc::new(SystemClock),
            )
        })
        .collect()
}

/// Connect to storage and broker, then run the selected workers.
///
/// With `--once` every worker runs a single cycle and the first failure is
/// returned. Otherwise workers loop until Ctrl+C or SIGTERM.
///
/// # Errors
///
/// Startup failures (metrics, database, migrations, producer) and, with
/// `--once`, the first failed run.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    MetricsServer::new(config.metrics_addr()?)
        .start()
        .context("Failed to start metrics server")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .connect(&config.postgres.url)
        .await
        .context("Failed to connect to database")?;
    let postgres = PostgresItemStore::from_pool(pool);
    postgres.migrate().await.context("Failed to run migrations")?;
    let store: Arc<dyn ItemStore> = Arc::new(postgres);

    tracing::info!(brokers = %config.redpanda.brokers, "Connecting to Redpanda...");
    let publisher: Arc<dyn EventPublisher> = Arc::new(
        RedpandaPublisher::builder()
            .brokers(&config.redpanda.brokers)
            .producer_acks(&config.redpanda.acks)
            .compression(&config.redpanda.compression)
            .timeout(Duration::from_millis(config.redpanda.timeout_ms))
            .build()
            .context("Failed to create Redpanda producer")?,
    );

    let workers = build_workers(&config, &cli.kind.kinds(), &store, &publisher);

    if cli.once {
        for worker in &workers {
            let ctx = RequestContext::new().with_timeout(config.dispatch_deadline());
            let report = worker
                .run_once(&ctx)
                .await
                .with_context(|| format!("{} dispatch failed", worker.kind()))?;
            tracing::info!(
                kind = %report.kind,
                item_count = report.item_count,
                message_id = ?report.message_id,
                "Dispatch run finished"
            );
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::with_capacity(workers.len());
    for worker in workers {
        let shutdown = shutdown_rx.clone();
        let interval = config.dispatch_interval();
        let deadline = config.dispatch_deadline();
        handles.push(tokio::spawn(async move {
            worker.run_periodic(interval, deadline, shutdown).await;
        }));
    }

    shutdown_signal().await;
    // Receivers may already be gone if every worker exited.
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Dispatch worker task failed");
        }
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}

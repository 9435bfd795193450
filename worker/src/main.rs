//! Outbox dispatch worker.
//!
//! Announces pending inventory changes on Redpanda and marks them available.

use clap::Parser;
use tradew_inventory_worker::{Cli, Config, init_tracing, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real deployments use the environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(&config);

    tracing::info!(
        kind = ?cli.kind,
        once = cli.once,
        database = %config.postgres.target(),
        redpanda_brokers = %config.redpanda.brokers,
        "Starting inventory dispatch worker"
    );

    run(cli, config).await
}

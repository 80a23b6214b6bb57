//! Convenience entry point: `cargo run` from the workspace root starts the
//! same supervisor the `meshvaultd` binary does. The dedicated binary
//! lives in `meshvault-supervisor` so other crates can depend on the
//! library half without pulling in a `main`.

use clap::Parser;
use meshvault_supervisor::{Args, Supervisor, SupervisorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = SupervisorConfig::load(&args)?;

    let log_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("meshvault={log_level},meshvault_replica={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(data_dir = %config.data_dir.display(), "starting meshvault supervisor");
    let supervisor = Supervisor::new(config).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    supervisor.shutdown().await;

    Ok(())
}

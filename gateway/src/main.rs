mod args;

use std::sync::Arc;

use args::Args;
use clap::Parser;
use gateway_config::Config;
use gateway_pipeline::NoopAutoTopUpGateway;
use gateway_server::Server;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.server.listen_address = Some(listen);
    }

    gateway_telemetry::init("info");

    tracing::info!(config_path = %args.config.display(), "starting gateway");

    let database_url = gateway_config::database::database_url().ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
    let redis_url = gateway_config::database::redis_url().ok_or_else(|| anyhow::anyhow!("REDIS_URL is not set"))?;

    let pool = PgPoolOptions::new().connect(&database_url).await?;
    sqlx::migrate!("../crates/gateway-pipeline/migrations").run(&pool).await?;

    let billing = config.billing.clone();
    let stats = config.stats.clone();
    let retention = config.retention.clone();

    let (log_tx, log_rx) = tokio::sync::mpsc::unbounded_channel();

    let server = Server::new(config, log_tx, &redis_url).await?;

    let shutdown = CancellationToken::new();

    gateway_pipeline::spawn_background_workers(
        pool,
        &redis_url,
        log_rx,
        billing,
        stats,
        retention,
        Arc::new(NoopAutoTopUpGateway),
        shutdown.clone(),
    )
    .await?;

    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    server.serve(shutdown).await?;

    tracing::info!("gateway stopped");
    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}

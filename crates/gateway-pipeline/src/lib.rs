//! The background half of the gateway: C9 (Log Queue Consumer), C10 (Credit/Usage
//! Batcher, auto-top-up, retention cleanup), and C11 (Stats Aggregator), per §4.9–§4.11.
//!
//! The request-serving half (`gateway-server`) only ever talks to this crate through an
//! `mpsc::UnboundedSender<LogRecord>` — everything else here is self-contained
//! background workers spawned by [`spawn_background_workers`].

pub mod batcher;
pub mod lock;
pub mod log_queue;
pub mod queued_log;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use gateway_config::{BillingConfig, RetentionConfig, StatsConfig};
use gateway_llm::LogRecord;
use sqlx::PgPool;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

pub use batcher::{AutoTopUpError, AutoTopUpGateway};
pub use lock::Lock;
pub use queued_log::QueuedLog;
pub use stats::StatsRunnerConfig;

/// A no-op top-up gateway for deployments that haven't wired a real payment provider —
/// every charge attempt fails, so `credits` is never force-advanced without a real charge.
pub struct NoopAutoTopUpGateway;

#[async_trait::async_trait]
impl AutoTopUpGateway for NoopAutoTopUpGateway {
    async fn charge(&self, _organization_id: uuid::Uuid, _amount: rust_decimal::Decimal) -> Result<(), AutoTopUpError> {
        Err(AutoTopUpError("no auto top-up gateway configured".to_owned()))
    }
}

/// Spawns every background worker (log queue producer/consumer, credit batcher,
/// auto-top-up, retention cleanup, stats aggregator) and returns immediately; each
/// worker runs until `shutdown` is cancelled.
pub async fn spawn_background_workers(
    pool: PgPool,
    redis_url: &str,
    log_rx: UnboundedReceiver<LogRecord>,
    billing: BillingConfig,
    stats: StatsConfig,
    retention: RetentionConfig,
    auto_top_up: Arc<dyn AutoTopUpGateway>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let redis_client = redis::Client::open(redis_url)?;
    let producer_conn = redis_client.get_connection_manager().await?;
    let consumer_conn = redis_client.get_connection_manager().await?;

    tokio::spawn(log_queue::run_producer(log_rx, producer_conn, shutdown.clone()));
    tokio::spawn(log_queue::run_consumer(pool.clone(), consumer_conn, shutdown.clone()));

    tokio::spawn(batcher::run_credit_batcher(
        pool.clone(),
        billing.credit_batch_size,
        billing.byok_fee_percentage,
        Duration::from_secs(billing.credit_batch_interval_secs),
        shutdown.clone(),
    ));

    tokio::spawn(batcher::run_auto_top_up(pool.clone(), auto_top_up, shutdown.clone()));

    tokio::spawn(batcher::run_retention_cleanup(pool.clone(), retention.enable_data_retention_cleanup, shutdown.clone()));

    tokio::spawn(stats::run(
        pool,
        StatsRunnerConfig {
            refresh_interval_secs: stats.project_stats_refresh_interval_seconds,
            batch_size: stats.stats_batch_size,
            backfill_enabled: stats.backfill_enabled,
            backfill_days: stats.backfill_days,
            stale_enabled: stats.stale_enabled,
            stale_days: stats.stale_days,
        },
        shutdown,
    ));

    Ok(())
}

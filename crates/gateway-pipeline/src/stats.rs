//! C11 — Stats Aggregator (§4.11): rolls the `log` table up into per-project and
//! per-api-key hourly buckets via backfill, stale-bucket refresh, and a current-hour
//! refresh, all sharing the same four `ON CONFLICT DO UPDATE` upserts.
//!
//! Grounded on the same `crates/synapse-llm/src/discovery.rs` periodic-loop idiom as C9/C10.

use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Runs backfill + stale + current-hour refresh on `PROJECT_STATS_REFRESH_INTERVAL_SECONDS`.
pub async fn run(pool: PgPool, config: StatsRunnerConfig, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.refresh_interval_secs));
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = run_cycle(&pool, &config).await {
                    tracing::error!(error = %err, "stats aggregation cycle failed");
                }
            }
        }
    }
    tracing::debug!("stats aggregator shutting down");
}

pub struct StatsRunnerConfig {
    pub refresh_interval_secs: u64,
    pub batch_size: u32,
    pub backfill_enabled: bool,
    pub backfill_days: u32,
    pub stale_enabled: bool,
    pub stale_days: u32,
}

async fn run_cycle(pool: &PgPool, config: &StatsRunnerConfig) -> anyhow::Result<()> {
    if config.backfill_enabled {
        backfill(pool, config.batch_size, config.backfill_days).await?;
    }
    if config.stale_enabled {
        refresh_stale(pool, config.batch_size, config.stale_days).await?;
    }
    refresh_current_hour(pool).await?;
    Ok(())
}

/// Buckets missing from `project_hourly_stats` entirely, within the backfill window.
async fn backfill(pool: &PgPool, batch_size: u32, backfill_days: u32) -> anyhow::Result<()> {
    let buckets: Vec<(Uuid, chrono::NaiveDateTime)> = sqlx::query_as(
        "SELECT DISTINCT l.project_id, date_trunc('hour', l.created_at)::timestamp AS hour_timestamp
         FROM log l
         WHERE l.created_at >= now() - ($1 || ' days')::interval
           AND l.created_at < date_trunc('hour', now())
           AND NOT EXISTS (
               SELECT 1 FROM project_hourly_stats s
               WHERE s.project_id = l.project_id AND s.hour_timestamp = date_trunc('hour', l.created_at)::timestamp
           )
         LIMIT $2",
    )
    .bind(backfill_days.to_string())
    .bind(i64::from(batch_size))
    .fetch_all(pool)
    .await?;

    for (project_id, hour_timestamp) in buckets {
        upsert_bucket(pool, project_id, hour_timestamp).await?;
    }

    Ok(())
}

/// Buckets whose underlying logs changed after the bucket's last `updated_at`.
async fn refresh_stale(pool: &PgPool, batch_size: u32, stale_days: u32) -> anyhow::Result<()> {
    let buckets: Vec<(Uuid, chrono::NaiveDateTime)> = sqlx::query_as(
        "SELECT s.project_id, s.hour_timestamp
         FROM project_hourly_stats s
         WHERE s.hour_timestamp >= now() - ($1 || ' days')::interval
           AND EXISTS (
               SELECT 1 FROM log l
               WHERE l.project_id = s.project_id
                 AND date_trunc('hour', l.created_at)::timestamp = s.hour_timestamp
                 AND l.created_at > s.updated_at
           )
         LIMIT $2",
    )
    .bind(stale_days.to_string())
    .bind(i64::from(batch_size))
    .fetch_all(pool)
    .await?;

    for (project_id, hour_timestamp) in buckets {
        upsert_bucket(pool, project_id, hour_timestamp).await?;
    }

    Ok(())
}

/// Every project with logs in the current hour, unconditionally refreshed each cycle.
async fn refresh_current_hour(pool: &PgPool) -> anyhow::Result<()> {
    let projects: Vec<(Uuid,)> =
        sqlx::query_as("SELECT DISTINCT project_id FROM log WHERE created_at >= date_trunc('hour', now())").fetch_all(pool).await?;

    let current_hour: (chrono::NaiveDateTime,) = sqlx::query_as("SELECT date_trunc('hour', now())::timestamp").fetch_one(pool).await?;

    for (project_id,) in projects {
        upsert_bucket(pool, project_id, current_hour.0).await?;
    }

    Ok(())
}

/// Runs all four upserts for one `(project_id, hour_timestamp)` bucket. Idempotent —
/// `ON CONFLICT DO UPDATE` on each table's natural key means re-running is always safe.
async fn upsert_bucket(pool: &PgPool, project_id: Uuid, hour_timestamp: chrono::NaiveDateTime) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO project_hourly_stats
            (project_id, hour_timestamp, request_count, error_count, total_cost,
             total_prompt_tokens, total_completion_tokens, total_tokens, updated_at)
         SELECT $1, $2, count(*), count(*) FILTER (WHERE has_error), coalesce(sum(cost), 0),
                coalesce(sum(prompt_tokens), 0), coalesce(sum(completion_tokens), 0), coalesce(sum(total_tokens), 0), now()
         FROM log WHERE project_id = $1 AND date_trunc('hour', created_at)::timestamp = $2
         ON CONFLICT (project_id, hour_timestamp) DO UPDATE SET
            request_count = excluded.request_count,
            error_count = excluded.error_count,
            total_cost = excluded.total_cost,
            total_prompt_tokens = excluded.total_prompt_tokens,
            total_completion_tokens = excluded.total_completion_tokens,
            total_tokens = excluded.total_tokens,
            updated_at = now()",
    )
    .bind(project_id)
    .bind(hour_timestamp)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO project_hourly_model_stats
            (project_id, hour_timestamp, used_model, used_provider, request_count, error_count, total_cost,
             total_prompt_tokens, total_completion_tokens, total_tokens, updated_at)
         SELECT $1, $2, used_model, used_provider, count(*), count(*) FILTER (WHERE has_error), coalesce(sum(cost), 0),
                coalesce(sum(prompt_tokens), 0), coalesce(sum(completion_tokens), 0), coalesce(sum(total_tokens), 0), now()
         FROM log WHERE project_id = $1 AND date_trunc('hour', created_at)::timestamp = $2
         GROUP BY used_model, used_provider
         ON CONFLICT (project_id, hour_timestamp, used_model, used_provider) DO UPDATE SET
            request_count = excluded.request_count,
            error_count = excluded.error_count,
            total_cost = excluded.total_cost,
            total_prompt_tokens = excluded.total_prompt_tokens,
            total_completion_tokens = excluded.total_completion_tokens,
            total_tokens = excluded.total_tokens,
            updated_at = now()",
    )
    .bind(project_id)
    .bind(hour_timestamp)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO api_key_hourly_stats
            (api_key_id, hour_timestamp, request_count, error_count, total_cost,
             total_prompt_tokens, total_completion_tokens, total_tokens, updated_at)
         SELECT api_key_id, $2, count(*), count(*) FILTER (WHERE has_error), coalesce(sum(cost), 0),
                coalesce(sum(prompt_tokens), 0), coalesce(sum(completion_tokens), 0), coalesce(sum(total_tokens), 0), now()
         FROM log WHERE project_id = $1 AND date_trunc('hour', created_at)::timestamp = $2
         GROUP BY api_key_id
         ON CONFLICT (api_key_id, hour_timestamp) DO UPDATE SET
            request_count = excluded.request_count,
            error_count = excluded.error_count,
            total_cost = excluded.total_cost,
            total_prompt_tokens = excluded.total_prompt_tokens,
            total_completion_tokens = excluded.total_completion_tokens,
            total_tokens = excluded.total_tokens,
            updated_at = now()",
    )
    .bind(project_id)
    .bind(hour_timestamp)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO api_key_hourly_model_stats
            (api_key_id, hour_timestamp, used_model, used_provider, request_count, error_count, total_cost,
             total_prompt_tokens, total_completion_tokens, total_tokens, updated_at)
         SELECT api_key_id, $2, used_model, used_provider, count(*), count(*) FILTER (WHERE has_error), coalesce(sum(cost), 0),
                coalesce(sum(prompt_tokens), 0), coalesce(sum(completion_tokens), 0), coalesce(sum(total_tokens), 0), now()
         FROM log WHERE project_id = $1 AND date_trunc('hour', created_at)::timestamp = $2
         GROUP BY api_key_id, used_model, used_provider
         ON CONFLICT (api_key_id, hour_timestamp, used_model, used_provider) DO UPDATE SET
            request_count = excluded.request_count,
            error_count = excluded.error_count,
            total_cost = excluded.total_cost,
            total_prompt_tokens = excluded.total_prompt_tokens,
            total_completion_tokens = excluded.total_completion_tokens,
            total_tokens = excluded.total_tokens,
            updated_at = now()",
    )
    .bind(project_id)
    .bind(hour_timestamp)
    .execute(pool)
    .await?;

    Ok(())
}

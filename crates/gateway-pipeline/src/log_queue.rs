//! C9 — Log Queue Consumer (§4.9): the dispatcher hands every completed request's
//! [`gateway_llm::LogRecord`] to an in-process channel; this module pushes each onto
//! Redis `LOG_QUEUE` as JSON, then drains that queue with `BLPOP` and bulk-inserts into
//! the `log` table, retrying a failed batch with backoff before requeuing it.
//!
//! Grounded on `crates/synapse-llm/src/discovery.rs` for the `tokio::spawn` +
//! `tokio::time::interval` periodic-task shape, and `crates/synapse-billing/src/recorder.rs`
//! for the fire-and-forget, never-block-the-response channel drain.

use std::time::Duration;

use gateway_llm::LogRecord;
use redis::AsyncCommands;
use sqlx::PgPool;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::queued_log::QueuedLog;

const LOG_QUEUE_KEY: &str = "LOG_QUEUE";
const BLPOP_TIMEOUT_SECS: f64 = 1.0;
const MAX_RETRIES: u32 = 5;
const RETRY_BACKOFFS: [Duration; 5] =
    [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8), Duration::from_secs(16)];

/// Drains the dispatcher's log channel and RPUSHes each record onto `LOG_QUEUE`.
///
/// Runs until `rx` is closed (the gateway's `log_tx` is dropped on shutdown) or
/// `shutdown` fires. A push failure is logged and the record dropped — §4.9 treats the
/// queue as best-effort, not a durable audit log.
pub async fn run_producer(mut rx: UnboundedReceiver<LogRecord>, mut redis: redis::aio::ConnectionManager, shutdown: CancellationToken) {
    loop {
        let record = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            record = rx.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };

        let queued = QueuedLog::from(record);
        match serde_json::to_string(&queued) {
            Ok(payload) => {
                if let Err(err) = redis.rpush::<_, _, ()>(LOG_QUEUE_KEY, payload).await {
                    tracing::warn!(error = %err, "failed to enqueue log record, dropping");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize log record, dropping");
            }
        }
    }

    tracing::debug!("log queue producer shutting down");
}

/// Blocking-pop consumer: pulls one record at a time off `LOG_QUEUE` and inserts it,
/// retrying transient failures with exponential backoff before requeuing.
pub async fn run_consumer(pool: PgPool, mut redis: redis::aio::ConnectionManager, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let popped: Option<(String, String)> =
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                result = redis.blpop(LOG_QUEUE_KEY, BLPOP_TIMEOUT_SECS) => match result {
                    Ok(popped) => popped,
                    Err(err) => {
                        tracing::warn!(error = %err, "log queue blpop failed");
                        tokio::time::sleep(RETRY_BACKOFFS[0]).await;
                        continue;
                    }
                },
            };

        let Some((_, payload)) = popped else { continue };

        let record: QueuedLog = match serde_json::from_str(&payload) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(error = %err, "dropping unparseable log queue entry");
                continue;
            }
        };

        insert_with_retry(&pool, &mut redis, record).await;
    }

    tracing::debug!("log queue consumer shutting down");
}

/// Inserts one record, retrying up to [`MAX_RETRIES`] times with the backoff schedule
/// from §4.9 before giving up and pushing the record back onto the tail of the queue
/// for a later consumer pass.
async fn insert_with_retry(pool: &PgPool, redis: &mut redis::aio::ConnectionManager, record: QueuedLog) {
    for (attempt, backoff) in RETRY_BACKOFFS.iter().enumerate() {
        match insert_one(pool, &record).await {
            Ok(()) => return,
            Err(err) => {
                tracing::warn!(error = %err, attempt = attempt + 1, "log insert failed, retrying");
                if attempt + 1 < MAX_RETRIES as usize {
                    tokio::time::sleep(*backoff).await;
                }
            }
        }
    }

    tracing::error!(request_id = %record.id, "log insert exhausted retries, requeuing");
    if let Ok(payload) = serde_json::to_string(&record)
        && let Err(err) = redis.rpush::<_, _, ()>(LOG_QUEUE_KEY, payload).await
    {
        tracing::error!(error = %err, "failed to requeue log record after exhausted retries, dropping");
    }
}

/// Organizations with this `retention_level` get their verbose log columns stripped
/// before insert (§4.9): `content`/`reasoningContent`/`tools`/`toolResults`. `messages`
/// and `toolChoice` name request-side fields this gateway never persists to the `log`
/// table in the first place, so there is nothing further to strip for those two.
const RETENTION_LEVEL_NONE: &str = "none";

async fn retention_level(pool: &PgPool, organization_id: uuid::Uuid) -> sqlx::Result<String> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT retention_level FROM organization WHERE id = $1").bind(organization_id).fetch_optional(pool).await?;
    Ok(row.map_or_else(|| "full".to_owned(), |(level,)| level))
}

/// Nulls out `content`/`reasoningContent`/`tools`/`toolResults` when `retention_level`
/// is `none` (§4.9); passes them through unchanged otherwise.
#[allow(clippy::type_complexity)]
fn strip_for_retention(
    retention_level: &str,
    content: Option<String>,
    reasoning_content: Option<String>,
    tools: Option<serde_json::Value>,
    tool_results: Option<serde_json::Value>,
) -> (Option<String>, Option<String>, Option<serde_json::Value>, Option<serde_json::Value>) {
    if retention_level == RETENTION_LEVEL_NONE {
        (None, None, None, None)
    } else {
        (content, reasoning_content, tools, tool_results)
    }
}

async fn insert_one(pool: &PgPool, record: &QueuedLog) -> sqlx::Result<()> {
    let level = retention_level(pool, record.organization_id).await?;
    let (content, reasoning_content, tools, tool_results) = strip_for_retention(
        &level,
        record.content.clone(),
        record.reasoning_content.clone(),
        record.tools.clone(),
        record.tool_results.clone(),
    );

    sqlx::query(
        "INSERT INTO log (
            id, request_id, organization_id, project_id, api_key_id, duration_ms,
            time_to_first_token_ms, response_size,
            requested_model, used_model, used_provider, unified_finish_reason, canceled,
            content, reasoning_content, tools, tool_results, streamed, cached,
            prompt_tokens, completion_tokens, reasoning_tokens, cached_tokens, total_tokens,
            cost, input_cost, output_cost, cached_input_cost, request_cost,
            image_input_cost, image_output_cost, web_search_cost, estimated_cost,
            discount, pricing_tier, routing_metadata, source, mode, used_mode,
            error_details, created_at
         ) VALUES (
            $1, $2, $3, $4, $5, $6,
            $7, $8,
            $9, $10, $11, $12, $13,
            $14, $15, $16, $17, $18, $19,
            $20, $21, $22, $23, $24,
            $25, $26, $27, $28, $29,
            $30, $31, $32, $33,
            $34, $35, $36, $37, $38, $39,
            $40, to_timestamp($41)
         )",
    )
    .bind(record.id)
    .bind(record.id.to_string())
    .bind(record.organization_id)
    .bind(record.project_id)
    .bind(record.api_key_id)
    .bind(record.duration_ms)
    .bind(record.time_to_first_token_ms)
    .bind(record.response_size)
    .bind(&record.requested_model)
    .bind(&record.used_model)
    .bind(&record.used_provider)
    .bind(&record.unified_finish_reason)
    .bind(record.canceled)
    .bind(content)
    .bind(reasoning_content)
    .bind(tools)
    .bind(tool_results)
    .bind(record.streamed)
    .bind(record.cached)
    .bind(record.prompt_tokens)
    .bind(record.completion_tokens)
    .bind(record.reasoning_tokens)
    .bind(record.cached_tokens)
    .bind(record.total_tokens)
    .bind(record.cost)
    .bind(record.input_cost)
    .bind(record.output_cost)
    .bind(record.cached_input_cost)
    .bind(record.request_cost)
    .bind(record.image_input_cost)
    .bind(record.image_output_cost)
    .bind(record.web_search_cost)
    .bind(record.estimated_cost)
    .bind(record.discount)
    .bind(&record.pricing_tier)
    .bind(&record.routing_metadata)
    .bind(&record.source)
    .bind(&record.mode)
    .bind(&record.used_mode)
    .bind(record.error_details.as_ref().map(|details| serde_json::json!({ "message": details })))
    .bind(record.created_at_unix as f64)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Option<String>, Option<String>, Option<serde_json::Value>, Option<serde_json::Value>) {
        (
            Some("hello".to_owned()),
            Some("because".to_owned()),
            Some(serde_json::json!([{"name": "lookup"}])),
            Some(serde_json::json!([{"id": "call_1"}])),
        )
    }

    #[test]
    fn retention_none_strips_verbose_columns() {
        let (content, reasoning, tools, results) = sample();
        let stripped = strip_for_retention("none", content, reasoning, tools, results);
        assert_eq!(stripped, (None, None, None, None));
    }

    #[test]
    fn retention_full_passes_through_unchanged() {
        let (content, reasoning, tools, results) = sample();
        let passed = strip_for_retention("full", content.clone(), reasoning.clone(), tools.clone(), results.clone());
        assert_eq!(passed, (content, reasoning, tools, results));
    }
}

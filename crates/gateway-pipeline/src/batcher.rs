//! C10 — Credit/Usage Batcher (§4.10): periodic credit deduction, auto-top-up, and
//! data-retention cleanup, each serialized across gateway instances by a named row in
//! the `lock` table (§5).
//!
//! Grounded on `crates/synapse-llm/src/discovery.rs`'s periodic-loop idiom for all three
//! background loops, and `other_examples/manifests/poly-workshop-llm-gateway-rs`'s
//! `sqlx` postgres+migrate feature set for the transactional `FOR UPDATE SKIP LOCKED`
//! batch read.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::lock::Lock;

const CREDIT_LOCK_KEY: &str = "credit_processing";
const AUTO_TOP_UP_LOCK_KEY: &str = "auto_top_up";
const RETENTION_LOCK_KEY: &str = "data_retention_cleanup";
const RETENTION_MAX_AGE_DAYS: i64 = 30;
const AUTO_TOP_UP_INTERVAL: Duration = Duration::from_secs(60);
const RETENTION_INTERVAL: Duration = Duration::from_secs(3600);

/// Charging the organization's payment method when `credits` drops below its
/// auto-top-up threshold — an external collaborator (Stripe or similar) out of this
/// crate's scope per §1; the threshold-check loop that calls it is in scope.
#[async_trait]
pub trait AutoTopUpGateway: Send + Sync {
    async fn charge(&self, organization_id: Uuid, amount: Decimal) -> Result<(), AutoTopUpError>;
}

#[derive(Debug, thiserror::Error)]
#[error("auto top-up charge failed: {0}")]
pub struct AutoTopUpError(pub String);

struct SelectedLog {
    id: Uuid,
    organization_id: Uuid,
    api_key_id: Uuid,
    cost: Decimal,
    used_mode: String,
    cached: bool,
    data_storage_cost: Decimal,
}

struct OrgDeduction {
    deduction: Decimal,
}

/// Runs the credit batcher loop on `CREDIT_BATCH_INTERVAL` until `shutdown` fires.
pub async fn run_credit_batcher(pool: PgPool, batch_size: u32, byok_fee_percentage: f64, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = run_credit_batch_once(&pool, batch_size, byok_fee_percentage).await {
                    tracing::error!(error = %err, "credit batch run failed");
                }
            }
        }
    }
    tracing::debug!("credit batcher shutting down");
}

async fn run_credit_batch_once(pool: &PgPool, batch_size: u32, byok_fee_percentage: f64) -> anyhow::Result<()> {
    let Some(lock) = Lock::acquire(pool, CREDIT_LOCK_KEY).await? else {
        return Ok(());
    };

    let result = process_credit_batch(pool, batch_size, byok_fee_percentage).await;
    lock.release().await?;
    result
}

async fn process_credit_batch(pool: &PgPool, batch_size: u32, byok_fee_percentage: f64) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let rows: Vec<(Uuid, Uuid, Uuid, Option<Decimal>, String, bool, Option<Decimal>)> = sqlx::query_as(
        "SELECT id, organization_id, api_key_id, cost::numeric, used_mode, cached, data_storage_cost
         FROM log
         WHERE processed_at IS NULL
         ORDER BY created_at
         LIMIT $1
         FOR UPDATE SKIP LOCKED",
    )
    .bind(i64::from(batch_size))
    .fetch_all(&mut *tx)
    .await?;

    if rows.is_empty() {
        tx.commit().await?;
        return Ok(());
    }

    let logs: Vec<SelectedLog> = rows
        .into_iter()
        .map(|(id, organization_id, api_key_id, cost, used_mode, cached, data_storage_cost)| SelectedLog {
            id,
            organization_id,
            api_key_id,
            cost: cost.unwrap_or_default(),
            used_mode,
            cached,
            data_storage_cost: data_storage_cost.unwrap_or_default(),
        })
        .collect();

    let byok_fee_percentage = Decimal::try_from(byok_fee_percentage).unwrap_or_default();

    // api_key_hourly_stats already sums every log's `cost` regardless of `used_mode`
    // (C11, §4.11), which is exactly the "api-key's running usage" of step 3 — nothing
    // further to accumulate here.
    let mut org_deductions: std::collections::HashMap<Uuid, OrgDeduction> = std::collections::HashMap::new();
    let mut service_fee_by_log: std::collections::HashMap<Uuid, Decimal> = std::collections::HashMap::new();

    for log in &logs {
        if log.cached || log.cost <= Decimal::ZERO {
            continue;
        }

        let entry = org_deductions.entry(log.organization_id).or_insert_with(|| OrgDeduction { deduction: Decimal::ZERO });

        if log.used_mode == "api-keys" {
            let fee = byok_fee(log.cost, byok_fee_percentage, log.data_storage_cost);
            entry.deduction += fee;
            service_fee_by_log.insert(log.id, fee);
        } else {
            entry.deduction += log.cost;
        }
    }

    for (organization_id, deduction) in &org_deductions {
        if deduction.deduction <= Decimal::ZERO {
            continue;
        }

        let org: Option<(Decimal, Decimal, Option<Uuid>)> =
            sqlx::query_as("SELECT dev_plan_credits_limit, dev_plan_credits_used, referred_by FROM organization WHERE id = $1 FOR UPDATE")
                .bind(organization_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((dev_plan_limit, dev_plan_used, referred_by)) = org else {
            continue;
        };

        let (from_dev_plan, from_credits) = split_dev_plan_and_credits(deduction.deduction, dev_plan_limit, dev_plan_used);

        sqlx::query("UPDATE organization SET dev_plan_credits_used = dev_plan_credits_used + $1, credits = credits - $2 WHERE id = $3")
            .bind(from_dev_plan)
            .bind(from_credits)
            .bind(organization_id)
            .execute(&mut *tx)
            .await?;

        if let Some(referrer_id) = referred_by {
            let credit = referral_credit(deduction.deduction);
            sqlx::query("UPDATE organization SET credits = credits + $1, referral_earnings = referral_earnings + $1 WHERE id = $2")
                .bind(credit)
                .bind(referrer_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    for log in &logs {
        let service_fee = service_fee_by_log.get(&log.id);
        sqlx::query("UPDATE log SET processed_at = now(), service_fee = $1 WHERE id = $2")
            .bind(service_fee)
            .bind(log.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::debug!(count = logs.len(), "credit batch processed");
    Ok(())
}

/// BYOK deduction for one log: the configured fee percentage of its cost, plus the
/// flat per-log storage cost (§4.10 step 3).
fn byok_fee(cost: Decimal, byok_fee_percentage: Decimal, data_storage_cost: Decimal) -> Decimal {
    cost * byok_fee_percentage + data_storage_cost
}

/// Splits a deduction across dev-plan credits first, then regular credits (§4.10 step 4).
fn split_dev_plan_and_credits(deduction: Decimal, dev_plan_limit: Decimal, dev_plan_used: Decimal) -> (Decimal, Decimal) {
    let dev_plan_remaining = (dev_plan_limit - dev_plan_used).max(Decimal::ZERO);
    let from_dev_plan = deduction.min(dev_plan_remaining);
    let from_credits = deduction - from_dev_plan;
    (from_dev_plan, from_credits)
}

/// 1% of the total deduction credited back to the referring organization (§4.10 step 5).
fn referral_credit(deduction: Decimal) -> Decimal {
    deduction * Decimal::new(1, 2)
}

/// Threshold-check loop: when `credits < auto_top_up_threshold`, calls the configured
/// [`AutoTopUpGateway`]. Runs under its own 5-minute-expiry lock.
pub async fn run_auto_top_up(pool: PgPool, gateway: std::sync::Arc<dyn AutoTopUpGateway>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(AUTO_TOP_UP_INTERVAL);
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = run_auto_top_up_once(&pool, gateway.as_ref()).await {
                    tracing::error!(error = %err, "auto top-up run failed");
                }
            }
        }
    }
    tracing::debug!("auto top-up loop shutting down");
}

async fn run_auto_top_up_once(pool: &PgPool, gateway: &dyn AutoTopUpGateway) -> anyhow::Result<()> {
    let Some(lock) = Lock::acquire(pool, AUTO_TOP_UP_LOCK_KEY).await? else {
        return Ok(());
    };

    let due: Vec<(Uuid, Decimal, Decimal)> = sqlx::query_as(
        "SELECT id, credits, auto_top_up_threshold FROM organization
         WHERE auto_top_up_enabled AND auto_top_up_threshold IS NOT NULL AND credits < auto_top_up_threshold",
    )
    .fetch_all(pool)
    .await?;

    for (organization_id, credits, threshold) in due {
        let top_up_amount = (threshold - credits).max(Decimal::ZERO);
        if top_up_amount <= Decimal::ZERO {
            continue;
        }

        match gateway.charge(organization_id, top_up_amount).await {
            Ok(()) => {
                sqlx::query("UPDATE organization SET credits = credits + $1 WHERE id = $2")
                    .bind(top_up_amount)
                    .bind(organization_id)
                    .execute(pool)
                    .await?;
            }
            Err(err) => {
                tracing::warn!(error = %err, %organization_id, "auto top-up charge failed, will retry next cycle");
            }
        }
    }

    lock.release().await?;
    Ok(())
}

/// Nulls verbose columns on logs older than [`RETENTION_MAX_AGE_DAYS`] and marks them
/// cleaned up, so the gateway doesn't retain request/response bodies indefinitely.
pub async fn run_retention_cleanup(pool: PgPool, enabled: bool, shutdown: CancellationToken) {
    if !enabled {
        tracing::debug!("data retention cleanup disabled, not starting loop");
        return;
    }

    let mut ticker = tokio::time::interval(RETENTION_INTERVAL);
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = run_retention_cleanup_once(&pool).await {
                    tracing::error!(error = %err, "retention cleanup run failed");
                }
            }
        }
    }
    tracing::debug!("retention cleanup loop shutting down");
}

async fn run_retention_cleanup_once(pool: &PgPool) -> anyhow::Result<()> {
    let Some(lock) = Lock::acquire(pool, RETENTION_LOCK_KEY).await? else {
        return Ok(());
    };

    let result = sqlx::query(
        "UPDATE log SET content = NULL, reasoning_content = NULL, tools = NULL, tool_results = NULL,
            data_retention_cleaned_up = true
         WHERE data_retention_cleaned_up = false
           AND created_at < now() - ($1 || ' days')::interval",
    )
    .bind(RETENTION_MAX_AGE_DAYS.to_string())
    .execute(pool)
    .await;

    lock.release().await?;
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn byok_fee_is_percentage_plus_storage_cost() {
        let fee = byok_fee(dec("10"), dec("0.05"), dec("0.01"));
        assert_eq!(fee, dec("0.51"));
    }

    #[test]
    fn deduction_drains_dev_plan_before_credits() {
        let (from_dev_plan, from_credits) = split_dev_plan_and_credits(dec("30"), dec("50"), dec("40"));
        assert_eq!(from_dev_plan, dec("10"));
        assert_eq!(from_credits, dec("20"));
    }

    #[test]
    fn deduction_is_all_credits_once_dev_plan_exhausted() {
        let (from_dev_plan, from_credits) = split_dev_plan_and_credits(dec("30"), dec("50"), dec("50"));
        assert_eq!(from_dev_plan, Decimal::ZERO);
        assert_eq!(from_credits, dec("30"));
    }

    #[test]
    fn referral_credit_is_one_percent() {
        assert_eq!(referral_credit(dec("200")), dec("2"));
    }
}

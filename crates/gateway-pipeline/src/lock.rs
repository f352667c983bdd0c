//! Named-row distributed lock in Postgres `lock` table (§5): "delete stale, then
//! insert" acquisition — a concurrent acquirer collides on the unique `key` column
//! (SQLSTATE `23505`), which this treats as "not acquired". Expired locks (older than
//! `STALE_AFTER`) are reclaimed by the next acquirer, never by the holder itself.

use std::time::Duration;

use sqlx::PgPool;

const STALE_AFTER: Duration = Duration::from_secs(5 * 60);

pub struct Lock<'a> {
    pool: &'a PgPool,
    key: &'static str,
}

impl<'a> Lock<'a> {
    /// Attempt to acquire the named lock. Returns `None` if another holder has it.
    pub async fn acquire(pool: &'a PgPool, key: &'static str) -> sqlx::Result<Option<Self>> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM lock WHERE key = $1 AND updated_at < now() - ($2 || ' seconds')::interval")
            .bind(key)
            .bind(STALE_AFTER.as_secs().to_string())
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query("INSERT INTO lock (key, updated_at) VALUES ($1, now())").bind(key).execute(&mut *tx).await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                Ok(Some(Self { pool, key }))
            }
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                tx.rollback().await?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Release the lock. Called in the caller's `finally` equivalent — always run,
    /// success or failure of the guarded work.
    pub async fn release(self) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM lock WHERE key = $1").bind(self.key).execute(self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_after_matches_spec() {
        assert_eq!(STALE_AFTER, Duration::from_secs(300));
    }
}

//! Postgres/Redis connection strings (§3, §6). These are deployment secrets read
//! straight from `DATABASE_URL`/`REDIS_URL`, not config-file material — mirroring how
//! `<PROVIDER>_API_KEY` is kept out of the TOML file in [`crate::api_keys`].

#[must_use]
pub fn database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

#[must_use]
pub fn redis_url() -> Option<String> {
    std::env::var("REDIS_URL").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_database_url_from_env() {
        temp_env::with_var("DATABASE_URL", Some("postgres://localhost/gateway"), || {
            assert_eq!(database_url().as_deref(), Some("postgres://localhost/gateway"));
        });
    }

    #[test]
    fn missing_redis_url_is_none() {
        temp_env::with_var_unset("REDIS_URL", || {
            assert!(redis_url().is_none());
        });
    }
}

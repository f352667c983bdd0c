//! Stats Aggregator (C11) and retention cadence config (§4.11, §6).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsConfig {
    #[serde(default = "default_project_stats_refresh_interval_seconds")]
    pub project_stats_refresh_interval_seconds: u64,
    #[serde(default = "default_current_minute_history_interval_seconds")]
    pub current_minute_history_interval_seconds: u64,
    #[serde(default = "default_stats_batch_size")]
    pub stats_batch_size: u32,
    #[serde(default = "default_true")]
    pub backfill_enabled: bool,
    #[serde(default = "default_backfill_days")]
    pub backfill_days: u32,
    #[serde(default = "default_true")]
    pub stale_enabled: bool,
    #[serde(default = "default_stale_days")]
    pub stale_days: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            project_stats_refresh_interval_seconds: default_project_stats_refresh_interval_seconds(),
            current_minute_history_interval_seconds: default_current_minute_history_interval_seconds(),
            stats_batch_size: default_stats_batch_size(),
            backfill_enabled: true,
            backfill_days: default_backfill_days(),
            stale_enabled: true,
            stale_days: default_stale_days(),
        }
    }
}

const fn default_project_stats_refresh_interval_seconds() -> u64 {
    60
}

const fn default_current_minute_history_interval_seconds() -> u64 {
    5
}

const fn default_stats_batch_size() -> u32 {
    100
}

const fn default_backfill_days() -> u32 {
    30
}

const fn default_stale_days() -> u32 {
    7
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    #[serde(default)]
    pub enable_data_retention_cleanup: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let stats = StatsConfig::default();
        assert_eq!(stats.project_stats_refresh_interval_seconds, 60);
        assert_eq!(stats.stats_batch_size, 100);
        assert_eq!(stats.backfill_days, 30);
        assert_eq!(stats.stale_days, 7);
        assert!(stats.backfill_enabled);
        assert!(stats.stale_enabled);

        let retention = RetentionConfig::default();
        assert!(!retention.enable_data_retention_cleanup);
    }
}

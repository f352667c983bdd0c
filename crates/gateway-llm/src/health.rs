//! C3 — Key Health Tracker: sliding-window success/error stats per upstream
//! `(envVarName, keyIndex)`, with temporary and permanent blacklisting.
//!
//! Grounded on `crates/synapse-llm/src/health.rs` for the `DashMap`-keyed
//! concurrent-map shape; the state machine itself is rewritten against
//! SPEC_FULL.md §4.2/§8 — the teacher's three-state `CircuitState` circuit
//! breaker does not match this spec's ring-buffer uptime model and is not reused.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

const HISTORY_WINDOW: Duration = Duration::from_secs(5 * 60);
const MAX_HISTORY: usize = 1000;
const CONSECUTIVE_ERROR_THRESHOLD: u32 = 3;
const TEMP_BLACKLIST_COOLDOWN: Duration = Duration::from_secs(30);

const AUTH_FAILURE_SUBSTRINGS: [&str; 3] = ["invalid api key", "invalid_api_key", "authentication failed"];

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

#[derive(Debug, Clone, Copy)]
struct HistoryEntry {
    ts: f64,
    success: bool,
}

#[derive(Debug, Default)]
struct Health {
    consecutive_errors: u32,
    last_error_time: Option<f64>,
    permanently_blacklisted: bool,
    history: VecDeque<HistoryEntry>,
}

impl Health {
    fn prune(&mut self, now: f64) {
        let cutoff = now - HISTORY_WINDOW.as_secs_f64();
        while self.history.front().is_some_and(|e| e.ts < cutoff) {
            self.history.pop_front();
        }
    }

    fn push(&mut self, entry: HistoryEntry) {
        self.history.push_back(entry);
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }
}

/// Observed reliability counters for a `(envVar, keyIndex)` upstream key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub uptime: f64,
    pub successes: u64,
    pub total: u64,
}

/// §4.2 uptime penalty: `0` at or above 95%, else `((95-u)/95 * 5)^2`.
#[must_use]
pub fn uptime_penalty(uptime: f64) -> f64 {
    if uptime >= 95.0 {
        0.0
    } else {
        (((95.0 - uptime) / 95.0) * 5.0).powi(2)
    }
}

/// Process-wide, per-key sliding-window health tracker.
#[derive(Debug, Default)]
pub struct KeyHealthTracker {
    entries: DashMap<(String, u32), Mutex<Health>>,
}

impl KeyHealthTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `isHealthy(envVar, idx)` per §4.2. Resets `consecutiveErrors` to 0 as a side
    /// effect when the temporary-blacklist cooldown has expired.
    #[must_use]
    pub fn is_healthy(&self, env_var: &str, idx: u32) -> bool {
        let Some(entry) = self.entries.get(&(env_var.to_owned(), idx)) else {
            return true;
        };
        let mut health = entry.lock().expect("health lock poisoned");
        let now = now_secs();
        health.prune(now);

        if health.permanently_blacklisted {
            return false;
        }

        if health.consecutive_errors < CONSECUTIVE_ERROR_THRESHOLD {
            return true;
        }

        let cooldown_elapsed =
            health.last_error_time.is_none_or(|last| now - last >= TEMP_BLACKLIST_COOLDOWN.as_secs_f64());
        if cooldown_elapsed {
            health.consecutive_errors = 0;
            true
        } else {
            false
        }
    }

    pub fn report_success(&self, env_var: &str, idx: u32) {
        let entry = self.entries.entry((env_var.to_owned(), idx)).or_default();
        let mut health = entry.lock().expect("health lock poisoned");
        let now = now_secs();
        health.prune(now);
        health.push(HistoryEntry { ts: now, success: true });
        if !health.permanently_blacklisted {
            health.consecutive_errors = 0;
        }
    }

    pub fn report_error(&self, env_var: &str, idx: u32, status: Option<u16>, text: Option<&str>) {
        let entry = self.entries.entry((env_var.to_owned(), idx)).or_default();
        let mut health = entry.lock().expect("health lock poisoned");
        let now = now_secs();
        health.prune(now);
        health.push(HistoryEntry { ts: now, success: false });

        let is_auth_failure = matches!(status, Some(401 | 403))
            || text.is_some_and(|t| {
                let lower = t.to_lowercase();
                AUTH_FAILURE_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
            });

        if is_auth_failure {
            health.permanently_blacklisted = true;
        } else {
            health.consecutive_errors += 1;
            health.last_error_time = Some(now);
        }
    }

    /// `metrics(envVar, idx)`: prune, then `uptime = 100 * successes / total` (100 when empty).
    #[must_use]
    pub fn metrics(&self, env_var: &str, idx: u32) -> Metrics {
        let Some(entry) = self.entries.get(&(env_var.to_owned(), idx)) else {
            return Metrics { uptime: 100.0, successes: 0, total: 0 };
        };
        let mut health = entry.lock().expect("health lock poisoned");
        health.prune(now_secs());
        let total = health.history.len() as u64;
        let successes = health.history.iter().filter(|e| e.success).count() as u64;
        let uptime = if total == 0 { 100.0 } else { 100.0 * successes as f64 / total as f64 };
        Metrics { uptime, successes, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_record_is_healthy() {
        let tracker = KeyHealthTracker::new();
        assert!(tracker.is_healthy("OPENAI_API_KEY", 0));
    }

    #[test]
    fn three_consecutive_errors_become_unhealthy() {
        let tracker = KeyHealthTracker::new();
        for _ in 0..3 {
            tracker.report_error("OPENAI_API_KEY", 0, Some(500), None);
        }
        assert!(!tracker.is_healthy("OPENAI_API_KEY", 0));
    }

    #[test]
    fn success_resets_consecutive_errors() {
        let tracker = KeyHealthTracker::new();
        tracker.report_error("OPENAI_API_KEY", 0, Some(500), None);
        tracker.report_error("OPENAI_API_KEY", 0, Some(500), None);
        tracker.report_success("OPENAI_API_KEY", 0);
        tracker.report_error("OPENAI_API_KEY", 0, Some(500), None);
        assert!(tracker.is_healthy("OPENAI_API_KEY", 0));
    }

    #[test]
    fn single_401_permanently_blacklists() {
        let tracker = KeyHealthTracker::new();
        tracker.report_error("OPENAI_API_KEY", 0, Some(401), None);
        assert!(!tracker.is_healthy("OPENAI_API_KEY", 0));
        tracker.report_success("OPENAI_API_KEY", 0);
        assert!(!tracker.is_healthy("OPENAI_API_KEY", 0), "permanent blacklist must not clear on success");
    }

    #[test]
    fn independent_keys_tracked_separately() {
        let tracker = KeyHealthTracker::new();
        for _ in 0..3 {
            tracker.report_error("OPENAI_API_KEY", 0, Some(500), None);
        }
        assert!(!tracker.is_healthy("OPENAI_API_KEY", 0));
        assert!(tracker.is_healthy("OPENAI_API_KEY", 1));
        assert!(tracker.is_healthy("ANTHROPIC_API_KEY", 0));
    }

    #[test]
    fn metrics_report_full_uptime_for_all_successes() {
        let tracker = KeyHealthTracker::new();
        tracker.report_success("OPENAI_API_KEY", 0);
        tracker.report_success("OPENAI_API_KEY", 0);
        let metrics = tracker.metrics("OPENAI_API_KEY", 0);
        assert_eq!(metrics.uptime, 100.0);
        assert_eq!(metrics.total, 2);
    }

    #[test]
    fn metrics_default_to_full_uptime_when_empty() {
        let tracker = KeyHealthTracker::new();
        let metrics = tracker.metrics("OPENAI_API_KEY", 0);
        assert_eq!(metrics.uptime, 100.0);
        assert_eq!(metrics.total, 0);
    }

    #[test]
    fn uptime_penalty_is_zero_at_or_above_95() {
        assert_eq!(uptime_penalty(95.0), 0.0);
        assert_eq!(uptime_penalty(100.0), 0.0);
    }

    #[test]
    fn uptime_penalty_grows_quadratically_below_95() {
        let penalty_at_50 = uptime_penalty(50.0);
        let penalty_at_90 = uptime_penalty(90.0);
        assert!(penalty_at_50 > penalty_at_90);
        assert!((penalty_at_50 - ((45.0 / 95.0) * 5.0).powi(2)).abs() < 1e-9);
    }
}

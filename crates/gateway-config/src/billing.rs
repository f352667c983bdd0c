//! Billing/metering config (§3, §4.10): only the BYOK fee percentage and credit-batcher
//! cadence survive from the teacher's Aether-integration config — crediting/debiting is
//! a local `credits` column here, not an external billing service (§1 non-goal).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Fee applied to BYOK requests before crediting the referrer (§4.10). Gateway-wide,
    /// not per-organization (§3).
    #[serde(default = "default_byok_fee_percentage")]
    pub byok_fee_percentage: f64,
    #[serde(default = "default_credit_batch_size")]
    pub credit_batch_size: u32,
    #[serde(default = "default_credit_batch_interval_secs")]
    pub credit_batch_interval_secs: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            byok_fee_percentage: default_byok_fee_percentage(),
            credit_batch_size: default_credit_batch_size(),
            credit_batch_interval_secs: default_credit_batch_interval_secs(),
        }
    }
}

const fn default_byok_fee_percentage() -> f64 {
    0.05
}

const fn default_credit_batch_size() -> u32 {
    100
}

const fn default_credit_batch_interval_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = BillingConfig::default();
        assert!((config.byok_fee_percentage - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.credit_batch_size, 100);
        assert_eq!(config.credit_batch_interval_secs, 5);
    }
}

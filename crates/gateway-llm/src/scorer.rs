//! C4 — Provider Scorer: given a set of candidate mappings for a single resolved
//! model plus optional live metrics, pick one and explain the decision.
//!
//! Grounded on the weighted multi-objective, min-max-normalized scoring *style* of
//! `crates/synapse-routing/src/strategy/score.rs` (that crate scores across different
//! models by task complexity; this component scores across providers offering the
//! *same* model, per SPEC_FULL.md §4.3, and is written fresh against that formula).

use gateway_catalog::Mapping;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::health::uptime_penalty;

const EXPLORATION_PROBABILITY: f64 = 0.01;
const WEIGHT_PRICE: f64 = 0.2;
const WEIGHT_UPTIME: f64 = 0.5;
const WEIGHT_THROUGHPUT: f64 = 0.2;
const WEIGHT_LATENCY: f64 = 0.1;

const DEFAULT_UPTIME: f64 = 100.0;
const DEFAULT_LATENCY: f64 = 1000.0;
const DEFAULT_THROUGHPUT: f64 = 50.0;

/// Live metrics for one `(modelId, providerId)` pair, as observed by the dispatcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderMetrics {
    pub uptime: Option<f64>,
    pub average_latency: Option<f64>,
    pub throughput: Option<f64>,
}

/// Per-candidate scoring detail surfaced in `RoutingMetadata`.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateScore {
    pub provider_id: String,
    pub score: f64,
    pub uptime: Option<f64>,
    pub latency: Option<f64>,
    pub throughput: Option<f64>,
    pub price: f64,
    pub priority: f64,
}

/// Explains which mapping was chosen and why.
///
/// `original_provider`/`original_provider_uptime` are left unset here — the scorer only
/// picks once. The dispatcher (§4.8 step 4) fills them in when it falls back from this
/// choice to the next-best candidate after a low-uptime or failed attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingMetadata {
    pub reason: String,
    pub available_providers: Vec<String>,
    pub candidates: Vec<CandidateScore>,
    pub chosen_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_provider_uptime: Option<f64>,
    #[serde(default)]
    pub no_fallback: bool,
}

fn price_of(mapping: &Mapping) -> f64 {
    let input = mapping.input_price.to_f64().unwrap_or_default();
    let output = mapping.output_price.to_f64().unwrap_or_default();
    let discount = mapping.discount.to_f64().unwrap_or_default();
    ((input + output) / 2.0) * (1.0 - discount)
}

/// Score every candidate and pick one, per SPEC_FULL.md §4.3.
///
/// `metrics_of` looks up live metrics for a candidate by provider id; `priority_of` looks
/// up the owning `Provider`'s priority by provider id (`Mapping` itself doesn't carry
/// one — the dispatcher joins it in from the catalog's `Provider` rows), defaulting to
/// `1.0` when a candidate isn't found; `is_streaming` gates whether latency participates
/// in the weighted score; `explore` is a hook tests use to disable the ε-greedy
/// exploration draw (the contract requires it be disabled "outside tests" only in the
/// sense that callers control it explicitly).
pub fn score<'a>(
    candidates: &'a [&'a Mapping],
    metrics_of: impl Fn(&str) -> Option<ProviderMetrics>,
    priority_of: impl Fn(&str) -> Option<f64>,
    is_streaming: bool,
    explore: bool,
) -> Option<(&'a Mapping, RoutingMetadata)> {
    if candidates.is_empty() {
        return None;
    }

    let available_providers: Vec<String> = candidates.iter().map(|m| m.provider_id.clone()).collect();

    if explore && rand::random::<f64>() < EXPLORATION_PROBABILITY {
        let idx = rand::random::<usize>() % candidates.len();
        let chosen = candidates[idx];
        return Some((
            chosen,
            RoutingMetadata {
                reason: "random-exploration".to_owned(),
                available_providers,
                candidates: Vec::new(),
                chosen_provider: chosen.provider_id.clone(),
                original_provider: None,
                original_provider_uptime: None,
                no_fallback: false,
            },
        ));
    }

    let metrics: Vec<Option<ProviderMetrics>> = candidates.iter().map(|m| metrics_of(&m.provider_id)).collect();
    let has_any_metrics = metrics.iter().any(Option::is_some);

    if !has_any_metrics {
        let mut best_idx = 0;
        let mut best_price = f64::INFINITY;
        let mut prices = Vec::with_capacity(candidates.len());
        for (i, mapping) in candidates.iter().enumerate() {
            let priority = priority_of(&mapping.provider_id).unwrap_or(1.0);
            let effective_price = price_of(mapping) / priority;
            prices.push(effective_price);
            if effective_price < best_price {
                best_price = effective_price;
                best_idx = i;
            }
        }
        let candidate_scores = candidates
            .iter()
            .zip(prices)
            .map(|(m, price)| CandidateScore {
                provider_id: m.provider_id.clone(),
                score: price,
                uptime: None,
                latency: None,
                throughput: None,
                price: price_of(m),
                priority: priority_of(&m.provider_id).unwrap_or(1.0),
            })
            .collect();
        let chosen = candidates[best_idx];
        return Some((
            chosen,
            RoutingMetadata {
                reason: "price-only-no-metrics".to_owned(),
                available_providers,
                candidates: candidate_scores,
                chosen_provider: chosen.provider_id.clone(),
                original_provider: None,
                original_provider_uptime: None,
                no_fallback: false,
            },
        ));
    }

    let prices: Vec<f64> = candidates.iter().map(|m| price_of(m)).collect();
    let uptimes: Vec<f64> = metrics.iter().map(|m| m.and_then(|m| m.uptime).unwrap_or(DEFAULT_UPTIME)).collect();
    let throughputs: Vec<f64> =
        metrics.iter().map(|m| m.and_then(|m| m.throughput).unwrap_or(DEFAULT_THROUGHPUT)).collect();
    let latencies: Vec<f64> =
        metrics.iter().map(|m| m.and_then(|m| m.average_latency).unwrap_or(DEFAULT_LATENCY)).collect();

    let norm_price = min_max_normalize(&prices, false);
    let norm_uptime = min_max_normalize(&uptimes, true);
    let norm_throughput = min_max_normalize(&throughputs, true);
    let norm_latency = min_max_normalize(&latencies, false);

    let (w_price, w_uptime, w_throughput, w_latency) = if is_streaming {
        (WEIGHT_PRICE, WEIGHT_UPTIME, WEIGHT_THROUGHPUT, WEIGHT_LATENCY)
    } else {
        let kept = WEIGHT_PRICE + WEIGHT_UPTIME + WEIGHT_THROUGHPUT;
        (WEIGHT_PRICE / kept, WEIGHT_UPTIME / kept, WEIGHT_THROUGHPUT / kept, 0.0)
    };

    let mut candidate_scores = Vec::with_capacity(candidates.len());
    let mut best_idx = 0;
    let mut best_score = f64::INFINITY;

    for i in 0..candidates.len() {
        let priority = priority_of(&candidates[i].provider_id).unwrap_or(1.0);
        let latency_term = if is_streaming { norm_latency[i] * w_latency } else { 0.0 };
        let composite = norm_price[i] * w_price
            + norm_uptime[i] * w_uptime
            + norm_throughput[i] * w_throughput
            + latency_term
            + (1.0 - priority)
            + uptime_penalty(uptimes[i]);

        candidate_scores.push(CandidateScore {
            provider_id: candidates[i].provider_id.clone(),
            score: composite,
            uptime: Some(uptimes[i]),
            latency: is_streaming.then_some(latencies[i]),
            throughput: Some(throughputs[i]),
            price: prices[i],
            priority,
        });

        if composite < best_score {
            best_score = composite;
            best_idx = i;
        }
    }

    let chosen = candidates[best_idx];
    Some((
        chosen,
        RoutingMetadata {
            reason: "weighted-score".to_owned(),
            available_providers,
            candidates: candidate_scores,
            chosen_provider: chosen.provider_id.clone(),
            original_provider: None,
            original_provider_uptime: None,
            no_fallback: false,
        },
    ))
}

/// Min-max normalize so 0 = best, 1 = worst. `invert` is true for "higher is better" metrics.
fn min_max_normalize(values: &[f64], invert: bool) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    values
        .iter()
        .map(|&v| {
            if range <= f64::EPSILON {
                0.0
            } else if invert {
                (max - v) / range
            } else {
                (v - min) / range
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_catalog::Stability;
    use rust_decimal::Decimal;

    fn mapping(provider_id: &str, input: i64, output: i64) -> Mapping {
        Mapping {
            provider_id: provider_id.to_owned(),
            model_name: "m".to_owned(),
            input_price: Decimal::new(input, 0),
            output_price: Decimal::new(output, 0),
            cached_input_price: None,
            image_input_price: None,
            image_output_price: None,
            request_price: None,
            web_search_price: None,
            pricing_tiers: Vec::new(),
            context_size: None,
            max_output: None,
            streaming: true,
            vision: false,
            reasoning: false,
            tools: true,
            json_output: true,
            web_search: false,
            discount: Decimal::ZERO,
            stability: Stability::Stable,
            deprecated_at: None,
            deactivated_at: None,
        }
    }

    #[test]
    fn single_candidate_always_chosen() {
        let m = mapping("only", 1, 1);
        let candidates = vec![&m];
        let (chosen, meta) = score(&candidates, |_| None, |_| None, false, false).unwrap();
        assert_eq!(chosen.provider_id, "only");
        assert_eq!(meta.reason, "price-only-no-metrics");
    }

    #[test]
    fn cheaper_candidate_wins_on_price_alone() {
        let cheap = mapping("cheap", 1, 1);
        let expensive = mapping("expensive", 10, 10);
        let candidates = vec![&cheap, &expensive];
        let (chosen, _) = score(&candidates, |_| None, |_| None, false, false).unwrap();
        assert_eq!(chosen.provider_id, "cheap");
    }

    #[test]
    fn high_uptime_beats_cheap_low_uptime() {
        let cheap_unreliable = mapping("cheap", 1, 1);
        let expensive_reliable = mapping("expensive", 10, 10);
        let candidates = vec![&cheap_unreliable, &expensive_reliable];
        let metrics_of = |provider: &str| {
            if provider == "cheap" {
                Some(ProviderMetrics { uptime: Some(50.0), average_latency: Some(500.0), throughput: Some(50.0) })
            } else {
                Some(ProviderMetrics { uptime: Some(99.0), average_latency: Some(500.0), throughput: Some(50.0) })
            }
        };
        let (chosen, meta) = score(&candidates, metrics_of, |_| None, false, false).unwrap();
        assert_eq!(chosen.provider_id, "expensive");
        assert_eq!(meta.reason, "weighted-score");
    }

    #[test]
    fn empty_candidates_returns_none() {
        let candidates: Vec<&Mapping> = Vec::new();
        assert!(score(&candidates, |_| None, |_| None, false, false).is_none());
    }

    #[test]
    fn latency_excluded_when_not_streaming() {
        let a = mapping("a", 1, 1);
        let b = mapping("b", 1, 1);
        let candidates = vec![&a, &b];
        let metrics_of = |provider: &str| {
            let latency = if provider == "a" { 100.0 } else { 5000.0 };
            Some(ProviderMetrics { uptime: Some(100.0), average_latency: Some(latency), throughput: Some(50.0) })
        };
        let (_, meta) = score(&candidates, metrics_of, |_| None, false, false).unwrap();
        assert!(meta.candidates.iter().all(|c| c.latency.is_none()));
    }

    #[test]
    fn min_max_normalize_handles_equal_values() {
        let values = [5.0, 5.0, 5.0];
        let normalized = min_max_normalize(&values, false);
        assert!(normalized.iter().all(|&v| v == 0.0));
    }
}

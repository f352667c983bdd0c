//! Flattened, JSON-serializable view of a [`gateway_llm::LogRecord`] — the shape that
//! crosses the Redis `LOG_QUEUE` (§4.9) and lands in the `log` table's columns (§3).

use gateway_llm::LogRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedLog {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub project_id: Uuid,
    pub api_key_id: Uuid,
    pub requested_model: String,
    pub used_model: String,
    pub used_provider: String,
    pub has_error: bool,
    pub error_details: Option<String>,
    pub unified_finish_reason: String,
    pub canceled: bool,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub reasoning_tokens: Option<i64>,
    pub cached_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub cost: Option<f64>,
    pub input_cost: Option<Decimal>,
    pub output_cost: Option<Decimal>,
    pub cached_input_cost: Option<Decimal>,
    pub request_cost: Option<Decimal>,
    pub image_input_cost: Option<Decimal>,
    pub image_output_cost: Option<Decimal>,
    pub web_search_cost: Option<Decimal>,
    pub estimated_cost: bool,
    pub discount: Option<f64>,
    pub pricing_tier: Option<String>,
    pub routing_metadata: Option<serde_json::Value>,
    pub source: Option<String>,
    /// Mode the api key was validated under (§4.8 step 1) — `api-keys`, `credits`, or `hybrid`.
    pub mode: String,
    /// `api-keys` when a BYOK/configured-key request, `credits` when billed against
    /// the org's credit balance — §4.10 treats these differently.
    pub used_mode: String,
    pub created_at_unix: i64,
    pub duration_ms: i64,
    pub time_to_first_token_ms: Option<i64>,
    pub response_size: i64,
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub tools: Option<serde_json::Value>,
    pub tool_results: Option<serde_json::Value>,
    pub streamed: bool,
    pub cached: bool,
}

impl From<LogRecord> for QueuedLog {
    fn from(record: LogRecord) -> Self {
        let cost = record.cost;
        Self {
            id: Uuid::new_v4(),
            organization_id: record.identity.organization_id,
            project_id: record.identity.project_id,
            api_key_id: record.identity.api_key_id,
            requested_model: record.requested_model,
            used_model: record.used_model,
            used_provider: record.used_provider,
            has_error: record.has_error,
            error_details: record.error_details,
            unified_finish_reason: record.unified_finish_reason.to_string(),
            canceled: record.canceled,
            prompt_tokens: record.usage.as_ref().map(|u| i64::from(u.prompt_tokens)),
            completion_tokens: record.usage.as_ref().map(|u| i64::from(u.completion_tokens)),
            reasoning_tokens: record.usage.as_ref().map(|u| i64::from(u.reasoning_tokens)),
            cached_tokens: record.usage.as_ref().map(|u| i64::from(u.cached_tokens)),
            total_tokens: record.usage.as_ref().map(|u| i64::from(u.total_tokens)),
            cost: cost.as_ref().and_then(|c| rust_decimal::prelude::ToPrimitive::to_f64(&c.total_cost)),
            input_cost: cost.as_ref().map(|c| c.input_cost),
            output_cost: cost.as_ref().map(|c| c.output_cost),
            cached_input_cost: cost.as_ref().map(|c| c.cached_input_cost),
            request_cost: cost.as_ref().map(|c| c.request_cost),
            image_input_cost: cost.as_ref().map(|c| c.image_input_cost),
            image_output_cost: cost.as_ref().map(|c| c.image_output_cost),
            web_search_cost: cost.as_ref().map(|c| c.web_search_cost),
            estimated_cost: cost.as_ref().is_some_and(|c| c.estimated_cost),
            discount: cost
                .as_ref()
                .and_then(|c| c.discount)
                .and_then(|d| rust_decimal::prelude::ToPrimitive::to_f64(&d)),
            pricing_tier: cost.as_ref().and_then(|c| c.pricing_tier.clone()),
            routing_metadata: record.routing_metadata.and_then(|m| serde_json::to_value(m).ok()),
            source: record.source,
            mode: record.mode.to_string(),
            used_mode: if record.used_byok { "api-keys".to_owned() } else { "credits".to_owned() },
            created_at_unix: i64::try_from(record.created_at_unix).unwrap_or(i64::MAX),
            duration_ms: i64::try_from(record.duration_ms).unwrap_or(i64::MAX),
            time_to_first_token_ms: record.time_to_first_token_ms.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)),
            response_size: i64::try_from(record.response_size).unwrap_or(i64::MAX),
            content: record.content,
            reasoning_content: record.reasoning_content,
            tools: record.tools,
            tool_results: record.tool_results,
            streamed: record.streamed,
            cached: record.cached,
        }
    }
}

#[cfg(test)]
mod tests {
    use gateway_core::{Identity, RequestMode, UnifiedFinishReason};

    use super::*;

    fn sample_record(used_byok: bool) -> LogRecord {
        LogRecord {
            identity: Identity { organization_id: Uuid::nil(), project_id: Uuid::nil(), api_key_id: Uuid::nil() },
            used_byok,
            mode: if used_byok { RequestMode::ApiKeys } else { RequestMode::Credits },
            requested_model: "gpt-4o".to_owned(),
            used_model: "gpt-4o".to_owned(),
            used_provider: "openai".to_owned(),
            has_error: false,
            error_details: None,
            unified_finish_reason: UnifiedFinishReason::Completed,
            canceled: false,
            cost: None,
            usage: None,
            routing_metadata: None,
            source: None,
            created_at_unix: 1_700_000_000,
            duration_ms: 123,
            time_to_first_token_ms: None,
            response_size: 0,
            content: None,
            reasoning_content: None,
            tools: None,
            tool_results: None,
            streamed: false,
            cached: false,
        }
    }

    #[test]
    fn byok_request_bills_as_api_keys() {
        let queued = QueuedLog::from(sample_record(true));
        assert_eq!(queued.used_mode, "api-keys");
        assert_eq!(queued.mode, "api-keys");
    }

    #[test]
    fn non_byok_request_bills_as_credits() {
        let queued = QueuedLog::from(sample_record(false));
        assert_eq!(queued.used_mode, "credits");
    }

    #[test]
    fn finish_reason_is_flattened_to_its_string_form() {
        let queued = QueuedLog::from(sample_record(false));
        assert_eq!(queued.unified_finish_reason, "completed");
    }

    #[test]
    fn mode_and_used_mode_can_diverge() {
        let mut record = sample_record(false);
        record.mode = RequestMode::Hybrid;
        let queued = QueuedLog::from(record);
        assert_eq!(queued.mode, "hybrid");
        assert_eq!(queued.used_mode, "credits");
    }

    #[test]
    fn streaming_fields_pass_through() {
        let mut record = sample_record(false);
        record.duration_ms = 842;
        record.time_to_first_token_ms = Some(120);
        record.response_size = 17;
        record.content = Some("hi there".to_owned());
        record.reasoning_content = Some("because".to_owned());
        record.streamed = true;
        record.cached = true;

        let queued = QueuedLog::from(record);
        assert_eq!(queued.duration_ms, 842);
        assert_eq!(queued.time_to_first_token_ms, Some(120));
        assert_eq!(queued.response_size, 17);
        assert_eq!(queued.content.as_deref(), Some("hi there"));
        assert_eq!(queued.reasoning_content.as_deref(), Some("because"));
        assert!(queued.streamed);
        assert!(queued.cached);
    }
}

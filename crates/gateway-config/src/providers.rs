//! Per-provider endpoint configuration: which wire protocol a catalog `Provider` id
//! speaks and where it lives. Upstream API keys are deliberately absent here — they
//! come from `<PROVIDER>_API_KEY` env vars (§6), read directly by [`crate::api_keys`],
//! never checked into the TOML file.

use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "protocol")]
pub enum ProviderProtocol {
    /// Generic OpenAI-compatible `/chat/completions` wire format.
    OpenaiCompatible {
        base_url: Url,
        #[serde(default)]
        send_stream_options: bool,
    },
    /// Anthropic Messages API.
    Anthropic {
        #[serde(default)]
        base_url: Option<Url>,
    },
    /// Google Generative Language API (`generateContent`/`streamGenerateContent`).
    Google {
        #[serde(default)]
        base_url: Option<Url>,
    },
    /// AWS Bedrock Converse API. Deliberately carries only `region` — credentials come
    /// from the AWS SDK's default provider chain (env vars, IAM role, profile, IMDS),
    /// never from this TOML file.
    Bedrock { region: String },
    /// OpenAI Responses API (`/v1/responses`), distinct from the chat-completions shape.
    OpenaiResponses {
        #[serde(default)]
        base_url: Option<Url>,
    },
    /// Alibaba DashScope image generation (§4.4) — chat-completions request shape, a
    /// `output.choices[*].message.content[*].image` response shape.
    DashscopeImageGen { base_url: Url },
    /// ZAI CogView image generation (§4.4) — chat-completions request shape, a
    /// top-level `data[*].url` response shape.
    ZaiCogview { base_url: Url },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEndpointConfig {
    #[serde(flatten)]
    pub protocol: ProviderProtocol,
}

/// `[providers.<id>]` table, keyed by the catalog `Provider.id` it configures the
/// transport for.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ProvidersConfig(pub HashMap<String, ProviderEndpointConfig>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_openai_compatible_and_anthropic() {
        let toml = r#"
            [openai]
            protocol = "openai_compatible"
            base_url = "https://api.openai.com/v1"
            send_stream_options = true

            [anthropic]
            protocol = "anthropic"
        "#;

        let config: ProvidersConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.0["openai"].protocol, ProviderProtocol::OpenaiCompatible { .. }));
        assert!(matches!(config.0["anthropic"].protocol, ProviderProtocol::Anthropic { .. }));
    }

    #[test]
    fn deserializes_google_and_bedrock() {
        let toml = r#"
            [google]
            protocol = "google"

            [bedrock]
            protocol = "bedrock"
            region = "us-east-1"
        "#;

        let config: ProvidersConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.0["google"].protocol, ProviderProtocol::Google { .. }));
        match &config.0["bedrock"].protocol {
            ProviderProtocol::Bedrock { region } => assert_eq!(region, "us-east-1"),
            other => panic!("expected Bedrock, got {other:?}"),
        }
    }

    #[test]
    fn deserializes_openai_responses() {
        let toml = r#"
            [openai_responses]
            protocol = "openai_responses"
        "#;

        let config: ProvidersConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.0["openai_responses"].protocol, ProviderProtocol::OpenaiResponses { .. }));
    }

    #[test]
    fn deserializes_image_gen_families() {
        let toml = r#"
            [dashscope]
            protocol = "dashscope_image_gen"
            base_url = "https://dashscope.aliyuncs.com/compatible-mode/v1"

            [zai]
            protocol = "zai_cogview"
            base_url = "https://open.bigmodel.cn/api/paas/v4"
        "#;

        let config: ProvidersConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.0["dashscope"].protocol, ProviderProtocol::DashscopeImageGen { .. }));
        assert!(matches!(config.0["zai"].protocol, ProviderProtocol::ZaiCogview { .. }));
    }
}

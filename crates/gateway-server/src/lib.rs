//! Assembles the catalog, dispatcher, and routes into a servable axum app.
//!
//! Grounded on `crates/synapse-server/src/lib.rs::Server::new`/`serve` for the overall
//! shape — stripped of every middleware layer (CORS, CSRF, auth-via-external-API,
//! billing identity, rate limiting, entitlement) that has no counterpart in scope, but
//! keeping the innermost request-context middleware and outermost tracing layer in the
//! teacher's exact order.

mod error;
mod handler;
mod request_context;
mod streaming;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use gateway_catalog::Catalog;
use gateway_config::{Config, EnvApiKeySource, IdentityResolver, ProviderProtocol};
use gateway_llm::health::KeyHealthTracker;
use gateway_llm::provider::anthropic::AnthropicProvider;
use gateway_llm::provider::bedrock::BedrockProvider;
use gateway_llm::provider::google::GoogleProvider;
use gateway_llm::provider::image_gen::{ImageGenFamily, ImageGenProvider};
use gateway_llm::provider::openai_compatible::OpenAiCompatibleProvider;
use gateway_llm::provider::openai_responses::OpenAiResponsesProvider;
use gateway_llm::provider::quirks::{FencedJsonContentQuirk, ZaiQuirk};
use gateway_llm::provider::Provider;
use gateway_llm::{Dispatcher, LogRecord};
use tokio::sync::mpsc::UnboundedSender;
use tower_http::trace::TraceLayer;

/// Shared state every route handler reaches into.
pub struct AppState {
    dispatcher: Dispatcher,
    catalog: Arc<Catalog>,
    identities: Arc<dyn IdentityResolver>,
}

/// Assembled server with all routes and middleware.
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from configuration.
    ///
    /// `redis_url` backs the Google provider's `thoughtSignature` cache (§4.4/§4.5); a
    /// connection is only opened if the catalog actually configures a `google` provider.
    ///
    /// # Errors
    ///
    /// Returns an error if a catalog model maps to a provider with no configured
    /// transport (§2/§6: every `providers.<id>` table must name a real protocol), or if
    /// a Google provider is configured but the Redis connection fails.
    pub async fn new(config: Config, log_tx: UnboundedSender<LogRecord>, redis_url: &str) -> anyhow::Result<Self> {
        let listen_address = config.server.listen_address.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let catalog = Arc::new(config.catalog.into_catalog());
        let health = Arc::new(KeyHealthTracker::new());
        let keys = Arc::new(EnvApiKeySource::from_catalog(&catalog));

        let needs_redis = config.providers.0.values().any(|e| matches!(e.protocol, ProviderProtocol::Google { .. }));
        let redis_conn = if needs_redis {
            Some(redis::Client::open(redis_url)?.get_connection_manager().await?)
        } else {
            None
        };

        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        for (id, endpoint) in &config.providers.0 {
            let provider: Arc<dyn Provider> = match &endpoint.protocol {
                ProviderProtocol::OpenaiCompatible { base_url, send_stream_options } => {
                    let provider = OpenAiCompatibleProvider::new(id.clone(), base_url.to_string(), *send_stream_options);
                    // §9: mistral/novita/zai need small post-processing beyond the generic shape.
                    let provider = match id.as_str() {
                        "zai" => provider.with_quirk(Box::new(ZaiQuirk)),
                        "mistral" | "novita" => provider.with_quirk(Box::new(FencedJsonContentQuirk)),
                        _ => provider,
                    };
                    Arc::new(provider)
                }
                ProviderProtocol::Anthropic { base_url } => {
                    Arc::new(AnthropicProvider::new(base_url.as_ref().map(ToString::to_string)))
                }
                ProviderProtocol::Google { base_url } => {
                    let conn = redis_conn.clone().expect("redis connection opened above when any provider is Google");
                    Arc::new(GoogleProvider::new(base_url.as_ref().map(ToString::to_string), conn))
                }
                ProviderProtocol::Bedrock { region } => Arc::new(BedrockProvider::new(region.clone()).await),
                ProviderProtocol::OpenaiResponses { base_url } => {
                    Arc::new(OpenAiResponsesProvider::new(base_url.as_ref().map(ToString::to_string)))
                }
                ProviderProtocol::DashscopeImageGen { base_url } => {
                    Arc::new(ImageGenProvider::new(id.clone(), base_url.to_string(), ImageGenFamily::DashScope))
                }
                ProviderProtocol::ZaiCogview { base_url } => {
                    Arc::new(ImageGenProvider::new(id.clone(), base_url.to_string(), ImageGenFamily::ZaiCogView))
                }
            };
            providers.insert(id.clone(), provider);
        }

        let dispatcher = Dispatcher::new(Arc::clone(&catalog), health, providers, keys, log_tx);
        let identities: Arc<dyn IdentityResolver> = Arc::new(config.identities);

        let state = Arc::new(AppState { dispatcher, catalog, identities });

        let app = handler::router(Arc::clone(&state))
            .layer(axum::middleware::from_fn_with_state(Arc::clone(&state), request_context::request_context_middleware))
            .layer(TraceLayer::new_for_http());

        Ok(Self { router: app, listen_address })
    }

    /// The configured listen address.
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router, for tests that manage their own listener.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests. Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails.
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}

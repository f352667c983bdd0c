use std::net::SocketAddr;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Overridable via the `--listen` CLI arg / `GATEWAY_LISTEN` env var (§6).
    #[serde(default)]
    pub listen_address: Option<SocketAddr>,
}

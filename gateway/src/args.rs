use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// LLM Gateway
#[derive(Debug, Parser)]
#[command(name = "gateway", about = "Multi-tenant LLM API gateway")]
pub struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "gateway.toml", env = "GATEWAY_CONFIG")]
    pub config: PathBuf,

    /// Override the configured listen address.
    #[arg(long, env = "GATEWAY_LISTEN")]
    pub listen: Option<SocketAddr>,
}

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Anthropic and OpenAI compatible gateway in front of a local agent
#[derive(Debug, Parser)]
#[command(name = "conduit", version)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "conduit.toml", env = "CONDUIT_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "CONDUIT_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Default log filter when `RUST_LOG` is unset
    #[arg(long, default_value = "info", env = "CONDUIT_LOG")]
    pub log: String,
}

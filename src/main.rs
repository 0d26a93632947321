use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use channel_bridge::config::{load_config, validate_config, BridgeConfig, ConfigError};
use channel_bridge::lifecycle::signals::shutdown_signal;
use channel_bridge::observability::{logging, metrics};
use channel_bridge::BridgeSystem;

/// Forward HTTP requests to a peer connected over a WebSocket control channel.
#[derive(Parser, Debug)]
#[command(name = "channel-bridge", version, about)]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind host for both listeners.
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    http_port: Option<u16>,

    #[arg(long)]
    channel_port: Option<u16>,

    /// Longest wait for the next peer event of a request.
    #[arg(long)]
    request_timeout_ms: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(host) = &self.host {
            config.http.host = host.clone();
            config.channel.host = host.clone();
        }
        if let Some(port) = self.http_port {
            config.http.port = port;
        }
        if let Some(port) = self.channel_port {
            config.channel.port = port;
        }
        if let Some(ms) = self.request_timeout_ms {
            config.timeouts.request_ms = ms;
        }
    }
}

fn build_config(args: &Args) -> Result<BridgeConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    args.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = build_config(&args)?;

    logging::init_logging(&config.observability.log_level)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "channel-bridge starting");

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let system = BridgeSystem::new(config);
    system.start().await?;

    shutdown_signal().await;
    system.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

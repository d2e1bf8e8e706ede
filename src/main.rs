//! Gateway binary entry point.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pilot_gateway::config::{load_config, ConfigError, GatewayConfig};
use pilot_gateway::observability::metrics;
use pilot_gateway::Gateway;

#[derive(Parser)]
#[command(name = "pilot-gateway", about = "Dynamic HTTP to gRPC gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config/gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pilot_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(ConfigError::Io(e)) => {
            tracing::info!(
                path = %args.config.display(),
                error = %e,
                "Config file not found, using default config"
            );
            GatewayConfig::default()
        }
        Err(e) => return Err(e.into()),
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_addr.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_addr = %config.observability.metrics_addr,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = Gateway::new(config).await?;
    gateway.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

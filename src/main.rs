//! flycam-relay - latest-wins frame relay
//!
//! Relays video frames and metadata from an embedded producer to any number
//! of subscribers, dropping stale frames instead of queueing them.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

use flycam_relay::config::ConfigManager;
use flycam_relay::metrics::{MetricsServer, RelayMetrics};
use flycam_relay::Supervisor;

/// CLI arguments for flycam-relay
#[derive(Parser, Debug)]
#[command(name = "flycam-relay")]
#[command(about = "Latest-wins relay for live video frames and metadata")]
#[command(version)]
#[command(long_about = "
flycam-relay - latest-wins relay for live video frames and metadata

Producers push length-prefixed frames to a channel's inbound address;
subscribers connected to its outbound address receive the newest frame.
Stale frames are dropped, never queued.

Default channels:
  video     inbound 0.0.0.0:5555  outbound 0.0.0.0:5556  (monitored)
  metadata  inbound 0.0.0.0:5557  outbound 0.0.0.0:5558

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  FLYCAM_MAX_FRAME_SIZE    - Largest accepted frame in bytes
  FLYCAM_REPORT_INTERVAL   - Throughput report window (e.g., 1s, 500ms)
  FLYCAM_METRICS_ADDR      - Prometheus scrape address (e.g., 127.0.0.1:9100)
  FLYCAM_LOG_LEVEL         - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "flycam-relay.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Largest accepted frame in bytes
    #[arg(long, help = "Largest accepted frame in bytes")]
    pub max_frame_size: Option<usize>,

    /// Throughput report window
    #[arg(long, value_parser = humantime::parse_duration, help = "Throughput report window (e.g., 1s)")]
    pub report_interval: Option<Duration>,

    /// Prometheus scrape address
    #[arg(long, help = "Serve Prometheus metrics on this address")]
    pub metrics_addr: Option<SocketAddr>,

    /// Report throughput for every channel
    #[arg(long, help = "Report throughput for every channel, not just video")]
    pub monitor_all: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let cli_log_level = if args.verbose {
        Some("debug")
    } else {
        args.log_level.as_deref()
    };

    let log_filter = init_tracing(cli_log_level.unwrap_or("info"))?;

    info!("Starting flycam-relay v{}", env!("CARGO_PKG_VERSION"));

    // Priority: CLI args > config file > environment > defaults
    let mut config = ConfigManager::load(&args.config)?;

    config.merge_with_cli_args(
        cli_log_level,
        args.max_frame_size,
        args.report_interval,
        args.metrics_addr,
        args.monitor_all,
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    apply_log_level(&log_filter, &config.monitoring.log_level)?;

    if args.validate_config {
        info!("Configuration is valid");
        println!("{}", ConfigManager::render(&config)?);
        return Ok(());
    }

    let metrics = Arc::new(RelayMetrics::new().context("Failed to create metrics registry")?);

    let supervisor = match Supervisor::start(&config, Arc::clone(&metrics)).await {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("Relay startup failed: {:#}", e);
            return Err(e);
        }
    };

    if let Some(metrics_addr) = config.monitoring.metrics_addr {
        let server = MetricsServer::bind(metrics, metrics_addr).await?;
        tokio::spawn(server.serve());
    }

    supervisor.log_banner();
    supervisor.run().await;

    Ok(())
}

type LogFilterHandle = reload::Handle<EnvFilter, Registry>;

fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// Initialize tracing/logging before the configuration is loaded
fn init_tracing(log_level: &str) -> Result<LogFilterHandle> {
    let (filter, handle) = reload::Layer::new(build_filter(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(handle)
}

/// Switch to the configured log level; RUST_LOG still takes precedence
fn apply_log_level(handle: &LogFilterHandle, log_level: &str) -> Result<()> {
    handle
        .reload(build_filter(log_level))
        .context("Failed to apply configured log level")
}

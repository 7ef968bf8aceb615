//! Marquee server binary.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! marquee --config config.yaml
//!
//! # With environment variables only
//! MARQUEE_LIMITER__RPS=10 marquee --env production
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use marquee::config::{LoggingConfig, MarqueeConfig};
use marquee::lifecycle::Lifecycle;
use marquee::notify::LogNotifier;
use marquee::store::MemoryStore;

/// Marquee - Movie Catalog JSON API
#[derive(Parser, Debug)]
#[command(name = "marquee")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Environment name (development|staging|production)
    #[arg(long)]
    env: Option<String>,

    /// Enable or disable the per-client rate limiter
    #[arg(long)]
    limiter_enabled: Option<bool>,

    /// Sustained requests per second per client
    #[arg(long)]
    limiter_rps: Option<f64>,

    /// Bucket capacity per client
    #[arg(long)]
    limiter_burst: Option<u32>,

    /// Trusted CORS origins, comma separated
    #[arg(long, value_delimiter = ',')]
    cors_trusted_origins: Option<Vec<String>>,
}

impl Args {
    fn apply(self, config: &mut MarqueeConfig) {
        if let Some(addr) = self.addr {
            config.server.addr = addr;
        }
        if let Some(env) = self.env {
            config.server.env = env;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.limiter.enabled = enabled;
        }
        if let Some(rps) = self.limiter_rps {
            config.limiter.rps = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.limiter.burst = burst;
        }
        if let Some(origins) = self.cors_trusted_origins {
            config.cors.trusted_origins = origins;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = resolve_config(Args::parse())?;

    init_logging(&config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Marquee");
    info!(
        addr = %config.server.addr,
        env = %config.server.env,
        limiter_enabled = config.limiter.enabled,
        "Configuration loaded"
    );

    let lifecycle = Lifecycle::new(config);
    let report = lifecycle
        .run(
            Arc::new(MemoryStore::new()),
            Arc::new(LogNotifier::new()),
            shutdown_signal(),
        )
        .await?;

    info!(degraded = report.is_degraded(), "Marquee stopped");
    Ok(())
}

/// Layer CLI overrides over the file or environment, then validate once.
fn resolve_config(mut args: Args) -> anyhow::Result<MarqueeConfig> {
    let mut config = match args.config.take() {
        Some(path) => MarqueeConfig::load(&path)?,
        None => MarqueeConfig::from_env()?,
    };
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

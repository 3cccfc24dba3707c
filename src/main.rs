use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use mirage::config::Config;
use mirage::service::ServiceRegistry;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Serves configured fake PostgreSQL databases.
#[derive(Parser)]
#[command(name = "mirage", version, about)]
struct Args {
    /// Service definitions (TOML)
    #[arg(short, long, value_name = "FILE", default_value = "mirage.toml")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, value_name = "FILTER", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if config.services.is_empty() {
        bail!("{} defines no services", args.config.display());
    }

    let registry = ServiceRegistry::with_defaults();
    let shutdown = CancellationToken::new();
    let mut running = JoinSet::new();

    for service_config in &config.services {
        let service = registry.build(service_config).await?;
        info!(
            service = service.name(),
            addr = %service.local_addr()?,
            "service started"
        );
        running.spawn(service.run(shutdown.clone()));
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutting down");
        }
        _ = running.join_next() => warn!("a service stopped unexpectedly"),
    }

    shutdown.cancel();
    while running.join_next().await.is_some() {}
    info!("all services stopped");
    Ok(())
}

//! `switchyard` binary: runs a control plane over a JSON entity file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use switchyard::server::{shutdown, ControlPlane, ControlPlaneConfig};
use switchyard::store::FileStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "switchyard", version, about)]
struct Args {
    /// JSON configuration file; missing keys keep their defaults
    #[arg(short, long, env = "SWITCHYARD_CONFIG")]
    config: Option<PathBuf>,

    /// JSON document holding listeners, routes and clusters
    #[arg(short, long, env = "SWITCHYARD_STORE", default_value = "entities.json")]
    store: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "SWITCHYARD_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Time between store polls, e.g. "2s"
    #[arg(long, env = "SWITCHYARD_POLL_INTERVAL", value_parser = parse_duration)]
    poll_interval: Option<Duration>,

    /// Discovery and health listen address
    #[arg(long, env = "SWITCHYARD_DISCOVERY_LISTEN")]
    discovery_listen: Option<SocketAddr>,

    /// Metrics listen address
    #[arg(long, env = "SWITCHYARD_ADMIN_LISTEN")]
    admin_listen: Option<SocketAddr>,
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    switchyard::core::parse_duration(text).ok_or_else(|| format!("invalid duration {text:?}"))
}

impl Args {
    fn control_plane_config(&self) -> anyhow::Result<ControlPlaneConfig> {
        let mut config = match &self.config {
            Some(path) => ControlPlaneConfig::from_file(path)?,
            None => ControlPlaneConfig::default(),
        };
        if let Some(interval) = self.poll_interval {
            config.poll_interval = interval;
        }
        if let Some(addr) = self.discovery_listen {
            config.discovery_listen = addr;
        }
        if let Some(addr) = self.admin_listen {
            config.admin_listen = addr;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    info!("{}", switchyard::version::version_string());

    let config = args.control_plane_config()?;
    info!(
        store = %args.store.display(),
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        discovery = %config.discovery_listen,
        admin = %config.admin_listen,
        "configuration loaded"
    );

    PrometheusBuilder::new()
        .with_http_listener(config.admin_listen)
        .install()
        .with_context(|| format!("cannot start metrics exporter on {}", config.admin_listen))?;

    let grace_period = config.grace_period;
    let plane = ControlPlane::new(config, Arc::new(FileStore::new(&args.store)))?;

    let controller = plane.shutdown_controller().clone();
    tokio::spawn(async move {
        shutdown::wait_for_signal().await;
        controller.shutdown(grace_period).await;
    });

    plane.run().await?;
    Ok(())
}

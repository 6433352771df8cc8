//! ping_exporter - Prometheus exporter for an ICMP probing engine
//!
//! Keeps the engine's monitored addresses in sync with DNS for a list of hostnames
//! and exposes the engine's per-address round trip and loss statistics as gauges.
//! The engine itself is supplied by the embedding binary through [`ProbeEngine`].

pub mod collector;
pub mod config;
pub mod error;
pub mod exporter;
pub mod probe;
pub mod server;
pub mod targets;

use std::sync::Arc;

use tracing::debug;

pub use collector::PingCollector;
pub use config::{Args, Config, ConfigError};
pub use error::{AppError, StartupError};
pub use exporter::Exporter;
pub use probe::{EngineError, IpVersion, ProbeEngine, ProbeKey, ProbeOptions, ProbeStatistics, Snapshot};
pub use targets::{ResolutionError, Target, TargetRegistry};

/// Entry point for a binary embedding the exporter.
///
/// Builds the configuration from `args`, installs logging, creates the engine with
/// `make_engine`, reconciles every target and serves HTTP until the server stops.
/// Nothing is served if any startup step fails.
pub async fn run<F>(args: Args, make_engine: F) -> Result<(), AppError>
where
    F: FnOnce(&Config) -> anyhow::Result<Arc<dyn ProbeEngine>>,
{
    let config = args.into_config().map_err(StartupError::from)?;
    logger::init_with_level(config.log_filter().map_err(StartupError::from)?);
    debug!("{config}");

    let engine = make_engine(&config).map_err(StartupError::Engine)?;
    let exporter = Exporter::start(&config, engine).await?;

    let served = server::serve(&config.web, exporter.registry().clone()).await;
    exporter.shutdown().await;

    Ok(served?)
}

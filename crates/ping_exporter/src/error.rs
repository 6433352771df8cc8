use std::io::Error as IoError;

use thiserror::Error;

use crate::config::ConfigError;

/// Conditions that keep the exporter from ever serving scrapes.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("no targets specified")]
    NoTargets,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to initialize probing engine: {0:#}")]
    Engine(anyhow::Error),

    #[error("failed to register ping collector: {0}")]
    Metrics(#[from] prometheus::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error("{0:#}")]
    Io(#[from] IoError),
}

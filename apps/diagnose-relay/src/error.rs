use thiserror::Error;

use crate::config::ConfigError;
use crate::telemetry::logging::InitError;
use crate::transport::ConnectionError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Connection(#[from] ConnectionError),
    #[error("logging initialization failed: {0}")]
    Logging(#[from] InitError),
}

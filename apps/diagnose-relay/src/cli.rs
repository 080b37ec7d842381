use clap::{Args, Parser};
use std::path::PathBuf;

use crate::config::{ConfigError, DEFAULT_HOST, DEFAULT_INTERVAL_MS, DEFAULT_PORT, RelayConfig};
use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "diagnose-relay",
    about = "Relay live diagnostic events from a diagnose backend to the terminal",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "DIAGNOSE_HOST",
        default_value = DEFAULT_HOST,
        help = "Host of the diagnose backend channel"
    )]
    pub host: String,

    #[arg(
        long,
        short = 'p',
        env = "DIAGNOSE_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Port of the diagnose backend channel"
    )]
    pub port: u16,

    #[arg(
        long,
        env = "DIAGNOSE_PATH",
        value_name = "PATH",
        help = "Optional URL path of the backend channel"
    )]
    pub path: Option<String>,

    #[arg(
        long,
        env = "DIAGNOSE_TLS",
        action = clap::ArgAction::SetTrue,
        help = "Connect with wss:// instead of ws://"
    )]
    pub tls: bool,

    #[arg(
        long = "interval-ms",
        short = 'i',
        env = "DIAGNOSE_INTERVAL_MS",
        value_name = "MS",
        default_value_t = DEFAULT_INTERVAL_MS,
        help = "Milliseconds between presented events"
    )]
    pub interval_ms: u64,

    #[arg(
        long,
        action = clap::ArgAction::SetTrue,
        help = "Start the session as soon as the channel is open"
    )]
    pub autostart: bool,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

impl Cli {
    pub fn relay_config(&self) -> Result<RelayConfig, ConfigError> {
        Ok(RelayConfig::new(&self.host, self.port, self.interval_ms)?
            .with_path(self.path.clone())
            .with_tls(self.tls))
    }
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "DIAGNOSE_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "DIAGNOSE_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

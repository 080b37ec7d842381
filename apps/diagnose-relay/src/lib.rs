pub mod app;
pub mod buffer;
pub mod cli;
pub mod config;
pub mod consumer;
pub mod error;
pub mod present;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use diagnose_proto::{Command, DiagnosticEvent};

use diagnose_proto::{Command, DiagnosticEvent};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub mod mock;
pub mod websocket;

/// What the backend channel hands to its owner. Decoding already happened;
/// malformed payloads never make it this far.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Event(DiagnosticEvent),
    /// The backend went away. Delivered once, after the last event.
    Closed,
}

/// Outbound half of the backend channel, as seen by the session controller.
pub trait CommandChannel: Send {
    /// Queue a command for the backend. Fails instead of dropping when the
    /// channel is not open.
    fn send(&self, command: Command) -> Result<(), ChannelError>;

    fn is_open(&self) -> bool;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel is closed; cannot send `{command}`")]
    Closed { command: Command },
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid channel url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to open channel to {url}: {source}")]
    Handshake {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
}

/// Inbound counters shared between the reader task and its owner.
#[derive(Debug, Default)]
pub struct ChannelStats {
    received: AtomicU64,
    malformed: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStatsSnapshot {
    pub received: u64,
    pub malformed: u64,
}

impl ChannelStats {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ChannelStatsSnapshot {
        ChannelStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

use diagnose_proto::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{ChannelError, CommandChannel};

/// In-memory command channel that records everything sent through it.
/// Clones share the same log, so a test can keep one handle while the
/// controller owns another.
#[derive(Clone, Debug)]
pub struct MockChannel {
    sent: Arc<Mutex<Vec<Command>>>,
    open: Arc<AtomicBool>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn sent(&self) -> Vec<Command> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Simulate the backend dropping the connection.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandChannel for MockChannel {
    fn send(&self, command: Command) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed { command });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(command);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

use diagnose_proto::DiagnosticEvent;
use serde::Serialize;
use std::collections::VecDeque;

/// An event waiting to be presented, stamped with its arrival number.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedEvent {
    pub seq: u64,
    pub event: DiagnosticEvent,
}

/// Unbounded FIFO of pending events. Arrivals append at the back, the
/// consumer takes from the front; nothing is ever reordered or merged.
#[derive(Debug, Default)]
pub struct EventBuffer {
    pending: VecDeque<BufferedEvent>,
    next_seq: u64,
    consumed: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub pending: usize,
    pub enqueued: u64,
    pub consumed: u64,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its arrival number.
    pub fn enqueue(&mut self, event: DiagnosticEvent) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push_back(BufferedEvent { seq, event });
        seq
    }

    /// Remove the earliest pending event. An empty buffer is the normal
    /// steady state, not an error.
    pub fn dequeue_oldest(&mut self) -> Option<BufferedEvent> {
        let item = self.pending.pop_front()?;
        self.consumed += 1;
        Some(item)
    }

    pub fn peek_oldest(&self) -> Option<&BufferedEvent> {
        self.pending.front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending event, returning how many were discarded.
    /// Arrival numbering continues where it left off.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            pending: self.pending.len(),
            enqueued: self.next_seq,
            consumed: self.consumed,
        }
    }
}

//! Session lifecycle for the event relay.
//!
//! A [`Controller`] owns the pending-event buffer, the consumer timer and the
//! outbound half of the backend channel. Everything runs on one task: arrivals,
//! ticks and control clicks each perform a single mutation and return, so the
//! buffer never needs a lock and presentation order is arrival order.

pub mod controls;
pub mod runner;

use diagnose_proto::{Command, DiagnosticEvent};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::buffer::{BufferStats, EventBuffer};
use crate::consumer::{ConsumerLoop, TickInterval};
use crate::present::PresentationSink;
use crate::transport::{ChannelError, ChannelEvent, CommandChannel};
use controls::{ControlSurface, ControlView};

pub use runner::{ControlInput, RelayReport, RelaySession, UnknownControl, drive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    Pause,
    Resume,
    Stop,
    Toggle,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Start => "start",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Stop => "stop",
            Operation::Toggle => "toggle",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("cannot {operation} while session is {state}")]
    InvalidTransition {
        operation: Operation,
        state: SessionState,
    },
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Result of one consumer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running; the buffer was not touched.
    Inactive,
    Empty,
    Presented { seq: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub pending: usize,
    pub enqueued: u64,
    pub presented: u64,
}

pub struct Controller<C: CommandChannel> {
    state: SessionState,
    buffer: EventBuffer,
    consumer: ConsumerLoop,
    interval: TickInterval,
    channel: C,
    sink: Box<dyn PresentationSink>,
    surface: Box<dyn ControlSurface>,
    presented: u64,
}

impl<C: CommandChannel> Controller<C> {
    pub fn new(
        channel: C,
        interval: TickInterval,
        sink: Box<dyn PresentationSink>,
        mut surface: Box<dyn ControlSurface>,
    ) -> Self {
        surface.render(&ControlView::for_state(SessionState::Idle));
        Self {
            state: SessionState::Idle,
            buffer: EventBuffer::new(),
            consumer: ConsumerLoop::new(),
            interval,
            channel,
            sink,
            surface,
            presented: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn interval(&self) -> TickInterval {
        self.interval
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn is_consuming(&self) -> bool {
        self.consumer.is_active()
    }

    /// `Idle → Running`. Tells the backend to start and begins consuming.
    /// If the command cannot be sent the session stays idle.
    pub fn start(&mut self) -> Result<(), ControllerError> {
        self.require(Operation::Start, &[SessionState::Idle])?;
        self.channel.send(Command::Start)?;
        self.consumer.activate(self.interval);
        self.transition(SessionState::Running);
        Ok(())
    }

    /// `Running → Paused`. Local only: the backend keeps streaming and
    /// arrivals pile up in the buffer until `resume`.
    pub fn pause(&mut self) -> Result<(), ControllerError> {
        self.require(Operation::Pause, &[SessionState::Running])?;
        self.consumer.deactivate();
        self.transition(SessionState::Paused);
        Ok(())
    }

    /// `Paused → Running` at the same cadence. Local only.
    pub fn resume(&mut self) -> Result<(), ControllerError> {
        self.require(Operation::Resume, &[SessionState::Paused])?;
        self.consumer.activate(self.interval);
        self.transition(SessionState::Running);
        Ok(())
    }

    /// `Running | Paused → Stopped`. Terminal. The session is stopped even
    /// when the backend can no longer be told; that failure is returned.
    pub fn stop(&mut self) -> Result<(), ControllerError> {
        self.require(
            Operation::Stop,
            &[SessionState::Running, SessionState::Paused],
        )?;
        self.consumer.deactivate();
        let sent = self.channel.send(Command::Stop);
        let discarded = self.buffer.clear();
        if discarded > 0 {
            debug!(target: "diagnose::session", discarded, "discarding unpresented events");
        }
        self.transition(SessionState::Stopped);
        sent.map_err(ControllerError::from)
    }

    /// Click on the start/pause toggle.
    pub fn toggle(&mut self) -> Result<SessionState, ControllerError> {
        match self.state {
            SessionState::Idle => self.start()?,
            SessionState::Running => self.pause()?,
            SessionState::Paused => self.resume()?,
            SessionState::Stopped => {
                return Err(ControllerError::InvalidTransition {
                    operation: Operation::Toggle,
                    state: self.state,
                });
            }
        }
        Ok(self.state)
    }

    /// One consumer step. Only touches the buffer while running.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != SessionState::Running {
            return TickOutcome::Inactive;
        }
        match ConsumerLoop::step(&mut self.buffer, self.sink.as_mut()) {
            Some(seq) => {
                self.presented += 1;
                trace!(target: "diagnose::session", seq, pending = self.buffer.len(), "presented event");
                TickOutcome::Presented { seq }
            }
            None => TickOutcome::Empty,
        }
    }

    /// Waits for the consumer timer. Never resolves unless running.
    pub async fn next_tick(&mut self) {
        self.consumer.ticked().await;
    }

    /// Record an arrival. Returns its arrival number, or `None` once the
    /// session has stopped and arrivals are discarded.
    pub fn enqueue(&mut self, event: DiagnosticEvent) -> Option<u64> {
        if self.state == SessionState::Stopped {
            debug!(target: "diagnose::session", target_id = %event.target_id, "discarding event after stop");
            return None;
        }
        let seq = self.buffer.enqueue(event);
        trace!(target: "diagnose::session", seq, pending = self.buffer.len(), "event buffered");
        Some(seq)
    }

    pub fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Event(event) => {
                self.enqueue(event);
            }
            ChannelEvent::Closed => {
                warn!(
                    target: "diagnose::session",
                    state = %self.state,
                    pending = self.buffer.len(),
                    "backend channel closed"
                );
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let BufferStats {
            pending, enqueued, ..
        } = self.buffer.stats();
        SessionSnapshot {
            state: self.state,
            pending,
            enqueued,
            presented: self.presented,
        }
    }

    /// Push the current snapshot to the control surface.
    pub fn report_status(&mut self) {
        let snapshot = self.snapshot();
        self.surface.report(&snapshot);
    }

    fn require(
        &self,
        operation: Operation,
        allowed: &[SessionState],
    ) -> Result<(), ControllerError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ControllerError::InvalidTransition {
                operation,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, next: SessionState) {
        info!(target: "diagnose::session", from = %self.state, to = %next, "session transition");
        self.state = next;
        self.surface.render(&ControlView::for_state(next));
    }
}

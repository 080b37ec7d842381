use std::future;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, trace};

use crate::buffer::EventBuffer;
use crate::present::PresentationSink;

pub const DEFAULT_PERIOD_MS: u64 = 500;

/// Consumption cadence. Controls pacing only, never ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInterval(Duration);

impl Default for TickInterval {
    fn default() -> Self {
        Self(Duration::from_millis(DEFAULT_PERIOD_MS))
    }
}

impl TickInterval {
    /// `None` for a zero period, which would spin the consumer.
    pub fn new(period: Duration) -> Option<Self> {
        (!period.is_zero()).then_some(Self(period))
    }

    pub fn from_millis(ms: u64) -> Option<Self> {
        Self::new(Duration::from_millis(ms))
    }

    pub fn period(self) -> Duration {
        self.0
    }
}

/// Cancelable periodic handle. Dropping it cancels it.
#[derive(Debug)]
pub struct ConsumerTimer {
    ticker: Interval,
    interval: TickInterval,
}

impl ConsumerTimer {
    fn start(interval: TickInterval) -> Self {
        let period = interval.period();
        // First tick lands one full period after activation.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker, interval }
    }
}

/// Timer-driven puller: at most one timer, one event per tick.
#[derive(Debug, Default)]
pub struct ConsumerLoop {
    timer: Option<ConsumerTimer>,
}

impl ConsumerLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking. An already running timer is replaced, never doubled.
    pub fn activate(&mut self, interval: TickInterval) {
        if self.timer.take().is_some() {
            debug!(target: "diagnose::consumer", "replacing active consumer timer");
        }
        self.timer = Some(ConsumerTimer::start(interval));
        trace!(target: "diagnose::consumer", period_ms = interval.period().as_millis() as u64, "consumer active");
    }

    /// Cancel the timer. Returns whether one was running.
    pub fn deactivate(&mut self) -> bool {
        let was_active = self.timer.take().is_some();
        if was_active {
            trace!(target: "diagnose::consumer", "consumer inactive");
        }
        was_active
    }

    pub fn is_active(&self) -> bool {
        self.timer.is_some()
    }

    pub fn interval(&self) -> Option<TickInterval> {
        self.timer.as_ref().map(|timer| timer.interval)
    }

    /// Resolves on the next tick; pending forever while inactive. Cancel
    /// safe, so it can sit in a `select!`.
    pub async fn ticked(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.ticker.tick().await;
            }
            None => future::pending::<()>().await,
        }
    }

    /// One consumer step: take the oldest event, if any, and present it.
    pub fn step(buffer: &mut EventBuffer, sink: &mut dyn PresentationSink) -> Option<u64> {
        let item = buffer.dequeue_oldest()?;
        sink.highlight(&item.event);
        Some(item.seq)
    }
}

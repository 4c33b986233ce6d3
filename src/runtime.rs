use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crate::config::RaceConfig;

/// Repeating deadline driven by the caller's clock.
///
/// A late poll fires once and reschedules from `now`, so a stalled loop
/// never produces a burst of catch-up ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    period: Duration,
    next_due: Option<Instant>,
}

impl Interval {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now + self.period);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    /// Returns true at most once per call when the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_due else {
            return false;
        };
        if now < due {
            return false;
        }
        let next = due + self.period;
        self.next_due = Some(if next > now { next } else { now + self.period });
        true
    }
}

/// The two intervals that run while a race is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceTimers {
    pub tick: Interval,
    pub broadcast: Interval,
}

impl RaceTimers {
    pub fn new(config: &RaceConfig) -> Self {
        Self {
            tick: Interval::new(config.tick_interval),
            broadcast: Interval::new(config.broadcast_interval),
        }
    }

    /// The broadcast interval only runs when there is a peer to send to.
    pub fn start(&mut self, now: Instant, multiplayer: bool) {
        self.tick.start(now);
        if multiplayer {
            self.broadcast.start(now);
        } else {
            self.broadcast.cancel();
        }
    }

    pub fn cancel(&mut self) {
        self.tick.cancel();
        self.broadcast.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.tick.is_active() || self.broadcast.is_active()
    }
}

/// Unified event type consumed by the race runner
#[derive(Clone, Debug, PartialEq)]
pub enum RaceEvent {
    /// Full contents of a player's input field after an edit.
    Input { player: usize, text: String },
    Quit,
    Tick,
}

/// Source of input events
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<RaceEvent, RecvTimeoutError>;
}

/// Event source fed through an mpsc channel
pub struct ChannelEventSource {
    rx: Receiver<RaceEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<RaceEvent>) -> Self {
        Self { rx }
    }

    pub fn pair() -> (Sender<RaceEvent>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }
}

impl EventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<RaceEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> RaceEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                RaceEvent::Tick
            }
        }
    }
}

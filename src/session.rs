use std::time::{Duration, Instant};

use crate::content::Difficulty;
use crate::metrics::{self, MetricsCounters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Idle,
    Loading,
    Playing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Single,
    Host,
    Client,
}

impl Mode {
    pub fn is_multiplayer(self) -> bool {
        self != Mode::Single
    }
}

/// State of one race, from difficulty selection through results.
#[derive(Debug, Clone)]
pub struct Session {
    pub status: Status,
    pub mode: Mode,
    pub difficulty: Difficulty,
    /// Fixed for the race once loaded; typing cycles through it.
    pub sentences: Vec<String>,
    pub sentence_index: usize,
    pub input_buffer: String,
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
    pub time_remaining: Duration,
    pub counters: MetricsCounters,
}

impl Session {
    pub fn new(duration: Duration) -> Self {
        Self {
            status: Status::Idle,
            mode: Mode::Single,
            difficulty: Difficulty::default(),
            sentences: Vec::new(),
            sentence_index: 0,
            input_buffer: String::new(),
            started_at: None,
            ended_at: None,
            time_remaining: duration,
            counters: MetricsCounters::default(),
        }
    }

    /// Enters `Playing` with fresh counters, keeping mode and difficulty.
    pub fn begin(&mut self, sentences: Vec<String>, now: Instant, duration: Duration) {
        self.clear(duration);
        self.sentences = sentences;
        self.started_at = Some(now);
        self.status = Status::Playing;
    }

    /// Drops all per-race data, keeping mode, difficulty and status.
    pub fn clear(&mut self, duration: Duration) {
        self.sentences.clear();
        self.sentence_index = 0;
        self.input_buffer.clear();
        self.started_at = None;
        self.ended_at = None;
        self.time_remaining = duration;
        self.counters = MetricsCounters::default();
    }

    pub fn current_target(&self) -> Option<&str> {
        self.sentences.get(self.sentence_index).map(String::as_str)
    }

    /// Moves to the next sentence, wrapping to the first after the last.
    /// Returns the new index.
    pub fn advance_sentence(&mut self) -> usize {
        if !self.sentences.is_empty() {
            self.sentence_index = (self.sentence_index + 1) % self.sentences.len();
        }
        self.input_buffer.clear();
        self.sentence_index
    }

    /// Time raced so far; frozen once the race has ended.
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.started_at {
            Some(start) => self.ended_at.unwrap_or(now).saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }

    pub fn progress(&self) -> f64 {
        let target_len = self.current_target().map_or(0, |t| t.chars().count());
        metrics::progress(
            self.sentence_index,
            self.input_buffer.chars().count(),
            target_len,
            self.sentences.len(),
        )
    }
}

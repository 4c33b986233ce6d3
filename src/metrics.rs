use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Characters that make up one "word" for WPM purposes.
pub const CHARS_PER_WORD: f64 = 5.0;

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    Incorrect,
}

/// The single scored character produced by one input update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Keystroke {
    /// Char index in the target sentence the typed character landed on.
    pub index: usize,
    pub typed: char,
    /// `None` when the input ran past the end of the target.
    pub expected: Option<char>,
    pub outcome: Outcome,
}

impl Keystroke {
    /// The ErrorMap key to charge for this keystroke, if it was a miss.
    pub fn miss_key(&self) -> Option<char> {
        match self.outcome {
            Outcome::Correct => None,
            Outcome::Incorrect => self.expected.map(fold_case),
        }
    }
}

pub fn fold_case(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Scores the transition from `previous` to `input` against `target`.
///
/// Only growth is scored, and only at the last position of the new input:
/// a paste or multi-character jump is treated like a single keystroke.
/// Deletions return `None` and never revise earlier scoring.
pub fn score_input(previous: &str, input: &str, target: &str) -> Option<Keystroke> {
    let typed_len = input.chars().count();
    if typed_len <= previous.chars().count() {
        return None;
    }

    let index = typed_len - 1;
    let typed = input.chars().last()?;
    let expected = target.chars().nth(index);
    let outcome = if expected == Some(typed) {
        Outcome::Correct
    } else {
        Outcome::Incorrect
    };

    Some(Keystroke {
        index,
        typed,
        expected,
        outcome,
    })
}

/// Raw per-race counters. Both only ever grow, and `correct_chars` can never
/// exceed `total_chars_typed` since every recorded outcome bumps the total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsCounters {
    correct_chars: u64,
    total_chars_typed: u64,
}

impl MetricsCounters {
    pub fn record(&mut self, outcome: Outcome) {
        if outcome == Outcome::Correct {
            self.correct_chars += 1;
        }
        self.total_chars_typed += 1;
    }

    pub fn correct_chars(&self) -> u64 {
        self.correct_chars
    }

    pub fn total_chars_typed(&self) -> u64 {
        self.total_chars_typed
    }

    pub fn wpm(&self, elapsed: Duration) -> u32 {
        wpm(self.correct_chars, elapsed)
    }

    pub fn accuracy(&self) -> u32 {
        accuracy(self.correct_chars, self.total_chars_typed)
    }
}

/// Words per minute from correctly typed characters.
pub fn wpm(correct_chars: u64, elapsed: Duration) -> u32 {
    let minutes = elapsed.as_secs_f64() / 60.0;
    if minutes <= 0.0 {
        return 0;
    }
    ((correct_chars as f64 / CHARS_PER_WORD) / minutes).round() as u32
}

/// Percentage of typed characters that were correct; 100 before any typing.
pub fn accuracy(correct_chars: u64, total_chars_typed: u64) -> u32 {
    if total_chars_typed == 0 {
        return 100;
    }
    ((correct_chars as f64 / total_chars_typed as f64) * 100.0).round() as u32
}

/// Fraction of the sentence list completed, counting the partially typed
/// current sentence.
pub fn progress(
    sentence_index: usize,
    typed_len: usize,
    target_len: usize,
    sentence_count: usize,
) -> f64 {
    if sentence_count == 0 {
        return 0.0;
    }
    let within = if target_len == 0 {
        0.0
    } else {
        (typed_len as f64 / target_len as f64).min(1.0)
    };
    ((sentence_index as f64 + within) / sentence_count as f64).clamp(0.0, 1.0)
}

/// Misses per expected character, keyed by the lowercased character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorMap(BTreeMap<char, u32>);

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charges one miss to `expected` and returns the key used.
    pub fn record(&mut self, expected: char) -> char {
        let key = fold_case(expected);
        *self.0.entry(key).or_insert(0) += 1;
        key
    }

    pub fn get(&self, c: char) -> u32 {
        self.0.get(&fold_case(c)).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, u32)> + '_ {
        self.0.iter().map(|(&c, &n)| (c, n))
    }
}

/// Instantaneous derived metrics handed to presentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub wpm: u32,
    pub accuracy: u32,
    pub progress: f64,
    pub time_left: Duration,
}

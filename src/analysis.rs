//! Post-race analysis.
//!
//! [`AnalysisRecorder`] collects one [`HistorySample`] per race tick together
//! with the per-character miss tally and a running peak. When the race ends
//! it is folded into an immutable [`AnalysisData`] for the results screen.

use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::content::Difficulty;
use crate::metrics::ErrorMap;
use crate::time_series::HistorySample;

#[derive(Debug, Clone, Default)]
pub struct AnalysisRecorder {
    history: Vec<HistorySample>,
    errors: ErrorMap,
    peak_wpm: u32,
}

/// End-of-race values the recorder does not track itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaceSummary {
    pub final_wpm: u32,
    pub accuracy: u32,
    pub total_time: Duration,
    pub difficulty: Difficulty,
    pub opponent_final_wpm: Option<u32>,
}

impl AnalysisRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears history, errors and peak for a fresh race.
    pub fn reset(&mut self) {
        self.history.clear();
        self.errors = ErrorMap::new();
        self.peak_wpm = 0;
    }

    pub fn sample(
        &mut self,
        elapsed: Duration,
        wpm: u32,
        opponent_wpm: Option<u32>,
    ) -> HistorySample {
        let sample = HistorySample::new(elapsed.as_secs_f64(), wpm, opponent_wpm);
        self.history.push(sample);
        self.observe_peak(wpm);
        sample
    }

    pub fn observe_peak(&mut self, wpm: u32) {
        self.peak_wpm = self.peak_wpm.max(wpm);
    }

    pub fn record_miss(&mut self, expected: char) -> char {
        self.errors.record(expected)
    }

    pub fn history(&self) -> &[HistorySample] {
        &self.history
    }

    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    pub fn peak_wpm(&self) -> u32 {
        self.peak_wpm
    }

    pub fn finalize(&self, summary: RaceSummary) -> AnalysisData {
        let sampled: Vec<f64> = self.history.iter().map(|s| s.wpm as f64).collect();
        let avg_wpm = mean(&sampled).map_or(summary.final_wpm, |m| m.round() as u32);

        AnalysisData {
            history: self.history.clone(),
            errors: self.errors.clone(),
            avg_wpm,
            peak_wpm: self.peak_wpm.max(summary.final_wpm),
            final_wpm: summary.final_wpm,
            wpm_std_dev: std_dev(&sampled).unwrap_or(0.0),
            total_time_secs: summary.total_time.as_secs_f64(),
            accuracy: summary.accuracy,
            difficulty: summary.difficulty,
            opponent_final_wpm: summary.opponent_final_wpm,
            finished_at: Local::now(),
        }
    }
}

/// Results of one finished race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisData {
    pub history: Vec<HistorySample>,
    pub errors: ErrorMap,
    pub avg_wpm: u32,
    pub peak_wpm: u32,
    pub final_wpm: u32,
    /// Spread of the sampled WPM; lower is steadier.
    pub wpm_std_dev: f64,
    pub total_time_secs: f64,
    pub accuracy: u32,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_final_wpm: Option<u32>,
    pub finished_at: DateTime<Local>,
}

impl AnalysisData {
    /// Most-missed characters, worst first; ties are alphabetical.
    pub fn top_errors(&self, n: usize) -> Vec<(char, u32)> {
        self.errors
            .iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
            .take(n)
            .collect()
    }

    /// X (seconds) and Y (WPM) extents for a results chart.
    pub fn chart_bounds(&self) -> (f64, f64) {
        let duration = self
            .history
            .last()
            .map_or(self.total_time_secs, |s| s.time)
            .max(1.0);

        let highest = self
            .history
            .iter()
            .flat_map(|s| std::iter::once(s.wpm).chain(s.opponent_wpm))
            .max()
            .unwrap_or(0);

        (duration, highest as f64)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

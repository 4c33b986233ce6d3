use serde::{Deserialize, Serialize};

/// One WPM sample taken on the race tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    /// Seconds since the race started.
    pub time: f64,
    pub wpm: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_wpm: Option<u32>,
}

impl HistorySample {
    pub fn new(time: f64, wpm: u32, opponent_wpm: Option<u32>) -> Self {
        Self {
            time,
            wpm,
            opponent_wpm,
        }
    }
}

impl From<HistorySample> for (f64, f64) {
    fn from(s: HistorySample) -> Self {
        (s.time, s.wpm as f64)
    }
}

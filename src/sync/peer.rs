use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::protocol::UpdatePayload;

const PEER_ID_LEN: usize = 6;

/// Identity a peer is reachable under on the signaling service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Short, human-shareable identity such as `K3Q9ZB`.
    pub fn random() -> Self {
        let id = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PEER_ID_LEN)
            .map(|b| (b as char).to_ascii_uppercase())
            .collect::<String>();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Host,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerState {
    pub local_id: PeerId,
    pub role: Role,
    pub connected: bool,
    pub remote_id: Option<PeerId>,
}

/// Latest known state of the remote racer.
///
/// Fields are merged last-received-wins: an UPDATE that was sent earlier but
/// arrives later overwrites a fresher one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpponentSnapshot {
    pub wpm: u32,
    pub progress: f64,
    pub identity: Option<PeerId>,
    pub finished_wpm: Option<u32>,
}

impl OpponentSnapshot {
    pub fn merge(&mut self, update: &UpdatePayload) {
        if let Some(wpm) = update.wpm {
            self.wpm = wpm;
        }
        if let Some(progress) = update.progress {
            self.progress = if progress.is_finite() {
                progress.clamp(0.0, 1.0)
            } else {
                0.0
            };
        }
        if let Some(id) = &update.id {
            self.identity = Some(id.clone());
        }
    }

    /// Clears race values but remembers who the opponent is.
    pub fn reset(&mut self) {
        *self = Self {
            identity: self.identity.take(),
            ..Self::default()
        };
    }
}

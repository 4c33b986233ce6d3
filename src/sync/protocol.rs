//! Wire format.
//!
//! Every frame is a JSON object `{"type": ..., "payload": ...}`. There is no
//! version field; both peers must run compatible builds.

use serde::{Deserialize, Serialize};

use super::peer::PeerId;
use crate::content::Difficulty;
use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Host -> client: the race content. The client starts on receipt.
    Init(InitPayload),
    /// Either side: periodic progress report.
    Update(UpdatePayload),
    /// Either side: final score. Informational only.
    Finish(FinishPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Init,
    Update,
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub sentences: Vec<String>,
    pub difficulty: Difficulty,
    pub host_id: PeerId,
}

/// Every field is optional so a partial update only overwrites what it
/// carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wpm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PeerId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishPayload {
    pub wpm: u32,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Init(_) => MessageKind::Init,
            Message::Update(_) => MessageKind::Update,
            Message::Finish(_) => MessageKind::Finish,
        }
    }

    pub fn encode(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(|e| SyncError::MalformedMessage(e.to_string()))
    }

    /// Unknown `type` values and payloads of the wrong shape are both
    /// reported as [`SyncError::MalformedMessage`].
    pub fn decode(frame: &str) -> Result<Self, SyncError> {
        serde_json::from_str(frame).map_err(|e| SyncError::MalformedMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::{json, Value};

    #[test]
    fn init_wire_shape() {
        let msg = Message::Init(InitPayload {
            sentences: vec!["The fox runs.".to_string()],
            difficulty: Difficulty::Medium,
            host_id: PeerId::new("HOST01"),
        });
        let value: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "INIT",
                "payload": {
                    "sentences": ["The fox runs."],
                    "difficulty": "MEDIUM",
                    "hostId": "HOST01"
                }
            })
        );
    }

    #[test]
    fn decode_update() {
        let msg =
            Message::decode(r#"{"type":"UPDATE","payload":{"wpm":40,"progress":0.2,"id":"X"}}"#)
                .unwrap();
        assert_eq!(msg.kind(), MessageKind::Update);
        assert_matches!(msg, Message::Update(UpdatePayload { wpm: Some(40), .. }));
    }

    #[test]
    fn decode_partial_update() {
        let msg = Message::decode(r#"{"type":"UPDATE","payload":{"progress":0.5}}"#).unwrap();
        assert_eq!(
            msg,
            Message::Update(UpdatePayload {
                wpm: None,
                progress: Some(0.5),
                id: None,
            })
        );
    }

    #[test]
    fn decode_finish() {
        let msg = Message::decode(r#"{"type":"FINISH","payload":{"wpm":71}}"#).unwrap();
        assert_eq!(msg, Message::Finish(FinishPayload { wpm: 71 }));
    }

    #[test]
    fn unknown_type_is_malformed() {
        assert_matches!(
            Message::decode(r#"{"type":"CHAT","payload":{"text":"hi"}}"#),
            Err(SyncError::MalformedMessage(_))
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert_matches!(Message::decode("not json"), Err(SyncError::MalformedMessage(_)));
        assert_matches!(
            Message::decode(r#"{"type":"FINISH","payload":{}}"#),
            Err(SyncError::MalformedMessage(_))
        );
    }

    #[test]
    fn kind_display() {
        assert_eq!(MessageKind::Init.to_string(), "INIT");
        assert_eq!(MessageKind::Finish.to_string(), "FINISH");
    }
}

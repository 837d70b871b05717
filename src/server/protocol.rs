//! Wire messages: one JSON object per line, discriminated by `type`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::actions::DoAction;
use crate::pipeline::{
    HistoryEntry, InsertPosition, ModerationAction, QueueSnapshot, SchedulerEvent,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("missing field: {0}")]
    MissingField(String),
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerateVerb {
    Allow,
    Refund,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Inbound {
    Tts {
        text: String,
        alias: Option<String>,
        username: Option<String>,
        redemption_id: Option<String>,
        reward_id: Option<String>,
    },
    PlaybackFinished {
        id: Uuid,
        duration_ms: Option<u64>,
    },
    Pause,
    Resume,
    Clear,
    Cancel {
        id: Uuid,
    },
    Moderate {
        id: Uuid,
        action: ModerateVerb,
        position: Option<InsertPosition>,
    },
    Replay {
        id: Uuid,
        position: Option<InsertPosition>,
        use_show_hide: Option<bool>,
    },
    Refund {
        id: Uuid,
    },
    Queue,
}

impl Inbound {
    /// Parse one line.
    ///
    /// ```
    /// use stream_tts::server::protocol::Inbound;
    ///
    /// let msg = Inbound::parse(r#"{"type":"TTS","text":"hi","redemptionId":"r1"}"#).unwrap();
    /// assert!(matches!(msg, Inbound::Tts { ref text, .. } if text == "hi"));
    /// ```
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let message: Inbound = serde_json::from_str(line).map_err(classify)?;
        if let Inbound::Tts { text, .. } = &message {
            if text.trim().is_empty() {
                return Err(ProtocolError::MissingField("text".into()));
            }
        }
        Ok(message)
    }
}

fn classify(e: serde_json::Error) -> ProtocolError {
    let message = e.to_string();
    match message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
    {
        Some(field) => ProtocolError::MissingField(field.to_string()),
        None => ProtocolError::Malformed(message),
    }
}

impl ModerateVerb {
    pub fn into_action(self, position: Option<InsertPosition>) -> ModerationAction {
        match self {
            ModerateVerb::Allow => ModerationAction::Allow(position.unwrap_or_default()),
            ModerateVerb::Refund => ModerationAction::Refund,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Outbound {
    TtsQueued {
        id: Uuid,
        position: usize,
        status: &'static str,
    },
    Error {
        message: String,
    },
    Result {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Uuid>,
    },
    QueueUpdate {
        #[serde(flatten)]
        snapshot: QueueSnapshot,
    },
    Play {
        id: Uuid,
        /// Base64-encoded audio.
        audio: String,
        volume: u32,
    },
    HistoryAdded {
        entry: HistoryEntry,
    },
    Action {
        #[serde(flatten)]
        action: DoAction,
    },
}

impl Outbound {
    pub fn queued(id: Uuid, position: usize) -> Self {
        Outbound::TtsQueued {
            id,
            position,
            status: "queued",
        }
    }

    pub fn ok() -> Self {
        Outbound::Result {
            success: true,
            message: None,
            id: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Outbound::Result {
            success: false,
            message: Some(message.into()),
            id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Outbound::Error {
            message: message.into(),
        }
    }

    /// Serialize as a single line, newline included.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl From<SchedulerEvent> for Outbound {
    fn from(event: SchedulerEvent) -> Self {
        match event {
            SchedulerEvent::QueueUpdated(snapshot) => Outbound::QueueUpdate { snapshot },
            SchedulerEvent::Play { id, audio, volume } => Outbound::Play {
                id,
                audio: STANDARD.encode(audio),
                volume,
            },
            SchedulerEvent::HistoryAdded(entry) => Outbound::HistoryAdded { entry },
        }
    }
}

impl From<DoAction> for Outbound {
    fn from(action: DoAction) -> Self {
        Outbound::Action { action }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionRef;

    #[test]
    fn parses_tts_with_camel_case_ids() {
        let msg = Inbound::parse(
            r#"{"type":"TTS","text":"hello","alias":"narrator","username":"viewer","redemptionId":"r1","rewardId":"w1"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            Inbound::Tts {
                text: "hello".into(),
                alias: Some("narrator".into()),
                username: Some("viewer".into()),
                redemption_id: Some("r1".into()),
                reward_id: Some("w1".into()),
            }
        );
    }

    #[test]
    fn parses_control_messages() {
        let id = Uuid::new_v4();
        assert_eq!(Inbound::parse(r#"{"type":"PAUSE"}"#), Ok(Inbound::Pause));
        assert_eq!(
            Inbound::parse(&format!(
                r#"{{"type":"PLAYBACK_FINISHED","id":"{id}","durationMs":1500}}"#
            )),
            Ok(Inbound::PlaybackFinished {
                id,
                duration_ms: Some(1500)
            })
        );
        assert_eq!(
            Inbound::parse(&format!(
                r#"{{"type":"MODERATE","id":"{id}","action":"allow","position":"front"}}"#
            )),
            Ok(Inbound::Moderate {
                id,
                action: ModerateVerb::Allow,
                position: Some(InsertPosition::Front)
            })
        );
        assert_eq!(
            Inbound::parse(&format!(r#"{{"type":"REPLAY","id":"{id}","useShowHide":true}}"#)),
            Ok(Inbound::Replay {
                id,
                position: None,
                use_show_hide: Some(true)
            })
        );
    }

    #[test]
    fn missing_and_blank_text_are_reported() {
        assert_eq!(
            Inbound::parse(r#"{"type":"TTS"}"#),
            Err(ProtocolError::MissingField("text".into()))
        );
        assert_eq!(
            Inbound::parse(r#"{"type":"TTS","text":"   "}"#),
            Err(ProtocolError::MissingField("text".into()))
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            Inbound::parse("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            Inbound::parse(r#"{"type":"DANCE"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn allow_defaults_to_back() {
        assert_eq!(
            ModerateVerb::Allow.into_action(None),
            ModerationAction::Allow(InsertPosition::Back)
        );
    }

    #[test]
    fn outbound_shapes() {
        let id = Uuid::new_v4();
        let queued = serde_json::to_value(Outbound::queued(id, 3)).unwrap();
        assert_eq!(queued["type"], "TTS_QUEUED");
        assert_eq!(queued["position"], 3);
        assert_eq!(queued["status"], "queued");

        let play: Outbound = SchedulerEvent::Play {
            id,
            audio: b"abc".to_vec(),
            volume: 80,
        }
        .into();
        let play = serde_json::to_value(play).unwrap();
        assert_eq!(play["type"], "PLAY");
        assert_eq!(play["audio"], "YWJj");
        assert_eq!(play["volume"], 80);

        let result = serde_json::to_value(Outbound::ok()).unwrap();
        assert_eq!(result, serde_json::json!({"type": "RESULT", "success": true}));

        let action = serde_json::to_value(Outbound::from(DoAction {
            request: "DoAction",
            id: "hide-1".into(),
            action: ActionRef { id: "a1".into() },
            args: None,
        }))
        .unwrap();
        assert_eq!(action["type"], "ACTION");
        assert_eq!(action["request"], "DoAction");
        assert_eq!(action["action"]["id"], "a1");
    }

    #[test]
    fn lines_end_with_newline() {
        let line = Outbound::error("bad").to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}

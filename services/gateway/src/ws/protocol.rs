//! Defines the WebSocket message protocol between the device and the gateway.
//!
//! Text frames carry JSON objects with a `type` field; binary frames carry
//! encoded audio in both directions.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// How the client signals the start and end of speech.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenMode {
    /// The client sends explicit `start` / `stop`.
    Manual,
    /// The gateway decides utterance boundaries with voice-activity detection.
    #[default]
    Auto,
    /// Like `auto`, with the client streaming continuously.
    Realtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenState {
    Start,
    Stop,
    Detect,
}

/// Message types the gateway has handlers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello,
    Listen,
    Abort,
}

impl MessageType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "hello" => Some(MessageType::Hello),
            "listen" => Some(MessageType::Listen),
            "abort" => Some(MessageType::Abort),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Hello => "hello",
            MessageType::Listen => "listen",
            MessageType::Abort => "abort",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound JSON message.
///
/// Only the fields the session engine branches on are typed; everything else
/// is kept in `extra` for the handler that needs it.
#[derive(Deserialize, Debug, Clone)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mode: Option<ListenMode>,
    #[serde(default)]
    pub state: Option<ListenState>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TtsState {
    Start,
    SentenceStart,
    Stop,
}

/// Messages sent from the gateway to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Answers the client's `hello`.
    Hello {
        session_id: Uuid,
        transport: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_params: Option<Value>,
    },
    /// Recognized-text notice.
    Stt { session_id: Uuid, text: String },
    /// Reply playback framing.
    Tts {
        session_id: Uuid,
        state: TtsState,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

/// Everything the session may put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Audio(Bytes),
}

/// Frames received from the client, already stripped of transport details.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Text(String),
    Audio(Bytes),
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listen_message_parses_typed_fields_and_keeps_the_rest() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"listen","mode":"manual","state":"detect","text":"你好,","device":"esp32"}"#,
        )
        .unwrap();

        assert_eq!(msg.kind, "listen");
        assert_eq!(msg.mode, Some(ListenMode::Manual));
        assert_eq!(msg.state, Some(ListenState::Detect));
        assert_eq!(msg.text.as_deref(), Some("你好,"));
        assert_eq!(msg.extra.get("device"), Some(&json!("esp32")));
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"abort"}"#).unwrap();

        assert_eq!(msg.mode, None);
        assert_eq!(msg.state, None);
        assert_eq!(msg.text, None);
    }

    #[test]
    fn unknown_state_is_rejected() {
        let parsed =
            serde_json::from_str::<ClientMessage>(r#"{"type":"listen","state":"pause"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn message_type_lookup() {
        assert_eq!(MessageType::parse("listen"), Some(MessageType::Listen));
        assert_eq!(MessageType::parse("iot"), None);
    }

    #[test]
    fn server_messages_serialize_with_type_tag() {
        let id = Uuid::nil();
        let stop = ServerMessage::Tts {
            session_id: id,
            state: TtsState::Stop,
            text: None,
        };
        assert_eq!(
            serde_json::to_value(&stop).unwrap(),
            json!({"type": "tts", "session_id": id, "state": "stop"})
        );

        let sentence = ServerMessage::Tts {
            session_id: id,
            state: TtsState::SentenceStart,
            text: Some("你好".into()),
        };
        assert_eq!(
            serde_json::to_value(&sentence).unwrap()["state"],
            json!("sentence_start")
        );

        let stt = ServerMessage::Stt {
            session_id: id,
            text: "你好,".into(),
        };
        assert_eq!(
            serde_json::to_value(&stt).unwrap(),
            json!({"type": "stt", "session_id": id, "text": "你好,"})
        );
    }
}

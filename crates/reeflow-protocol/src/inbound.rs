//! Inbound client frame parsing.
//!
//! Wire shape: `{ "type": "...", "data": {...} }`. A legacy flat shape
//! (`{ "message": "...", "session_id"?: "...", "context"?: {...} }`, no
//! `type` field) is coerced into `UserSendMessage` here so it never leaks
//! past this module into the orchestrator.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolError;

/// A parsed, validated inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Init {
        session_id: Option<String>,
        user_id: String,
    },
    Ping,
    UserSendMessage {
        content: String,
        session_id: Option<String>,
        context: Option<Value>,
    },
    /// A syntactically valid envelope with a `type` this server doesn't
    /// recognize. Held onto (rather than rejected outright) so callers can
    /// decide whether it's a protocol error or something to ignore.
    Unknown { frame_type: String },
}

#[derive(Debug, Deserialize)]
struct InitData {
    #[serde(default)]
    session_id: Option<String>,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct UserSendMessageData {
    content: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    context: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LegacyFlatFrame {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    context: Option<Value>,
}

impl InboundFrame {
    /// Parse a single inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let obj = value
            .as_object()
            .ok_or_else(|| ProtocolError::Malformed("frame is not a JSON object".to_string()))?;

        if let Some(frame_type) = obj.get("type").and_then(|v| v.as_str()) {
            let data = obj.get("data").cloned().unwrap_or(Value::Null);
            return Self::from_typed(frame_type, data);
        }

        // No `type` discriminator — try the legacy flat shape.
        if obj.contains_key("message") {
            let legacy: LegacyFlatFrame = serde_json::from_value(value)
                .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
            return Ok(InboundFrame::UserSendMessage {
                content: legacy.message,
                session_id: legacy.session_id,
                context: legacy.context,
            });
        }

        Err(ProtocolError::Malformed(
            "frame has neither 'type' nor legacy 'message' field".to_string(),
        ))
    }

    fn from_typed(frame_type: &str, data: Value) -> Result<Self, ProtocolError> {
        match frame_type {
            "init" => {
                let parsed: InitData =
                    serde_json::from_value(data).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
                Ok(InboundFrame::Init {
                    session_id: parsed.session_id,
                    user_id: parsed.user_id,
                })
            }
            "ping" => Ok(InboundFrame::Ping),
            "userSendMessage" => {
                let parsed: UserSendMessageData =
                    serde_json::from_value(data).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
                Ok(InboundFrame::UserSendMessage {
                    content: parsed.content,
                    session_id: parsed.session_id,
                    context: parsed.context,
                })
            }
            other => Ok(InboundFrame::Unknown {
                frame_type: other.to_string(),
            }),
        }
    }

    /// True for the two frame kinds honored before `init` completes.
    pub fn allowed_before_init(&self) -> bool {
        matches!(self, InboundFrame::Init { .. } | InboundFrame::Ping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_init_frame() {
        let f = InboundFrame::parse(r#"{"type":"init","data":{"user_id":"u1"}}"#).unwrap();
        assert_eq!(
            f,
            InboundFrame::Init {
                session_id: None,
                user_id: "u1".to_string()
            }
        );
    }

    #[test]
    fn parses_ping_with_no_data_field() {
        let f = InboundFrame::parse(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(f, InboundFrame::Ping);
    }

    #[test]
    fn parses_user_send_message() {
        let f = InboundFrame::parse(
            r#"{"type":"userSendMessage","data":{"content":"hello","session_id":"s1"}}"#,
        )
        .unwrap();
        assert_eq!(
            f,
            InboundFrame::UserSendMessage {
                content: "hello".to_string(),
                session_id: Some("s1".to_string()),
                context: None,
            }
        );
    }

    #[test]
    fn coerces_legacy_flat_shape() {
        let f = InboundFrame::parse(r#"{"message":"hi","session_id":"s2"}"#).unwrap();
        assert_eq!(
            f,
            InboundFrame::UserSendMessage {
                content: "hi".to_string(),
                session_id: Some("s2".to_string()),
                context: None,
            }
        );
    }

    #[test]
    fn unknown_type_is_held_not_rejected() {
        let f = InboundFrame::parse(r#"{"type":"subscribe","data":{}}"#).unwrap();
        assert_eq!(
            f,
            InboundFrame::Unknown {
                frame_type: "subscribe".to_string()
            }
        );
    }

    #[test]
    fn rejects_frame_without_type_or_message() {
        assert!(InboundFrame::parse(r#"{"foo":"bar"}"#).is_err());
    }

    #[test]
    fn rejects_non_json() {
        assert!(InboundFrame::parse("not json").is_err());
    }

    #[test]
    fn init_and_ping_are_allowed_before_init() {
        assert!(InboundFrame::Ping.allowed_before_init());
        assert!(InboundFrame::Init {
            session_id: None,
            user_id: "u".into()
        }
        .allowed_before_init());
        assert!(!InboundFrame::UserSendMessage {
            content: "x".into(),
            session_id: None,
            context: None
        }
        .allowed_before_init());
    }
}

//! Outbound server frame construction.
//!
//! Every outbound frame is `{ "type": "...", "data": {...} }`
//! Frame kinds are modeled as distinct variants, each
//! carrying its own typed payload — mirroring `skynet_protocol::frames`'s
//! `ResFrame`/`EventFrame` split, collapsed here into one enum since this
//! protocol has no separate request/response correlation id.

use serde::{Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct InitData {
    pub session_id: String,
    pub messages: Vec<Value>,
    pub config: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewChatMessageData {
    pub session_id: String,
    pub content: String,
    pub message_id: String,
    pub role: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub message_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamChunkData {
    pub session_id: String,
    pub content: String,
    pub event: String,
    pub message_id: String,
    pub role: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub frame_subtype: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorData {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoneData {
    pub session_id: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// A fully-formed outbound frame, ready to serialize onto the socket.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Init(InitData),
    Pong,
    NewChatMessage(NewChatMessageData),
    StreamChunk(StreamChunkData),
    Error(ErrorData),
    Done(DoneData),
}

impl OutboundFrame {
    pub fn init(session_id: impl Into<String>, messages: Vec<Value>, config: Value) -> Self {
        OutboundFrame::Init(InitData {
            session_id: session_id.into(),
            messages,
            config,
        })
    }

    pub fn pong() -> Self {
        OutboundFrame::Pong
    }

    pub fn new_chat_message(
        session_id: impl Into<String>,
        content: impl Into<String>,
        message_id: impl Into<String>,
        role: impl Into<String>,
        timestamp: impl Into<String>,
        message_type: impl Into<String>,
    ) -> Self {
        OutboundFrame::NewChatMessage(NewChatMessageData {
            session_id: session_id.into(),
            content: content.into(),
            message_id: message_id.into(),
            role: role.into(),
            timestamp: timestamp.into(),
            message_type: message_type.into(),
        })
    }

    /// `content` carries exactly one chunk, never the running concatenation.
    pub fn stream_chunk(
        session_id: impl Into<String>,
        content: impl Into<String>,
        message_id: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        OutboundFrame::StreamChunk(StreamChunkData {
            session_id: session_id.into(),
            content: content.into(),
            event: "content".to_string(),
            message_id: message_id.into(),
            role: "assistant".to_string(),
            timestamp: timestamp.into(),
            frame_subtype: "stream_chunk".to_string(),
        })
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        OutboundFrame::Error(ErrorData {
            code: code.into(),
            message: message.into(),
        })
    }

    pub fn done(
        session_id: impl Into<String>,
        message_id: impl Into<String>,
        meta: Option<Value>,
    ) -> Self {
        OutboundFrame::Done(DoneData {
            session_id: session_id.into(),
            message_id: message_id.into(),
            meta,
        })
    }

    fn type_tag(&self) -> &'static str {
        match self {
            OutboundFrame::Init(_) => "init",
            OutboundFrame::Pong => "pong",
            OutboundFrame::NewChatMessage(_) => "newChatMessage",
            OutboundFrame::StreamChunk(_) => "stream_chunk",
            OutboundFrame::Error(_) => "error",
            OutboundFrame::Done(_) => "done",
        }
    }

    /// Render to the wire-format JSON string sent over the socket.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Serialize for OutboundFrame {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let frame_type = self.type_tag();
        match self {
            OutboundFrame::Pong => {
                serde_json::json!({ "type": frame_type }).serialize(serializer)
            }
            OutboundFrame::Init(d) => {
                serde_json::json!({ "type": frame_type, "data": d }).serialize(serializer)
            }
            OutboundFrame::NewChatMessage(d) => {
                serde_json::json!({ "type": frame_type, "data": d }).serialize(serializer)
            }
            OutboundFrame::StreamChunk(d) => {
                serde_json::json!({ "type": frame_type, "data": d }).serialize(serializer)
            }
            OutboundFrame::Error(d) => {
                serde_json::json!({ "type": frame_type, "data": d }).serialize(serializer)
            }
            OutboundFrame::Done(d) => {
                serde_json::json!({ "type": frame_type, "data": d }).serialize(serializer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pong_has_no_data_field() {
        let f = OutboundFrame::pong();
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v, serde_json::json!({ "type": "pong" }));
    }

    #[test]
    fn stream_chunk_carries_role_assistant_and_one_chunk() {
        let f = OutboundFrame::stream_chunk("s1", "hel", "m1", "2026-01-01T00:00:00Z");
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["type"], "stream_chunk");
        assert_eq!(v["data"]["content"], "hel");
        assert_eq!(v["data"]["role"], "assistant");
        assert_eq!(v["data"]["type"], "stream_chunk");
    }

    #[test]
    fn error_frame_shape() {
        let f = OutboundFrame::error("NOT_FOUND", "nope");
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v, serde_json::json!({"type":"error","data":{"code":"NOT_FOUND","message":"nope"}}));
    }

    #[test]
    fn done_omits_meta_when_absent() {
        let f = OutboundFrame::done("s1", "m1", None);
        let v = serde_json::to_value(&f).unwrap();
        assert!(v["data"].get("meta").is_none());
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a single `ChatMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        f.write_str(s)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One persisted utterance in a session.
///
/// Immutable after write — nothing in this crate updates a row's `content`
/// once `append` has returned it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    /// Free-form tag: carries the classified intent for assistant turns, or
    /// an explicit caller-supplied type for user turns.
    pub message_type: Option<String>,
    pub status: Option<String>,
    pub message_id: String,
    pub tool_calls: Option<serde_json::Value>,
    pub meta_data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The stripped `{role, content}` shape produced by `format_for_llm`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: Role,
    pub content: String,
}

impl From<&ChatMessage> for LlmMessage {
    fn from(m: &ChatMessage) -> Self {
        LlmMessage {
            role: m.role,
            content: m.content.clone(),
        }
    }
}

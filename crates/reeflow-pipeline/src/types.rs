use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use reeflow_expert::ExpertResult;
use reeflow_llm::{LlmUsage, Message};

/// Closed set of intent labels the domain defines, with an `Other`
/// catch-all so additional domain labels still round-trip. The
/// orchestrator only ever branches on `DeviceControl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentLabel {
    Chitchat,
    DataQuery,
    DeviceControl,
    DomainKnowledge,
    Other(String),
}

impl Serialize for IntentLabel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IntentLabel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().expect("IntentLabel::from_str is infallible"))
    }
}

impl fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IntentLabel {
    pub fn as_str(&self) -> &str {
        match self {
            IntentLabel::Chitchat => "chitchat",
            IntentLabel::DataQuery => "data_query",
            IntentLabel::DeviceControl => "device_control",
            IntentLabel::DomainKnowledge => "domain_knowledge",
            IntentLabel::Other(s) => s.as_str(),
        }
    }
}

impl FromStr for IntentLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed {
            "chitchat" => IntentLabel::Chitchat,
            "data_query" => IntentLabel::DataQuery,
            "device_control" => IntentLabel::DeviceControl,
            "domain_knowledge" => IntentLabel::DomainKnowledge,
            "" => IntentLabel::Other("other".to_string()),
            other => IntentLabel::Other(other.to_string()),
        })
    }
}

/// Structured routing record produced by the routing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub needs_expert: bool,
    pub needs_data: bool,
    pub decision: String,
    pub reason: String,
}

impl RoutingDecision {
    /// Conservative fallback used when the routing stage's output can't be
    /// parsed — direct synthesis, no expert or data lookup.
    pub fn direct_fallback(reason: impl Into<String>) -> Self {
        Self {
            needs_expert: false,
            needs_data: false,
            decision: "direct".to_string(),
            reason: reason.into(),
        }
    }
}

/// Per-request transient state, created at turn start and discarded at turn
/// end.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub original_text: String,
    pub rewritten_text: Option<String>,
    pub history: Vec<Message>,
    pub weather_context: Option<String>,
    pub intent: Option<IntentLabel>,
    pub routing: Option<RoutingDecision>,
    pub expert_result: Option<ExpertResult>,
    pub assistant_message_id: String,
    pub assistant_timestamp: DateTime<Utc>,
    pub buffer: String,
}

impl TurnState {
    pub fn new(original_text: impl Into<String>, history: Vec<Message>) -> Self {
        Self {
            original_text: original_text.into(),
            rewritten_text: None,
            history,
            weather_context: None,
            intent: None,
            routing: None,
            expert_result: None,
            assistant_message_id: uuid::Uuid::new_v4().to_string(),
            assistant_timestamp: reeflow_core::time::now_secs(),
            buffer: String::new(),
        }
    }

    /// The text pipeline stages downstream of rewrite should operate on.
    pub fn effective_text(&self) -> &str {
        self.rewritten_text.as_deref().unwrap_or(&self.original_text)
    }
}

/// Running per-stage token accounting, folded into `meta_data.stage_stats`
/// on the persisted assistant row — ambient observability alongside the
/// routing/expert-consulted fields the orchestrator always writes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageStats {
    pub rewrite: LlmUsage,
    pub intent: LlmUsage,
    pub routing: LlmUsage,
    pub synthesis: LlmUsage,
}

impl StageStats {
    pub fn total(&self) -> LlmUsage {
        let mut total = LlmUsage::default();
        total.accumulate(&self.rewrite);
        total.accumulate(&self.intent);
        total.accumulate(&self.routing);
        total.accumulate(&self.synthesis);
        total
    }
}

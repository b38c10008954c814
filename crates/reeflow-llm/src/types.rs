use serde::{Deserialize, Serialize};

/// Speaker of a single dialogue turn handed to the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One message in the ordered dialogue passed to `LlmClient::call`.
///
/// Deliberately its own type (not `reeflow_history::LlmMessage`) so this
/// crate stays free of a dependency on storage — the pipeline crate
/// converts between the two at the call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call model parameters.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub base_url: String,
    pub api_key: String,
}

/// Token/timing accounting returned alongside the generated text.
///
/// Counts may be approximate — providers that omit usage in a streaming
/// response leave these at zero rather than failing the call.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub wall_time_ms: u64,
}

impl LlmUsage {
    /// Fold stage-level usage into a running pipeline total.
    pub fn accumulate(&mut self, other: &LlmUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.wall_time_ms += other.wall_time_ms;
    }
}

/// Outcome of a completed (possibly streamed) call.
#[derive(Debug, Clone)]
pub struct LlmCallResult {
    pub text: String,
    pub usage: LlmUsage,
}

use serde_json::Value;

use reeflow_core::config::LlmConfig as LlmDefaults;
use reeflow_llm::LlmConfig;

/// Build the per-call LLM config for one turn: model/temperature/max_tokens
/// come from the session's stored config (falling back to process
/// defaults), while base_url/api_key always come from the process-wide
/// defaults — a session never carries its own credentials.
pub fn resolve_llm_config(session_config: &Value, defaults: &LlmDefaults) -> LlmConfig {
    LlmConfig {
        model: session_config
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| defaults.model.clone()),
        temperature: session_config
            .get("temperature")
            .and_then(Value::as_f64)
            .map(|t| t as f32)
            .unwrap_or(defaults.temperature),
        max_tokens: session_config
            .get("max_tokens")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or(defaults.max_tokens),
        base_url: defaults.base_url.clone(),
        api_key: defaults.api_key.clone(),
    }
}

/// Which branch of the expert fan-in a `needs_expert` turn takes — the two
/// inconsistent policies a routing decision could imply, resolved as a
/// per-session config flag rather than guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpertStreamPolicy {
    /// Forward expert chunks to the client directly; suppress synthesis.
    ForwardExpertChunks,
    /// Buffer the expert answer (still forwarding its chunks) and feed it
    /// as grounding into the synthesis stage, streaming synthesis tokens.
    SynthesizeFromExpert,
}

impl ExpertStreamPolicy {
    pub fn from_session_config(session_config: &Value) -> Self {
        match session_config.get("expert_stream_policy").and_then(Value::as_str) {
            Some("forward_expert_chunks") => ExpertStreamPolicy::ForwardExpertChunks,
            _ => ExpertStreamPolicy::SynthesizeFromExpert,
        }
    }
}

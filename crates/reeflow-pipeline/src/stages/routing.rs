use async_trait::async_trait;

use reeflow_llm::{LlmClient, LlmConfig, LlmUsage, Message};

use crate::error::Result;
use crate::stage::Stage;
use crate::types::{IntentLabel, RoutingDecision};

const PROMPT: &str = "Decide how to answer the user's message. Reply with a \
single JSON object: {\"needs_expert\": bool, \"needs_data\": bool, \
\"decision\": string, \"reason\": string}. Set needs_expert true when the \
question needs specialized aquaculture domain knowledge beyond general \
conversation. Set needs_data true when it needs the user's own pond/device \
readings. decision is a short label for the chosen path, reason is one \
sentence. Reply with the JSON object only.";

pub struct RoutingInput<'a> {
    pub text: &'a str,
    pub intent: &'a IntentLabel,
    pub context: Option<&'a str>,
}

/// Stage 3: decides whether this turn needs the expert, local data, or
/// neither. A malformed reply degrades to [`RoutingDecision::direct_fallback`]
/// rather than failing the turn.
pub struct RoutingStage;

#[async_trait]
impl Stage<RoutingInput<'_>, RoutingDecision> for RoutingStage {
    async fn run(
        &self,
        input: RoutingInput<'_>,
        llm: &dyn LlmClient,
        config: &LlmConfig,
    ) -> Result<(RoutingDecision, LlmUsage)> {
        let mut prompt_text = format!("intent: {}\nmessage: {}", input.intent, input.text);
        if let Some(context) = input.context {
            prompt_text.push_str(&format!("\ncontext: {context}"));
        }
        let messages = vec![Message::system(PROMPT), Message::user(prompt_text)];
        let result = llm.call(&messages, config, None, None).await?;

        let decision = parse_routing_json(&result.text)
            .unwrap_or_else(|| RoutingDecision::direct_fallback("routing reply was not valid JSON"));

        Ok((decision, result.usage))
    }

    fn prompt(&self) -> &str {
        PROMPT
    }
}

fn parse_routing_json(text: &str) -> Option<RoutingDecision> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed)
        .strip_suffix("```")
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    struct StubLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn call(
            &self,
            _messages: &[Message],
            _config: &LlmConfig,
            _on_chunk: Option<reeflow_llm::ChunkSink<'_>>,
            _cancel: Option<&CancellationToken>,
        ) -> std::result::Result<reeflow_llm::LlmCallResult, reeflow_llm::LlmError> {
            Ok(reeflow_llm::LlmCallResult {
                text: self.reply.clone(),
                usage: LlmUsage::default(),
            })
        }
    }

    fn cfg() -> LlmConfig {
        LlmConfig {
            model: "m".to_string(),
            temperature: 0.0,
            max_tokens: 64,
            base_url: "http://x".to_string(),
            api_key: String::new(),
        }
    }

    #[tokio::test]
    async fn parses_well_formed_json_reply() {
        let stage = RoutingStage;
        let llm = StubLlm {
            reply: r#"{"needs_expert": true, "needs_data": false, "decision": "consult_expert", "reason": "specialized question"}"#.to_string(),
        };
        let (decision, _) = stage
            .run(
                RoutingInput {
                    text: "what's the ideal dissolved oxygen for shrimp?",
                    intent: &IntentLabel::DomainKnowledge,
                    context: None,
                },
                &llm,
                &cfg(),
            )
            .await
            .unwrap();
        assert!(decision.needs_expert);
        assert!(!decision.needs_data);
    }

    #[tokio::test]
    async fn unwraps_markdown_fenced_json() {
        let stage = RoutingStage;
        let llm = StubLlm {
            reply: "```json\n{\"needs_expert\": false, \"needs_data\": true, \"decision\": \"local_data\", \"reason\": \"asks about own sensors\"}\n```".to_string(),
        };
        let (decision, _) = stage
            .run(
                RoutingInput {
                    text: "what's my pond's current pH?",
                    intent: &IntentLabel::DataQuery,
                    context: None,
                },
                &llm,
                &cfg(),
            )
            .await
            .unwrap();
        assert!(decision.needs_data);
    }

    #[tokio::test]
    async fn malformed_reply_falls_back_to_direct() {
        let stage = RoutingStage;
        let llm = StubLlm {
            reply: "not json at all".to_string(),
        };
        let (decision, _) = stage
            .run(
                RoutingInput {
                    text: "hi",
                    intent: &IntentLabel::Chitchat,
                    context: None,
                },
                &llm,
                &cfg(),
            )
            .await
            .unwrap();
        assert_eq!(decision.decision, "direct");
        assert!(!decision.needs_expert);
    }
}

use async_trait::async_trait;

use reeflow_llm::{LlmClient, LlmConfig, LlmUsage, Message};

use crate::error::Result;
use crate::stage::Stage;

const PROMPT: &str = "You rewrite a user's latest message into a single, \
self-contained query that makes sense without the preceding conversation. \
Resolve pronouns and ellipsis against the conversation history. If the \
message is already self-contained, or no rewriting is needed, return it \
unchanged. Reply with the rewritten query only — no preamble, no quotes.";

pub struct QueryRewriteInput<'a> {
    pub original_text: &'a str,
    pub history: &'a [Message],
    pub context: Option<&'a str>,
}

/// Stage 1: turns a possibly elliptical follow-up into a self-contained
/// query. Deterministic on empty history — returns the input unchanged
/// without an LLM round trip.
pub struct QueryRewriteStage;

#[async_trait]
impl Stage<QueryRewriteInput<'_>, String> for QueryRewriteStage {
    async fn run(
        &self,
        input: QueryRewriteInput<'_>,
        llm: &dyn LlmClient,
        config: &LlmConfig,
    ) -> Result<(String, LlmUsage)> {
        if input.history.is_empty() {
            return Ok((input.original_text.to_string(), LlmUsage::default()));
        }

        let mut messages = vec![Message::system(PROMPT)];
        if let Some(context) = input.context {
            messages.push(Message::system(format!("Additional context: {context}")));
        }
        messages.extend(input.history.iter().cloned());
        messages.push(Message::user(input.original_text));

        let result = llm.call(&messages, config, None, None).await?;
        let rewritten = result.text.trim();
        let rewritten = if rewritten.is_empty() {
            input.original_text.to_string()
        } else {
            rewritten.to_string()
        };

        Ok((rewritten, result.usage))
    }

    fn prompt(&self) -> &str {
        PROMPT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
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
            max_tokens: 16,
            base_url: "http://x".to_string(),
            api_key: String::new(),
        }
    }

    #[tokio::test]
    async fn empty_history_returns_input_unchanged_without_calling_llm() {
        let stage = QueryRewriteStage;
        let llm = StubLlm {
            reply: "should not be used".to_string(),
        };
        let (rewritten, usage) = stage
            .run(
                QueryRewriteInput {
                    original_text: "and what about pH?",
                    history: &[],
                    context: None,
                },
                &llm,
                &cfg(),
            )
            .await
            .unwrap();
        assert_eq!(rewritten, "and what about pH?");
        assert_eq!(usage.prompt_tokens, 0);
    }

    #[tokio::test]
    async fn non_empty_history_uses_llm_rewrite() {
        let stage = QueryRewriteStage;
        let llm = StubLlm {
            reply: "What is the recommended pH range for tilapia ponds?".to_string(),
        };
        let history = vec![Message::user("tell me about tilapia")];
        let (rewritten, _) = stage
            .run(
                QueryRewriteInput {
                    original_text: "and what about pH?",
                    history: &history,
                    context: None,
                },
                &llm,
                &cfg(),
            )
            .await
            .unwrap();
        assert_eq!(rewritten, "What is the recommended pH range for tilapia ponds?");
    }
}

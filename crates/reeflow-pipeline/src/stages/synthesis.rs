use reeflow_llm::{ChunkSink, LlmClient, LlmConfig, LlmUsage, Message};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

const DIRECT_PROMPT: &str = "You are a helpful aquaculture operations assistant. \
Answer the user's message directly and concisely, using the conversation \
history for context.";

const GROUNDED_PROMPT: &str = "You are a helpful aquaculture operations \
assistant. An internal domain expert has provided the grounding below. \
Compose a final answer for the user from it: keep the factual content, \
drop anything irrelevant to what was asked, and write in a natural \
conversational tone. Do not mention that an expert was consulted.";

/// Stage 4: streams the final answer to the client. Unlike the earlier
/// stages this one always streams, so it sits outside the [`crate::stage::Stage`]
/// trait rather than squeeze a chunk sink and cancellation token into that
/// shared signature.
pub struct SynthesisStage;

impl SynthesisStage {
    /// Answer directly from conversation history, no expert grounding.
    pub async fn stream_direct(
        &self,
        history: &[Message],
        query: &str,
        llm: &dyn LlmClient,
        config: &LlmConfig,
        on_chunk: ChunkSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<(String, LlmUsage)> {
        let mut messages = vec![Message::system(DIRECT_PROMPT)];
        messages.extend(history.iter().cloned());
        messages.push(Message::user(query));

        let result = llm
            .call(&messages, config, Some(on_chunk), Some(cancel))
            .await?;
        Ok((result.text, result.usage))
    }

    /// Answer grounded in the expert's buffered response.
    pub async fn stream_grounded(
        &self,
        history: &[Message],
        query: &str,
        expert_answer: &str,
        llm: &dyn LlmClient,
        config: &LlmConfig,
        on_chunk: ChunkSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<(String, LlmUsage)> {
        let mut messages = vec![Message::system(GROUNDED_PROMPT)];
        messages.extend(history.iter().cloned());
        let grounded_query = format!(
            "user question: {query}\n\nexpert grounding:\n{expert_answer}"
        );
        messages.push(Message::user(grounded_query));

        let result = llm
            .call(&messages, config, Some(on_chunk), Some(cancel))
            .await?;
        Ok((result.text, result.usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubLlm {
        chunks: Vec<&'static str>,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn call(
            &self,
            _messages: &[Message],
            _config: &LlmConfig,
            on_chunk: Option<ChunkSink<'_>>,
            _cancel: Option<&CancellationToken>,
        ) -> std::result::Result<reeflow_llm::LlmCallResult, reeflow_llm::LlmError> {
            let mut full = String::new();
            if let Some(sink) = on_chunk {
                for chunk in &self.chunks {
                    sink(chunk);
                    full.push_str(chunk);
                }
            } else {
                full = self.chunks.concat();
            }
            Ok(reeflow_llm::LlmCallResult {
                text: full,
                usage: LlmUsage::default(),
            })
        }
    }

    fn cfg() -> LlmConfig {
        LlmConfig {
            model: "m".to_string(),
            temperature: 0.7,
            max_tokens: 256,
            base_url: "http://x".to_string(),
            api_key: String::new(),
        }
    }

    #[tokio::test]
    async fn stream_direct_forwards_chunks_and_returns_joined_text() {
        let stage = SynthesisStage;
        let llm = StubLlm {
            chunks: vec!["The ", "pH ", "should be 7."],
        };
        let mut seen = String::new();
        let mut sink = |c: &str| seen.push_str(c);
        let cancel = CancellationToken::new();
        let (text, _) = stage
            .stream_direct(&[], "what pH?", &llm, &cfg(), &mut sink, &cancel)
            .await
            .unwrap();
        assert_eq!(text, "The pH should be 7.");
        assert_eq!(seen, "The pH should be 7.");
    }

    #[tokio::test]
    async fn stream_grounded_includes_expert_answer_in_prompt() {
        let stage = SynthesisStage;
        let llm = StubLlm {
            chunks: vec!["Aim for 6.5 to 8.5."],
        };
        let mut sink = |_: &str| {};
        let cancel = CancellationToken::new();
        let (text, _) = stage
            .stream_grounded(
                &[],
                "what pH?",
                "Optimal pH range is 6.5-8.5 for tilapia.",
                &llm,
                &cfg(),
                &mut sink,
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(text, "Aim for 6.5 to 8.5.");
    }
}

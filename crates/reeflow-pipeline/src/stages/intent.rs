use async_trait::async_trait;

use reeflow_llm::{LlmClient, LlmConfig, LlmUsage, Message};

use crate::error::Result;
use crate::stage::Stage;
use crate::types::IntentLabel;

const PROMPT: &str = "Classify the user's message into exactly one label: \
chitchat, data_query, device_control, or domain_knowledge. Reply with the \
label only, lowercase, no punctuation.";

pub struct IntentInput<'a> {
    pub text: &'a str,
    pub history: &'a [Message],
}

/// Stage 2: classifies the rewritten query. Never fails the turn on a
/// malformed reply — falls back to `Other` so routing still has something
/// to branch on.
pub struct IntentStage;

#[async_trait]
impl Stage<IntentInput<'_>, IntentLabel> for IntentStage {
    async fn run(
        &self,
        input: IntentInput<'_>,
        llm: &dyn LlmClient,
        config: &LlmConfig,
    ) -> Result<(IntentLabel, LlmUsage)> {
        let mut messages = vec![Message::system(PROMPT)];
        messages.extend(input.history.iter().cloned());
        messages.push(Message::user(input.text));
        let result = llm.call(&messages, config, None, None).await?;
        let label: IntentLabel = result
            .text
            .trim()
            .to_lowercase()
            .parse()
            .expect("IntentLabel::from_str is infallible");
        Ok((label, result.usage))
    }

    fn prompt(&self) -> &str {
        PROMPT
    }
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
            max_tokens: 8,
            base_url: "http://x".to_string(),
            api_key: String::new(),
        }
    }

    #[tokio::test]
    async fn parses_known_label() {
        let stage = IntentStage;
        let llm = StubLlm {
            reply: "device_control".to_string(),
        };
        let (label, _) = stage
            .run(IntentInput { text: "turn off the feeder", history: &[] }, &llm, &cfg())
            .await
            .unwrap();
        assert_eq!(label, IntentLabel::DeviceControl);
    }

    #[tokio::test]
    async fn unrecognized_reply_becomes_other_rather_than_failing() {
        let stage = IntentStage;
        let llm = StubLlm {
            reply: "I'm not sure".to_string(),
        };
        let (label, _) = stage
            .run(IntentInput { text: "hmm", history: &[] }, &llm, &cfg())
            .await
            .unwrap();
        assert!(matches!(label, IntentLabel::Other(_)));
    }

    struct CapturingLlm {
        reply: String,
        seen_messages: std::sync::Mutex<usize>,
    }

    #[async_trait]
    impl LlmClient for CapturingLlm {
        async fn call(
            &self,
            messages: &[Message],
            _config: &LlmConfig,
            _on_chunk: Option<reeflow_llm::ChunkSink<'_>>,
            _cancel: Option<&CancellationToken>,
        ) -> std::result::Result<reeflow_llm::LlmCallResult, reeflow_llm::LlmError> {
            *self.seen_messages.lock().unwrap() = messages.len();
            Ok(reeflow_llm::LlmCallResult {
                text: self.reply.clone(),
                usage: LlmUsage::default(),
            })
        }
    }

    #[tokio::test]
    async fn history_is_threaded_into_the_classification_call() {
        let stage = IntentStage;
        let llm = CapturingLlm {
            reply: "device_control".to_string(),
            seen_messages: std::sync::Mutex::new(0),
        };
        let history = vec![
            Message::user("turn the feeder on"),
            Message::assistant("done, the feeder is on"),
        ];
        stage
            .run(IntentInput { text: "now turn it off", history: &history }, &llm, &cfg())
            .await
            .unwrap();
        // system prompt + 2 history messages + the user message.
        assert_eq!(*llm.seen_messages.lock().unwrap(), 4);
    }
}

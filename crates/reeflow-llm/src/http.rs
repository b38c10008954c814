use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{ChunkSink, LlmClient};
use crate::error::{LlmError, Result};
use crate::types::{LlmCallResult, LlmConfig, LlmUsage, Message, Role};

/// OpenAI-compatible chat-completions provider, speaking the same wire
/// format `skynet_agent::openai::OpenAiProvider` does — request shape,
/// bearer auth, and the `data: [DONE]`-terminated SSE stream.
pub struct HttpLlmClient {
    client: reqwest::Client,
    chat_path: String,
}

impl HttpLlmClient {
    pub fn new() -> Self {
        Self::with_path("/v1/chat/completions")
    }

    /// `chat_path` should start with `/` and is appended to each call's
    /// `config.base_url` (kept per-call, not fixed at construction, since a
    /// session's config may point at a different `base_url` per turn).
    pub fn with_path(chat_path: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            chat_path: chat_path.into(),
        }
    }
}

impl Default for HttpLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn call(
        &self,
        messages: &[Message],
        config: &LlmConfig,
        on_chunk: Option<ChunkSink<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<LlmCallResult> {
        let started = Instant::now();
        let url = format!("{}{}", config.base_url, self.chat_path);

        match on_chunk {
            None => {
                let body = build_request_body(messages, config, false);
                debug!(model = %config.model, %url, "reeflow-llm: non-streaming call");

                let resp = self
                    .client
                    .post(&url)
                    .bearer_auth(&config.api_key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(classify_transport_error)?;

                let resp = check_status(resp).await?;

                let api_resp: ApiResponse = resp
                    .json()
                    .await
                    .map_err(|e| LlmError::Permanent(format!("unparseable response: {e}")))?;

                let text = api_resp
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default();

                Ok(LlmCallResult {
                    text,
                    usage: LlmUsage {
                        prompt_tokens: api_resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
                        completion_tokens: api_resp
                            .usage
                            .as_ref()
                            .map(|u| u.completion_tokens)
                            .unwrap_or(0),
                        wall_time_ms: started.elapsed().as_millis() as u64,
                    },
                })
            }
            Some(sink) => {
                let body = build_request_body(messages, config, true);
                debug!(model = %config.model, %url, "reeflow-llm: streaming call");

                let resp = self
                    .client
                    .post(&url)
                    .bearer_auth(&config.api_key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(classify_transport_error)?;

                let resp = check_status(resp).await?;
                stream_chat_completion(resp, sink, cancel, started).await
            }
        }
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let code = status.as_u16();
    let text = resp.text().await.unwrap_or_default();
    if code == 401 || code == 403 || (400..500).contains(&code) {
        warn!(status = code, body = %text, "reeflow-llm: permanent error");
        Err(LlmError::Permanent(format!("http {code}: {text}")))
    } else {
        warn!(status = code, body = %text, "reeflow-llm: retryable error");
        Err(LlmError::RetryableUpstream(format!("http {code}: {text}")))
    }
}

/// Network-level failures (timeout, connect, DNS) are always retryable —
/// only an HTTP status the server actually returned can be `Permanent`.
fn classify_transport_error(e: reqwest::Error) -> LlmError {
    LlmError::RetryableUpstream(e.to_string())
}

async fn stream_chat_completion(
    resp: reqwest::Response,
    on_chunk: ChunkSink<'_>,
    cancel: Option<&CancellationToken>,
    started: Instant,
) -> Result<LlmCallResult> {
    let mut byte_stream = resp.bytes_stream();
    let mut line_buf = String::new();
    let mut text = String::new();
    let mut usage = LlmUsage::default();

    loop {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(LlmError::Canceled);
            }
        }

        let chunk = match byte_stream.next().await {
            Some(Ok(c)) => c,
            Some(Err(e)) => return Err(LlmError::RetryableUpstream(e.to_string())),
            None => break,
        };

        let piece = match std::str::from_utf8(&chunk) {
            Ok(p) => p,
            Err(_) => continue,
        };
        line_buf.push_str(piece);

        let mut lines: Vec<&str> = line_buf.split('\n').collect();
        let remainder = lines.pop().unwrap_or_default().to_string();

        for line in lines {
            let line = line.trim();
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data.trim() == "[DONE]" {
                usage.wall_time_ms = started.elapsed().as_millis() as u64;
                return Ok(LlmCallResult { text, usage });
            }

            let Ok(delta) = serde_json::from_str::<StreamChunk>(data) else {
                continue;
            };
            if let Some(u) = &delta.usage {
                usage.prompt_tokens = u.prompt_tokens;
                usage.completion_tokens = u.completion_tokens;
            }
            for choice in &delta.choices {
                if let Some(content) = choice.delta.content.as_deref() {
                    if !content.is_empty() {
                        on_chunk(content);
                        text.push_str(content);
                    }
                }
            }
        }

        line_buf = remainder;
    }

    usage.wall_time_ms = started.elapsed().as_millis() as u64;
    Ok(LlmCallResult { text, usage })
}

/// Build the OpenAI-compatible chat-completions request body.
///
/// Pure and network-free so it is unit-testable without a server.
pub fn build_request_body(messages: &[Message], config: &LlmConfig, stream: bool) -> serde_json::Value {
    let wire_messages: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": role_str(m.role),
                "content": m.content,
            })
        })
        .collect();

    serde_json::json!({
        "model": config.model,
        "messages": wire_messages,
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
        "stream": stream,
    })
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LlmConfig {
        LlmConfig {
            model: "reeflow-default".to_string(),
            temperature: 0.7,
            max_tokens: 256,
            base_url: "http://localhost:11434".to_string(),
            api_key: "key".to_string(),
        }
    }

    #[test]
    fn request_body_carries_model_and_stream_flag() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let body = build_request_body(&messages, &cfg(), true);
        assert_eq!(body["model"], "reeflow-default");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn stream_chunk_parses_delta_content() {
        let raw = r#"{"choices":[{"delta":{"content":"hel"}}]}"#;
        let parsed: StreamChunk = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("hel"));
    }
}

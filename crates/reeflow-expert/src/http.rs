use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{ChunkSink, ExpertClient};
use crate::error::{ExpertError, Result};
use crate::sse::{parse_payload, ExpertFrame};
use crate::types::{ExpertResult, ExpertSettings};

/// GET-based SSE consumer for the upstream expert service.
///
/// Line-buffers the response body the same way
/// `skynet_agent::openai::process_openai_stream` does — hold the trailing
/// partial line across chunk boundaries, split complete lines on `\n`.
pub struct HttpExpertClient {
    client: reqwest::Client,
    settings: ExpertSettings,
    stream_path: String,
}

impl HttpExpertClient {
    pub fn new(settings: ExpertSettings) -> Self {
        Self::with_path(settings, "/sse/stream_qa")
    }

    pub fn with_path(settings: ExpertSettings, stream_path: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            stream_path: stream_path.into(),
        }
    }
}

#[async_trait]
impl ExpertClient for HttpExpertClient {
    async fn consult(
        &self,
        query: &str,
        agent_type: &str,
        session_id: &str,
        config: Option<&Value>,
        on_chunk: Option<ChunkSink<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<ExpertResult> {
        let Some(base_url) = self.settings.base_url.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(ExpertResult::not_configured());
        };
        if session_id.is_empty() || !self.settings.enabled {
            return Ok(ExpertResult::not_configured());
        }

        let url = format!("{base_url}{}", self.stream_path);
        let mut req = self
            .client
            .get(&url)
            .query(&[("query", query), ("agent_type", agent_type), ("session_id", session_id)]);
        if let Some(cfg) = config {
            req = req.query(&[("config", cfg.to_string())]);
        }
        if let Some(key) = self.settings.api_key.as_deref() {
            req = req.bearer_auth(key);
        }

        debug!(%url, agent_type, session_id, "reeflow-expert: opening SSE stream");

        let call = run_consult(req, on_chunk, cancel);
        match tokio::time::timeout(self.settings.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%url, "reeflow-expert: call timed out");
                Err(ExpertError::Timeout)
            }
        }
    }
}

async fn run_consult(
    req: reqwest::RequestBuilder,
    mut on_chunk: Option<ChunkSink<'_>>,
    cancel: Option<&CancellationToken>,
) -> Result<ExpertResult> {
    let resp = req
        .send()
        .await
        .map_err(|e| ExpertError::Transport(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(ExpertError::Upstream(format!("http {status}: {body}")));
    }

    let mut byte_stream = resp.bytes_stream();
    let mut line_buf = String::new();
    let mut data_buf: Vec<String> = Vec::new();
    let mut answer = String::new();

    loop {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(ExpertError::Canceled);
            }
        }

        let chunk = match byte_stream.next().await {
            Some(Ok(c)) => c,
            Some(Err(e)) => return Err(ExpertError::Transport(e.to_string())),
            None => break,
        };

        let piece = match std::str::from_utf8(&chunk) {
            Ok(p) => p,
            Err(_) => continue,
        };
        line_buf.push_str(piece);

        let mut lines: Vec<&str> = line_buf.split('\n').collect();
        let remainder = lines.pop().unwrap_or_default().to_string();

        for raw_line in lines {
            let line = raw_line.trim_end_matches('\r');
            if line.is_empty() {
                if let Some(result) = flush_frame(&mut data_buf, &mut answer, &mut on_chunk)? {
                    return Ok(result);
                }
                continue;
            }
            if let Some(data) = line.strip_prefix("data: ") {
                data_buf.push(data.to_string());
            }
            // `event: ` lines are recognized but non-authoritative; parsing
            // stays entirely data-driven.
        }

        line_buf = remainder;
    }

    // Stream closed without an explicit `{done:true}` frame — treat
    // whatever content accumulated as the final answer.
    Ok(ExpertResult {
        success: true,
        answer,
        ..Default::default()
    })
}

fn flush_frame(
    data_buf: &mut Vec<String>,
    answer: &mut String,
    on_chunk: &mut Option<ChunkSink<'_>>,
) -> Result<Option<ExpertResult>> {
    if data_buf.is_empty() {
        return Ok(None);
    }
    let payload = data_buf.join("\n");
    data_buf.clear();

    match parse_payload(&payload) {
        ExpertFrame::Content(content) => {
            if let Some(sink) = on_chunk.as_mut() {
                sink(&content);
            }
            answer.push_str(&content);
            Ok(None)
        }
        ExpertFrame::Done => Ok(Some(ExpertResult {
            success: true,
            answer: answer.clone(),
            ..Default::default()
        })),
        ExpertFrame::Error(msg) => Err(ExpertError::Upstream(msg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_frame_appends_content_and_calls_sink() {
        let mut data_buf = vec!["{\"content\":\"he\"}".to_string()];
        let mut answer = String::new();
        let mut seen = String::new();
        let mut closure = |c: &str| seen.push_str(c);
        let mut on_chunk: Option<ChunkSink<'_>> = Some(&mut closure);
        let result = flush_frame(&mut data_buf, &mut answer, &mut on_chunk).unwrap();
        assert!(result.is_none());
        assert_eq!(answer, "he");
        drop(on_chunk);
        assert_eq!(seen, "he");
    }

    #[test]
    fn flush_frame_on_done_returns_final_result() {
        let mut data_buf = vec!["{\"done\":true}".to_string()];
        let mut answer = "partial".to_string();
        let mut on_chunk: Option<ChunkSink<'_>> = None;
        let result = flush_frame(&mut data_buf, &mut answer, &mut on_chunk).unwrap().unwrap();
        assert!(result.success);
        assert_eq!(result.answer, "partial");
    }

    #[test]
    fn flush_frame_on_error_returns_err() {
        let mut data_buf = vec!["{\"error\":\"boom\"}".to_string()];
        let mut answer = String::new();
        let mut on_chunk: Option<ChunkSink<'_>> = None;
        let err = flush_frame(&mut data_buf, &mut answer, &mut on_chunk).unwrap_err();
        assert!(matches!(err, ExpertError::Upstream(msg) if msg == "boom"));
    }
}

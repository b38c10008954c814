use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{LlmCallResult, LlmConfig, Message};

/// Consumer callback for streamed tokens.
///
/// Invoked once per non-empty chunk, synchronously, in emission order — a
/// producer-accepts-a-consumer-callback shape chosen so cancellation is
/// just the consumer declining to keep being called.
pub type ChunkSink<'a> = &'a mut (dyn FnMut(&str) + Send + 'a);

/// Single call abstraction over an LLM provider.
///
/// `on_chunk` is `None` for a non-streaming call; when `Some`, every
/// non-empty token block is delivered to it before `call` returns, and the
/// concatenation of delivered chunks equals `LlmCallResult.text`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn call(
        &self,
        messages: &[Message],
        config: &LlmConfig,
        on_chunk: Option<ChunkSink<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<LlmCallResult>;
}

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::ExpertResult;

/// Consumer callback for streamed expert content chunks, delivered in
/// receive order before `consult` returns.
pub type ChunkSink<'a> = &'a mut (dyn FnMut(&str) + Send + 'a);

/// Upstream domain-knowledge expert accessed over a server-sent event
/// channel.
#[async_trait]
pub trait ExpertClient: Send + Sync {
    async fn consult(
        &self,
        query: &str,
        agent_type: &str,
        session_id: &str,
        config: Option<&Value>,
        on_chunk: Option<ChunkSink<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<ExpertResult>;
}

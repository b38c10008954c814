use reeflow_protocol::OutboundFrame;

use crate::error::Result;

/// The seam between the orchestrator and a connection's outbound socket.
///
/// Kept synchronous, not `async_trait`, so it can be called directly from
/// inside an `LlmClient`/`ExpertClient` chunk callback — those callbacks are
/// plain `FnMut`, with no executor to drive an `.await`. The gateway's sole
/// implementor wraps an `UnboundedSender<OutboundFrame>`; the connection
/// task drains the matching receiver concurrently with the socket read
/// loop, mirroring how `skynet_gateway::ws::broadcast::EventBroadcaster`
/// forwards its broadcast channel onto the socket inside the same
/// `select!`. This keeps `reeflow-pipeline` free of
/// any WebSocket/axum dependency while preserving the single-writer
/// invariant on the socket itself.
pub trait FrameSink: Send + Sync {
    fn send(&self, frame: OutboundFrame) -> Result<()>;
}

use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::error;

use reeflow_pipeline::Orchestrator;

use crate::ws::send::GatewaySink;

/// One queued user turn: everything `Orchestrator::run_turn` needs, plus
/// the ids the reader already echoed back to the client in its
/// `newChatMessage` frame so the persisted row carries the same id.
pub struct UserTurnJob {
    pub session_id: String,
    pub user_message_id: String,
    pub content: String,
}

/// Drains one connection's bounded inbound queue, running turns strictly
/// sequentially and in arrival order. Lives on its own task so the reader
/// loop keeps answering `ping` and filling the queue while a turn is
/// mid-flight.
///
/// `conn_cancel` is the parent token for the whole connection; each turn
/// gets its own child so a disconnect mid-turn (`conn_cancel.cancel()`)
/// aborts exactly the in-flight turn without needing to touch this loop.
pub async fn run(
    mut jobs: Receiver<UserTurnJob>,
    orchestrator: std::sync::Arc<Orchestrator>,
    sink: GatewaySink,
    conn_cancel: CancellationToken,
) {
    while let Some(job) = jobs.recv().await {
        if conn_cancel.is_cancelled() {
            break;
        }
        let turn_cancel = conn_cancel.child_token();
        if let Err(e) = orchestrator
            .run_turn(&job.session_id, &job.user_message_id, &job.content, &sink, &turn_cancel)
            .await
        {
            error!(session_id = %job.session_id, error = %e, "turn failed");
        }
    }
}

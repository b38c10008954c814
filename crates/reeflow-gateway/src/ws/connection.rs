use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use reeflow_core::config::INIT_HANDSHAKE_TIMEOUT_MS;
use reeflow_protocol::{InboundFrame, OutboundFrame};

use crate::app::AppState;
use crate::ws::send::{to_ws_message, GatewaySink};
use crate::ws::turn_runner::{self, UserTurnJob};

/// Per-connection state machine: lives on this task's stack, never shared.
/// `init` doubles as this protocol's handshake — there is no separate
/// challenge/nonce exchange the way `skynet_gateway`'s
/// `ConnState::AwaitingConnect` has one.
enum ConnState {
    AwaitingInit,
    Initialized { session_id: String },
}

/// Axum handler — upgrades HTTP to WebSocket at `GET /ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

/// Per-connection task — lives for the entire WS session lifetime; each
/// client connection is handled by its own dedicated task.
async fn handle_connection(socket: WebSocket, app: Arc<AppState>) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "new WS connection");

    let (mut tx, mut rx) = socket.split();

    // Every outbound frame — direct replies and turn-runner chunks alike —
    // funnels through this one channel so there is exactly one writer on
    // the socket.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let sink = GatewaySink::new(outbound_tx.clone());

    // Bounded per-connection inbound queue: a turn in flight does not block
    // the reader from answering `ping` or queuing the next message, up to
    // capacity.
    let (job_tx, job_rx) = mpsc::channel::<UserTurnJob>(reeflow_core::config::INBOUND_QUEUE_CAPACITY);

    let conn_cancel = CancellationToken::new();
    let runner_handle = tokio::spawn(turn_runner::run(
        job_rx,
        app.orchestrator.clone(),
        sink.clone(),
        conn_cancel.clone(),
    ));

    let mut conn_state = ConnState::AwaitingInit;

    let handshake_deadline = tokio::time::Instant::now() + Duration::from_millis(INIT_HANDSHAKE_TIMEOUT_MS);
    let mut handshake_timer = Box::pin(tokio::time::sleep_until(handshake_deadline));

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text_ref: &str = &text;
                        if text_ref.len() > reeflow_core::config::MAX_PAYLOAD_BYTES {
                            warn!(conn_id, size = text_ref.len(), "payload too large, dropping connection");
                            break;
                        }
                        conn_state = handle_text(&conn_id, text_ref, conn_state, &app, &outbound_tx, &job_tx).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(conn_id, error = %e, "WS read error");
                        break;
                    }
                    _ => {}
                }
            }

            frame = outbound_rx.recv() => {
                match frame {
                    Some(f) => {
                        if tx.send(to_ws_message(&f)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Guarded so this branch stops firing once initialized — a
            // `Sleep` stays ready forever once elapsed, so without the
            // guard this would spin the loop after the deadline passed.
            _ = &mut handshake_timer, if matches!(conn_state, ConnState::AwaitingInit) => {
                warn!(conn_id, "init handshake timeout, closing connection");
                break;
            }
        }
    }

    // Disconnect: abort any in-flight turn and stop accepting new ones.
    // Persistence writes that already completed stand.
    conn_cancel.cancel();
    drop(job_tx);
    runner_handle.abort();
    info!(conn_id, "WS connection closed");
}

/// Handle one inbound text frame, returning the connection's new state.
async fn handle_text(
    conn_id: &str,
    text: &str,
    state: ConnState,
    app: &Arc<AppState>,
    outbound_tx: &mpsc::UnboundedSender<OutboundFrame>,
    job_tx: &mpsc::Sender<UserTurnJob>,
) -> ConnState {
    let frame = match InboundFrame::parse(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(conn_id, error = %e, "malformed frame");
            let _ = outbound_tx.send(OutboundFrame::error("VALIDATION_ERROR", e.to_string()));
            return state;
        }
    };

    // `ping` is honored in every state, even before `init`.
    if matches!(frame, InboundFrame::Ping) {
        let _ = outbound_tx.send(OutboundFrame::pong());
        return state;
    }

    if !frame.allowed_before_init() && matches!(state, ConnState::AwaitingInit) {
        let _ = outbound_tx.send(OutboundFrame::error("NOT_INITIALIZED", "init your session first"));
        return state;
    }

    match frame {
        InboundFrame::Init { session_id, user_id } => handle_init(conn_id, session_id, user_id, app, outbound_tx),
        InboundFrame::UserSendMessage { content, session_id, .. } => {
            let ConnState::Initialized { session_id: conn_session_id } = &state else {
                // unreachable: guarded above, but keep the branch exhaustive
                // and honest about what it assumes.
                return state;
            };
            let target_session = session_id.unwrap_or_else(|| conn_session_id.clone());
            handle_user_message(&target_session, content, outbound_tx, job_tx);
            state
        }
        InboundFrame::Ping => unreachable!("handled above"),
        InboundFrame::Unknown { frame_type } => {
            warn!(conn_id, frame_type, "unrecognized frame type");
            let _ = outbound_tx.send(OutboundFrame::error(
                "VALIDATION_ERROR",
                format!("unrecognized frame type '{frame_type}'"),
            ));
            state
        }
    }
}

/// `init`: bootstrap or resume a session and reply with its config and
/// recent history.
fn handle_init(
    conn_id: &str,
    session_id: Option<String>,
    user_id: String,
    app: &Arc<AppState>,
    outbound_tx: &mpsc::UnboundedSender<OutboundFrame>,
) -> ConnState {
    match app.sessions.ensure(session_id.as_deref(), &user_id) {
        Ok(result) => {
            let messages: Vec<serde_json::Value> = result
                .messages
                .iter()
                .map(|m| serde_json::to_value(m).unwrap_or(serde_json::Value::Null))
                .collect();
            let frame = OutboundFrame::init(result.session_id.clone(), messages, result.config);
            let _ = outbound_tx.send(frame);
            info!(conn_id, session_id = %result.session_id, "session initialized");
            ConnState::Initialized { session_id: result.session_id }
        }
        Err(e) => {
            warn!(conn_id, error = %e, "session ensure failed");
            let _ = outbound_tx.send(OutboundFrame::error("STORAGE_ERROR", "could not initialize session"));
            ConnState::AwaitingInit
        }
    }
}

/// `userSendMessage`: echo receipt, then enqueue the turn for the
/// dedicated runner task. A full queue emits `busy` and
/// drops the message rather than echoing it — no silent loss either way.
///
/// Reserves a queue slot with `try_reserve` *before* sending the echo
/// frame, and only hands the job to the runner via that reserved permit
/// afterwards. The runner task polls the queue concurrently with this one,
/// so if the job were enqueued first it could dequeue and start streaming
/// before the echo reached the outbound channel, reordering `stream_chunk`
/// ahead of `newChatMessage`. Holding the permit until the echo is sent
/// closes that race: the job cannot be dequeued until `permit.send` makes
/// it visible, which happens strictly after the echo's `outbound_tx.send`.
fn handle_user_message(
    session_id: &str,
    content: String,
    outbound_tx: &mpsc::UnboundedSender<OutboundFrame>,
    job_tx: &mpsc::Sender<UserTurnJob>,
) {
    let user_message_id = Uuid::new_v4().to_string();
    let timestamp = reeflow_core::time::now_secs().to_rfc3339();

    match job_tx.try_reserve() {
        Ok(permit) => {
            let _ = outbound_tx.send(OutboundFrame::new_chat_message(
                session_id,
                content.clone(),
                user_message_id.clone(),
                "user",
                timestamp,
                "user",
            ));
            permit.send(UserTurnJob {
                session_id: session_id.to_string(),
                user_message_id,
                content,
            });
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            let _ = outbound_tx.send(OutboundFrame::error("BUSY", "a previous message is still being processed"));
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            // connection is tearing down; nothing to do.
        }
    }
}

use axum::extract::ws::Message;
use tokio::sync::mpsc::UnboundedSender;

use reeflow_pipeline::FrameSink;
use reeflow_protocol::OutboundFrame;

/// Every `OutboundFrame` produced anywhere in a connection's lifetime
/// (direct replies from the reader, or chunks forwarded from the turn
/// runner task) funnels through this one unbounded channel, drained by a
/// single writer loop in [`crate::ws::connection`]. That funnel — not a
/// lock — is what keeps the socket single-writer, mirroring how the
/// teacher's `handle_connection` `select!` loop is the only place that
/// calls `tx.send` on the split sink.
#[derive(Clone)]
pub struct GatewaySink {
    tx: UnboundedSender<OutboundFrame>,
}

impl GatewaySink {
    pub fn new(tx: UnboundedSender<OutboundFrame>) -> Self {
        Self { tx }
    }
}

impl FrameSink for GatewaySink {
    fn send(&self, frame: OutboundFrame) -> reeflow_pipeline::Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| reeflow_pipeline::PipelineError::SinkClosed("connection closed".to_string()))
    }
}

/// Render an `OutboundFrame` to the wire `Message` the WS sink expects.
pub fn to_ws_message(frame: &OutboundFrame) -> Message {
    Message::Text(frame.to_json_string().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_forwards_frame_to_channel() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = GatewaySink::new(tx);

        sink.send(OutboundFrame::pong()).unwrap();

        let received = rx.try_recv().unwrap();
        assert!(matches!(received, OutboundFrame::Pong));
    }

    #[test]
    fn send_errors_once_receiver_is_dropped() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let sink = GatewaySink::new(tx);

        assert!(sink.send(OutboundFrame::pong()).is_err());
    }

    #[test]
    fn to_ws_message_carries_the_serialized_frame() {
        let frame = OutboundFrame::error("BUSY", "a previous message is still being processed");
        let Message::Text(text) = to_ws_message(&frame) else {
            panic!("expected a text message");
        };
        let text_ref: &str = &text;
        assert!(text_ref.contains("\"code\":\"BUSY\""));
    }
}

// Verify the wire format matches what clients expect.
// These tests pin down the envelope shape so it can never drift silently.

use reeflow_protocol::{InboundFrame, OutboundFrame};

#[test]
fn init_frame_round_trip() {
    let json = r#"{"type":"init","data":{"user_id":"u1","session_id":"s1"}}"#;
    let frame = InboundFrame::parse(json).unwrap();
    assert_eq!(
        frame,
        InboundFrame::Init {
            session_id: Some("s1".to_string()),
            user_id: "u1".to_string(),
        }
    );
}

#[test]
fn ping_round_trip_has_no_payload() {
    let out = OutboundFrame::pong();
    let json = serde_json::to_string(&out).unwrap();
    assert_eq!(json, r#"{"type":"pong"}"#);
}

#[test]
fn user_send_message_requires_content() {
    let json = r#"{"type":"userSendMessage","data":{"session_id":"s1"}}"#;
    assert!(InboundFrame::parse(json).is_err());
}

#[test]
fn legacy_flat_frame_coerces_to_user_send_message() {
    let json = r#"{"message":"and what about pH?","session_id":"s1","context":{"x":1}}"#;
    let frame = InboundFrame::parse(json).unwrap();
    match frame {
        InboundFrame::UserSendMessage {
            content,
            session_id,
            context,
        } => {
            assert_eq!(content, "and what about pH?");
            assert_eq!(session_id.as_deref(), Some("s1"));
            assert_eq!(context, Some(serde_json::json!({"x": 1})));
        }
        other => panic!("expected UserSendMessage, got {other:?}"),
    }
}

#[test]
fn new_chat_message_carries_role_and_type() {
    let out = OutboundFrame::new_chat_message(
        "s1",
        "hello",
        "m1",
        "user",
        "2026-01-01T00:00:00Z",
        "text",
    );
    let v = serde_json::to_value(&out).unwrap();
    assert_eq!(v["type"], "newChatMessage");
    assert_eq!(v["data"]["role"], "user");
    assert_eq!(v["data"]["type"], "text");
}

#[test]
fn error_frame_code_is_closed_set_string() {
    let out = OutboundFrame::error("NOT_INITIALIZED", "must init first");
    let v = serde_json::to_value(&out).unwrap();
    assert_eq!(v["data"]["code"], "NOT_INITIALIZED");
}

#[test]
fn done_frame_can_carry_a_warning_in_meta() {
    let out = OutboundFrame::done("s1", "m1", Some(serde_json::json!({"warning": "storage_error"})));
    let v = serde_json::to_value(&out).unwrap();
    assert_eq!(v["data"]["meta"]["warning"], "storage_error");
}

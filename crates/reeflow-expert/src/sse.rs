use serde_json::Value;

/// One parsed expert SSE frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpertFrame {
    Content(String),
    Done,
    Error(String),
}

/// Parse the payload of a single `data: ` frame.
///
/// Recognized JSON object shapes: `{content}`, `{done:true}`, `{error}`. A
/// payload that fails to parse as JSON — or parses but matches none of the
/// recognized shapes — is treated as a raw content chunk.
pub fn parse_payload(payload: &str) -> ExpertFrame {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => {
            if map.get("done").and_then(Value::as_bool) == Some(true) {
                return ExpertFrame::Done;
            }
            if let Some(err) = map.get("error").and_then(Value::as_str) {
                return ExpertFrame::Error(err.to_string());
            }
            if let Some(content) = map.get("content").and_then(Value::as_str) {
                return ExpertFrame::Content(content.to_string());
            }
            ExpertFrame::Content(payload.to_string())
        }
        _ => ExpertFrame::Content(payload.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_frame() {
        assert_eq!(
            parse_payload(r#"{"content":"hel"}"#),
            ExpertFrame::Content("hel".to_string())
        );
    }

    #[test]
    fn parses_done_frame() {
        assert_eq!(parse_payload(r#"{"done":true}"#), ExpertFrame::Done);
    }

    #[test]
    fn parses_error_frame() {
        assert_eq!(
            parse_payload(r#"{"error":"boom"}"#),
            ExpertFrame::Error("boom".to_string())
        );
    }

    #[test]
    fn non_json_payload_is_raw_content() {
        assert_eq!(
            parse_payload("just plain text"),
            ExpertFrame::Content("just plain text".to_string())
        );
    }

    #[test]
    fn json_object_with_no_recognized_key_falls_back_to_raw_content() {
        let raw = r#"{"unexpected":"shape"}"#;
        assert_eq!(parse_payload(raw), ExpertFrame::Content(raw.to_string()));
    }
}

use super::openai::{parse_sse_line, SseEvent};
use super::types::{ChatMessage, ChatRequest};

#[test]
fn sse_content_line_is_extracted() {
    let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
    match parse_sse_line(line) {
        SseEvent::Content(content) => assert_eq!(content, "Hel"),
        _ => panic!("expected content event"),
    }
}

#[test]
fn sse_done_marker_terminates() {
    assert!(matches!(parse_sse_line("data: [DONE]"), SseEvent::Done));
}

#[test]
fn sse_noise_is_skipped() {
    assert!(matches!(parse_sse_line(""), SseEvent::Skip));
    assert!(matches!(parse_sse_line(": keep-alive"), SseEvent::Skip));
    assert!(matches!(parse_sse_line("data: not json"), SseEvent::Skip));
    // Role-only delta at stream start carries no content.
    let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
    assert!(matches!(parse_sse_line(role_only), SseEvent::Skip));
}

#[test]
fn chat_request_defaults_leave_sampling_unset() {
    let request = ChatRequest::new(vec![
        ChatMessage::system("instructions"),
        ChatMessage::user("question"),
    ]);
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].role, "system");
    assert_eq!(request.messages[1].role, "user");
    assert!(request.temperature.is_none());
    assert!(request.max_tokens.is_none());
}

//! Streaming and non-streaming chat response handling.
//!
//! [`StreamSession`] is the per-request state machine. The network drivers
//! [`run_stream`] and [`run_completion`] feed it; it emits [`ChatEvent`]s and
//! guarantees a single `Finish` per request, whether the request completes,
//! fails, or is aborted.

use std::time::Duration;

use futures_util::StreamExt;
use memchr::memchr;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ChatRequest, ChatResponse};
use crate::core::error::{ChatError, UNAUTHORIZED_MESSAGE};
use crate::core::headers::HeaderSet;
use crate::core::smoothing::{SmoothingBuffer, ThinkingWrapper, FRAME_INTERVAL};

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Cumulative visible text plus the slice revealed by this update.
    Update { message: String, chunk: String },
    Error(ChatError),
    Finish {
        message: String,
        status: Option<u16>,
        response: Option<Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    MessagePrepared,
    Sent,
    Streaming,
    NonStreaming,
    Finished,
    Aborted,
}

impl StreamPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamPhase::Finished | StreamPhase::Aborted)
    }
}

/// What to do with a response once its headers arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    EventStream,
    /// Plain-text body that is the whole answer.
    PlainText,
    /// Error status or unexpected content type; the body is diagnostic.
    Diagnostic,
}

pub struct StreamSession {
    phase: StreamPhase,
    buffer: SmoothingBuffer,
    thinking: ThinkingWrapper,
    status: Option<u16>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl StreamSession {
    pub fn new(events: mpsc::UnboundedSender<ChatEvent>) -> Self {
        Self {
            phase: StreamPhase::Idle,
            buffer: SmoothingBuffer::new(),
            thinking: ThinkingWrapper::default(),
            status: None,
            events,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn visible(&self) -> &str {
        self.buffer.visible()
    }

    pub fn is_done(&self) -> bool {
        self.phase.is_terminal()
    }

    fn advance(&mut self, next: StreamPhase) {
        if !self.phase.is_terminal() {
            self.phase = next;
        }
    }

    pub fn mark_prepared(&mut self) {
        self.advance(StreamPhase::MessagePrepared);
    }

    pub fn mark_sent(&mut self) {
        self.advance(StreamPhase::Sent);
    }

    pub fn mark_non_streaming(&mut self) {
        self.advance(StreamPhase::NonStreaming);
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    /// Classifies the response head and records its status.
    pub fn open(&mut self, status: u16, content_type: Option<&str>) -> OpenOutcome {
        self.status = Some(status);
        let content_type = content_type.unwrap_or("").to_ascii_lowercase();
        if content_type.starts_with("text/plain") {
            return OpenOutcome::PlainText;
        }
        if status != 200 || !content_type.starts_with(EVENT_STREAM_CONTENT_TYPE) {
            return OpenOutcome::Diagnostic;
        }
        self.advance(StreamPhase::Streaming);
        OpenOutcome::EventStream
    }

    /// Finishes with a complete plain-text body as the answer.
    pub fn finish_with_text(&mut self, text: &str) {
        if self.is_done() {
            return;
        }
        self.buffer.push(text);
        self.finish();
    }

    /// Finishes with diagnostic text built from an unusable response.
    pub fn finish_with_diagnostic(&mut self, status: u16, body: &str) {
        if self.is_done() {
            return;
        }
        let mut parts = Vec::new();
        if status == 401 {
            parts.push(UNAUTHORIZED_MESSAGE.to_string());
        }
        if !body.trim().is_empty() {
            parts.push(format_api_error(body));
        }
        let diagnostic = parts.join("\n\n");
        if !diagnostic.is_empty() {
            if !self.buffer.full_text().is_empty() {
                self.buffer.push("\n\n");
            }
            self.buffer.push(&diagnostic);
        }
        self.finish();
    }

    /// Handles one SSE `data:` payload. Returns true on the `[DONE]` sentinel.
    pub fn handle_data(&mut self, payload: &str) -> bool {
        let payload = payload.trim();
        if payload == DONE_SENTINEL {
            return true;
        }
        if payload.is_empty() || self.is_done() {
            return false;
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!("skipping unparseable stream chunk: {err}");
                return false;
            }
        };

        if value.get("error").is_some() {
            let formatted = format_api_error(payload);
            self.buffer.push(&format!("\n\n{formatted}"));
            return false;
        }

        let response: ChatResponse = match serde_json::from_value(value) {
            Ok(response) => response,
            Err(err) => {
                warn!("skipping malformed stream chunk: {err}");
                return false;
            }
        };

        if let Some(choice) = response.choices.first() {
            if let Some(reasoning) = choice.delta.reasoning_content.as_deref() {
                let wrapped = self.thinking.reasoning(reasoning);
                self.buffer.push(&wrapped);
            }
            if let Some(content) = choice.delta.content.as_deref() {
                let wrapped = self.thinking.content(content);
                self.buffer.push(&wrapped);
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                debug!(finish_reason = reason, "stream choice finished");
            }
        }
        false
    }

    /// One animation frame: reveals the next slice of pending text.
    pub fn tick(&mut self) {
        if self.is_done() {
            return;
        }
        if let Some(chunk) = self.buffer.tick() {
            self.emit(ChatEvent::Update {
                message: self.buffer.visible().to_string(),
                chunk,
            });
        }
    }

    pub fn finish(&mut self) {
        self.complete(StreamPhase::Finished, None);
    }

    pub fn finish_with_response(&mut self, text: &str, response: Value) {
        if self.is_done() {
            return;
        }
        self.buffer.push(text);
        self.complete(StreamPhase::Finished, Some(response));
    }

    pub fn abort(&mut self) {
        self.complete(StreamPhase::Aborted, None);
    }

    /// Reports an error without ending the request.
    pub fn error(&mut self, err: ChatError) {
        if !self.is_done() {
            self.emit(ChatEvent::Error(err));
        }
    }

    fn complete(&mut self, terminal: StreamPhase, response: Option<Value>) {
        if self.is_done() {
            return;
        }
        if let Some(marker) = self.thinking.close() {
            self.buffer.push(&marker);
        }
        let rest = self.buffer.flush();
        if !rest.is_empty() {
            self.emit(ChatEvent::Update {
                message: self.buffer.visible().to_string(),
                chunk: rest,
            });
        }
        if self.buffer.visible().is_empty() {
            self.emit(ChatEvent::Error(ChatError::EmptyResponse));
        }
        self.phase = terminal;
        debug!(phase = ?terminal, len = self.buffer.visible().len(), "chat request finished");
        self.emit(ChatEvent::Finish {
            message: self.buffer.visible().to_string(),
            status: self.status,
            response,
        });
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn process_sse_line(line: &str, session: &mut StreamSession) -> bool {
    extract_data_payload(line)
        .map(|payload| session.handle_data(payload))
        .unwrap_or(false)
}

/// Splits complete lines off `buffer` and feeds them to the session.
/// Returns true once the done sentinel is seen.
fn drain_lines(buffer: &mut Vec<u8>, session: &mut StreamSession) -> bool {
    while let Some(newline_pos) = memchr(b'\n', buffer) {
        let done = match std::str::from_utf8(&buffer[..newline_pos]) {
            Ok(line) => process_sse_line(line.trim(), session),
            Err(err) => {
                warn!("invalid UTF-8 in stream: {err}");
                false
            }
        };
        buffer.drain(..=newline_pos);
        if done {
            return true;
        }
    }
    false
}

fn extract_error_summary(value: &Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                Value::String(s) => Some(s.to_string()),
                Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
                }
            }
            return format!("API Error:\n```json\n{}\n```", pretty_json);
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error:\n```\n{}\n```", trimmed)
    }
}

/// Extracts the answer from a non-streaming completion body, wrapping any
/// reasoning text in think markers.
pub fn extract_completion_text(value: &Value) -> Option<String> {
    let message = value.pointer("/choices/0/message")?;
    let content = message.get("content").and_then(Value::as_str).unwrap_or("");
    let reasoning = message
        .get("reasoning_content")
        .and_then(Value::as_str)
        .unwrap_or("");
    let mut wrapper = ThinkingWrapper::default();
    let mut text = wrapper.reasoning(reasoning);
    text.push_str(&wrapper.content(content));
    if let Some(marker) = wrapper.close() {
        text.push_str(&marker);
    }
    Some(text)
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub url: String,
    pub headers: HeaderSet,
    pub payload: ChatRequest,
    pub cancel_token: CancellationToken,
    /// Bound on waiting for the response head.
    pub timeout: Duration,
}

enum Dispatch {
    Response(reqwest::Response),
    Stopped,
}

async fn dispatch(params: &StreamParams, session: &mut StreamSession) -> Dispatch {
    let mut request = params.client.post(&params.url);
    for (name, value) in &params.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    let request = request.json(&params.payload);
    session.mark_sent();

    tokio::select! {
        biased;
        _ = params.cancel_token.cancelled() => {
            session.abort();
            Dispatch::Stopped
        }
        result = tokio::time::timeout(params.timeout, request.send()) => match result {
            Ok(Ok(response)) => Dispatch::Response(response),
            Ok(Err(err)) => {
                session.error(ChatError::from(err));
                session.finish();
                Dispatch::Stopped
            }
            Err(_) => {
                warn!(url = %params.url, "request timed out waiting for response");
                params.cancel_token.cancel();
                session.error(ChatError::Timeout);
                session.abort();
                Dispatch::Stopped
            }
        }
    }
}

async fn read_body(response: reqwest::Response, cancel: &CancellationToken) -> Option<String> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        body = response.text() => Some(body.unwrap_or_default()),
    }
}

/// Drives a streaming request to its single terminal event.
pub async fn run_stream(params: StreamParams, events: mpsc::UnboundedSender<ChatEvent>) {
    let mut session = StreamSession::new(events);
    session.mark_prepared();

    let response = match dispatch(&params, &mut session).await {
        Dispatch::Response(response) => response,
        Dispatch::Stopped => return,
    };

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    match session.open(status, content_type.as_deref()) {
        OpenOutcome::EventStream => {}
        outcome => {
            match read_body(response, &params.cancel_token).await {
                Some(body) if outcome == OpenOutcome::PlainText => session.finish_with_text(&body),
                Some(body) => session.finish_with_diagnostic(status, &body),
                None => session.abort(),
            }
            return;
        }
    }

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut frames = tokio::time::interval(FRAME_INTERVAL);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = params.cancel_token.cancelled() => {
                session.abort();
                break;
            }
            _ = frames.tick() => session.tick(),
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(&bytes);
                    if drain_lines(&mut buffer, &mut session) {
                        session.finish();
                        break;
                    }
                }
                Some(Err(err)) => {
                    session.error(ChatError::from(err));
                    session.finish();
                    break;
                }
                None => {
                    buffer.push(b'\n');
                    drain_lines(&mut buffer, &mut session);
                    session.finish();
                    break;
                }
            },
        }
    }
}

/// Drives a non-streaming request: one body, one `Finish`.
pub async fn run_completion(params: StreamParams, events: mpsc::UnboundedSender<ChatEvent>) {
    let mut session = StreamSession::new(events);
    session.mark_prepared();

    let response = match dispatch(&params, &mut session).await {
        Dispatch::Response(response) => response,
        Dispatch::Stopped => return,
    };
    session.mark_non_streaming();

    let status = response.status().as_u16();
    session.status = Some(status);
    let Some(body) = read_body(response, &params.cancel_token).await else {
        session.abort();
        return;
    };

    let value: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(err) => {
            if status == 401 {
                session.error(ChatError::Unauthorized);
            } else {
                session.error(ChatError::Decode(err.to_string()));
            }
            session.finish_with_diagnostic(status, &body);
            return;
        }
    };

    if status == 401 {
        session.error(ChatError::Unauthorized);
        session.finish_with_diagnostic(status, &body);
        return;
    }

    if value.get("error").is_some() || !(200..300).contains(&status) {
        session.error(ChatError::Protocol {
            status,
            body: body.clone(),
        });
        let pretty = format_api_error(&body);
        session.finish_with_response(&pretty, value);
        return;
    }

    let text = extract_completion_text(&value).unwrap_or_default();
    session.finish_with_response(&text, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> (StreamSession, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StreamSession::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn finishes(events: &[ChatEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|event| match event {
                ChatEvent::Finish { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    fn chunk(content: &str) -> String {
        serde_json::json!({"choices": [{"delta": {"content": content}}]}).to_string()
    }

    #[test]
    fn abort_after_three_chunks_finishes_once_with_all_text() {
        let (mut session, mut rx) = session();
        assert_eq!(session.open(200, Some("text/event-stream")), OpenOutcome::EventStream);
        for part in ["Hel", "lo, ", "world"] {
            assert!(!session.handle_data(&chunk(part)));
            session.tick();
        }
        session.abort();
        session.abort();
        session.finish();

        let events = drain(&mut rx);
        assert_eq!(finishes(&events), vec!["Hello, world"]);
        assert_eq!(session.phase(), StreamPhase::Aborted);
        assert!(!events.iter().any(|e| matches!(e, ChatEvent::Error(_))));
    }

    #[test]
    fn empty_stream_reports_error_before_finish() {
        let (mut session, mut rx) = session();
        session.open(200, Some("text/event-stream; charset=utf-8"));
        session.finish();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ChatEvent::Error(ChatError::EmptyResponse));
        assert!(matches!(&events[1], ChatEvent::Finish { message, status: Some(200), .. } if message.is_empty()));
    }

    #[test]
    fn updates_carry_cumulative_text_and_new_slice() {
        let (mut session, mut rx) = session();
        session.open(200, Some("text/event-stream"));
        session.handle_data(&chunk("ab"));
        session.tick();
        session.tick();
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ChatEvent::Update {
                    message: "a".to_string(),
                    chunk: "a".to_string()
                },
                ChatEvent::Update {
                    message: "ab".to_string(),
                    chunk: "b".to_string()
                },
            ]
        );
    }

    #[test]
    fn reasoning_is_wrapped_and_closed_when_content_resumes() {
        let (mut session, mut rx) = session();
        session.open(200, Some("text/event-stream"));
        session.handle_data(r#"{"choices":[{"delta":{"reasoning_content":"think "}}]}"#);
        session.handle_data(r#"{"choices":[{"delta":{"reasoning_content":"hard"}}]}"#);
        session.handle_data(&chunk("Done."));
        assert!(session.handle_data("[DONE]"));
        session.finish();

        let events = drain(&mut rx);
        assert_eq!(
            finishes(&events),
            vec!["<think>\nthink hard\n</think>\n\nDone."]
        );
    }

    #[test]
    fn unclosed_reasoning_is_closed_on_finish() {
        let (mut session, mut rx) = session();
        session.open(200, Some("text/event-stream"));
        session.handle_data(r#"{"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#);
        session.finish();
        assert_eq!(finishes(&drain(&mut rx)), vec!["<think>\nhmm\n</think>\n\n"]);
    }

    #[test]
    fn malformed_chunks_are_skipped() {
        let (mut session, mut rx) = session();
        session.open(200, Some("text/event-stream"));
        assert!(!session.handle_data("{not json"));
        assert!(!session.handle_data(r#"{"choices": "nope"}"#));
        session.handle_data(&chunk("still here"));
        session.finish();
        assert_eq!(finishes(&drain(&mut rx)), vec!["still here"]);
    }

    #[test]
    fn error_envelopes_in_stream_become_visible_text() {
        let (mut session, mut rx) = session();
        session.open(200, Some("text/event-stream"));
        session.handle_data(r#"{"error":{"message":"rate limited"}}"#);
        session.finish();
        let events = drain(&mut rx);
        let text = finishes(&events)[0];
        assert!(text.contains("API Error: rate limited"));
    }

    #[test]
    fn unauthorized_open_finishes_with_translated_message() {
        let (mut session, mut rx) = session();
        assert_eq!(session.open(401, Some("application/json")), OpenOutcome::Diagnostic);
        session.finish_with_diagnostic(401, r#"{"error":{"message":"bad key"}}"#);
        let events = drain(&mut rx);
        let text = finishes(&events)[0];
        assert!(text.starts_with(UNAUTHORIZED_MESSAGE));
        assert!(text.contains("API Error: bad key"));
    }

    #[test]
    fn plain_text_and_wrong_content_type_are_classified() {
        let (mut session, _rx) = session();
        assert_eq!(session.open(200, Some("text/plain; charset=utf-8")), OpenOutcome::PlainText);
        let (mut session, _rx) = self::session();
        assert_eq!(session.open(200, Some("application/json")), OpenOutcome::Diagnostic);
        let (mut session, _rx) = self::session();
        assert_eq!(session.open(500, Some("text/event-stream")), OpenOutcome::Diagnostic);
        assert_eq!(session.phase(), StreamPhase::Idle);
    }

    #[test]
    fn process_sse_line_handles_spacing_variants() {
        let (mut session, mut rx) = session();
        session.open(200, Some("text/event-stream"));
        assert!(!process_sse_line(r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#, &mut session));
        assert!(!process_sse_line(r#"data:{"choices":[{"delta":{"content":" World"}}]}"#, &mut session));
        assert!(!process_sse_line(": keep-alive comment", &mut session));
        assert!(process_sse_line("data:[DONE]", &mut session));
        session.finish();
        assert_eq!(finishes(&drain(&mut rx)), vec!["Hello World"]);
    }

    #[test]
    fn drain_lines_keeps_partial_lines_buffered() {
        let (mut session, mut rx) = session();
        session.open(200, Some("text/event-stream"));
        let line = format!("data: {}\n", chunk("split"));
        let (head, tail) = line.as_bytes().split_at(10);
        let mut buffer = head.to_vec();
        assert!(!drain_lines(&mut buffer, &mut session));
        assert_eq!(buffer.len(), 10);
        buffer.extend_from_slice(tail);
        assert!(!drain_lines(&mut buffer, &mut session));
        assert!(buffer.is_empty());
        session.finish();
        assert_eq!(finishes(&drain(&mut rx)), vec!["split"]);
    }

    #[test]
    fn completion_text_wraps_reasoning() {
        let value = serde_json::json!({
            "choices": [{"message": {"content": "42", "reasoning_content": "compute"}}]
        });
        assert_eq!(
            extract_completion_text(&value).as_deref(),
            Some("<think>\ncompute\n</think>\n\n42")
        );
        assert!(extract_completion_text(&serde_json::json!({})).is_none());
    }

    #[test]
    fn format_api_error_prettifies_json_with_summary() {
        let raw = r#"{"error":{"message":"model overloaded","type":"invalid_request_error"}}"#;
        let expected = r#"API Error: model overloaded
```json
{
  "error": {
    "message": "model overloaded",
    "type": "invalid_request_error"
  }
}
```"#;
        assert_eq!(format_api_error(raw), expected);
    }

    #[test]
    fn format_api_error_handles_xml_and_plaintext() {
        assert_eq!(format_api_error("<error>bad</error>"), "API Error:\n```xml\n<error>bad</error>\n```");
        assert_eq!(format_api_error("api failure"), "API Error:\n```\napi failure\n```");
    }
}

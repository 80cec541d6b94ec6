//! # SSE Parser
//!
//! Wraps an HTTP response body (a byte stream) into a lazy, restartable
//! sequence of typed JSON frames, one per `data: <json>\n\n` event. Frames
//! that split across TCP chunks are buffered by `eventsource-stream` until
//! complete; this module only has to decide what to do with a *complete*
//! frame.
//!
//! Two failure modes are handled differently, matching §7 of the error
//! handling design:
//!
//! - A transport-level failure (the underlying byte stream itself erroring,
//!   e.g. the connection dropping mid-response) is **not** swallowed: it is
//!   surfaced as `Error::Transport` and ends the stream, because the turn
//!   cannot continue without a live connection.
//! - A frame whose `data:` payload isn't valid JSON is logged and skipped;
//!   the stream continues. This keeps one bad frame from aborting an
//!   otherwise-healthy turn.

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;

use crate::error::{Error, Result};

/// A boxed stream of parsed JSON frames, one per complete SSE event whose
/// `data:` payload decoded successfully.
pub type JsonEventStream = Pin<Box<dyn Stream<Item = Result<serde_json::Value>> + Send>>;

/// Parse a response body's byte stream into a stream of JSON frames.
///
/// `[DONE]` sentinel frames (an OpenAI-compatibility convention some runtimes
/// still emit ahead of, or instead of, a `done` wire event) and blank frames
/// are silently dropped rather than treated as parse errors.
pub fn parse_sse_json<S, E>(body: S) -> JsonEventStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let events = body.eventsource();
    Box::pin(events.filter_map(|frame| async move {
        match frame {
            Ok(event) => {
                let data = event.data.trim();
                if data.is_empty() || data == "[DONE]" {
                    return None;
                }
                match serde_json::from_str::<serde_json::Value>(data) {
                    Ok(value) => Some(Ok(value)),
                    Err(err) => {
                        log::warn!("skipping malformed SSE frame ({err}): {data:.200}");
                        None
                    }
                }
            }
            Err(err) => Some(Err(Error::transport(format!(
                "SSE stream terminated: {err}"
            )))),
        }
    }))
}

/// Synthesize the equivalent of a streamed event sequence from a single JSON
/// document, for the `application/json` (non-streaming) response branch of
/// §4.I.1. Returns the frames in the order the streaming branch would have
/// produced them: `action:start`, `action:args`, `tool_calls`, `done`.
///
/// This keeps `crate::agent_loop` uniform: it always consumes a
/// `JsonEventStream`, whether the server replied with SSE or with one JSON
/// object.
pub fn synthesize_json_response_frames(body: serde_json::Value) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();

    if let Some(tool_calls) = body.get("toolCalls").and_then(|v| v.as_array()) {
        for call in tool_calls {
            let id = call.get("id").cloned().unwrap_or(serde_json::Value::Null);
            let name = call
                .get("name")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            frames.push(serde_json::json!({
                "type": "action:start",
                "id": id,
                "name": name,
            }));
            let args = call
                .get("args")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "{}".to_string());
            frames.push(serde_json::json!({
                "type": "action:args",
                "id": id,
                "args": args,
            }));
        }
        frames.push(serde_json::json!({
            "type": "tool_calls",
            "toolCalls": tool_calls,
            "assistantMessage": body.get("assistantMessage").cloned().unwrap_or(serde_json::json!({
                "role": "assistant",
                "content": body.get("content").cloned().unwrap_or(serde_json::Value::Null),
                "tool_calls": tool_calls,
            })),
        }));
    } else if let Some(content) = body.get("content").and_then(|v| v.as_str()) {
        frames.push(serde_json::json!({
            "type": "message:delta",
            "content": content,
        }));
    }

    let mut done = serde_json::json!({ "type": "done" });
    if let Some(requires_action) = body.get("requiresAction") {
        done["requiresAction"] = requires_action.clone();
    }
    if let Some(messages) = body.get("messages") {
        done["messages"] = messages.clone();
    }
    frames.push(done);
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn parses_complete_frames() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"type\":\"message:delta\",\"content\":\"hi\"}\n\n",
            )),
            Ok(Bytes::from_static(b"data: {\"type\":\"done\"}\n\n")),
        ];
        let mut stream = parse_sse_json(stream::iter(chunks));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first["type"], "message:delta");
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second["type"], "done");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn buffers_frames_split_across_chunks() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"mess")),
            Ok(Bytes::from_static(b"age:delta\",\"content\":\"hi\"}\n\n")),
        ];
        let mut stream = parse_sse_json(stream::iter(chunks));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first["type"], "message:delta");
    }

    #[tokio::test]
    async fn skips_malformed_frame_and_continues() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: not json at all\n\n")),
            Ok(Bytes::from_static(b"data: {\"type\":\"done\"}\n\n")),
        ];
        let mut stream = parse_sse_json(stream::iter(chunks));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first["type"], "done");
    }

    #[tokio::test]
    async fn drops_done_sentinel() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"data: [DONE]\n\n"))];
        let mut stream = parse_sse_json(stream::iter(chunks));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn synthesizes_plain_text_response() {
        let body = serde_json::json!({ "content": "hi there" });
        let frames = synthesize_json_response_frames(body);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["type"], "message:delta");
        assert_eq!(frames[1]["type"], "done");
    }

    #[test]
    fn synthesizes_tool_call_response() {
        let body = serde_json::json!({
            "toolCalls": [{"id": "t1", "name": "get_time", "args": {}}],
            "requiresAction": true,
        });
        let frames = synthesize_json_response_frames(body);
        let types: Vec<_> = frames
            .iter()
            .map(|f| f["type"].as_str().unwrap())
            .collect();
        assert_eq!(
            types,
            vec!["action:start", "action:args", "tool_calls", "done"]
        );
        assert_eq!(frames.last().unwrap()["requiresAction"], true);
    }
}

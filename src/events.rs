//! # Wire Event Protocol (component H)
//!
//! The tagged-union shape a streaming (or synthesized, see `crate::sse`)
//! response is made of. Deserializing is intentionally forgiving: an event
//! type this crate doesn't recognize decodes to `StreamEvent::Unknown`
//! instead of failing the whole stream, so a runtime can add new event types
//! without breaking older clients (§4.H "forward compatibility").

use serde::{Deserialize, Serialize};

use crate::types::Source;

/// One entry of the `tool_calls` event's `toolCalls` array — a
/// host-friendly duplicate of the accompanying `assistantMessage.tool_calls`
/// with `args` left as a parsed JSON value rather than a re-encoded string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallAnnouncement {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// A single frame of the wire protocol, dispatched by its `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "message:delta")]
    MessageDelta { content: String },

    #[serde(rename = "thinking:delta")]
    ThinkingDelta { content: String },

    #[serde(rename = "action:start")]
    ActionStart { id: String, name: String },

    #[serde(rename = "action:args")]
    ActionArgs { id: String, args: String },

    #[serde(rename = "action:end")]
    ActionEnd { id: String },

    #[serde(rename = "tool_calls")]
    ToolCalls {
        #[serde(rename = "toolCalls")]
        tool_calls: Vec<ToolCallAnnouncement>,
        #[serde(rename = "assistantMessage")]
        assistant_message: serde_json::Value,
    },

    #[serde(rename = "source:add")]
    SourceAdd { source: Source },

    #[serde(rename = "loop:iteration")]
    LoopIteration { iteration: usize },

    #[serde(rename = "loop:complete")]
    LoopComplete { iterations: usize },

    #[serde(rename = "done")]
    Done {
        #[serde(rename = "requiresAction", default)]
        requires_action: Option<bool>,
        #[serde(default)]
        messages: Option<Vec<serde_json::Value>>,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        recoverable: Option<bool>,
    },

    /// Catch-all for any `type` this crate doesn't recognize yet. Carries the
    /// raw frame so a host that wants to inspect unrecognized events still
    /// can.
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Whether this event ends the current server turn's streaming phase —
    /// `done` or a terminal `error`. `tool_calls` does not: it hands control
    /// to the tool execution pipeline, but the turn isn't over (§4.I.1).
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

/// Parse one already-decoded JSON frame (from `crate::sse::JsonEventStream`)
/// into a `StreamEvent`. A frame whose shape doesn't match its declared
/// `type` (a malformed `tool_calls` event missing `toolCalls`, say) is logged
/// and downgraded to `Unknown` rather than aborting the stream — matching
/// `parse_sse_json`'s per-frame error isolation.
pub fn dispatch(frame: serde_json::Value) -> StreamEvent {
    match serde_json::from_value(frame.clone()) {
        Ok(event) => event,
        Err(err) => {
            log::warn!("unrecognized or malformed wire event ({err}): {frame}");
            StreamEvent::Unknown
        }
    }
}

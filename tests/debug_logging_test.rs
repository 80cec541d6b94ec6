//! Tests that malformed or unrecognized wire frames are logged and
//! tolerated rather than aborting a turn.
//!
//! The crate logs at `debug`/`warn` level (see `events::dispatch` and
//! `agent_loop`'s drive loop) whenever a frame doesn't match a known event
//! shape, or the server reports a recoverable error mid-stream. These tests
//! exercise those paths end-to-end through `Session` and confirm the turn
//! still completes.

use async_trait::async_trait;
use embed_agent_runtime::{AgentOptions, JsonEventStream, Result, RuntimeTransport, Session, TurnOutcome};
use std::collections::VecDeque;
use std::sync::Mutex;

struct ScriptedTransport {
    turns: Mutex<VecDeque<Vec<serde_json::Value>>>,
}

impl ScriptedTransport {
    fn new(turns: Vec<Vec<serde_json::Value>>) -> Self {
        ScriptedTransport {
            turns: Mutex::new(turns.into()),
        }
    }
}

#[async_trait]
impl RuntimeTransport for ScriptedTransport {
    async fn submit(&self, _body: serde_json::Value) -> Result<JsonEventStream> {
        let frames = self.turns.lock().unwrap().pop_front().expect("no more scripted turns");
        Ok(Box::pin(futures::stream::iter(frames.into_iter().map(Ok))))
    }
}

fn options() -> AgentOptions {
    AgentOptions::builder()
        .runtime_url("https://runtime.example.com/agent")
        .system_prompt("You are helpful.")
        .build()
        .unwrap()
}

fn init_debug_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

#[tokio::test]
async fn unrecognized_event_type_is_logged_and_ignored() {
    init_debug_logging();

    let transport = ScriptedTransport::new(vec![vec![
        serde_json::json!({"type": "some_future_event", "payload": 1}),
        serde_json::json!({"type": "message:delta", "content": "hi there"}),
        serde_json::json!({"type": "done"}),
    ]]);

    let mut session = Session::new(std::sync::Arc::new(transport), options()).unwrap();
    let outcome = session.send("hello").await.unwrap();

    assert!(matches!(outcome, TurnOutcome::Completed { .. }));
    assert_eq!(session.messages().last().unwrap().content.as_deref(), Some("hi there"));
}

#[tokio::test]
async fn malformed_tool_calls_frame_is_logged_and_downgraded() {
    init_debug_logging();

    // Missing the required `toolCalls`/`assistantMessage` fields — the
    // protocol dispatcher logs a warning and falls back to `Unknown`
    // instead of failing the whole stream.
    let transport = ScriptedTransport::new(vec![vec![
        serde_json::json!({"type": "tool_calls"}),
        serde_json::json!({"type": "message:delta", "content": "ok"}),
        serde_json::json!({"type": "done"}),
    ]]);

    let mut session = Session::new(std::sync::Arc::new(transport), options()).unwrap();
    let outcome = session.send("hello").await.unwrap();

    assert!(matches!(outcome, TurnOutcome::Completed { .. }));
}

#[tokio::test]
async fn recoverable_error_event_is_logged_and_the_turn_continues() {
    init_debug_logging();

    let transport = ScriptedTransport::new(vec![vec![
        serde_json::json!({"type": "error", "message": "upstream hiccup", "recoverable": true}),
        serde_json::json!({"type": "message:delta", "content": "recovered"}),
        serde_json::json!({"type": "done"}),
    ]]);

    let mut session = Session::new(std::sync::Arc::new(transport), options()).unwrap();
    let outcome = session.send("hello").await.unwrap();

    assert!(matches!(outcome, TurnOutcome::Completed { .. }));
    assert_eq!(session.messages().last().unwrap().content.as_deref(), Some("recovered"));
}

#[tokio::test]
async fn non_recoverable_error_event_still_surfaces_as_a_turn_error() {
    init_debug_logging();

    let transport = ScriptedTransport::new(vec![vec![
        serde_json::json!({"type": "error", "message": "fatal upstream failure", "recoverable": false}),
    ]]);

    let mut session = Session::new(std::sync::Arc::new(transport), options()).unwrap();
    let result = session.send("hello").await;

    assert!(result.is_err());
    assert!(session.error().unwrap().contains("fatal upstream failure"));
}

//! # Host-Facing Session (§6.5)
//!
//! `Session` is the single object a host embeds: it owns the `AgentLoop`
//! and the `ThreadStore` together and exposes the surface §6.5 enumerates
//! — turn control, tool/action registration, context attachment, approval
//! decisions, and thread management — so a host never has to hand-thread
//! the two stores through its own call sites.
//!
//! The spec calls for "observables (or equivalent)" over messages,
//! `isLoading`, `error`, sources, tool executions, and loop iteration. This
//! crate has no reactive-framework dependency to hang an `Observable<T>`
//! off of — hosts bring their own (a Svelte store, a `Signal`, a channel).
//! What `Session` provides instead is the state those observables would
//! wrap: plain getters a host polls after `send`/`resume`/`regenerate`
//! settles, mirroring how the teacher's `Client` exposes `last_error()`
//! rather than inventing an event-emitter type the crate doesn't need.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use crate::agent_loop::{AgentLoop, ApprovalDecision, HttpRuntimeTransport, RuntimeTransport, TurnOutcome};
use crate::error::{Error, Result};
use crate::hooks::{Hooks, HookDecision};
use crate::permissions::PermissionLevel;
use crate::thread::ThreadStore;
use crate::tools::{Tool, ToolExecution};
use crate::types::{ActionDefinition, AgentOptions, Message, Source, Thread};

/// Snapshot of turn-level state a host polls after a turn settles, standing
/// in for the spec's `isLoading`/`error`/`loop:iteration` observables.
#[derive(Debug, Clone, Default)]
struct TurnState {
    is_loading: bool,
    last_error: Option<String>,
    loop_iteration: u32,
    max_iterations_reached: bool,
}

pub struct Session {
    agent: AgentLoop,
    threads: ThreadStore,
    is_loading: Arc<AtomicBool>,
    last_error: Arc<RwLock<Option<String>>>,
    loop_iteration: Arc<AtomicU32>,
    max_iterations_reached: Arc<AtomicBool>,
}

impl Session {
    /// Build a session over a custom `RuntimeTransport` (tests, or a host
    /// that wants its own HTTP layer). The `ThreadStore` is hydrated from
    /// `options.thread_persistence` (a no-op adapter by default), and a
    /// fresh active thread is created if nothing was loaded.
    pub fn new(transport: Arc<dyn RuntimeTransport>, options: AgentOptions) -> Result<Self> {
        let thread_persistence = options.thread_persistence.clone();
        let mut agent = AgentLoop::new(transport, options);

        let is_loading = Arc::new(AtomicBool::new(false));
        let last_error = Arc::new(RwLock::new(None));
        let loop_iteration = Arc::new(AtomicU32::new(0));
        let max_iterations_reached = Arc::new(AtomicBool::new(false));
        wire_turn_complete_hook(&mut agent.hooks, &loop_iteration, &max_iterations_reached);

        let mut threads = ThreadStore::with_persistence(thread_persistence)?;
        threads.init();

        Ok(Session {
            agent,
            threads,
            is_loading,
            last_error,
            loop_iteration,
            max_iterations_reached,
        })
    }

    /// Convenience constructor wired to the production `HttpRuntimeTransport`.
    pub fn connect(options: AgentOptions) -> Result<Self> {
        let transport = Arc::new(HttpRuntimeTransport::new(options.clone())?);
        Session::new(transport, options)
    }

    fn active_thread_id(&mut self) -> String {
        self.threads.init().to_string()
    }

    fn begin_turn(&self) {
        self.is_loading.store(true, Ordering::SeqCst);
        *self.last_error.write().unwrap() = None;
    }

    fn end_turn(&self, outcome: &Result<TurnOutcome>) {
        self.is_loading.store(false, Ordering::SeqCst);
        if let Err(err) = outcome {
            *self.last_error.write().unwrap() = Some(err.to_string());
        }
    }

    // ========================================================================
    // TURN CONTROL
    // ========================================================================

    pub async fn send(&mut self, text: impl Into<String>) -> Result<TurnOutcome> {
        let thread_id = self.active_thread_id();
        self.begin_turn();
        let outcome = self.agent.send(&mut self.threads, &thread_id, text).await;
        self.end_turn(&outcome);
        outcome
    }

    /// Request cancellation of whatever turn is currently in flight.
    pub fn stop(&self) {
        self.agent.stop();
    }

    /// Clear the active thread's messages and sources, keeping its id/title.
    pub fn clear(&mut self) -> Result<()> {
        let thread_id = self.active_thread_id();
        self.threads.clear(&thread_id)
    }

    /// Redo a prior response (§6.5 `regenerate`). `message_id` names which
    /// assistant message to redo; `None` means the most recent one.
    pub async fn regenerate(&mut self, message_id: Option<&str>) -> Result<TurnOutcome> {
        let thread_id = self.active_thread_id();
        self.begin_turn();
        let outcome = self.agent.regenerate(&mut self.threads, &thread_id, message_id).await;
        self.end_turn(&outcome);
        outcome
    }

    // ========================================================================
    // TOOLS & ACTIONS
    // ========================================================================

    pub fn register_tool(&mut self, tool: Tool) {
        self.agent.registry.register(tool);
    }

    pub fn unregister_tool(&mut self, name: &str) -> bool {
        self.agent.registry.unregister(name)
    }

    pub fn register_action(&mut self, action: ActionDefinition) {
        self.agent.register_action(action);
    }

    pub fn unregister_action(&mut self, name: &str) -> Option<ActionDefinition> {
        self.agent.unregister_action(name)
    }

    // ========================================================================
    // CONTEXT TREE
    // ========================================================================

    pub fn add_context(&mut self, value: impl Into<String>, parent_id: Option<&str>) -> Result<String> {
        self.agent.context_tree.add(value, parent_id)
    }

    pub fn remove_context(&mut self, id: &str) -> bool {
        self.agent.context_tree.remove(id)
    }

    // ========================================================================
    // APPROVALS
    // ========================================================================

    pub async fn approve(&mut self, execution_id: impl Into<String>, persist: Option<PermissionLevel>) -> Result<TurnOutcome> {
        let thread_id = self.active_thread_id();
        let decision = ApprovalDecision {
            execution_id: execution_id.into(),
            approved: true,
            reason: None,
            persist,
        };
        self.begin_turn();
        let outcome = self.agent.resume(&mut self.threads, &thread_id, vec![decision]).await;
        self.end_turn(&outcome);
        outcome
    }

    pub async fn reject(
        &mut self,
        execution_id: impl Into<String>,
        reason: Option<String>,
        persist: Option<PermissionLevel>,
    ) -> Result<TurnOutcome> {
        let thread_id = self.active_thread_id();
        let decision = ApprovalDecision {
            execution_id: execution_id.into(),
            approved: false,
            reason,
            persist,
        };
        self.begin_turn();
        let outcome = self.agent.resume(&mut self.threads, &thread_id, vec![decision]).await;
        self.end_turn(&outcome);
        outcome
    }

    // ========================================================================
    // THREAD MANAGEMENT
    // ========================================================================

    pub fn create_thread(&mut self, title: Option<String>) -> String {
        self.threads.create(title)
    }

    pub fn switch_thread(&mut self, id: &str) -> Result<()> {
        self.threads.switch(id)
    }

    pub fn delete_thread(&mut self, id: &str) -> Result<()> {
        self.threads.delete(id)
    }

    pub fn clear_thread(&mut self, id: &str) -> Result<()> {
        self.threads.clear(id)
    }

    pub fn update_thread_title(&mut self, id: &str, title: impl Into<String>) -> Result<()> {
        self.threads.update_title(id, title)
    }

    pub fn get_thread(&self, id: &str) -> Result<&Thread> {
        self.threads.get(id)
    }

    pub fn list_threads(&self) -> Vec<&Thread> {
        self.threads.list()
    }

    // ========================================================================
    // OBSERVABLES (polled snapshots — see module docs)
    // ========================================================================

    /// The active thread's messages, or an empty slice if none is active
    /// (never the case once a `Session` has been constructed via `new`).
    pub fn messages(&self) -> &[Message] {
        self.threads.active().map(|t| t.messages.as_slice()).unwrap_or(&[])
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> Option<String> {
        self.last_error.read().unwrap().clone()
    }

    pub fn sources(&self) -> Vec<Source> {
        self.threads.active().map(|t| t.sources.clone()).unwrap_or_default()
    }

    /// Tool executions recorded on the active thread's most recent
    /// assistant message.
    pub fn tool_executions(&self) -> Vec<ToolExecution> {
        self.threads
            .active()
            .and_then(|t| t.messages.iter().rev().find(|m| !m.metadata.tool_executions.is_empty()))
            .map(|m| m.metadata.tool_executions.clone())
            .unwrap_or_default()
    }

    pub fn loop_iteration(&self) -> u32 {
        self.loop_iteration.load(Ordering::SeqCst)
    }

    pub fn max_iterations_reached(&self) -> bool {
        self.max_iterations_reached.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> TurnState {
        TurnState {
            is_loading: self.is_loading(),
            last_error: self.error(),
            loop_iteration: self.loop_iteration(),
            max_iterations_reached: self.max_iterations_reached(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("active_thread", &self.threads.active_id())
            .field("turn_state", &self.snapshot())
            .finish()
    }
}

fn wire_turn_complete_hook(hooks: &mut Hooks, loop_iteration: &Arc<AtomicU32>, max_iterations_reached: &Arc<AtomicBool>) {
    let iteration_handle = loop_iteration.clone();
    let max_iter_handle = max_iterations_reached.clone();
    hooks.on_turn_complete(move |event| {
        let iteration_handle = iteration_handle.clone();
        let max_iter_handle = max_iter_handle.clone();
        async move {
            iteration_handle.store(event.iterations as u32, Ordering::SeqCst);
            max_iter_handle.store(event.max_iterations_reached, Ordering::SeqCst);
            HookDecision::Continue
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_loop::RuntimeTransport;
    use crate::sse::JsonEventStream;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    struct ScriptedTransport {
        frames: StdMutex<VecDeque<Vec<serde_json::Value>>>,
    }

    impl ScriptedTransport {
        fn new(turns: Vec<Vec<serde_json::Value>>) -> Self {
            ScriptedTransport {
                frames: StdMutex::new(turns.into()),
            }
        }
    }

    #[async_trait]
    impl RuntimeTransport for ScriptedTransport {
        async fn submit(&self, _body: serde_json::Value) -> Result<JsonEventStream> {
            let frames = self.frames.lock().unwrap().pop_front().expect("no more scripted turns");
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

    #[tokio::test]
    async fn send_updates_messages_and_clears_loading() {
        let transport = ScriptedTransport::new(vec![vec![
            serde_json::json!({"type": "message:delta", "content": "hi there"}),
            serde_json::json!({"type": "done"}),
        ]]);
        let mut session = Session::new(Arc::new(transport), options()).unwrap();
        assert!(!session.is_loading());

        let outcome = session.send("hello").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        assert!(!session.is_loading());
        assert!(session.error().is_none());
        assert_eq!(session.messages().last().unwrap().content.as_deref(), Some("hi there"));
    }

    #[tokio::test]
    async fn failed_turn_surfaces_error_and_clears_loading() {
        let transport = ScriptedTransport::new(vec![]);
        let mut session = Session::new(Arc::new(transport), options()).unwrap();
        let outcome = session.send("hello").await;
        assert!(outcome.is_err());
        assert!(!session.is_loading());
        assert!(session.error().is_some());
    }

    #[tokio::test]
    async fn approve_resumes_a_paused_tool_call() {
        let transport = ScriptedTransport::new(vec![
            vec![serde_json::json!({
                "type": "tool_calls",
                "toolCalls": [{"id": "t1", "name": "dangerous", "args": "{}"}],
                "assistantMessage": {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "t1", "type": "function", "function": {"name": "dangerous", "arguments": "{}"}}
                ]},
            }), serde_json::json!({"type": "done"})],
            vec![
                serde_json::json!({"type": "message:delta", "content": "done"}),
                serde_json::json!({"type": "done"}),
            ],
        ]);
        let mut session = Session::new(Arc::new(transport), options()).unwrap();
        session.register_tool(
            crate::tools::tool("dangerous", "does something risky")
                .needs_approval(crate::tools::NeedsApproval::Always)
                .approval_message("Allow?")
                .handler(|_args, _ctx| async { Ok(crate::tools::ToolResponse::success_message("ok")) })
                .build(),
        );

        let outcome = session.send("go").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::NeedsApproval { .. }));

        let outcome = session.approve("t1", None).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
    }

    #[test]
    fn thread_management_round_trips() {
        let transport = ScriptedTransport::new(vec![]);
        let mut session = Session::new(Arc::new(transport), options()).unwrap();
        let second = session.create_thread(Some("second".into()));
        assert_eq!(session.list_threads().len(), 2);
        session.switch_thread(&second).unwrap();
        assert_eq!(session.get_thread(&second).unwrap().title.as_deref(), Some("second"));
        session.update_thread_title(&second, "renamed").unwrap();
        assert_eq!(session.get_thread(&second).unwrap().title.as_deref(), Some("renamed"));
        session.delete_thread(&second).unwrap();
        assert_eq!(session.list_threads().len(), 1);
    }

    #[test]
    fn register_and_unregister_action_round_trips() {
        let transport = ScriptedTransport::new(vec![]);
        let mut session = Session::new(Arc::new(transport), options()).unwrap();
        session.register_action(ActionDefinition::new("legacy", "desc", serde_json::json!({})));
        assert!(session.unregister_action("legacy").is_some());
        assert!(session.unregister_action("legacy").is_none());
    }

    #[test]
    fn add_and_remove_context() {
        let transport = ScriptedTransport::new(vec![]);
        let mut session = Session::new(Arc::new(transport), options()).unwrap();
        let id = session.add_context("project: widgets", None).unwrap();
        assert!(session.remove_context(&id));
    }
}

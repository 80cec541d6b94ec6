//! # Agent Loop (component I)
//!
//! The state machine that drives one user turn from submission to
//! completion: `Idle -> Submitting -> Receiving -> (Approving -> Executing)*
//! -> Resubmitting -> ... -> Idle` (§4.I.1). A turn can pause mid-cycle
//! waiting on a host's approval decision — `send` returns
//! `TurnOutcome::NeedsApproval` in that case, and the host calls `resume`
//! once it has decisions, which re-enters the same cycle where it left off.
//!
//! Request construction (§4.I.2), the resubmit body after tool execution
//! (§4.I.3), and the event-to-thread-mutation table (§4.I.4) all live here;
//! the server-side tool path (§4.I.5) falls out of the same code, since a
//! server-located tool call simply never appears in `classify`'s input.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::StreamExt;
use serde_json::Value;

use crate::context::ContextTree;
use crate::error::{Error, Result};
use crate::events::{self, StreamEvent};
use crate::hooks::{Hooks, PostToolUseEvent, PreToolUseEvent, TurnCompleteEvent, UserPromptSubmitEvent, HookDecision};
use crate::permissions::{PermissionLevel, PermissionStore, ToolPermission};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::sse::{parse_sse_json, synthesize_json_response_frames, JsonEventStream};
use crate::thread::{park_assistant_placeholder, ThreadStore};
use crate::tools::{
    CancellationSignal, ExecutionPass, PendingApproval, ToolCallInfo, ToolContext, ToolExecution, ToolPipeline,
    ToolRegistry, ToolResponse,
};
use crate::types::{ActionDefinition, AgentOptions, Message, Role, Thread, ToolCallRequest};

// ============================================================================
// RUNTIME TRANSPORT
// ============================================================================

/// Abstraction over "send a request body to the runtime endpoint, get back a
/// stream of wire frames" — whether the server actually streamed (SSE) or
/// replied with one JSON document (synthesized into the same frame shape by
/// `crate::sse::synthesize_json_response_frames`). Exists mainly so tests can
/// substitute a scripted transport instead of making real HTTP calls.
#[async_trait]
pub trait RuntimeTransport: Send + Sync {
    async fn submit(&self, body: Value) -> Result<JsonEventStream>;
}

/// The production transport: POSTs to `AgentOptions::runtime_url`, retrying
/// the initial request (not the stream once it starts) via
/// `crate::retry::retry_with_backoff`.
pub struct HttpRuntimeTransport {
    client: reqwest::Client,
    options: AgentOptions,
}

impl HttpRuntimeTransport {
    pub fn new(options: AgentOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(Error::from)?;
        Ok(HttpRuntimeTransport { client, options })
    }
}

#[async_trait]
impl RuntimeTransport for HttpRuntimeTransport {
    async fn submit(&self, body: Value) -> Result<JsonEventStream> {
        let policy = RetryPolicy {
            max_retries: self.options.max_retries,
            ..RetryPolicy::default()
        };
        let client = &self.client;
        let options = &self.options;

        retry_with_backoff(&policy, || {
            let body = body.clone();
            async move {
                let mut request = client.post(&options.runtime_url).json(&body);
                if let Some(api_key) = &options.api_key {
                    request = request.bearer_auth(api_key);
                }
                let response = request.send().await?;
                let response = response.error_for_status().map_err(Error::from)?;

                let content_type = response
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();

                if content_type.contains("text/event-stream") {
                    Ok(parse_sse_json(response.bytes_stream()))
                } else {
                    let value: Value = response.json().await?;
                    let frames = synthesize_json_response_frames(value);
                    Ok(Box::pin(futures::stream::iter(frames.into_iter().map(Ok))) as JsonEventStream)
                }
            }
        })
        .await
    }
}

// ============================================================================
// REQUEST CONSTRUCTION (§4.I.2)
// ============================================================================

/// Build the request body sent to the runtime endpoint: system prompt (with
/// the context tree rendered and appended), the full message history in wire
/// shape, the client tool catalog, and the knowledge base / bot id hints the
/// runtime forwards on this crate's behalf (§1: this crate never talks to a
/// KB directly).
pub fn build_request_body(
    options: &AgentOptions,
    thread: &Thread,
    context_tree: &ContextTree,
    registry: &ToolRegistry,
    actions: &[ActionDefinition],
) -> Value {
    let mut system_prompt = options.system_prompt.clone();
    if !context_tree.is_empty() {
        system_prompt.push_str("\n\n");
        system_prompt.push_str(&context_tree.render());
    }

    let messages: Vec<Value> = thread.messages.iter().map(Message::to_wire).collect();
    let tools = registry.client_tools_wire();

    let mut body = serde_json::json!({
        "threadId": thread.id,
        "systemPrompt": system_prompt,
        "messages": messages,
        "stream": options.streaming,
    });
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools);
    }
    if !actions.is_empty() {
        body["actions"] = serde_json::to_value(actions).unwrap_or(Value::Array(Vec::new()));
    }
    if let Some(model) = &options.model {
        body["model"] = Value::String(model.clone());
    }
    if let Some(bot_id) = &options.bot_id {
        body["botId"] = Value::String(bot_id.clone());
    }
    if let Some(kb) = &options.knowledge_base {
        body["knowledgeBase"] = serde_json::to_value(kb).unwrap_or(Value::Null);
    }
    body
}

/// Reconstruct `Message`s from a `done.messages` payload (plain OpenAI-shape
/// JSON objects, no local metadata) for the reconciliation step of §4.I.4.
/// Multimodal `content` arrays are flattened to their `text` part only — the
/// runtime is the source of truth for what was actually sent, and this crate
/// has no way to recover a discarded attachment from its own echo.
fn parse_wire_messages(raw: Vec<Value>, thread_id: &str) -> Result<Vec<Message>> {
    raw.into_iter()
        .map(|value| {
            let role: Role = serde_json::from_value(
                value
                    .get("role")
                    .cloned()
                    .ok_or_else(|| Error::protocol("done.messages entry missing role"))?,
            )
            .map_err(|e| Error::protocol(format!("done.messages entry has invalid role: {e}")))?;

            let content = match value.get("content") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Array(parts)) => {
                    let text = parts
                        .iter()
                        .filter(|p| p.get("type").and_then(|t| t.as_str()) == Some("text"))
                        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                        .collect::<Vec<_>>()
                        .join("\n");
                    Some(text)
                }
                _ => None,
            };

            let tool_calls = value
                .get("tool_calls")
                .and_then(|tc| tc.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|item| serde_json::from_value::<ToolCallRequest>(item.clone()).ok())
                        .collect::<Vec<_>>()
                })
                .filter(|v| !v.is_empty());

            let tool_call_id = value
                .get("tool_call_id")
                .and_then(|t| t.as_str())
                .map(|s| s.to_string());

            Ok(Message {
                id: crate::ids::message_id(),
                thread_id: Some(thread_id.to_string()),
                role,
                content,
                tool_calls,
                tool_call_id,
                metadata: Default::default(),
                created_at: crate::ids::now_millis(),
            })
        })
        .collect()
}

// ============================================================================
// TURN OUTCOME
// ============================================================================

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Completed { thread_id: String },
    NeedsApproval { thread_id: String, pending: Vec<PendingApproval> },
    MaxIterationsReached { thread_id: String },
    Cancelled { thread_id: String },
}

/// A host's decision for one execution suspended at the approval gate.
/// `persist` stores the decision for future calls at the given level; `None`
/// means "just this once."
#[derive(Debug, Clone)]
pub struct ApprovalDecision {
    pub execution_id: String,
    pub approved: bool,
    /// Shown to the model in place of the canonical rejection message when
    /// `approved` is `false` (§6.5 `reject(executionId, reason?, ...)`).
    pub reason: Option<String>,
    pub persist: Option<PermissionLevel>,
}

struct PendingTurn {
    placeholder_id: String,
    iteration: usize,
    executions: Vec<ToolExecution>,
}

// ============================================================================
// AGENT LOOP
// ============================================================================

pub struct AgentLoop {
    transport: Arc<dyn RuntimeTransport>,
    options: AgentOptions,
    pub registry: ToolRegistry,
    pub permissions: PermissionStore,
    pub hooks: Hooks,
    pub context_tree: ContextTree,
    actions: HashMap<String, ActionDefinition>,
    cancel: CancellationSignal,
    pending: HashMap<String, PendingTurn>,
}

impl AgentLoop {
    pub fn new(transport: Arc<dyn RuntimeTransport>, options: AgentOptions) -> Self {
        let mut registry = ToolRegistry::new();
        for tool in options.tools.clone() {
            registry.register(tool);
        }
        let permissions = PermissionStore::new(options.permission_backend.clone());
        AgentLoop {
            transport,
            options,
            registry,
            permissions,
            hooks: Hooks::new(),
            context_tree: ContextTree::new(),
            actions: HashMap::new(),
            cancel: CancellationSignal::new(),
            pending: HashMap::new(),
        }
    }

    /// Register a legacy action definition (§6.5 `registerAction`). Actions
    /// carry no local handler — they're forwarded to the runtime endpoint's
    /// `actions[]` verbatim and whatever invokes them lives entirely
    /// upstream.
    pub fn register_action(&mut self, action: ActionDefinition) {
        self.actions.insert(action.name.clone(), action);
    }

    pub fn unregister_action(&mut self, name: &str) -> Option<ActionDefinition> {
        self.actions.remove(name)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionDefinition> {
        self.actions.values()
    }

    /// Request cancellation of whatever turn is currently in flight. Takes
    /// effect at the next frame boundary or tool dispatch — cooperative, not
    /// preemptive (§8 P7).
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Submit a new user turn and drive it to completion, an approval pause,
    /// the iteration ceiling, or cancellation.
    pub async fn send(&mut self, thread_store: &mut ThreadStore, thread_id: &str, content: impl Into<String>) -> Result<TurnOutcome> {
        self.cancel = CancellationSignal::new();
        let content = content.into();

        let decision = self
            .hooks
            .run_user_prompt_submit(UserPromptSubmitEvent {
                prompt: content.clone(),
                history: thread_store.get(thread_id)?.messages.clone(),
            })
            .await;
        let content = match decision {
            HookDecision::Block { reason } => return Err(Error::invalid_input(reason)),
            HookDecision::Modify { payload } => payload.as_str().map(|s| s.to_string()).unwrap_or(content),
            HookDecision::Continue => content,
        };

        thread_store.add_message(thread_id, Message::user(content).with_thread_id(thread_id))?;
        self.drive(thread_store, thread_id, 0).await
    }

    /// Resume a turn that paused for host approval.
    pub async fn resume(&mut self, thread_store: &mut ThreadStore, thread_id: &str, decisions: Vec<ApprovalDecision>) -> Result<TurnOutcome> {
        let pending = self
            .pending
            .remove(thread_id)
            .ok_or_else(|| Error::invalid_input("no pending approval for this thread"))?;

        let mut executions = pending.executions;
        for decision in decisions {
            let Some(execution) = executions.iter_mut().find(|e| e.id == decision.execution_id) else {
                continue;
            };
            if decision.approved {
                execution.approval_status = crate::tools::ApprovalStatus::Approved;
            } else {
                execution.approval_status = crate::tools::ApprovalStatus::Rejected;
                execution.error = Some(decision.reason.clone().unwrap_or_else(|| "Rejected by user".to_string()));
            }
            if let Some(level) = decision.persist {
                self.permissions.set(ToolPermission::new(execution.name.clone(), level))?;
            }
        }

        self.execute_and_resubmit(thread_store, thread_id, &pending.placeholder_id, executions, pending.iteration)
            .await
    }

    /// Redo a prior response (§6.5 `regenerate`): drop `message_id` (or the
    /// most recent assistant message, if `None`) and everything after it,
    /// then drive a fresh turn from the same point. Does not append a new
    /// user message — the thread's trailing `user` message is resent as-is.
    pub async fn regenerate(
        &mut self,
        thread_store: &mut ThreadStore,
        thread_id: &str,
        message_id: Option<&str>,
    ) -> Result<TurnOutcome> {
        let target_id = match message_id {
            Some(id) => id.to_string(),
            None => thread_store
                .get(thread_id)?
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::Assistant)
                .map(|m| m.id.clone())
                .ok_or_else(|| Error::invalid_input("no assistant message to regenerate"))?,
        };
        thread_store.truncate_from(thread_id, &target_id)?;
        self.drive(thread_store, thread_id, 0).await
    }

    /// The Submitting/Receiving half of one iteration: build the request,
    /// submit it, and reconcile the stream's events onto the thread until a
    /// terminal event arrives.
    async fn drive(&mut self, thread_store: &mut ThreadStore, thread_id: &str, iteration: usize) -> Result<TurnOutcome> {
        if iteration >= self.options.max_iterations {
            self.hooks
                .run_turn_complete(TurnCompleteEvent {
                    iterations: iteration,
                    aborted: false,
                    max_iterations_reached: true,
                })
                .await;
            return Ok(TurnOutcome::MaxIterationsReached {
                thread_id: thread_id.to_string(),
            });
        }

        let placeholder_id = park_assistant_placeholder(thread_store, thread_id)?;
        let actions: Vec<ActionDefinition> = self.actions.values().cloned().collect();
        let body = build_request_body(&self.options, thread_store.get(thread_id)?, &self.context_tree, &self.registry, &actions);
        let mut stream = self.transport.submit(body).await?;

        let mut message_buf = String::new();
        let mut thinking_buf = String::new();
        let mut parked_calls: Vec<ToolCallInfo> = Vec::new();
        let mut done_messages: Option<Vec<Message>> = None;
        let mut saw_done = false;

        while let Some(frame) = stream.next().await {
            if self.cancel.is_cancelled() {
                return Ok(TurnOutcome::Cancelled {
                    thread_id: thread_id.to_string(),
                });
            }

            let event = events::dispatch(frame?);
            match event {
                StreamEvent::MessageDelta { content } => {
                    message_buf.push_str(&content);
                    thread_store.update_message(thread_id, &placeholder_id, message_buf.clone())?;
                }
                StreamEvent::ThinkingDelta { content } => {
                    thinking_buf.push_str(&content);
                    thread_store.update_thinking(thread_id, &placeholder_id, thinking_buf.clone())?;
                }
                StreamEvent::ActionStart { id, name } => {
                    parked_calls.push(ToolCallInfo { id, name, args: Value::Null });
                }
                StreamEvent::ActionArgs { id, args } => {
                    if let Some(call) = parked_calls.iter_mut().find(|c| c.id == id) {
                        call.args = serde_json::from_str(&args).unwrap_or(Value::Null);
                    }
                }
                StreamEvent::ActionEnd { .. } => {}
                StreamEvent::ToolCalls { tool_calls, .. } => {
                    let calls: Vec<ToolCallRequest> = tool_calls
                        .iter()
                        .map(|c| ToolCallRequest::new(c.id.clone(), c.name.clone(), &c.args))
                        .collect();
                    thread_store.set_tool_calls(thread_id, &placeholder_id, calls)?;
                    parked_calls = tool_calls
                        .into_iter()
                        .map(|c| ToolCallInfo {
                            id: c.id,
                            name: c.name,
                            args: c.args,
                        })
                        .collect();
                }
                StreamEvent::SourceAdd { source } => {
                    thread_store.add_source(thread_id, &placeholder_id, source)?;
                }
                StreamEvent::LoopIteration { .. } => {}
                StreamEvent::LoopComplete { .. } => {}
                StreamEvent::Done { messages, .. } => {
                    saw_done = true;
                    if let Some(raw) = messages {
                        done_messages = Some(parse_wire_messages(raw, thread_id)?);
                    }
                }
                StreamEvent::Error { message, recoverable, .. } => {
                    if recoverable.unwrap_or(false) {
                        log::warn!("recoverable stream error: {message}");
                        continue;
                    }
                    return Err(Error::api(message));
                }
                StreamEvent::Unknown => {
                    log::debug!("ignoring unrecognized wire event");
                }
            }

            if saw_done {
                break;
            }
        }

        if !saw_done {
            return Err(Error::protocol("stream ended before a done event"));
        }

        if let Some(messages) = done_messages {
            thread_store.replace_streaming_with_messages(thread_id, &placeholder_id, messages)?;
        }

        if parked_calls.is_empty() {
            self.hooks
                .run_turn_complete(TurnCompleteEvent {
                    iterations: iteration + 1,
                    aborted: false,
                    max_iterations_reached: false,
                })
                .await;
            return Ok(TurnOutcome::Completed {
                thread_id: thread_id.to_string(),
            });
        }

        let classified = ToolPipeline::classify(&self.registry, &self.permissions, &parked_calls)?;
        let executions: Vec<ToolExecution> = classified.iter().map(|(e, _)| e.clone()).collect();
        let needs_approval: Vec<ToolExecution> = classified
            .into_iter()
            .filter(|(_, pass)| *pass == ExecutionPass::AwaitingApproval)
            .map(|(e, _)| e)
            .collect();

        if !needs_approval.is_empty() {
            let pending = ToolPipeline::pending_approvals(&needs_approval);
            self.pending.insert(
                thread_id.to_string(),
                PendingTurn {
                    placeholder_id,
                    iteration,
                    executions,
                },
            );
            return Ok(TurnOutcome::NeedsApproval {
                thread_id: thread_id.to_string(),
                pending,
            });
        }

        self.execute_and_resubmit(thread_store, thread_id, &placeholder_id, executions, iteration)
            .await
    }

    /// The Executing/Resubmitting half: run every classified execution
    /// (sequentially, in call order — §5 requires this so parked
    /// `tool_calls` line up 1:1 with emitted `tool` results), append the
    /// `tool` result messages, then recurse into the next iteration.
    async fn execute_and_resubmit(
        &mut self,
        thread_store: &mut ThreadStore,
        thread_id: &str,
        placeholder_id: &str,
        mut executions: Vec<ToolExecution>,
        iteration: usize,
    ) -> Result<TurnOutcome> {
        for execution in executions.iter_mut() {
            if self.cancel.is_cancelled() {
                return Ok(TurnOutcome::Cancelled {
                    thread_id: thread_id.to_string(),
                });
            }

            let pre_decision = self
                .hooks
                .run_pre_tool_use(PreToolUseEvent {
                    tool_name: execution.name.clone(),
                    tool_call_id: execution.id.clone(),
                    input: execution.args.clone(),
                    history: thread_store.get(thread_id)?.messages.clone(),
                })
                .await;

            let response = if let HookDecision::Block { reason } = pre_decision {
                execution.status = crate::tools::ExecutionStatus::Error;
                execution.error = Some(reason.clone());
                ToolResponse::error(reason)
            } else {
                let ctx = ToolContext {
                    signal: self.cancel.clone(),
                    tool_call_id: execution.id.clone(),
                    headers: None,
                    request: None,
                };
                let response = ToolPipeline::execute(&self.registry, execution, ctx).await;

                self.hooks
                    .run_post_tool_use(PostToolUseEvent {
                        tool_name: execution.name.clone(),
                        tool_call_id: execution.id.clone(),
                        input: execution.args.clone(),
                        result: response.to_wire_json(),
                        history: thread_store.get(thread_id)?.messages.clone(),
                    })
                    .await;
                response
            };

            append_tool_result(thread_store, thread_id, execution, &response)?;
        }

        thread_store.set_tool_executions_on_message(thread_id, placeholder_id, executions)?;

        Box::pin(self.drive(thread_store, thread_id, iteration + 1)).await
    }
}

/// Append the `tool` message(s) produced by one execution. A plain
/// ok/error result becomes one `tool` message; `AttachmentAsUserMessage`
/// becomes a short `tool` acknowledgement plus a follow-up `user` message
/// carrying the attachment (§4.I.3 step 4) — the binary payload never
/// crosses into a `tool` message.
fn append_tool_result(thread_store: &mut ThreadStore, thread_id: &str, execution: &ToolExecution, response: &ToolResponse) -> Result<()> {
    thread_store.add_message(
        thread_id,
        Message::tool_result(execution.id.clone(), response.to_wire_json().to_string()).with_thread_id(thread_id),
    )?;

    if let ToolResponse::AttachmentAsUserMessage { caption, attachment, .. } = response {
        thread_store.add_message(
            thread_id,
            Message::user(caption.clone())
                .with_attachment(attachment.clone())
                .with_thread_id(thread_id),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool;
    use std::sync::Mutex as StdMutex;

    struct ScriptedTransport {
        frames: StdMutex<std::collections::VecDeque<Vec<Value>>>,
    }

    impl ScriptedTransport {
        fn new(turns: Vec<Vec<Value>>) -> Self {
            ScriptedTransport {
                frames: StdMutex::new(turns.into()),
            }
        }
    }

    #[async_trait]
    impl RuntimeTransport for ScriptedTransport {
        async fn submit(&self, _body: Value) -> Result<JsonEventStream> {
            let frames = self
                .frames
                .lock()
                .unwrap()
                .pop_front()
                .expect("no more scripted turns");
            Ok(Box::pin(futures::stream::iter(frames.into_iter().map(Ok))))
        }
    }

    fn new_loop(transport: ScriptedTransport, options: AgentOptions) -> AgentLoop {
        AgentLoop::new(Arc::new(transport), options)
    }

    fn options() -> AgentOptions {
        AgentOptions::builder()
            .runtime_url("https://runtime.example.com/agent")
            .system_prompt("You are helpful.")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn simple_text_turn_completes_without_tool_calls() {
        let transport = ScriptedTransport::new(vec![vec![
            serde_json::json!({"type": "message:delta", "content": "Hello"}),
            serde_json::json!({"type": "message:delta", "content": " there"}),
            serde_json::json!({"type": "done"}),
        ]]);
        let mut agent = new_loop(transport, options());
        let mut store = ThreadStore::new();
        let thread_id = store.create(None);

        let outcome = agent.send(&mut store, &thread_id, "hi").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        let thread = store.get(&thread_id).unwrap();
        assert_eq!(thread.messages.last().unwrap().content.as_deref(), Some("Hello there"));
    }

    #[tokio::test]
    async fn regenerate_drops_prior_response_and_redrives() {
        let transport = ScriptedTransport::new(vec![
            vec![
                serde_json::json!({"type": "message:delta", "content": "first answer"}),
                serde_json::json!({"type": "done"}),
            ],
            vec![
                serde_json::json!({"type": "message:delta", "content": "second answer"}),
                serde_json::json!({"type": "done"}),
            ],
        ]);
        let mut agent = new_loop(transport, options());
        let mut store = ThreadStore::new();
        let thread_id = store.create(None);
        agent.send(&mut store, &thread_id, "hi").await.unwrap();
        assert_eq!(
            store.get(&thread_id).unwrap().messages.last().unwrap().content.as_deref(),
            Some("first answer")
        );

        let outcome = agent.regenerate(&mut store, &thread_id, None).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        let thread = store.get(&thread_id).unwrap();
        assert_eq!(thread.messages.last().unwrap().content.as_deref(), Some("second answer"));
        assert_eq!(thread.messages.len(), 2);
    }

    #[tokio::test]
    async fn tool_call_without_approval_auto_executes_and_resubmits() {
        let transport = ScriptedTransport::new(vec![
            vec![serde_json::json!({
                "type": "tool_calls",
                "toolCalls": [{"id": "t1", "name": "get_time", "args": {}}],
                "assistantMessage": {"role": "assistant", "content": null, "tool_calls": []},
            }), serde_json::json!({"type": "done"})],
            vec![
                serde_json::json!({"type": "message:delta", "content": "It's noon."}),
                serde_json::json!({"type": "done"}),
            ],
        ]);
        let mut agent = new_loop(transport, options());
        agent.registry.register(
            tool("get_time", "Get the time")
                .handler(|_args, _ctx| async { Ok(ToolResponse::success(serde_json::json!("12:00"))) })
                .build(),
        );
        let mut store = ThreadStore::new();
        let thread_id = store.create(None);

        let outcome = agent.send(&mut store, &thread_id, "what time is it?").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        let thread = store.get(&thread_id).unwrap();
        assert!(thread.messages.iter().any(|m| m.role == Role::Tool));
        assert_eq!(thread.messages.last().unwrap().content.as_deref(), Some("It's noon."));
    }

    #[tokio::test]
    async fn tool_requiring_approval_pauses_the_turn() {
        let transport = ScriptedTransport::new(vec![vec![
            serde_json::json!({
                "type": "tool_calls",
                "toolCalls": [{"id": "t1", "name": "delete_account", "args": {}}],
                "assistantMessage": {"role": "assistant", "content": null, "tool_calls": []},
            }),
            serde_json::json!({"type": "done"}),
        ]]);
        let mut agent = new_loop(transport, options());
        agent.registry.register(
            tool("delete_account", "Delete the account")
                .needs_approval(crate::tools::NeedsApproval::Always)
                .approval_message("Really delete the account?")
                .handler(|_args, _ctx| async { panic!("should not run before approval") })
                .build(),
        );
        let mut store = ThreadStore::new();
        let thread_id = store.create(None);

        let outcome = agent.send(&mut store, &thread_id, "delete my account").await.unwrap();
        match outcome {
            TurnOutcome::NeedsApproval { pending, .. } => {
                assert_eq!(pending.len(), 1);
                assert_eq!(pending[0].tool_name, "delete_account");
            }
            other => panic!("expected NeedsApproval, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resume_after_rejection_feeds_denial_back_to_model() {
        let transport = ScriptedTransport::new(vec![
            vec![
                serde_json::json!({
                    "type": "tool_calls",
                    "toolCalls": [{"id": "t1", "name": "delete_account", "args": {}}],
                    "assistantMessage": {"role": "assistant", "content": null, "tool_calls": []},
                }),
                serde_json::json!({"type": "done"}),
            ],
            vec![
                serde_json::json!({"type": "message:delta", "content": "Okay, I won't."}),
                serde_json::json!({"type": "done"}),
            ],
        ]);
        let mut agent = new_loop(transport, options());
        agent.registry.register(
            tool("delete_account", "Delete the account")
                .needs_approval(crate::tools::NeedsApproval::Always)
                .handler(|_args, _ctx| async { panic!("should not run") })
                .build(),
        );
        let mut store = ThreadStore::new();
        let thread_id = store.create(None);
        agent.send(&mut store, &thread_id, "delete my account").await.unwrap();

        let outcome = agent
            .resume(
                &mut store,
                &thread_id,
                vec![ApprovalDecision {
                    execution_id: "t1".to_string(),
                    approved: false,
                    reason: None,
                    persist: None,
                }],
            )
            .await
            .unwrap();

        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        let thread = store.get(&thread_id).unwrap();
        let tool_message = thread.messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_message.content.as_ref().unwrap().contains("Rejected by user"));
    }

    #[tokio::test]
    async fn max_iterations_reached_stops_the_loop() {
        let looping_frames = vec![
            serde_json::json!({
                "type": "tool_calls",
                "toolCalls": [{"id": "t1", "name": "get_time", "args": {}}],
                "assistantMessage": {"role": "assistant", "content": null, "tool_calls": []},
            }),
            serde_json::json!({"type": "done"}),
        ];
        let transport = ScriptedTransport::new(vec![looping_frames.clone(), looping_frames]);
        let mut options = options();
        options.max_iterations = 2;
        let mut agent = new_loop(transport, options);
        agent.registry.register(
            tool("get_time", "Get the time")
                .handler(|_args, _ctx| async { Ok(ToolResponse::success(serde_json::json!("12:00"))) })
                .build(),
        );
        let mut store = ThreadStore::new();
        let thread_id = store.create(None);

        let outcome = agent.send(&mut store, &thread_id, "loop forever").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::MaxIterationsReached { .. }));
    }

    #[test]
    fn build_request_body_includes_context_tree_in_system_prompt() {
        let opts = options();
        let thread = Thread::new(None);
        let mut tree = ContextTree::new();
        tree.add("project: widgets", None).unwrap();
        let registry = ToolRegistry::new();
        let body = build_request_body(&opts, &thread, &tree, &registry, &[]);
        assert!(body["systemPrompt"].as_str().unwrap().contains("project: widgets"));
    }

    #[test]
    fn build_request_body_omits_tools_key_when_registry_empty() {
        let opts = options();
        let thread = Thread::new(None);
        let tree = ContextTree::new();
        let registry = ToolRegistry::new();
        let body = build_request_body(&opts, &thread, &tree, &registry, &[]);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn build_request_body_carries_thread_id_and_actions() {
        let opts = options();
        let thread = Thread::new(None);
        let tree = ContextTree::new();
        let registry = ToolRegistry::new();
        let actions = vec![ActionDefinition::new(
            "legacy_search",
            "Search the old index",
            serde_json::json!({"type": "object", "properties": {}}),
        )];
        let body = build_request_body(&opts, &thread, &tree, &registry, &actions);
        assert_eq!(body["threadId"], thread.id);
        assert_eq!(body["actions"][0]["name"], "legacy_search");
    }

    #[test]
    fn register_and_unregister_action_round_trips() {
        let mut agent = new_loop(ScriptedTransport::new(vec![]), options());
        agent.register_action(ActionDefinition::new("a1", "desc", serde_json::json!({})));
        assert_eq!(agent.actions().count(), 1);
        assert!(agent.unregister_action("a1").is_some());
        assert_eq!(agent.actions().count(), 0);
    }

    #[test]
    fn parse_wire_messages_flattens_multimodal_content_to_text() {
        let raw = vec![serde_json::json!({
            "role": "user",
            "content": [{"type": "text", "text": "look at this"}, {"type": "image_url", "image_url": {"url": "data:..."}}],
        })];
        let messages = parse_wire_messages(raw, "thread-1").unwrap();
        assert_eq!(messages[0].content.as_deref(), Some("look at this"));
    }
}

//! # Tool Definition & Registry
//!
//! A `Tool` is the local representation of something the model can invoke:
//! either a handler that runs in this process (`Location::Client`) or a
//! marker that the upstream runtime executes entirely on its own
//! (`Location::Server`, never sent to the client, never dispatched here).
//!
//! Submodules: `registry` (component D, the name → `Tool` map), `pipeline`
//! (component J, approval gating + execution + result normalization), and
//! `builtin` (the three auto-registered tools of §4.J.1).

mod builtin;
mod pipeline;
mod registry;

pub use builtin::{
    BuiltinToolSource, ConsoleLogEntry, NetworkRequestEntry, NoopBuiltinToolSource,
    register_builtin_tools,
};
pub use pipeline::{ExecutionPass, PendingApproval, ToolCallInfo, ToolPipeline};
pub use registry::ToolRegistry;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::ids;
use crate::schema::{ParamSpec, ParamType, schema_from_params};
use crate::types::Attachment;

// ============================================================================
// CANCELLATION
// ============================================================================

/// A per-turn cancellation flag, threaded into every tool handler's
/// `ToolContext`. Cloning shares the same underlying flag: the agent loop
/// holds one clone and flips it on `stop()`; handlers hold another and poll
/// `is_cancelled()` at cooperative points.
#[derive(Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        CancellationSignal(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// TOOL LOCATION / RESPONSE MODE
// ============================================================================

/// Where a tool's handler runs. Only `Client` tools are ever sent to the
/// runtime endpoint's `tools[]`; `Server` tools are handled entirely
/// upstream and the client never sees an `action:*`/`tool_calls` event for
/// them — it only observes the final `done.messages` chain (§4.I.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Client,
    Server,
}

/// How much of a tool's result the model should see back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiResponseMode {
    None,
    Brief,
    #[default]
    Full,
}

/// Whether a tool call requires human approval before it runs. `Predicate`
/// lets the decision depend on the call's parsed arguments (e.g. a
/// `delete_file` tool that only asks when the path is outside a sandbox).
#[derive(Clone)]
pub enum NeedsApproval {
    Never,
    Always,
    Predicate(Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>),
}

impl NeedsApproval {
    pub fn evaluate(&self, params: &serde_json::Value) -> bool {
        match self {
            NeedsApproval::Never => false,
            NeedsApproval::Always => true,
            NeedsApproval::Predicate(f) => f(params),
        }
    }
}

impl std::fmt::Debug for NeedsApproval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NeedsApproval::Never => write!(f, "NeedsApproval::Never"),
            NeedsApproval::Always => write!(f, "NeedsApproval::Always"),
            NeedsApproval::Predicate(_) => write!(f, "NeedsApproval::Predicate(..)"),
        }
    }
}

/// The message shown to a host/user at the approval gate. Either a static
/// string or one derived from the call's parsed arguments.
#[derive(Clone)]
pub enum ApprovalMessage {
    Static(String),
    Dynamic(Arc<dyn Fn(&serde_json::Value) -> String + Send + Sync>),
}

impl ApprovalMessage {
    pub fn render(&self, params: &serde_json::Value) -> String {
        match self {
            ApprovalMessage::Static(s) => s.clone(),
            ApprovalMessage::Dynamic(f) => f(params),
        }
    }
}

impl std::fmt::Debug for ApprovalMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalMessage::Static(s) => write!(f, "ApprovalMessage::Static({s:?})"),
            ApprovalMessage::Dynamic(_) => write!(f, "ApprovalMessage::Dynamic(..)"),
        }
    }
}

// ============================================================================
// TOOL CONTEXT & RESPONSE
// ============================================================================

/// Context passed to every client-side handler invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub signal: CancellationSignal,
    pub tool_call_id: String,
    pub headers: Option<std::collections::HashMap<String, String>>,
    pub request: Option<serde_json::Value>,
}

/// The normalized outcome of a tool invocation. `AttachmentAsUserMessage` is
/// the explicit representation of the "add as user message" marker the
/// design notes call for — a distinct variant rather than a side-channel
/// boolean, so the pipeline can exhaustively match instead of checking a
/// flag it might forget to look at.
#[derive(Debug, Clone)]
pub enum ToolResponse {
    Ok {
        data: Option<serde_json::Value>,
        message: Option<String>,
    },
    Err {
        error: String,
    },
    AttachmentAsUserMessage {
        ack_message: String,
        caption: String,
        attachment: Attachment,
    },
}

impl ToolResponse {
    pub fn success(data: serde_json::Value) -> Self {
        ToolResponse::Ok {
            data: Some(data),
            message: None,
        }
    }

    pub fn success_message(message: impl Into<String>) -> Self {
        ToolResponse::Ok {
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolResponse::Err {
            error: message.into(),
        }
    }

    pub fn attachment_as_user_message(
        ack_message: impl Into<String>,
        caption: impl Into<String>,
        attachment: Attachment,
    ) -> Self {
        ToolResponse::AttachmentAsUserMessage {
            ack_message: ack_message.into(),
            caption: caption.into(),
            attachment,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, ToolResponse::Err { .. })
    }

    /// The JSON object that becomes a `tool` message's `content` (after
    /// JSON-stringifying), per §4.I.3 step 3. For the attachment variant
    /// this is the short acknowledgement — the binary payload never lands
    /// in a `tool` message (Design Notes: "Attachments in request bodies").
    pub fn to_wire_json(&self) -> serde_json::Value {
        match self {
            ToolResponse::Ok { data, message } => {
                let mut obj = serde_json::json!({ "success": true });
                if let Some(d) = data {
                    obj["data"] = d.clone();
                }
                if let Some(m) = message {
                    obj["message"] = serde_json::Value::String(m.clone());
                }
                obj
            }
            ToolResponse::Err { error } => serde_json::json!({ "success": false, "error": error }),
            ToolResponse::AttachmentAsUserMessage { ack_message, .. } => {
                serde_json::json!({ "success": true, "message": ack_message })
            }
        }
    }
}

pub type ToolHandlerFuture = BoxFuture<'static, Result<ToolResponse>>;
pub type ToolHandlerFn =
    Arc<dyn Fn(serde_json::Value, ToolContext) -> ToolHandlerFuture + Send + Sync>;

// ============================================================================
// TOOL DEFINITION
// ============================================================================

/// The local representation of a tool (spec's `ToolDefinition`). Built
/// directly or via `ToolBuilder`/`tool()`.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub location: Location,
    pub input_schema: serde_json::Value,
    pub handler: Option<ToolHandlerFn>,
    pub needs_approval: NeedsApproval,
    pub approval_message: Option<ApprovalMessage>,
    pub ai_response_mode: AiResponseMode,
    pub ai_context: Option<String>,
    pub available: bool,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("needs_approval", &self.needs_approval)
            .field("available", &self.available)
            .finish()
    }
}

impl Tool {
    /// The shape sent to the runtime endpoint's `tools[]` (§4.I.2): only
    /// client-located, available tools are included, stripped to
    /// `{name, description, inputSchema}`.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

/// Convenience entry point: `tool("name", "description")` starts a
/// `ToolBuilder`.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// Fluent builder for client-side tools, generating a canonical JSON-Schema
/// from declared parameters the way the teacher's builder does for plain
/// function tools.
pub struct ToolBuilder {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    handler: Option<ToolHandlerFn>,
    needs_approval: NeedsApproval,
    approval_message: Option<ApprovalMessage>,
    ai_response_mode: AiResponseMode,
    ai_context: Option<String>,
    available: bool,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        ToolBuilder {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            handler: None,
            needs_approval: NeedsApproval::Never,
            approval_message: None,
            ai_response_mode: AiResponseMode::Full,
            ai_context: None,
            available: true,
        }
    }

    pub fn param(
        mut self,
        name: impl Into<String>,
        kind: ParamType,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            description: description.into(),
            required,
            default: None,
        });
        self
    }

    pub fn needs_approval(mut self, needs: NeedsApproval) -> Self {
        self.needs_approval = needs;
        self
    }

    pub fn approval_message(mut self, message: impl Into<String>) -> Self {
        self.approval_message = Some(ApprovalMessage::Static(message.into()));
        self
    }

    pub fn ai_response_mode(mut self, mode: AiResponseMode) -> Self {
        self.ai_response_mode = mode;
        self
    }

    pub fn ai_context(mut self, context: impl Into<String>) -> Self {
        self.ai_context = Some(context.into());
        self
    }

    pub fn available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Attach a synchronous-looking async handler: `|args, ctx| async move
    /// { ... }`. The closure must return a future yielding
    /// `Result<ToolResponse>`.
    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(serde_json::Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ToolResponse>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |args, ctx| Box::pin(f(args, ctx))));
        self
    }

    pub fn build(self) -> Tool {
        Tool {
            name: self.name,
            description: self.description,
            location: Location::Client,
            input_schema: schema_from_params(&self.params),
            handler: self.handler,
            needs_approval: self.needs_approval,
            approval_message: self.approval_message,
            ai_response_mode: self.ai_response_mode,
            ai_context: self.ai_context,
            available: self.available,
        }
    }
}

// ============================================================================
// TOOL EXECUTION (runtime record)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Executing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    None,
    Required,
    Approved,
    Rejected,
}

/// A runtime record of one tool invocation within a turn. Snapshotted onto
/// the owning assistant message (`MessageMetadata.tool_executions`) once the
/// turn completes, matching `execution.id` against `tool_calls[*].id`
/// (§4.I.1's `Idle → Submitting` transition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
    pub status: ExecutionStatus,
    pub approval_status: ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ToolExecution {
    pub fn pending(id: impl Into<String>, name: impl Into<String>) -> Self {
        ToolExecution {
            id: id.into(),
            name: name.into(),
            args: serde_json::Value::Null,
            status: ExecutionStatus::Pending,
            approval_status: ApprovalStatus::None,
            approval_message: None,
            result: None,
            error: None,
            timestamp: ids::now_millis(),
            duration_ms: None,
        }
    }
}

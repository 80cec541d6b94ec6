//! # Embed Agent Runtime
//!
//! An embeddable agentic chat runtime: a client-side library for building an
//! in-app AI assistant on top of a runtime endpoint that already knows how to
//! talk to a model. This crate owns everything on the client side of that
//! boundary — the thread store, the tool execution pipeline, the permission
//! store, the context tree, an MCP client for external tool servers, and the
//! lifecycle hooks a host can use to observe or gate what the assistant does.
//!
//! It does not talk to a model provider directly, and it does not implement
//! a knowledge base — both are the runtime endpoint's job. What it provides
//! is the state machine and data model a host embeds to drive one of those
//! endpoints from a desktop, web, or CLI surface.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use embed_agent_runtime::{AgentOptions, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = AgentOptions::builder()
//!         .runtime_url("https://runtime.example.com/agent")
//!         .system_prompt("You are a helpful assistant.")
//!         .build()?;
//!
//!     let mut session = Session::connect(options)?;
//!     let outcome = session.send("What's 2+2?").await?;
//!     println!("{:?}", outcome);
//!     println!("{:?}", session.messages());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **session**: the host-facing `Session` wrapping every other component
//!   into one convenient surface.
//! - **agent_loop**: the turn state machine — request construction, stream
//!   reconciliation, tool dispatch, and resubmission.
//! - **thread**: the reducer-shaped `ThreadStore` over `Thread`/`Message`.
//! - **types**: the wire-shaped data model (`Message`, `Thread`,
//!   `AgentOptions`, attachments, legacy actions).
//! - **tools**: tool definitions, the registry, the approval/execution
//!   pipeline, and the three built-in tools.
//! - **permissions**: the persisted approval-policy store.
//! - **context**: token estimation/truncation helpers and the context tree.
//! - **hooks**: lifecycle interception points.
//! - **mcp**: a minimal Model Context Protocol client and tool adapter.
//! - **events**: the wire event protocol.
//! - **sse**: Server-Sent Events parsing and non-streaming response
//!   synthesis.
//! - **schema**: JSON-Schema construction and normalization for tool inputs.
//! - **retry**: exponential backoff for the runtime HTTP submit call.
//! - **config**: well-known provider defaults.
//! - **error**: the crate-wide `Error`/`Result`.

mod agent_loop;
mod config;
mod context;
mod error;
mod events;
mod hooks;
mod ids;
pub mod mcp;
mod permissions;
pub mod retry;
mod schema;
mod session;
mod sse;
mod thread;
mod tools;
mod types;

// --- Session (host-facing surface) ---

pub use session::Session;

// --- Agent Loop ---

pub use agent_loop::{
    build_request_body, ApprovalDecision, AgentLoop, HttpRuntimeTransport, RuntimeTransport,
    TurnOutcome,
};

// --- Thread Store ---

pub use thread::{park_assistant_placeholder, NoopThreadPersistence, ThreadPersistence, ThreadStore};

// --- Core Types ---

pub use types::{
    ActionDefinition, Attachment, AttachmentKind, FunctionCall, ImageDetail, KnowledgeBaseConfig,
    Message, MessageMetadata, Role, Source, Thread, ToolCallRequest, Usage, AgentOptions,
    AgentOptionsBuilder,
};

// --- Tool System ---

pub use tools::{
    tool, AiResponseMode, ApprovalMessage, ApprovalStatus, BuiltinToolSource, CancellationSignal,
    ConsoleLogEntry, ExecutionPass, ExecutionStatus, Location, NeedsApproval,
    NetworkRequestEntry, NoopBuiltinToolSource, PendingApproval, Tool, ToolBuilder, ToolCallInfo,
    ToolContext, ToolExecution, ToolPipeline, ToolRegistry, ToolResponse, register_builtin_tools,
};

// --- Permissions ---

pub use permissions::{
    InMemoryBackend, NoopBackend, PermissionBackend, PermissionLevel, PermissionStore,
    ToolPermission,
};

// --- Context Management ---

pub use context::{
    estimate_tokens, is_approaching_limit, truncate_messages, ContextTree, ContextTreeNode,
};

// --- Lifecycle Hooks ---

pub use hooks::{
    HookDecision, Hooks, PostToolUseEvent, PreApprovalEvent, PreToolUseEvent, TurnCompleteEvent,
    UserPromptSubmitEvent, HOOK_POST_TOOL_USE, HOOK_PRE_APPROVAL, HOOK_PRE_TOOL_USE,
    HOOK_TURN_COMPLETE, HOOK_USER_PROMPT_SUBMIT,
};

// --- Wire Event Protocol ---

pub use events::{StreamEvent, ToolCallAnnouncement};

// --- Server-Sent Events / Transport Framing ---

pub use sse::{parse_sse_json, synthesize_json_response_frames, JsonEventStream};

// --- Provider Configuration ---

pub use config::Provider;

// --- Error Handling ---

pub use error::{Error, Result};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The most commonly used types and functions for typical usage. Import with
/// `use embed_agent_runtime::prelude::*;`.
pub mod prelude {
    pub use crate::{
        tool, AgentOptions, AgentOptionsBuilder, ApprovalDecision, Error, HookDecision, Hooks,
        Message, PermissionLevel, Result, Session, Thread, Tool, ToolResponse, TurnOutcome,
    };
}

//! # Core Type Definitions
//!
//! The wire-shaped data model (§3 of the runtime spec): `Message`, `Thread`,
//! and the configuration surface (`AgentOptions`) hosts build agents with.
//! Messages are stored in OpenAI Chat Completions shape so that a thread can
//! be replayed to the runtime endpoint verbatim — no translation layer sits
//! between what's stored and what's sent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ids;
use crate::permissions::{InMemoryBackend, PermissionBackend};
use crate::thread::{NoopThreadPersistence, ThreadPersistence};
use crate::tools::{Tool, ToolExecution};

// ============================================================================
// ROLE
// ============================================================================

/// Role of a message participant. Determines how the runtime interprets the
/// message content and which fields are legal on it (see `Message`'s
/// invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ============================================================================
// TOOL CALLS
// ============================================================================

/// The `function` payload of a single tool call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded object, never the parsed value — this is the wire shape
    /// OpenAI Chat Completions uses and the one the runtime round-trips.
    pub arguments: String,
}

/// One entry of an assistant message's `tool_calls` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: &serde_json::Value) -> Self {
        ToolCallRequest {
            id: id.into(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: args.to_string(),
            },
        }
    }

    /// Parse `function.arguments` back into a JSON value. Malformed
    /// arguments (truncated stream, handcrafted server bug) produce a
    /// `Protocol` error rather than panicking.
    pub fn parsed_args(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.function.arguments)
            .map_err(|e| Error::protocol(format!("tool call {} has unparsable arguments: {e}", self.id)))
    }
}

// ============================================================================
// SOURCES, USAGE, ATTACHMENTS
// ============================================================================

/// A retrieval/citation source, surfaced via `source:add` events and
/// attached to both the thread and the message that received it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Token accounting reported by the runtime for a completed response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

/// Detail level for an image attachment, mirrored from the teacher's
/// `ImageDetail` (used by the vision-capable runtimes this SDK targets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

impl Default for ImageDetail {
    fn default() -> Self {
        ImageDetail::Auto
    }
}

/// The kind of binary payload an attachment carries. Only images exist today
/// (screenshots); the enum leaves room for future attachment kinds without
/// reshaping `Attachment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
}

/// A multimodal attachment carried on a `user` message, e.g. the screenshot
/// injected back into the conversation by `capture_screenshot` (§4.J.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    /// Base64-encoded payload, or a `data:`/`https:` URL — mirrors
    /// `ImageBlock::from_base64` / `from_url` on the teacher's image type.
    pub data: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<ImageDetail>,
}

impl Attachment {
    pub fn from_base64(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Attachment {
            kind: AttachmentKind::Image,
            data: data.into(),
            mime_type: mime_type.into(),
            filename: None,
            detail: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_detail(mut self, detail: ImageDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Render as an OpenAI-style `image_url` content-array entry.
    pub fn to_content_part(&self) -> serde_json::Value {
        let url = if self.data.starts_with("data:") || self.data.starts_with("http") {
            self.data.clone()
        } else {
            format!("data:{};base64,{}", self.mime_type, self.data)
        };
        serde_json::json!({
            "type": "image_url",
            "image_url": { "url": url, "detail": self.detail.unwrap_or_default() },
        })
    }
}

// ============================================================================
// MESSAGE METADATA
// ============================================================================

/// The open container the data model's §3 describes: everything about a
/// message that doesn't round-trip to the runtime endpoint verbatim, but is
/// needed locally (rendering, replay, audit).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_executions: Vec<ToolExecution>,
    /// Caption staged for a user-message-with-attachment composed during the
    /// screenshot flow (§4.I.3 step 4); not meaningful on other messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

// ============================================================================
// MESSAGE
// ============================================================================

/// One record in a thread's ordered message sequence, in OpenAI Chat
/// Completions shape.
///
/// Invariants (enforced by the `Thread`/reducer layer, not by this type
/// alone — a bare `Message` can be constructed in any shape a test needs):
/// 1. every `tool` message's `tool_call_id` matches an earlier
///    `assistant.tool_calls[*].id` in the same thread;
/// 2. an `assistant` with `tool_calls` is eventually followed by one `tool`
///    message per call before the next `user` message;
/// 3. `content` is `None` iff `role == Assistant` and `tool_calls` is
///    `Some` and no text was streamed;
/// 4. `created_at` is non-decreasing within a thread;
/// 5. message ids are process-unique, tool-call ids are thread-unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub metadata: MessageMetadata,
    pub created_at: u64,
}

impl Message {
    fn base(role: Role, content: Option<String>) -> Self {
        Message {
            id: ids::message_id(),
            thread_id: None,
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            metadata: MessageMetadata::default(),
            created_at: ids::now_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::base(Role::User, Some(content.into()))
    }

    pub fn system(content: impl Into<String>) -> Self {
        Message::base(Role::System, Some(content.into()))
    }

    /// An empty assistant placeholder, allocated before streaming begins and
    /// incrementally filled by `message:delta`/`thinking:delta` (§4.I.1 and
    /// the GLOSSARY's "Placeholder message").
    pub fn assistant_placeholder() -> Self {
        Message::base(Role::Assistant, None)
    }

    /// An assistant message carrying `tool_calls`, as composed from the
    /// server's `tool_calls` event (§4.I.3 step 2). `content` stays `None`
    /// unless `text` is `Some`, per invariant 3.
    pub fn assistant_with_tool_calls(
        content: Option<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        let mut msg = Message::base(Role::Assistant, content);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    /// A `tool` result message. `content` is the JSON-stringified
    /// `ToolResponse`, per §4.I.3 step 3.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Message::base(Role::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.metadata.attachments.push(attachment);
        self
    }

    /// Render this message to the exact JSON object the runtime endpoint
    /// expects in `messages[]`: only `role`, `content`, `tool_calls`, and
    /// `tool_call_id` — metadata never crosses the wire.
    pub fn to_wire(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert(
            "role".to_string(),
            serde_json::to_value(self.role).expect("Role serializes"),
        );

        if !self.metadata.attachments.is_empty() && self.role == Role::User {
            let mut parts = Vec::new();
            if let Some(text) = &self.content {
                if !text.is_empty() {
                    parts.push(serde_json::json!({ "type": "text", "text": text }));
                }
            }
            for attachment in &self.metadata.attachments {
                parts.push(attachment.to_content_part());
            }
            obj.insert("content".to_string(), serde_json::Value::Array(parts));
        } else {
            obj.insert(
                "content".to_string(),
                match &self.content {
                    Some(c) => serde_json::Value::String(c.clone()),
                    None => serde_json::Value::Null,
                },
            );
        }

        if let Some(calls) = &self.tool_calls {
            obj.insert(
                "tool_calls".to_string(),
                serde_json::to_value(calls).expect("tool_calls serialize"),
            );
        }
        if let Some(id) = &self.tool_call_id {
            obj.insert("tool_call_id".to_string(), serde_json::Value::String(id.clone()));
        }

        serde_json::Value::Object(obj)
    }
}

// ============================================================================
// THREAD
// ============================================================================

/// An ordered conversation. `title` is derived from the first user message
/// when absent (§4.F); `messages` holds the full OpenAI-shaped history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub sources: Vec<Source>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Thread {
    pub fn new(title: Option<String>) -> Self {
        let now = ids::now_millis();
        Thread {
            id: ids::thread_id(),
            title,
            messages: Vec::new(),
            sources: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = ids::now_millis();
    }

    /// Derive a title from a user message's content: truncate to a
    /// sentence-friendly length at a word boundary, matching the
    /// host-supplied-helper behavior the spec describes in §4.F.
    pub fn derive_title(content: &str) -> String {
        const MAX_LEN: usize = 60;
        let trimmed = content.trim();
        if trimmed.chars().count() <= MAX_LEN {
            return trimmed.to_string();
        }
        let mut cut = 0;
        for (idx, ch) in trimmed.char_indices() {
            if idx > MAX_LEN {
                break;
            }
            if ch.is_whitespace() {
                cut = idx;
            }
        }
        if cut == 0 {
            cut = trimmed
                .char_indices()
                .nth(MAX_LEN)
                .map(|(i, _)| i)
                .unwrap_or(trimmed.len());
        }
        format!("{}…", trimmed[..cut].trim_end())
    }
}

// ============================================================================
// LEGACY ACTION DEFINITIONS
// ============================================================================

/// A legacy action definition (§4.I.2's `actions[]`): bare metadata with no
/// local handler, forwarded to the runtime endpoint verbatim. Distinct from
/// `Tool` — an action has nowhere to dispatch to in this crate; whatever
/// invokes it lives entirely on the runtime side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ActionDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: serde_json::Value) -> Self {
        ActionDefinition {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

// ============================================================================
// AGENT OPTIONS
// ============================================================================

/// Knowledge-base hint forwarded to the runtime endpoint verbatim; this
/// crate never talks to a KB directly (§1 Out of scope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    pub project_uid: String,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Configuration for a single agent session, built with
/// `AgentOptions::builder()`.
#[derive(Clone)]
pub struct AgentOptions {
    pub runtime_url: String,
    pub system_prompt: String,
    pub api_key: Option<String>,
    pub bot_id: Option<String>,
    pub model: Option<String>,
    pub knowledge_base: Option<KnowledgeBaseConfig>,
    pub streaming: bool,
    pub max_iterations: usize,
    pub max_retries: u32,
    pub request_timeout: std::time::Duration,
    pub enable_builtin_tools: bool,
    pub require_builtin_consent: bool,
    pub tools: Vec<Tool>,
    /// Store adapter for the thread set (§6.3). Defaults to a no-op adapter.
    pub thread_persistence: Arc<dyn ThreadPersistence>,
    /// Store adapter for tool permission decisions (§6.4). Defaults to an
    /// in-memory backend, which does not survive a process restart.
    pub permission_backend: Arc<dyn PermissionBackend>,
}

impl AgentOptions {
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::default()
    }
}

/// Builder for `AgentOptions`. Required fields: `runtime_url`,
/// `system_prompt`. Everything else has a spec-mandated default
/// (`streaming: true`, `max_iterations: 20`).
#[derive(Default)]
pub struct AgentOptionsBuilder {
    runtime_url: Option<String>,
    system_prompt: Option<String>,
    api_key: Option<String>,
    bot_id: Option<String>,
    model: Option<String>,
    knowledge_base: Option<KnowledgeBaseConfig>,
    streaming: Option<bool>,
    max_iterations: Option<usize>,
    max_retries: Option<u32>,
    request_timeout: Option<std::time::Duration>,
    enable_builtin_tools: Option<bool>,
    require_builtin_consent: Option<bool>,
    tools: Vec<Tool>,
    thread_persistence: Option<Arc<dyn ThreadPersistence>>,
    permission_backend: Option<Arc<dyn PermissionBackend>>,
}

impl AgentOptionsBuilder {
    pub fn runtime_url(mut self, url: impl Into<String>) -> Self {
        self.runtime_url = Some(url.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn bot_id(mut self, id: impl Into<String>) -> Self {
        self.bot_id = Some(id.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn knowledge_base(mut self, kb: KnowledgeBaseConfig) -> Self {
        self.knowledge_base = Some(kb);
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = Some(streaming);
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    pub fn request_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn enable_builtin_tools(mut self, enable: bool) -> Self {
        self.enable_builtin_tools = Some(enable);
        self
    }

    pub fn require_builtin_consent(mut self, require: bool) -> Self {
        self.require_builtin_consent = Some(require);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Supply a durable (or otherwise custom) store adapter for the thread
    /// set (§6.3). Defaults to a no-op adapter when unset.
    pub fn thread_persistence(mut self, persistence: Arc<dyn ThreadPersistence>) -> Self {
        self.thread_persistence = Some(persistence);
        self
    }

    /// Supply a durable (or otherwise custom) backend for tool permission
    /// decisions (§6.4). Defaults to an in-memory backend when unset.
    pub fn permission_backend(mut self, backend: Arc<dyn PermissionBackend>) -> Self {
        self.permission_backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<AgentOptions> {
        let runtime_url = self
            .runtime_url
            .ok_or_else(|| Error::config("runtime_url is required"))?;
        if !runtime_url.starts_with("http://") && !runtime_url.starts_with("https://") {
            return Err(Error::config("runtime_url must be a valid HTTP or HTTPS URL"));
        }
        let system_prompt = self
            .system_prompt
            .ok_or_else(|| Error::config("system_prompt is required"))?;
        let max_iterations = self.max_iterations.unwrap_or(20);
        if max_iterations == 0 {
            return Err(Error::config("max_iterations must be at least 1"));
        }

        Ok(AgentOptions {
            runtime_url,
            system_prompt,
            api_key: self.api_key,
            bot_id: self.bot_id,
            model: self.model,
            knowledge_base: self.knowledge_base,
            streaming: self.streaming.unwrap_or(true),
            max_iterations,
            max_retries: self.max_retries.unwrap_or(3),
            request_timeout: self
                .request_timeout
                .unwrap_or(std::time::Duration::from_secs(30)),
            enable_builtin_tools: self.enable_builtin_tools.unwrap_or(false),
            require_builtin_consent: self.require_builtin_consent.unwrap_or(true),
            tools: self.tools,
            thread_persistence: self
                .thread_persistence
                .unwrap_or_else(|| Arc::new(NoopThreadPersistence)),
            permission_backend: self
                .permission_backend
                .unwrap_or_else(|| Arc::new(InMemoryBackend::default())),
        })
    }
}

//! # MCP Transports (component K)
//!
//! Three transports, all exposing the same `send`/`recv` shape over a
//! `JsonRpcMessage`, so `McpClient` never has to branch on which one is in
//! use:
//!
//! - `HttpStreamableTransport` — one POST per outbound message; the
//!   response body is either a single JSON object or an SSE stream of JSON
//!   frames (the "Streamable HTTP" transport MCP servers commonly expose),
//!   reusing `crate::sse::parse_sse_json`.
//! - `SseTransport` — a long-lived `GET` SSE connection carries
//!   server-to-client messages; client-to-server messages go out over a
//!   separate `POST` to the same base URL (the older HTTP+SSE transport).
//! - `StdioTransport` — a child process's stdin/stdout, newline-delimited
//!   JSON in both directions, for local MCP servers launched as a
//!   subprocess.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::{Error, Result};
use crate::mcp::McpError;
use crate::sse::parse_sse_json;

use futures::StreamExt;

// ============================================================================
// JSON-RPC MESSAGE SHAPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// An inbound or outbound JSON-RPC 2.0 frame. Variant order matters for the
/// `untagged` decode: `Request` (has both `id` and `method`) must be tried
/// before `Notification` (has `method` alone), which must be tried before
/// `Response` (has `id` alone) — otherwise a request would silently decode
/// as a notification and lose its `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    pub fn request(id: serde_json::Value, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        JsonRpcMessage::Request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        })
    }

    pub fn notification(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        JsonRpcMessage::Notification(JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        })
    }
}

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn send(&mut self, message: JsonRpcMessage) -> Result<()>;

    /// Receive the next inbound message. `None` means the transport closed
    /// cleanly (server exited, connection closed with no error).
    async fn recv(&mut self) -> Option<Result<JsonRpcMessage>>;
}

// ============================================================================
// HTTP STREAMABLE TRANSPORT
// ============================================================================

pub struct HttpStreamableTransport {
    endpoint: String,
    client: reqwest::Client,
    inbox: std::collections::VecDeque<Result<JsonRpcMessage>>,
    session_id: Option<String>,
}

impl HttpStreamableTransport {
    pub fn new(endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        HttpStreamableTransport {
            endpoint: endpoint.into(),
            client,
            inbox: std::collections::VecDeque::new(),
            session_id: None,
        }
    }
}

#[async_trait]
impl McpTransport for HttpStreamableTransport {
    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .header("accept", "application/json, text/event-stream");
        if let Some(session_id) = &self.session_id {
            request = request.header("mcp-session-id", session_id);
        }

        let response = request.json(&message).send().await?;
        if let Some(session_id) = response.headers().get("mcp-session-id") {
            self.session_id = Some(session_id.to_str().unwrap_or_default().to_string());
        }
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("text/event-stream") {
            let body = response.bytes_stream();
            let mut frames = parse_sse_json(body);
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(value) => self.inbox.push_back(
                        serde_json::from_value(value)
                            .map_err(|e| Error::protocol(format!("malformed MCP frame: {e}"))),
                    ),
                    Err(err) => self.inbox.push_back(Err(err)),
                }
            }
        } else {
            let body: serde_json::Value = response.json().await?;
            if !body.is_null() {
                self.inbox.push_back(
                    serde_json::from_value(body)
                        .map_err(|e| Error::protocol(format!("malformed MCP response: {e}"))),
                );
            }
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<JsonRpcMessage>> {
        self.inbox.pop_front()
    }
}

// ============================================================================
// SSE TRANSPORT
// ============================================================================

pub struct SseTransport {
    post_endpoint: String,
    client: reqwest::Client,
    events: Option<crate::sse::JsonEventStream>,
}

impl SseTransport {
    pub fn new(post_endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        SseTransport {
            post_endpoint: post_endpoint.into(),
            client,
            events: None,
        }
    }

    /// Open the long-lived `GET` stream that carries server-to-client
    /// messages. Must be called once before the first `recv`.
    pub async fn connect(&mut self, sse_endpoint: &str) -> Result<()> {
        let response = self.client.get(sse_endpoint).send().await?;
        self.events = Some(parse_sse_json(response.bytes_stream()));
        Ok(())
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        self.client
            .post(&self.post_endpoint)
            .json(&message)
            .send()
            .await?
            .error_for_status()
            .map_err(Error::from)?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<JsonRpcMessage>> {
        let events = self.events.as_mut()?;
        match events.next().await {
            Some(Ok(value)) => Some(
                serde_json::from_value(value).map_err(|e| Error::protocol(format!("malformed MCP frame: {e}"))),
            ),
            Some(Err(err)) => Some(Err(err)),
            None => None,
        }
    }
}

// ============================================================================
// STDIO TRANSPORT
// ============================================================================

pub struct StdioTransport {
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StdioTransport {
    /// Spawn `command` and wire its stdio as the transport. The process's
    /// stderr is left connected to this process's own stderr for debugging
    /// (matching how a host would normally see MCP server diagnostics).
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .spawn()
            .map_err(|e| Error::transport(format!("failed to spawn MCP server {command}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::transport("MCP server process has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::transport("MCP server process has no stdout"))?;

        Ok(StdioTransport {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        let mut line = serde_json::to_string(&message).map_err(Error::from)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::transport(format!("write to MCP server stdin failed: {e}")))?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<JsonRpcMessage>> {
        let mut line = String::new();
        match self.stdout.read_line(&mut line).await {
            Ok(0) => None,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return Some(Err(Error::protocol("empty line from MCP server stdout")));
                }
                Some(
                    serde_json::from_str(trimmed)
                        .map_err(|e| Error::protocol(format!("malformed MCP frame from stdio: {e}"))),
                )
            }
            Err(err) => Some(Err(Error::transport(format!("read from MCP server stdout failed: {err}")))),
        }
    }
}

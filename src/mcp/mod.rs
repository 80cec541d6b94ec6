//! # Model Context Protocol Client (components K, L, M)
//!
//! A minimal MCP client: enough to connect to a server over one of three
//! transports, perform the `initialize` handshake, list and call tools, and
//! adapt the server's tool definitions into this crate's own `Tool` type so
//! the agent loop never has to know a given tool call is actually an MCP
//! round trip.
//!
//! - `transport` (component K): `HttpStreamableTransport`, `SseTransport`,
//!   `StdioTransport`, all producing the same `JsonRpcMessage` stream.
//! - `client` (component L): `McpClient` — request/response correlation,
//!   the `initialize` handshake, paginated `tools/list`, and
//!   notification/elicitation dispatch.
//! - `adapter` (component M): wraps a discovered MCP tool as a local `Tool`
//!   whose handler calls back into the owning `McpClient`.

pub mod adapter;
pub mod client;
pub mod transport;

pub use adapter::adapt_mcp_tool;
pub use client::{ElicitationRequest, McpClient, ServerCapabilities, ToolDefinition};
pub use transport::{HttpStreamableTransport, JsonRpcMessage, McpTransport, StdioTransport};

use serde::{Deserialize, Serialize};

/// JSON-RPC 2.0 error object, standard codes plus MCP's own server-defined
/// range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl McpError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        McpError {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        McpError::new(Self::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }
}

impl std::fmt::Display for McpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MCP error {}: {}", self.code, self.message)
    }
}

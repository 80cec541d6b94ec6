//! # MCP Client Core (component L)
//!
//! Request/response correlation over any `McpTransport`, the `initialize`
//! handshake, paginated `tools/list`, tool invocation, and handling of the
//! two message types a server can push unprompted: fire-and-forget
//! notifications, and `elicitation/create` — a server-initiated *request*
//! the client must answer, forwarded to a host-supplied handler.
//!
//! Request concurrency is intentionally simple: one in-flight request at a
//! time per client. A host that needs to call multiple MCP servers
//! concurrently holds one `McpClient` per server, same as it would hold one
//! connection per upstream service elsewhere.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::mcp::transport::{JsonRpcMessage, JsonRpcResponse, McpTransport};

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ServerCapabilities {
    pub tools: bool,
    pub resources: bool,
    pub prompts: bool,
    pub protocol_version: String,
    pub server_name: String,
    pub server_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElicitationRequest {
    pub message: String,
    #[serde(rename = "requestedSchema")]
    pub requested_schema: Value,
}

type NotificationHandler = Arc<dyn Fn(String, Option<Value>) + Send + Sync>;
type ElicitationHandler = Arc<dyn Fn(ElicitationRequest) -> BoxFuture<'static, Value> + Send + Sync>;

pub struct McpClient {
    transport: Box<dyn McpTransport>,
    next_id: AtomicU64,
    request_timeout: Duration,
    on_notification: Option<NotificationHandler>,
    on_elicitation: Option<ElicitationHandler>,
    capabilities: Option<ServerCapabilities>,
}

impl McpClient {
    pub fn new(transport: Box<dyn McpTransport>) -> Self {
        McpClient {
            transport,
            next_id: AtomicU64::new(1),
            request_timeout: Duration::from_secs(30),
            on_notification: None,
            on_elicitation: None,
            capabilities: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn on_notification<F>(&mut self, handler: F)
    where
        F: Fn(String, Option<Value>) + Send + Sync + 'static,
    {
        self.on_notification = Some(Arc::new(handler));
    }

    /// Register the handler that answers server-initiated
    /// `elicitation/create` requests (asking the user for additional input
    /// mid-tool-call). A client with no handler registered declines every
    /// elicitation automatically.
    pub fn on_elicitation<F, Fut>(&mut self, handler: F)
    where
        F: Fn(ElicitationRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Value> + Send + 'static,
    {
        self.on_elicitation = Some(Arc::new(move |req| Box::pin(handler(req))));
    }

    pub fn capabilities(&self) -> Option<&ServerCapabilities> {
        self.capabilities.as_ref()
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id_value = serde_json::json!(id);
        self.transport
            .send(JsonRpcMessage::request(id_value.clone(), method, params))
            .await?;
        self.await_response(id_value).await
    }

    /// Pump the transport until the response matching `id` arrives,
    /// dispatching anything else (notifications, server-initiated requests)
    /// along the way.
    async fn await_response(&mut self, id: Value) -> Result<Value> {
        loop {
            let next = tokio::time::timeout(self.request_timeout, self.transport.recv())
                .await
                .map_err(|_| Error::timeout())?;

            match next {
                None => return Err(Error::transport("MCP connection closed while awaiting response")),
                Some(Err(err)) => return Err(err),
                Some(Ok(JsonRpcMessage::Response(response))) => {
                    if response.id == id {
                        return match response.error {
                            Some(err) => Err(Error::Mcp(err)),
                            None => Ok(response.result.unwrap_or(Value::Null)),
                        };
                    }
                    log::warn!("dropping MCP response for unexpected id {:?}", response.id);
                }
                Some(Ok(JsonRpcMessage::Notification(note))) => {
                    if let Some(handler) = &self.on_notification {
                        handler(note.method, note.params);
                    }
                }
                Some(Ok(JsonRpcMessage::Request(request))) => {
                    self.handle_server_request(request).await?;
                }
            }
        }
    }

    async fn handle_server_request(&mut self, request: crate::mcp::transport::JsonRpcRequest) -> Result<()> {
        if request.method != "elicitation/create" {
            let response = JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: None,
                error: Some(crate::mcp::McpError::method_not_found(&request.method)),
            };
            self.transport.send(JsonRpcMessage::Response(response)).await?;
            return Ok(());
        }

        let result = match &self.on_elicitation {
            Some(handler) => {
                let elicitation: ElicitationRequest = serde_json::from_value(request.params.unwrap_or_default())
                    .map_err(|e| Error::protocol(format!("malformed elicitation/create params: {e}")))?;
                handler(elicitation).await
            }
            None => serde_json::json!({ "action": "decline" }),
        };

        let response = JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: Some(result),
            error: None,
        };
        self.transport.send(JsonRpcMessage::Response(response)).await?;
        Ok(())
    }

    /// Perform the `initialize` handshake and send the
    /// `notifications/initialized` acknowledgement. Must be called before
    /// `list_tools`/`call_tool`.
    pub async fn initialize(&mut self, client_name: &str, client_version: &str) -> Result<ServerCapabilities> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": client_name, "version": client_version },
        });
        let result = self.request("initialize", Some(params)).await?;

        self.transport
            .send(JsonRpcMessage::notification("notifications/initialized", None))
            .await?;

        let capabilities = ServerCapabilities {
            tools: result["capabilities"]["tools"].is_object(),
            resources: result["capabilities"]["resources"].is_object(),
            prompts: result["capabilities"]["prompts"].is_object(),
            protocol_version: result["protocolVersion"].as_str().unwrap_or_default().to_string(),
            server_name: result["serverInfo"]["name"].as_str().unwrap_or_default().to_string(),
            server_version: result["serverInfo"]["version"].as_str().unwrap_or_default().to_string(),
        };
        self.capabilities = Some(capabilities.clone());
        Ok(capabilities)
    }

    /// List every tool the server exposes, transparently following
    /// `nextCursor` pagination until exhausted.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = serde_json::Map::new();
            if let Some(cursor) = &cursor {
                params.insert("cursor".to_string(), serde_json::json!(cursor));
            }
            let result = self.request("tools/list", Some(Value::Object(params))).await?;

            let page: Vec<ToolDefinition> = serde_json::from_value(
                result.get("tools").cloned().unwrap_or_else(|| serde_json::json!([])),
            )
            .map_err(|e| Error::protocol(format!("malformed tools/list result: {e}")))?;
            tools.extend(page);

            cursor = result.get("nextCursor").and_then(|v| v.as_str()).map(|s| s.to_string());
            if cursor.is_none() {
                break;
            }
        }

        Ok(tools)
    }

    /// Invoke `name` with `arguments`, returning the raw `tools/call` result
    /// (an MCP `CallToolResult`: `{content, isError}`). `crate::mcp::adapter`
    /// normalizes this into a local `ToolResponse`.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        self.request("tools/call", Some(params)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        outbound: Vec<JsonRpcMessage>,
        scripted: Arc<Mutex<VecDeque<JsonRpcMessage>>>,
    }

    impl FakeTransport {
        fn scripted(messages: Vec<JsonRpcMessage>) -> Self {
            FakeTransport {
                outbound: Vec::new(),
                scripted: Arc::new(Mutex::new(messages.into())),
            }
        }
    }

    #[async_trait]
    impl McpTransport for FakeTransport {
        async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
            self.outbound.push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<JsonRpcMessage>> {
            self.scripted.lock().await.pop_front().map(Ok)
        }
    }

    fn response(id: u64, result: Value) -> JsonRpcMessage {
        JsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: serde_json::json!(id),
            result: Some(result),
            error: None,
        })
    }

    #[tokio::test]
    async fn initialize_performs_handshake() {
        let transport = FakeTransport::scripted(vec![response(
            1,
            serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "test-server", "version": "1.0"},
            }),
        )]);
        let mut client = McpClient::new(Box::new(transport));
        let caps = client.initialize("test-client", "0.1").await.unwrap();
        assert!(caps.tools);
        assert_eq!(caps.server_name, "test-server");
    }

    #[tokio::test]
    async fn list_tools_follows_pagination() {
        let transport = FakeTransport::scripted(vec![
            response(
                1,
                serde_json::json!({
                    "tools": [{"name": "a", "inputSchema": {"type": "object"}}],
                    "nextCursor": "page2",
                }),
            ),
            response(
                2,
                serde_json::json!({
                    "tools": [{"name": "b", "inputSchema": {"type": "object"}}],
                }),
            ),
        ]);
        let mut client = McpClient::new(Box::new(transport));
        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "a");
        assert_eq!(tools[1].name, "b");
    }

    #[tokio::test]
    async fn call_tool_surfaces_mcp_error() {
        let transport = FakeTransport::scripted(vec![JsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: serde_json::json!(1),
            result: None,
            error: Some(crate::mcp::McpError::method_not_found("tools/call")),
        })]);
        let mut client = McpClient::new(Box::new(transport));
        let result = client.call_tool("ghost", serde_json::json!({})).await;
        assert!(matches!(result, Err(Error::Mcp(_))));
    }

    #[tokio::test]
    async fn unrelated_response_ids_are_skipped() {
        let transport = FakeTransport::scripted(vec![
            response(99, serde_json::json!({"stale": true})),
            response(1, serde_json::json!({"ok": true})),
        ]);
        let mut client = McpClient::new(Box::new(transport));
        let result = client.request("ping", None).await.unwrap();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn elicitation_without_handler_declines() {
        let elicit_request = JsonRpcMessage::Request(crate::mcp::transport::JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: serde_json::json!(500),
            method: "elicitation/create".to_string(),
            params: Some(serde_json::json!({
                "message": "Confirm deletion?",
                "requestedSchema": {"type": "object"},
            })),
        });
        let transport = FakeTransport::scripted(vec![elicit_request, response(1, serde_json::json!({"ok": true}))]);
        let mut client = McpClient::new(Box::new(transport));
        let result = client.request("ping", None).await.unwrap();
        assert_eq!(result["ok"], true);
    }
}

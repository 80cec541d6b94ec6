//! # MCP Tool Adapter (component M)
//!
//! Wraps one MCP `ToolDefinition` as a local `Tool` whose handler calls back
//! into the owning `McpClient`. From the agent loop's perspective an MCP
//! tool is indistinguishable from any other client-side tool — it goes
//! through the same classify/execute pipeline, the same permission store,
//! the same approval gate.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::mcp::client::{McpClient, ToolDefinition};
use crate::tools::{NeedsApproval, Tool, ToolResponse, tool};

/// Normalize an MCP `CallToolResult` (`{content: [...], isError}`) into a
/// local `ToolResponse`. Text content blocks are joined with newlines;
/// non-text blocks (images, resource links) are kept as raw JSON under
/// `data.content` since this crate has no generic binary-attachment pathway
/// for arbitrary MCP content types (only the image attachments the data
/// model defines natively).
fn normalize_call_tool_result(result: serde_json::Value) -> ToolResponse {
    let is_error = result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false);
    let content = result
        .get("content")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let text = content
        .iter()
        .filter_map(|block| {
            if block.get("type").and_then(|t| t.as_str()) == Some("text") {
                block.get("text").and_then(|t| t.as_str()).map(|s| s.to_string())
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    if is_error {
        let message = if text.is_empty() {
            "MCP tool call reported an error".to_string()
        } else {
            text
        };
        return ToolResponse::error(message);
    }

    ToolResponse::success(serde_json::json!({ "text": text, "content": content }))
}

/// Build a local `Tool` that proxies to `client`. `requires_approval`
/// mirrors the host's general policy for MCP-sourced tools (the spec treats
/// them as untrusted by default, same as any tool whose implementation the
/// host doesn't own) — a host can override per call via
/// `crate::permissions::PermissionStore`.
pub fn adapt_mcp_tool(client: Arc<Mutex<McpClient>>, definition: ToolDefinition, requires_approval: bool) -> Tool {
    let name = definition.name.clone();
    let approval = if requires_approval {
        NeedsApproval::Always
    } else {
        NeedsApproval::Never
    };

    let mut builder = tool(
        definition.name.clone(),
        definition.description.clone().unwrap_or_default(),
    )
    .needs_approval(approval);

    if requires_approval {
        builder = builder.approval_message(format!("Allow the MCP tool \"{name}\" to run?"));
    }

    let call_name = definition.name.clone();
    builder = builder.handler(move |args, _ctx| {
        let client = client.clone();
        let call_name = call_name.clone();
        async move {
            let mut client = client.lock().await;
            let result = client.call_tool(&call_name, args).await?;
            Ok(normalize_call_tool_result(result))
        }
    });

    let mut built = builder.build();
    built.input_schema = definition.input_schema;
    built
}

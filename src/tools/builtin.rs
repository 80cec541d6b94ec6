//! # Built-in Tools (§4.J.1)
//!
//! Three tools auto-registered when a host opts in: `capture_screenshot`,
//! `get_console_logs`, `get_network_requests`. The actual capture — reading
//! pixels off a window, draining a console ring buffer — is host-specific,
//! platform-coupled I/O that's explicitly out of this crate's scope (§1).
//! What this module owns is the wiring: the `ToolDefinition`s, their default
//! approval policy, and the request/response normalization described in the
//! spec. Hosts provide the capture itself by implementing
//! `BuiltinToolSource`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::schema::ParamType;
use crate::tools::registry::ToolRegistry;
use crate::tools::{NeedsApproval, ToolResponse, tool};
use crate::types::Attachment;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConsoleLogEntry {
    pub level: String,
    pub message: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NetworkRequestEntry {
    pub url: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub failed: bool,
    pub timestamp: u64,
}

/// The host-implemented side of the three built-in tools. A host that never
/// enables built-in tools (`AgentOptions::enable_builtin_tools == false`)
/// never needs to implement this.
#[async_trait]
pub trait BuiltinToolSource: Send + Sync {
    async fn capture_screenshot(&self, reason: Option<String>) -> Result<Attachment>;

    async fn get_console_logs(
        &self,
        types: Option<Vec<String>>,
        limit: Option<usize>,
    ) -> Result<Vec<ConsoleLogEntry>>;

    async fn get_network_requests(
        &self,
        failed_only: bool,
        limit: Option<usize>,
    ) -> Result<Vec<NetworkRequestEntry>>;
}

/// A source that refuses every capture. Safe default for a host that enables
/// built-in tools' wiring (e.g. for testing the approval flow) without
/// having real capture capability wired up yet.
pub struct NoopBuiltinToolSource;

#[async_trait]
impl BuiltinToolSource for NoopBuiltinToolSource {
    async fn capture_screenshot(&self, _reason: Option<String>) -> Result<Attachment> {
        Err(Error::tool("no screenshot source configured on host"))
    }

    async fn get_console_logs(
        &self,
        _types: Option<Vec<String>>,
        _limit: Option<usize>,
    ) -> Result<Vec<ConsoleLogEntry>> {
        Err(Error::tool("no console log source configured on host"))
    }

    async fn get_network_requests(
        &self,
        _failed_only: bool,
        _limit: Option<usize>,
    ) -> Result<Vec<NetworkRequestEntry>> {
        Err(Error::tool("no network request source configured on host"))
    }
}

fn format_logs(logs: &[ConsoleLogEntry]) -> String {
    logs.iter()
        .map(|l| format!("[{}] {}", l.level, l.message))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_network(entries: &[NetworkRequestEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            let status = e
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "—".to_string());
            format!("{} {} -> {}", e.method, e.url, status)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Register all three built-in tools against `registry`. All default to
/// `needsApproval: true` unless `require_consent` is `false` (the host's
/// `requireConsent:false` override).
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    source: Arc<dyn BuiltinToolSource>,
    require_consent: bool,
) {
    let approval = if require_consent {
        NeedsApproval::Always
    } else {
        NeedsApproval::Never
    };

    let screenshot_source = source.clone();
    registry.register(
        tool(
            "capture_screenshot",
            "Capture a screenshot of the host's current viewport.",
        )
        .param("reason", ParamType::String, "Why the screenshot is needed", false)
        .needs_approval(approval.clone())
        .approval_message("Allow the assistant to capture a screenshot of your screen?")
        .handler(move |args, _ctx| {
            let source = screenshot_source.clone();
            async move {
                let reason = args
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                let attachment = source.capture_screenshot(reason).await?;
                Ok(ToolResponse::attachment_as_user_message(
                    "Screenshot captured successfully.",
                    "Here's my screen:",
                    attachment,
                ))
            }
        })
        .build(),
    );

    let console_source = source.clone();
    registry.register(
        tool(
            "get_console_logs",
            "Read recently captured console output from the host application.",
        )
        .param(
            "types",
            ParamType::Array(Box::new(ParamType::String)),
            "Log levels to include (e.g. error, warn, log)",
            false,
        )
        .param("limit", ParamType::Integer, "Maximum number of entries", false)
        .needs_approval(approval.clone())
        .approval_message("Allow the assistant to read your browser console logs?")
        .handler(move |args, _ctx| {
            let source = console_source.clone();
            async move {
                let types = args.get("types").and_then(|v| v.as_array()).map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(|s| s.to_string()))
                        .collect()
                });
                let limit = args
                    .get("limit")
                    .and_then(|v| v.as_u64())
                    .map(|n| n as usize);
                let logs = source.get_console_logs(types, limit).await?;
                let formatted = format_logs(&logs);
                Ok(ToolResponse::success(serde_json::json!({
                    "logs": logs,
                    "totalCaptured": logs.len(),
                    "formatted": formatted,
                })))
            }
        })
        .build(),
    );

    let network_source = source;
    registry.register(
        tool(
            "get_network_requests",
            "Read recently captured fetch/XHR network activity from the host application.",
        )
        .param(
            "failedOnly",
            ParamType::Boolean,
            "Only include failed requests",
            false,
        )
        .param("limit", ParamType::Integer, "Maximum number of entries", false)
        .needs_approval(approval)
        .approval_message("Allow the assistant to read your network request history?")
        .handler(move |args, _ctx| {
            let source = network_source.clone();
            async move {
                let failed_only = args
                    .get("failedOnly")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let limit = args
                    .get("limit")
                    .and_then(|v| v.as_u64())
                    .map(|n| n as usize);
                let requests = source.get_network_requests(failed_only, limit).await?;
                let formatted = format_network(&requests);
                Ok(ToolResponse::success(serde_json::json!({
                    "requests": requests,
                    "totalCaptured": requests.len(),
                    "formatted": formatted,
                })))
            }
        })
        .build(),
    );
}

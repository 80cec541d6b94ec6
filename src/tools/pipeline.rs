//! # Tool Execution Pipeline (component J)
//!
//! Three passes over a batch of parked tool calls, matching §4.J exactly:
//!
//! 1. **classify** — resolve each call against the registry and permission
//!    store, deciding whether it's auto-approved, auto-denied, or needs a
//!    human decision.
//! 2. **execute** — run approved calls' handlers in call order (sequential,
//!    not parallel — §5 requires order preservation so parked `tool_calls`
//!    line up 1:1 with emitted `tool` results).
//! 3. **materialize** — composing the resubmit body is the agent loop's job
//!    (§4.I.3); this module only produces the per-call `ToolResponse`s it
//!    needs.

use crate::error::Result;
use crate::permissions::{PermissionLevel, PermissionStore, ToolPermission};
use crate::tools::registry::ToolRegistry;
use crate::tools::{ApprovalStatus, ExecutionStatus, ToolContext, ToolExecution, ToolResponse};

/// A single parked tool call, as observed from `action:start`/`tool_calls`
/// wire events.
#[derive(Debug, Clone)]
pub struct ToolCallInfo {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// What Pass 1 decided for a call, before Pass 2 runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPass {
    /// No approval needed, or a stored `allow_always`/`session` permission
    /// covers it. Ready for Pass 2 immediately.
    AutoApproved,
    /// A stored `deny_always` permission rejected it outright; already
    /// terminal, Pass 2 just reads back the canonical error.
    AutoDenied,
    /// Needs a host decision (`approve`/`reject`) before Pass 2 can run.
    AwaitingApproval,
}

/// A tool call suspended at the approval gate, with the message to show a
/// human.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub execution_id: String,
    pub tool_name: String,
    pub message: String,
}

pub const AUTO_DENIED_MESSAGE: &str = "Automatically denied based on saved preference";

pub struct ToolPipeline;

impl ToolPipeline {
    /// Pass 1: classify every parked call. Returns one `(ToolExecution,
    /// ExecutionPass)` per call, in the same order they were parked —
    /// preserving order is what lets Pass 3 zip executions back onto
    /// `tool_call_id`s without a lookup.
    pub fn classify(
        registry: &ToolRegistry,
        permissions: &PermissionStore,
        calls: &[ToolCallInfo],
    ) -> Result<Vec<(ToolExecution, ExecutionPass)>> {
        let mut out = Vec::with_capacity(calls.len());

        for call in calls {
            let mut execution = ToolExecution::pending(call.id.clone(), call.name.clone());
            execution.args = call.args.clone();

            let tool = match registry.get(&call.name) {
                Some(t) => t,
                None => {
                    execution.status = ExecutionStatus::Error;
                    execution.error = Some(format!("Tool {} not found on client", call.name));
                    out.push((execution, ExecutionPass::AutoDenied));
                    continue;
                }
            };

            let stored = permissions.get(&call.name)?;

            if let Some(ToolPermission {
                level: PermissionLevel::DenyAlways,
                ..
            }) = &stored
            {
                execution.status = ExecutionStatus::Error;
                execution.approval_status = ApprovalStatus::Rejected;
                execution.error = Some(AUTO_DENIED_MESSAGE.to_string());
                out.push((execution, ExecutionPass::AutoDenied));
                continue;
            }

            let covered_by_permission = matches!(
                stored.as_ref().map(|p| p.level),
                Some(PermissionLevel::AllowAlways) | Some(PermissionLevel::Session)
            );
            let needs_approval = tool.needs_approval.evaluate(&call.args);

            if !needs_approval || covered_by_permission {
                execution.approval_status = ApprovalStatus::Approved;
                if covered_by_permission {
                    permissions.touch(&call.name)?;
                }
                out.push((execution, ExecutionPass::AutoApproved));
            } else {
                execution.approval_status = ApprovalStatus::Required;
                execution.approval_message = tool
                    .approval_message
                    .as_ref()
                    .map(|m| m.render(&call.args))
                    .or_else(|| Some(format!("Allow \"{}\" to run?", tool.name)));
                out.push((execution, ExecutionPass::AwaitingApproval));
            }
        }

        Ok(out)
    }

    /// Executions still waiting on a host decision, as
    /// `approve(execution_id, ...)`/`reject(execution_id, ...)` targets.
    pub fn pending_approvals(executions: &[ToolExecution]) -> Vec<PendingApproval> {
        executions
            .iter()
            .filter(|e| e.approval_status == ApprovalStatus::Required)
            .map(|e| PendingApproval {
                execution_id: e.id.clone(),
                tool_name: e.name.clone(),
                message: e
                    .approval_message
                    .clone()
                    .unwrap_or_else(|| format!("Allow \"{}\" to run?", e.name)),
            })
            .collect()
    }

    /// Pass 2: execute one call. `execution.status`/`approval_status` are
    /// expected to already reflect Pass 1's decision (or a host's
    /// `approve`/`reject`, which mutates `approval_status` in place before
    /// this is called).
    pub async fn execute(
        registry: &ToolRegistry,
        execution: &mut ToolExecution,
        ctx: ToolContext,
    ) -> ToolResponse {
        let start = std::time::Instant::now();

        if execution.status == ExecutionStatus::Error {
            return ToolResponse::error(
                execution
                    .error
                    .clone()
                    .unwrap_or_else(|| "Tool call failed".to_string()),
            );
        }

        if execution.approval_status == ApprovalStatus::Rejected {
            let reason = execution
                .error
                .clone()
                .unwrap_or_else(|| "Rejected by user".to_string());
            execution.status = ExecutionStatus::Error;
            execution.error = Some(reason.clone());
            return ToolResponse::error(reason);
        }

        if ctx.signal.is_cancelled() {
            execution.status = ExecutionStatus::Error;
            execution.error = Some("Tool call cancelled".to_string());
            return ToolResponse::error("Tool call cancelled");
        }

        execution.status = ExecutionStatus::Executing;

        let Some(tool) = registry.get(&execution.name) else {
            execution.status = ExecutionStatus::Error;
            execution.error = Some(format!("Tool {} not found on client", execution.name));
            return ToolResponse::error(execution.error.clone().unwrap());
        };

        let Some(handler) = tool.handler.clone() else {
            execution.status = ExecutionStatus::Error;
            execution.error = Some(format!("Tool {} has no local handler", tool.name));
            return ToolResponse::error(execution.error.clone().unwrap());
        };

        let response = match handler(execution.args.clone(), ctx.clone()).await {
            Ok(response) => response,
            Err(err) => ToolResponse::error(err.to_string()),
        };

        if ctx.signal.is_cancelled() {
            execution.status = ExecutionStatus::Error;
            execution.error = Some("Tool call cancelled".to_string());
            return ToolResponse::error("Tool call cancelled");
        }

        execution.duration_ms = Some(start.elapsed().as_millis() as u64);
        match &response {
            ToolResponse::Err { error } => {
                execution.status = ExecutionStatus::Error;
                execution.error = Some(error.clone());
            }
            ToolResponse::Ok { data, .. } => {
                execution.status = ExecutionStatus::Completed;
                execution.result = data.clone();
            }
            ToolResponse::AttachmentAsUserMessage { ack_message, .. } => {
                execution.status = ExecutionStatus::Completed;
                execution.result = Some(serde_json::Value::String(ack_message.clone()));
            }
        }

        response
    }
}

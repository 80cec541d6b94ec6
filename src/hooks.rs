//! # Lifecycle Hooks
//!
//! Intercept execution at key points: before a user prompt is sent, before
//! and after a tool runs, before a tool call reaches the approval gate, and
//! when a turn completes. Hooks run sequentially per event type; the first
//! one to return anything other than `HookDecision::Continue` wins and the
//! rest are skipped — this lets an audit-logging hook and a
//! security-enforcing hook coexist without the audit hook accidentally
//! overriding the security one.
//!
//! `PreApproval` and `TurnComplete` extend the teacher's original three
//! hooks (`PreToolUse`, `PostToolUse`, `UserPromptSubmit`) for this runtime:
//! a host can auto-approve or auto-deny a tool call before the UI-facing
//! approval gate is even consulted, and observe `loop:complete`. A hook
//! decision composes with, but never bypasses, the Permission Store — a
//! `PreApproval` hook that returns `Continue` still goes through normal
//! precedence (§4.E); only `Block`/`Modify` short-circuits it.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::types::Message;

// ============================================================================
// HOOK TYPE IDENTIFIERS
// ============================================================================

pub const HOOK_PRE_TOOL_USE: &str = "PreToolUse";
pub const HOOK_POST_TOOL_USE: &str = "PostToolUse";
pub const HOOK_USER_PROMPT_SUBMIT: &str = "UserPromptSubmit";
pub const HOOK_PRE_APPROVAL: &str = "PreApproval";
pub const HOOK_TURN_COMPLETE: &str = "TurnComplete";

// ============================================================================
// HOOK DECISION
// ============================================================================

/// The outcome a hook returns. `Continue` means "no opinion, let the next
/// hook (or the default behavior) decide." `Block` halts the action with a
/// reason. `Modify` replaces the event's payload (a rewritten prompt, or
/// rewritten tool arguments) and continues.
#[derive(Debug, Clone)]
pub enum HookDecision {
    Continue,
    Block { reason: String },
    Modify { payload: serde_json::Value },
}

impl HookDecision {
    pub fn is_continue(&self) -> bool {
        matches!(self, HookDecision::Continue)
    }
}

// ============================================================================
// EVENT PAYLOADS
// ============================================================================

#[derive(Debug, Clone)]
pub struct UserPromptSubmitEvent {
    pub prompt: String,
    pub history: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct PreToolUseEvent {
    pub tool_name: String,
    pub tool_call_id: String,
    pub input: serde_json::Value,
    pub history: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct PostToolUseEvent {
    pub tool_name: String,
    pub tool_call_id: String,
    pub input: serde_json::Value,
    pub result: serde_json::Value,
    pub history: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct PreApprovalEvent {
    pub tool_name: String,
    pub execution_id: String,
    pub input: serde_json::Value,
    pub approval_message: String,
}

#[derive(Debug, Clone)]
pub struct TurnCompleteEvent {
    pub iterations: usize,
    pub aborted: bool,
    pub max_iterations_reached: bool,
}

type HookFn<E> = Arc<dyn Fn(E) -> BoxFuture<'static, HookDecision> + Send + Sync>;

fn box_handler<E, F, Fut>(f: F) -> HookFn<E>
where
    E: Send + 'static,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = HookDecision> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Registry of lifecycle hooks. Empty by default — a host opts in by
/// calling the `on_*` registration methods.
#[derive(Default, Clone)]
pub struct Hooks {
    pre_tool_use: Vec<HookFn<PreToolUseEvent>>,
    post_tool_use: Vec<HookFn<PostToolUseEvent>>,
    user_prompt_submit: Vec<HookFn<UserPromptSubmitEvent>>,
    pre_approval: Vec<HookFn<PreApprovalEvent>>,
    turn_complete: Vec<HookFn<TurnCompleteEvent>>,
}

macro_rules! runner {
    ($register:ident, $run:ident, $field:ident, $event:ty) => {
        pub fn $register<F, Fut>(&mut self, f: F)
        where
            F: Fn($event) -> Fut + Send + Sync + 'static,
            Fut: std::future::Future<Output = HookDecision> + Send + 'static,
        {
            self.$field.push(box_handler(f));
        }

        pub async fn $run(&self, event: $event) -> HookDecision {
            for hook in &self.$field {
                let decision = hook(event.clone()).await;
                if !decision.is_continue() {
                    return decision;
                }
            }
            HookDecision::Continue
        }
    };
}

impl Hooks {
    pub fn new() -> Self {
        Hooks::default()
    }

    runner!(
        on_user_prompt_submit,
        run_user_prompt_submit,
        user_prompt_submit,
        UserPromptSubmitEvent
    );
    runner!(on_pre_tool_use, run_pre_tool_use, pre_tool_use, PreToolUseEvent);
    runner!(
        on_post_tool_use,
        run_post_tool_use,
        post_tool_use,
        PostToolUseEvent
    );
    runner!(on_pre_approval, run_pre_approval, pre_approval, PreApprovalEvent);
    runner!(
        on_turn_complete,
        run_turn_complete,
        turn_complete,
        TurnCompleteEvent
    );
}

//! # Id & Time Utilities
//!
//! Small helpers shared across the agent loop, thread store, and MCP client:
//! unique ids for messages/threads/tool calls, and millisecond timestamps for
//! `Message.created_at` / `Thread.updated_at`.
//!
//! IDs are process-unique, not globally unique: the data model (§3) only
//! requires message ids to be unique within a process and tool-call ids to be
//! unique within a thread, so a counter-seeded random suffix is sufficient —
//! no need to pull in a UUID dependency the teacher doesn't already use.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Milliseconds since the Unix epoch, used for `created_at`/`updated_at`.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn next_counter() -> u64 {
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Generate a unique id with the given prefix, e.g. `generate_id("msg")` ->
/// `"msg_1a2b3c-7"`. Monotonic within a process: the counter never repeats,
/// so two ids minted in the same millisecond still differ.
pub fn generate_id(prefix: &str) -> String {
    let millis = now_millis();
    let counter = next_counter();
    format!("{prefix}_{millis:x}-{counter}")
}

/// Generate a message id (`msg_...`).
pub fn message_id() -> String {
    generate_id("msg")
}

/// Generate a thread id (`thread_...`).
pub fn thread_id() -> String {
    generate_id("thread")
}

/// Generate a tool-call id (`call_...`).
pub fn tool_call_id() -> String {
    generate_id("call")
}

/// Generate a context-tree node id (`ctx_...`).
pub fn context_id() -> String {
    generate_id("ctx")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = message_id();
        let b = message_id();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_carry_prefix() {
        assert!(thread_id().starts_with("thread_"));
        assert!(tool_call_id().starts_with("call_"));
        assert!(context_id().starts_with("ctx_"));
    }

    #[test]
    fn now_millis_is_monotonic_ish() {
        let a = now_millis();
        let b = now_millis();
        assert!(b >= a);
    }
}

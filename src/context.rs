//! # Context Window Management & Context Tree
//!
//! Two related but distinct pieces of "context" live here, following the
//! teacher's `context.rs` module layout:
//!
//! - **Token estimation / truncation** (kept from the teacher, generalized
//!   to the spec's `Message` type): manual tools a host can use between
//!   turns to keep a thread's history under a model's context window.
//! - **Context Tree** (component G): a forest of user-supplied strings
//!   rendered depth-first into the system prompt, letting a host attach
//!   structured background (open files, project facts, environment
//!   details) without polluting the message history itself.

use crate::error::{Error, Result};
use crate::ids::context_id;
use crate::types::{Message, Role};

// ============================================================================
// TOKEN ESTIMATION (kept from the teacher)
// ============================================================================

/// Estimate the number of tokens in a message history using a
/// character-based approximation (~1 token per 4 characters). This is
/// intentionally crude — 70-85% accurate across model families — but needs
/// no tokenizer dependency and is good enough for proactive truncation
/// decisions.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let mut chars = 0usize;
    for msg in messages {
        if let Some(content) = &msg.content {
            chars += content.chars().count();
        }
        if let Some(calls) = &msg.tool_calls {
            for call in calls {
                chars += call.function.name.chars().count();
                chars += call.function.arguments.chars().count();
            }
        }
    }
    chars / 4
}

/// Check whether a history is approaching (or over) a token limit.
pub fn is_approaching_limit(messages: &[Message], limit: usize) -> bool {
    estimate_tokens(messages) >= limit
}

/// Truncate message history to the most recent `keep_turns` turns, where a
/// turn is a user message plus everything up to (not including) the next
/// user message. Never splits a turn — that would leave a dangling
/// `tool_calls` with no matching `tool` result and violate §3's pairing
/// invariant. If `preserve_system` is set, any leading `system` message is
/// kept regardless of turn count.
pub fn truncate_messages(messages: &[Message], keep_turns: usize, preserve_system: bool) -> Vec<Message> {
    if keep_turns == 0 {
        return if preserve_system {
            messages
                .iter()
                .take_while(|m| m.role == Role::System)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
    }

    let system_prefix: Vec<Message> = if preserve_system {
        messages
            .iter()
            .take_while(|m| m.role == Role::System)
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    let rest = &messages[system_prefix.len()..];

    let mut turn_starts = Vec::new();
    for (idx, msg) in rest.iter().enumerate() {
        if msg.role == Role::User {
            turn_starts.push(idx);
        }
    }

    if turn_starts.is_empty() {
        let mut out = system_prefix;
        out.extend(rest.iter().cloned());
        return out;
    }

    let start_idx = if turn_starts.len() > keep_turns {
        turn_starts[turn_starts.len() - keep_turns]
    } else {
        0
    };

    let mut out = system_prefix;
    out.extend(rest[start_idx..].iter().cloned());
    out
}

// ============================================================================
// CONTEXT TREE (component G)
// ============================================================================

/// One node of the context forest.
#[derive(Debug, Clone)]
pub struct ContextTreeNode {
    pub id: String,
    pub value: String,
    pub children: Vec<ContextTreeNode>,
}

impl ContextTreeNode {
    fn find_mut(&mut self, id: &str) -> Option<&mut ContextTreeNode> {
        if self.id == id {
            return Some(self);
        }
        for child in &mut self.children {
            if let Some(found) = child.find_mut(id) {
                return Some(found);
            }
        }
        None
    }

    fn remove_child(&mut self, id: &str) -> bool {
        let before = self.children.len();
        self.children.retain(|c| c.id != id);
        if self.children.len() != before {
            return true;
        }
        for child in &mut self.children {
            if child.remove_child(id) {
                return true;
            }
        }
        false
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        out.push_str(&"  ".repeat(depth));
        out.push_str("- ");
        out.push_str(&self.value);
        out.push('\n');
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

/// A forest of user-supplied context blocks, rendered depth-first into the
/// system prompt with indentation (§3 "ContextTree").
#[derive(Debug, Clone, Default)]
pub struct ContextTree {
    roots: Vec<ContextTreeNode>,
}

impl ContextTree {
    pub fn new() -> Self {
        ContextTree::default()
    }

    /// Add a value, optionally under an existing node. Returns the new
    /// node's id. Errors if `parent_id` doesn't resolve to any node in the
    /// forest.
    pub fn add(&mut self, value: impl Into<String>, parent_id: Option<&str>) -> Result<String> {
        let node = ContextTreeNode {
            id: context_id(),
            value: value.into(),
            children: Vec::new(),
        };
        let id = node.id.clone();

        match parent_id {
            None => self.roots.push(node),
            Some(parent) => {
                let target = self
                    .roots
                    .iter_mut()
                    .find_map(|r| r.find_mut(parent))
                    .ok_or_else(|| Error::invalid_input(format!("context node {parent} not found")))?;
                target.children.push(node);
            }
        }

        Ok(id)
    }

    /// Remove a node (and its subtree) by id. Returns `true` if found.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.roots.len();
        self.roots.retain(|r| r.id != id);
        if self.roots.len() != before {
            return true;
        }
        for root in &mut self.roots {
            if root.remove_child(id) {
                return true;
            }
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Render the forest depth-first into a block suitable for appending to
    /// a system prompt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            root.render_into(&mut out, 0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_counts_content_and_tool_args() {
        let messages = vec![Message::user("hello world")];
        assert!(estimate_tokens(&messages) > 0);
    }

    #[test]
    fn is_approaching_limit_detects_over_budget_history() {
        let messages = vec![Message::user("a".repeat(1000))];
        assert!(is_approaching_limit(&messages, 100));
        assert!(!is_approaching_limit(&messages, 10_000));
    }

    #[test]
    fn truncate_keeps_last_n_turns_without_splitting() {
        let mut messages = Vec::new();
        for i in 0..5 {
            messages.push(Message::user(format!("turn {i}")));
            messages.push(Message::assistant_placeholder());
        }
        let truncated = truncate_messages(&messages, 2, false);
        // last 2 turns = 4 messages
        assert_eq!(truncated.len(), 4);
        assert_eq!(truncated[0].content.as_deref(), Some("turn 3"));
    }

    #[test]
    fn truncate_preserves_leading_system_message() {
        let mut messages = vec![Message::system("be nice")];
        for i in 0..3 {
            messages.push(Message::user(format!("turn {i}")));
        }
        let truncated = truncate_messages(&messages, 1, true);
        assert_eq!(truncated[0].role, Role::System);
        assert_eq!(truncated.last().unwrap().content.as_deref(), Some("turn 2"));
    }

    #[test]
    fn truncate_zero_turns_drops_everything_but_system() {
        let messages = vec![Message::system("be nice"), Message::user("hi")];
        let truncated = truncate_messages(&messages, 0, true);
        assert_eq!(truncated.len(), 1);
    }

    #[test]
    fn context_tree_add_and_render_nested() {
        let mut tree = ContextTree::new();
        let root = tree.add("project: widgets", None).unwrap();
        tree.add("file: main.rs", Some(&root)).unwrap();
        let rendered = tree.render();
        assert!(rendered.contains("- project: widgets"));
        assert!(rendered.contains("  - file: main.rs"));
    }

    #[test]
    fn context_tree_add_with_missing_parent_errors() {
        let mut tree = ContextTree::new();
        let result = tree.add("orphan", Some("ghost"));
        assert!(result.is_err());
    }

    #[test]
    fn context_tree_remove_drops_subtree() {
        let mut tree = ContextTree::new();
        let root = tree.add("root", None).unwrap();
        let child = tree.add("child", Some(&root)).unwrap();
        assert!(tree.remove(&root));
        assert!(tree.is_empty());
        assert!(!tree.remove(&child));
    }
}

//! # Tool Registry (component D)
//!
//! An in-process map from tool name to `Tool`. Registration bumps a version
//! counter so the agent loop can cheaply notice "the registry changed since
//! the last turn" without diffing the whole map (§5: "mutations from the
//! host while a turn is in flight take effect on the next submit").

use std::collections::HashMap;

use super::Tool;

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
    version: u64,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry::default()
    }

    /// Register a tool, replacing any existing tool with the same name.
    /// Bumps the version counter unconditionally — even a same-shape
    /// re-registration invalidates cached snapshots, since the handler
    /// closure's captured state may have changed.
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
        self.version += 1;
    }

    /// Remove a tool by name. Returns `true` if a tool was actually
    /// present and removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let removed = self.tools.remove(name).is_some();
        if removed {
            self.version += 1;
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All tools, in registration-order-agnostic iteration (a `HashMap`
    /// gives no ordering guarantee; callers that need determinism should
    /// sort by name, as `client_tools_wire` does).
    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.values()
    }

    /// Take a consistent snapshot of the registry's client-located,
    /// available tools in the `{name, description, inputSchema}` wire
    /// shape for §4.I.2's request body, sorted by name for deterministic
    /// request bodies (useful for prompt caching upstream).
    pub fn client_tools_wire(&self) -> Vec<serde_json::Value> {
        let mut tools: Vec<&Tool> = self
            .tools
            .values()
            .filter(|t| t.location == super::Location::Client && t.available)
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools.into_iter().map(|t| t.to_wire()).collect()
    }
}

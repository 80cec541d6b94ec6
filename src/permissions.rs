//! # Permission Store (component E)
//!
//! Per-tool persisted approval policy, with a pluggable backend. `session`
//! permissions never touch the backend — they live only in an in-memory
//! cache for the lifetime of the process, matching the teacher's treatment
//! of ephemeral vs. durable state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::now_millis;

/// Approval policy for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Ask,
    AllowAlways,
    DenyAlways,
    Session,
}

/// A stored decision for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPermission {
    pub tool_name: String,
    pub level: PermissionLevel,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<u64>,
}

impl ToolPermission {
    pub fn new(tool_name: impl Into<String>, level: PermissionLevel) -> Self {
        ToolPermission {
            tool_name: tool_name.into(),
            level,
            created_at: now_millis(),
            last_used_at: None,
        }
    }
}

/// Pluggable persistence for durable (`ask`/`allow_always`/`deny_always`)
/// permissions. `session`-level permissions never reach this trait (§4.E).
pub trait PermissionBackend: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<ToolPermission>>;
    fn set(&self, permission: ToolPermission) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
    fn get_all(&self) -> Result<Vec<ToolPermission>>;
    fn clear(&self) -> Result<()>;
}

/// In-memory backend — the default for `session`-only stores, and a
/// perfectly serviceable `durable`/`allow_always` backend for tests or
/// hosts that don't need cross-process persistence.
#[derive(Default)]
pub struct InMemoryBackend {
    data: RwLock<HashMap<String, ToolPermission>>,
}

impl PermissionBackend for InMemoryBackend {
    fn get(&self, name: &str) -> Result<Option<ToolPermission>> {
        Ok(self.data.read().unwrap().get(name).cloned())
    }

    fn set(&self, permission: ToolPermission) -> Result<()> {
        self.data
            .write()
            .unwrap()
            .insert(permission.tool_name.clone(), permission);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.data.write().unwrap().remove(name);
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<ToolPermission>> {
        Ok(self.data.read().unwrap().values().cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        self.data.write().unwrap().clear();
        Ok(())
    }
}

/// A backend that never stores anything — `get` always misses, `set`/
/// `remove`/`clear` are no-ops. Useful for hosts that want every tool to
/// always hit the approval gate (no persisted memory of past decisions).
#[derive(Default)]
pub struct NoopBackend;

impl PermissionBackend for NoopBackend {
    fn get(&self, _name: &str) -> Result<Option<ToolPermission>> {
        Ok(None)
    }
    fn set(&self, _permission: ToolPermission) -> Result<()> {
        Ok(())
    }
    fn remove(&self, _name: &str) -> Result<()> {
        Ok(())
    }
    fn get_all(&self) -> Result<Vec<ToolPermission>> {
        Ok(Vec::new())
    }
    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// The permission store the agent loop consults before dispatching a tool
/// call. Wraps a durable `PermissionBackend` plus an in-memory `session`
/// cache, implementing the precedence property P5: session cache beats the
/// persisted store, which beats the tool's own static policy.
pub struct PermissionStore {
    backend: Arc<dyn PermissionBackend>,
    session: RwLock<HashMap<String, ToolPermission>>,
}

impl PermissionStore {
    pub fn new(backend: Arc<dyn PermissionBackend>) -> Self {
        PermissionStore {
            backend,
            session: RwLock::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        PermissionStore::new(Arc::new(InMemoryBackend::default()))
    }

    /// Session cache first, then the durable backend. Returns `None` if
    /// neither has an opinion (caller falls back to the tool's static
    /// `needs_approval`).
    pub fn get(&self, name: &str) -> Result<Option<ToolPermission>> {
        if let Some(perm) = self.session.read().unwrap().get(name).cloned() {
            return Ok(Some(perm));
        }
        self.backend.get(name)
    }

    /// Store a decision. `Session` permissions go only into the in-memory
    /// cache; everything else is persisted via the backend.
    pub fn set(&self, permission: ToolPermission) -> Result<()> {
        match permission.level {
            PermissionLevel::Session => {
                self.session
                    .write()
                    .unwrap()
                    .insert(permission.tool_name.clone(), permission);
                Ok(())
            }
            _ => self.backend.set(permission),
        }
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        self.session.write().unwrap().remove(name);
        self.backend.remove(name)
    }

    pub fn get_all(&self) -> Result<Vec<ToolPermission>> {
        let mut all = self.backend.get_all()?;
        let session = self.session.read().unwrap();
        for perm in session.values() {
            if !all.iter().any(|p| p.tool_name == perm.tool_name) {
                all.push(perm.clone());
            }
        }
        Ok(all)
    }

    pub fn clear(&self) -> Result<()> {
        self.session.write().unwrap().clear();
        self.backend.clear()
    }

    /// Record that a permission was just used to auto-approve/deny a call
    /// (§4.E: "on successful use, update `lastUsedAt`").
    pub fn touch(&self, name: &str) -> Result<()> {
        if let Some(mut perm) = self.get(name)? {
            perm.last_used_at = Some(now_millis());
            self.set(perm)?;
        }
        Ok(())
    }
}

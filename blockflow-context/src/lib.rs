//! # Blockflow Context
//!
//! Hierarchical key/value state shared by every activity of a flow run.
//!
//! The tree has three levels:
//!
//! ```text
//! { flat flow keys...,
//!   "_activityBlocks": {
//!     "<blockId>": { flat block keys...,
//!       "_activities": {
//!         "<activityId>": { flat activity keys... } } } } }
//! ```
//!
//! Writes at activity scope propagate to block and flow scope unless
//! propagation is disabled. Reads at a narrower scope shadow broader ones;
//! `search` falls back outward.

mod keys;
mod remote;

pub use keys::*;
pub use remote::{InMemoryRemote, JsonDirRemote, RemoteContext};

use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors raised by the context store.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("key '{key}' not found at {scope}")]
    KeyNotFound { scope: String, key: String },

    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("remote context error: {0}")]
    Remote(String),

    #[error("malformed context document: {0}")]
    Malformed(String),
}

/// The level a context handle is focused on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Focus {
    Flow,
    Block,
    Activity,
}

/// Addresses one node of the context tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Flow,
    Block {
        block_id: String,
    },
    Activity {
        block_id: String,
        activity_id: String,
    },
}

impl Scope {
    pub fn flow() -> Self {
        Scope::Flow
    }

    pub fn block(block_id: impl Into<String>) -> Self {
        Scope::Block {
            block_id: block_id.into(),
        }
    }

    pub fn activity(
        block_id: impl Into<String>,
        activity_id: impl Into<String>,
    ) -> Self {
        Scope::Activity {
            block_id: block_id.into(),
            activity_id: activity_id.into(),
        }
    }

    pub fn focus(&self) -> Focus {
        match self {
            Scope::Flow => Focus::Flow,
            Scope::Block { .. } => Focus::Block,
            Scope::Activity { .. } => Focus::Activity,
        }
    }

    /// The next broader scope, `None` at flow level.
    pub fn parent(&self) -> Option<Scope> {
        match self {
            Scope::Flow => None,
            Scope::Block { .. } => Some(Scope::Flow),
            Scope::Activity { block_id, .. } => Some(Scope::block(block_id)),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Flow => write!(f, "flow"),
            Scope::Block { block_id } => write!(f, "block '{block_id}'"),
            Scope::Activity {
                block_id,
                activity_id,
            } => write!(f, "activity '{activity_id}' of block '{block_id}'"),
        }
    }
}

/// Three-level context tree plus an optional remote backend.
#[derive(Default)]
pub struct ContextStore {
    root: Map<String, Value>,
    flow_run_id: Option<String>,
    remote: Option<Arc<dyn RemoteContext>>,
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("flow_run_id", &self.flow_run_id)
            .field("root", &self.root)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

pub type SharedContext = Arc<Mutex<ContextStore>>;

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_flow_run_id(flow_run_id: impl Into<String>) -> Self {
        let mut store = Self::default();
        store.reset(flow_run_id);
        store
    }

    /// Wraps the store for sharing between the engine and activities.
    pub fn shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }

    /// Rebuilds a store from a JSON dump produced by [`ContextStore::to_value`].
    pub fn from_value(value: Value) -> Result<Self, ContextError> {
        let Value::Object(root) = value else {
            return Err(ContextError::Malformed(
                "context root must be an object".to_string(),
            ));
        };
        let flow_run_id = root
            .get(FLOW_RUN_ID_KEY)
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            root,
            flow_run_id,
            remote: None,
        })
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    pub fn flow_run_id(&self) -> Option<&str> {
        self.flow_run_id.as_deref()
    }

    /// Drops all state and starts a new flow run. The remote stays attached.
    pub fn reset(&mut self, flow_run_id: impl Into<String>) {
        let flow_run_id = flow_run_id.into();
        self.root = Map::new();
        self.root.insert(
            FLOW_RUN_ID_KEY.to_string(),
            Value::String(flow_run_id.clone()),
        );
        self.flow_run_id = Some(flow_run_id);
        tracing::debug!(flow_run_id = ?self.flow_run_id, "context reset");
    }

    pub fn attach_remote(&mut self, remote: Arc<dyn RemoteContext>) {
        self.remote = Some(remote);
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Merges with the remote copy: remote fills gaps, local wins on
    /// conflicts, then the merged tree is written back. No-op without a
    /// remote or a flow run id.
    pub fn sync_remote(&mut self) -> Result<(), ContextError> {
        let Some(remote) = self.remote.clone() else {
            return Ok(());
        };
        let Some(flow_run_id) = self.flow_run_id.clone() else {
            tracing::warn!("context has no flow run id, skipping remote sync");
            return Ok(());
        };

        if let Some(remote_root) = remote.load(&flow_run_id)? {
            let mut merged = remote_root;
            merge_into(&mut merged, &self.root);
            self.root = merged;
        }
        remote.store(&flow_run_id, &self.root)?;

        tracing::debug!(flow_run_id = %flow_run_id, "context synced with remote");
        Ok(())
    }

    pub fn has_block(&self, block_id: &str) -> bool {
        self.node(&Scope::block(block_id)).is_some()
    }

    pub fn block_ids(&self) -> Vec<String> {
        self.root
            .get(ACTIVITY_BLOCKS_KEY)
            .and_then(Value::as_object)
            .map(|blocks| blocks.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn activity_ids(&self, block_id: &str) -> Vec<String> {
        self.node(&Scope::block(block_id))
            .and_then(|block| block.get(ACTIVITIES_KEY))
            .and_then(Value::as_object)
            .map(|activities| activities.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Reads `key` at exactly `scope`.
    pub fn get(&self, scope: &Scope, key: &str) -> Result<&Value, ContextError> {
        self.node(scope)
            .and_then(|node| node.get(key))
            .ok_or_else(|| ContextError::KeyNotFound {
                scope: scope.to_string(),
                key: key.to_string(),
            })
    }

    pub fn get_or(&self, scope: &Scope, key: &str, default: Value) -> Value {
        self.get(scope, key).cloned().unwrap_or(default)
    }

    /// Reads `key` at `scope`, falling back to the broader scopes.
    pub fn search(&self, scope: &Scope, key: &str) -> Option<&Value> {
        let mut current = Some(scope.clone());
        while let Some(scope) = current {
            if let Some(value) = self.node(&scope).and_then(|node| node.get(key))
            {
                return Some(value);
            }
            current = scope.parent();
        }
        None
    }

    pub fn lookup(&self, scope: &Scope, key: &str, search: bool) -> Option<&Value> {
        if search {
            self.search(scope, key)
        } else {
            self.get(scope, key).ok()
        }
    }

    /// Writes a user key. With `propagate` the value is also written to
    /// every broader scope.
    pub fn set(
        &mut self,
        scope: &Scope,
        key: &str,
        value: Value,
        propagate: bool,
    ) -> Result<(), ContextError> {
        validate_user_key(key)?;
        tracing::trace!(%scope, key = %key, propagate, "set context value");

        let mut current = Some(scope.clone());
        while let Some(scope) = current {
            self.node_mut(&scope).insert(key.to_string(), value.clone());
            current = if propagate { scope.parent() } else { None };
        }
        Ok(())
    }

    pub fn set_on_flow(&mut self, key: &str, value: Value) -> Result<(), ContextError> {
        self.set(&Scope::Flow, key, value, false)
    }

    pub fn set_on_block(
        &mut self,
        block_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), ContextError> {
        self.set(&Scope::block(block_id), key, value, false)
    }

    pub fn set_on_activity(
        &mut self,
        block_id: &str,
        activity_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), ContextError> {
        self.set(&Scope::activity(block_id, activity_id), key, value, false)
    }

    pub fn set_propagating(
        &mut self,
        block_id: &str,
        activity_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), ContextError> {
        self.set(&Scope::activity(block_id, activity_id), key, value, true)
    }

    /// Writes framework metadata (`_status`, `_action`, ...). Never propagates.
    pub fn set_meta(
        &mut self,
        scope: &Scope,
        key: &str,
        value: Value,
    ) -> Result<(), ContextError> {
        validate_meta_key(key)?;
        self.node_mut(scope).insert(key.to_string(), value);
        Ok(())
    }

    pub fn meta(&self, scope: &Scope, key: &str) -> Option<&Value> {
        self.node(scope).and_then(|node| node.get(key))
    }

    /// The user keys stored at exactly `scope`, without metadata.
    pub fn user_values(&self, scope: &Scope) -> Map<String, Value> {
        self.node(scope)
            .map(|node| {
                node.iter()
                    .filter(|(key, _)| !is_meta(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drops the user keys stored at exactly `scope`, metadata stays.
    pub fn clear_user_values(&mut self, scope: &Scope) {
        if self.node(scope).is_none() {
            return;
        }
        self.node_mut(scope).retain(|key, _| is_meta(key));
    }

    /// Returns a handle focused on `scope`.
    pub fn view(&mut self, scope: Scope) -> ContextView<'_> {
        ContextView { store: self, scope }
    }

    fn node(&self, scope: &Scope) -> Option<&Map<String, Value>> {
        match scope {
            Scope::Flow => Some(&self.root),
            Scope::Block { block_id } => self
                .root
                .get(ACTIVITY_BLOCKS_KEY)?
                .as_object()?
                .get(block_id)?
                .as_object(),
            Scope::Activity {
                block_id,
                activity_id,
            } => self
                .node(&Scope::block(block_id))?
                .get(ACTIVITIES_KEY)?
                .as_object()?
                .get(activity_id)?
                .as_object(),
        }
    }

    fn node_mut(&mut self, scope: &Scope) -> &mut Map<String, Value> {
        match scope {
            Scope::Flow => &mut self.root,
            Scope::Block { block_id } => {
                let blocks = child_mut(&mut self.root, ACTIVITY_BLOCKS_KEY);
                child_mut(blocks, block_id)
            }
            Scope::Activity {
                block_id,
                activity_id,
            } => {
                let block = self.node_mut(&Scope::block(block_id.clone()));
                let activities = child_mut(block, ACTIVITIES_KEY);
                child_mut(activities, activity_id)
            }
        }
    }
}

fn child_mut<'a>(
    parent: &'a mut Map<String, Value>,
    key: &str,
) -> &'a mut Map<String, Value> {
    let entry = parent
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(map) => map,
        _ => unreachable!("entry was just replaced by an object"),
    }
}

/// Deep merge: values of `local` overwrite `target`, nested objects merge.
fn merge_into(target: &mut Map<String, Value>, local: &Map<String, Value>) {
    for (key, value) in local {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// A context handle with a fixed focus.
pub struct ContextView<'a> {
    store: &'a mut ContextStore,
    scope: Scope,
}

impl ContextView<'_> {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn focus(&self) -> Focus {
        self.scope.focus()
    }

    pub fn get(&self, key: &str) -> Result<&Value, ContextError> {
        self.store.get(&self.scope, key)
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.store.get_or(&self.scope, key, default)
    }

    pub fn search(&self, key: &str) -> Option<&Value> {
        self.store.search(&self.scope, key)
    }

    pub fn set(&mut self, key: &str, value: Value, propagate: bool) -> Result<(), ContextError> {
        self.store.set(&self.scope, key, value, propagate)
    }

    pub fn values(&self) -> Map<String, Value> {
        self.store.user_values(&self.scope)
    }
}

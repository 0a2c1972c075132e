use crate::data::ActivityData;
use crate::model::{matches_any, Group, Status, StatusMatcher};
use crate::property::PropertySet;
use async_trait::async_trait;
use blockflow_context::{ContextError, Scope, SharedContext};
use serde_json::Value;
use uuid::Uuid;

/// A unit of work with declared properties.
///
/// The engine builds a fresh instance per slot, binds config and inputs,
/// calls [`Activity::run`] and saves the outputs when the status it leaves
/// behind is `SUCCESS`.
#[async_trait]
pub trait Activity: PropertySet + Send {
    async fn run(&mut self, ctx: &mut ActivityContext) -> anyhow::Result<()>;
}

/// What a block callback is told about the activity that registered it.
#[derive(Debug, Clone)]
pub struct CallbackInfo {
    pub block_id: String,
    pub activity_id: String,
    pub activity_name: String,
    pub status: Status,
}

pub type CallbackFn = Box<dyn FnOnce(&CallbackInfo) -> anyhow::Result<()> + Send + Sync>;

/// Deferred work run once every slot of the block has finished.
pub struct BlockCallback {
    pub activity_id: String,
    pub run_on: Vec<StatusMatcher>,
    callback: CallbackFn,
}

impl std::fmt::Debug for BlockCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCallback")
            .field("activity_id", &self.activity_id)
            .field("run_on", &self.run_on)
            .finish()
    }
}

impl BlockCallback {
    pub fn new(activity_id: impl Into<String>, run_on: Vec<StatusMatcher>, callback: CallbackFn) -> Self {
        Self {
            activity_id: activity_id.into(),
            run_on,
            callback,
        }
    }

    /// An empty filter means the callback always runs.
    pub fn should_run(&self, status: Status) -> bool {
        self.run_on.is_empty() || matches_any(&self.run_on, status)
    }

    pub fn invoke(self, info: &CallbackInfo) -> anyhow::Result<()> {
        (self.callback)(info)
    }
}

/// Handle given to a running activity.
///
/// Must stay `Sync`: `read`/`write` hold `&self` across the context lock.
pub struct ActivityContext {
    block_id: String,
    activity_id: String,
    name: String,
    activity_type: String,
    group: Group,
    run_id: Uuid,
    status: Status,
    context: SharedContext,
    callbacks: Vec<BlockCallback>,
}

impl ActivityContext {
    pub fn new(data: &ActivityData, context: SharedContext) -> Self {
        Self {
            block_id: data.block_id.clone(),
            activity_id: data.id.clone(),
            name: data.name.clone(),
            activity_type: data.activity_type.clone(),
            group: data.group,
            run_id: data.run_id,
            status: Status::Unknown,
            context,
            callbacks: Vec::new(),
        }
    }

    pub fn block_id(&self) -> &str {
        &self.block_id
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn activity_type(&self) -> &str {
        &self.activity_type
    }

    pub fn group(&self) -> Group {
        self.group
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn scope(&self) -> Scope {
        Scope::activity(&self.block_id, &self.activity_id)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn shared_context(&self) -> &SharedContext {
        &self.context
    }

    /// Reads a key from the activity scope outward.
    pub async fn read(&self, key: &str) -> Option<Value> {
        let store = self.context.lock().await;
        store.search(&self.scope(), key).cloned()
    }

    /// Writes a key at activity scope, propagated to block and flow.
    pub async fn write(&self, key: &str, value: Value) -> Result<(), ContextError> {
        let mut store = self.context.lock().await;
        store.set_propagating(&self.block_id, &self.activity_id, key, value)
    }

    /// Registers work to run at the end of the block when the status of
    /// this activity matches `run_on`.
    pub fn add_callback<F>(&mut self, run_on: Vec<StatusMatcher>, callback: F)
    where
        F: FnOnce(&CallbackInfo) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.push(BlockCallback::new(
            self.activity_id.clone(),
            run_on,
            Box::new(callback),
        ));
    }

    pub fn take_callbacks(&mut self) -> Vec<BlockCallback> {
        std::mem::take(&mut self.callbacks)
    }
}

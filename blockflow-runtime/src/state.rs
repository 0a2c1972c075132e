//! 状态/事件总线
//!
//! 引擎按固定顺序经过一组命名状态，每个状态依次通知已注册的 listener。
//! 只有 `BOOTSTRAP` 阶段 listener 对状态数据的修改会被引擎读回。

use crate::params::InvocationParams;
use async_trait::async_trait;
use blockflow_context::SharedContext;
use blockflow_core::{ActivityData, ErrorKind, ErrorRegistry, Mode, Status};
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// 生命周期状态，按执行顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Bootstrap,
    Context,
    FrameworkStart,
    BeforeActivityBlock,
    SelectActivity,
    BeforeActivityPreprocess,
    AfterActivityRun,
    AfterActivityPostprocess,
    BeforeActivityBlockCallbacks,
    AfterActivityBlock,
    FrameworkEnd,
}

impl State {
    pub const ALL: [State; 11] = [
        State::Bootstrap,
        State::Context,
        State::FrameworkStart,
        State::BeforeActivityBlock,
        State::SelectActivity,
        State::BeforeActivityPreprocess,
        State::AfterActivityRun,
        State::AfterActivityPostprocess,
        State::BeforeActivityBlockCallbacks,
        State::AfterActivityBlock,
        State::FrameworkEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Bootstrap => "BOOTSTRAP",
            State::Context => "CONTEXT",
            State::FrameworkStart => "FRAMEWORK_START",
            State::BeforeActivityBlock => "BEFORE_ACTIVITY_BLOCK",
            State::SelectActivity => "SELECT_ACTIVITY",
            State::BeforeActivityPreprocess => "BEFORE_ACTIVITY_PREPROCESS",
            State::AfterActivityRun => "AFTER_ACTIVITY_RUN",
            State::AfterActivityPostprocess => "AFTER_ACTIVITY_POSTPROCESS",
            State::BeforeActivityBlockCallbacks => "BEFORE_ACTIVITY_BLOCK_CALLBACKS",
            State::AfterActivityBlock => "AFTER_ACTIVITY_BLOCK",
            State::FrameworkEnd => "FRAMEWORK_END",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 每次状态切换时交给 listener 的数据
#[derive(Debug, Clone)]
pub struct StateData {
    pub state: State,
    pub params: InvocationParams,
    pub mode: Option<Mode>,
    pub flow_id: Option<String>,
    pub flow_run_id: Option<String>,
    pub block_id: Option<String>,
    /// 当前 activity，仅在 activity 相关状态下存在
    pub activity: Option<ActivityData>,
    pub block_status: Option<Status>,
    pub custom_data: Option<Value>,
    pub context: Option<SharedContext>,
}

impl StateData {
    pub fn new(state: State, params: InvocationParams) -> Self {
        let custom_data = params.custom_data.clone();
        Self {
            state,
            params,
            mode: None,
            flow_id: None,
            flow_run_id: None,
            block_id: None,
            activity: None,
            block_status: None,
            custom_data,
            context: None,
        }
    }
}

/// Identity of one block run, used to build the state data of each
/// transition after bootstrap.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub params: InvocationParams,
    pub mode: Mode,
    pub flow_id: String,
    pub flow_run_id: String,
    pub block_id: String,
    pub context: SharedContext,
}

impl RunInfo {
    pub fn state_data(&self, state: State) -> StateData {
        StateData {
            state,
            params: self.params.clone(),
            mode: Some(self.mode),
            flow_id: Some(self.flow_id.clone()),
            flow_run_id: Some(self.flow_run_id.clone()),
            block_id: Some(self.block_id.clone()),
            activity: None,
            block_status: None,
            custom_data: self.params.custom_data.clone(),
            context: Some(self.context.clone()),
        }
    }

    pub fn activity_data(&self, state: State, activity: &ActivityData) -> StateData {
        let mut data = self.state_data(state);
        data.activity = Some(activity.clone());
        data
    }

    pub fn block_data(&self, state: State, status: Status) -> StateData {
        let mut data = self.state_data(state);
        data.block_status = Some(status);
        data
    }
}

/// 生命周期监听器，按需覆盖各状态的钩子
#[async_trait]
pub trait Listener: Send + Sync {
    fn name(&self) -> &str;

    /// 失败时是否中止整个运行
    fn fatal(&self) -> bool {
        false
    }

    async fn on_bootstrap(&self, _data: &mut StateData) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_context(&self, _data: &mut StateData) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_framework_start(&self, _data: &mut StateData) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_before_activity_block(&self, _data: &mut StateData) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_select_activity(&self, _data: &mut StateData) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_before_activity_preprocess(&self, _data: &mut StateData) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_after_activity_run(&self, _data: &mut StateData) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_after_activity_postprocess(&self, _data: &mut StateData) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_before_activity_block_callbacks(
        &self,
        _data: &mut StateData,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_after_activity_block(&self, _data: &mut StateData) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_framework_end(&self, _data: &mut StateData) -> anyhow::Result<()> {
        Ok(())
    }

    /// Dispatches to the hook of `data.state`.
    async fn handle(&self, data: &mut StateData) -> anyhow::Result<()> {
        match data.state {
            State::Bootstrap => self.on_bootstrap(data).await,
            State::Context => self.on_context(data).await,
            State::FrameworkStart => self.on_framework_start(data).await,
            State::BeforeActivityBlock => self.on_before_activity_block(data).await,
            State::SelectActivity => self.on_select_activity(data).await,
            State::BeforeActivityPreprocess => self.on_before_activity_preprocess(data).await,
            State::AfterActivityRun => self.on_after_activity_run(data).await,
            State::AfterActivityPostprocess => self.on_after_activity_postprocess(data).await,
            State::BeforeActivityBlockCallbacks => {
                self.on_before_activity_block_callbacks(data).await
            }
            State::AfterActivityBlock => self.on_after_activity_block(data).await,
            State::FrameworkEnd => self.on_framework_end(data).await,
        }
    }
}

/// 有序的 listener 列表
#[derive(Clone, Default)]
pub struct StateBus {
    listeners: Vec<Arc<dyn Listener>>,
}

impl fmt::Debug for StateBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl StateBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn Listener>) {
        tracing::debug!(listener = %listener.name(), "listener registered");
        self.listeners.push(listener);
    }

    pub fn names(&self) -> Vec<&str> {
        self.listeners.iter().map(|l| l.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Notifies every listener in registration order.
    ///
    /// Listeners work on `data` directly during `BOOTSTRAP`. For every other
    /// state they get a scratch copy and their edits are dropped. Failures
    /// are registered as `EXTENSION` errors; a fatal listener latches abort.
    pub async fn emit(&self, data: &mut StateData, errors: &mut ErrorRegistry) {
        if self.listeners.is_empty() {
            return;
        }
        tracing::trace!(state = %data.state, listeners = self.listeners.len(), "emit state");

        let mut scratch;
        let target = if data.state == State::Bootstrap {
            data
        } else {
            scratch = data.clone();
            &mut scratch
        };

        for listener in &self.listeners {
            let outcome = AssertUnwindSafe(listener.handle(target))
                .catch_unwind()
                .await;
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(panic) => format!("panicked: {}", panic_message(&*panic)),
            };
            let message = format!(
                "listener '{}' failed in {}: {failure}",
                listener.name(),
                target.state
            );
            let activity_id = target.activity.as_ref().map(|a| a.id.clone());
            if listener.fatal() {
                errors.register_fatal(ErrorKind::Extension, activity_id.as_deref(), message);
            } else {
                errors.register(ErrorKind::Extension, activity_id.as_deref(), message);
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! # Blockflow Runtime - 引擎
//!
//! 一次调用的完整流程：BOOTSTRAP、加载配置与模块、准备上下文、执行 block、
//! 持久化与汇总

use crate::executor::BlockExecutor;
use crate::params::InvocationParams;
use crate::persist;
use crate::runner::ActivityRunner;
use crate::state::{Listener, RunInfo, State, StateBus, StateData};
use blockflow_context::{
    validate_input_key, ContextStore, JsonDirRemote, RemoteContext, Scope, SharedContext,
    STATUS_KEY,
};
use blockflow_core::{
    Activity, ActivityData, ActivityModule, ActivityRegistry, BlockPlan, ErrorKind, ErrorRegistry,
    Mode, ModuleCatalog, RegisteredError, Status,
};
use blockflow_logger::Logger;
use blockflow_yaml::{ActivityConfig, ActivityGroup, BlockConfig, BlockPlanner, FlowConfiguration, FlowLoader};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// ACTIVITY 模式下合成的流程与 block 的默认 id
pub const ACTIVITY_FLOW_ID: &str = "activity";
pub const ACTIVITY_BLOCK_ID: &str = "activity";

/// 引擎配置
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// `context/` 与 `skip_with_outputs/` 所在目录
    pub output_dir: PathBuf,
    /// 运行结束后是否写出两个状态文件
    pub persist: bool,
    /// 以目录保存的远程上下文，跨进程重跑时需要
    pub context_dir: Option<PathBuf>,
    /// 运行结束时打印汇总
    pub print_summary: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            persist: true,
            context_dir: None,
            print_summary: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `BLOCKFLOW_OUTPUT_DIR`, `BLOCKFLOW_PERSIST`,
    /// `BLOCKFLOW_CONTEXT_DIR` and `BLOCKFLOW_PRINT_SUMMARY`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str, default: bool| {
            lookup(key).map_or(default, |value| {
                !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
            })
        };
        let defaults = Self::default();
        Self {
            output_dir: lookup("BLOCKFLOW_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            persist: flag("BLOCKFLOW_PERSIST", defaults.persist),
            context_dir: lookup("BLOCKFLOW_CONTEXT_DIR").map(PathBuf::from),
            print_summary: flag("BLOCKFLOW_PRINT_SUMMARY", defaults.print_summary),
        }
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn context_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.context_dir = Some(dir.into());
        self
    }

    pub fn print_summary(mut self, print: bool) -> Self {
        self.print_summary = print;
        self
    }
}

pub type ListenerFactory = Arc<dyn Fn() -> Arc<dyn Listener> + Send + Sync>;

/// Listener factories by the name used under `extensions` and
/// `additional-extensions`.
#[derive(Default, Clone)]
pub struct ExtensionCatalog {
    factories: BTreeMap<String, ListenerFactory>,
}

impl fmt::Debug for ExtensionCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl ExtensionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Listener> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Registers a fresh listener per name; unknown names are recorded as
    /// non-fatal `EXTENSION` errors.
    pub fn load(&self, names: &[String], bus: &mut StateBus, errors: &mut ErrorRegistry) {
        for name in names {
            match self.factories.get(name) {
                Some(factory) => bus.register(factory()),
                None => {
                    errors.register(ErrorKind::Extension, None, format!("unknown extension '{name}'"));
                }
            }
        }
    }
}

/// 一次调用的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRunReport {
    pub flow_id: Option<String>,
    pub flow_run_id: String,
    pub block_id: Option<String>,
    pub mode: Mode,
    pub status: Status,
    pub activities: Vec<ActivityData>,
    pub errors: Vec<RegisteredError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_with_outputs_file: Option<PathBuf>,
}

impl BlockRunReport {
    pub fn activity(&self, activity_id: &str) -> Option<&ActivityData> {
        self.activities.iter().find(|a| a.id == activity_id)
    }

    pub fn activity_by_name(&self, name: &str) -> Option<&ActivityData> {
        self.activities.iter().find(|a| a.name == name)
    }

    pub fn has_error(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// A setup step that failed before the block could run normally.
struct SetupError {
    kind: ErrorKind,
    message: String,
}

impl SetupError {
    fn new(kind: ErrorKind, message: impl fmt::Display) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }

    fn register(self, errors: &mut ErrorRegistry) {
        errors.register_fatal(self.kind, None, self.message);
    }
}

struct Prepared {
    flow: FlowConfiguration,
    block_id: String,
    plan: BlockPlan,
}

/// 执行引擎：持有注册表、模块与扩展目录、监听器以及跨调用保留的上下文
pub struct Engine {
    registry: ActivityRegistry,
    modules: ModuleCatalog,
    extensions: ExtensionCatalog,
    bus: StateBus,
    flow: Option<FlowConfiguration>,
    context: SharedContext,
    config: EngineConfig,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("modules", &self.modules)
            .field("extensions", &self.extensions)
            .field("listeners", &self.bus)
            .field("config", &self.config)
            .finish()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ActivityRegistry {
        &self.registry
    }

    /// The context kept between invocations.
    pub fn context(&self) -> SharedContext {
        self.context.clone()
    }

    /// Reads one key stored at exactly the activity scope.
    pub async fn output(&self, block_id: &str, activity_id: &str, key: &str) -> Option<Value> {
        let store = self.context.lock().await;
        store
            .get(&Scope::activity(block_id, activity_id), key)
            .ok()
            .cloned()
    }

    /// Executes one invocation.
    ///
    /// Failures of the run itself are reported through the returned status
    /// and error list; `Err` is reserved for problems outside the block.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn run(&self, params: InvocationParams) -> anyhow::Result<BlockRunReport> {
        let mut errors = ErrorRegistry::new();
        let mut bus = self.bus.clone();
        self.extensions
            .load(&params.additional_extensions, &mut bus, &mut errors);

        let mut boot = StateData::new(State::Bootstrap, params);
        boot.context = Some(self.context.clone());
        bus.emit(&mut boot, &mut errors).await;
        let params = boot.params;
        let mode = params.mode();
        tracing::info!(mode = %mode, "invocation mode derived");

        let mut registry = self.registry.clone();
        let prepared = match self.prepare(&params, mode, &mut registry, &mut bus, &mut errors) {
            Ok(prepared) => prepared,
            Err(err) => {
                err.register(&mut errors);
                return Ok(self.abandon(params, mode, &bus, errors).await);
            }
        };
        let Prepared {
            flow,
            block_id,
            plan,
        } = prepared;

        let flow_run_id = self.prepare_context(&params, mode, &mut errors).await;
        if let Err(err) = self.check_context(&params, mode, &block_id).await {
            err.register(&mut errors);
        }
        let special_activity_id = match resolve_special_activity(&params, mode, &plan) {
            Ok(id) => id,
            Err(err) => {
                err.register(&mut errors);
                None
            }
        };
        if mode == Mode::Activity {
            if let Err(err) = self.write_activity_input(&params, &block_id).await {
                err.register(&mut errors);
            }
        }

        let info = RunInfo {
            params,
            mode,
            flow_id: flow.flow_id.clone(),
            flow_run_id: flow_run_id.clone(),
            block_id: block_id.clone(),
            context: self.context.clone(),
        };
        bus.emit(&mut info.state_data(State::Context), &mut errors).await;
        bus.emit(&mut info.state_data(State::FrameworkStart), &mut errors)
            .await;

        let runner = ActivityRunner::new(&registry, &bus, &info);
        let executor = BlockExecutor::new(runner).with_special_activity(special_activity_id);
        let state = executor.execute(&plan, &mut errors).await;

        let mut status = state.status;
        if errors.is_aborted() && status != Status::Fail {
            status = Status::Aborted;
        }
        {
            let mut store = self.context.lock().await;
            if let Err(err) = store.set_meta(&Scope::block(&block_id), STATUS_KEY, Value::from(status.as_str())) {
                errors.register(ErrorKind::Internal, None, err.to_string());
            }
        }

        let (context_file, skip_with_outputs_file) = if self.config.persist {
            self.persist(&flow, &block_id, mode, status, &state, &mut errors)
                .await
        } else {
            (None, None)
        };

        if let Err(err) = self.context.lock().await.sync_remote() {
            errors.register(ErrorKind::TearDown, None, format!("remote context sync failed: {err}"));
        }

        bus.emit(&mut info.block_data(State::FrameworkEnd, status), &mut errors)
            .await;

        let report = BlockRunReport {
            flow_id: Some(flow.flow_id),
            flow_run_id,
            block_id: Some(block_id),
            mode,
            status,
            activities: state.activities().to_vec(),
            errors: errors.errors().to_vec(),
            context_file,
            skip_with_outputs_file,
        };
        self.summarize(&report);
        Ok(report)
    }

    fn prepare(
        &self,
        params: &InvocationParams,
        mode: Mode,
        registry: &mut ActivityRegistry,
        bus: &mut StateBus,
        errors: &mut ErrorRegistry,
    ) -> Result<Prepared, SetupError> {
        let flow = self.resolve_flow(params, mode)?;

        for module in &flow.activity_modules {
            self.modules
                .load(module, registry)
                .map_err(|err| SetupError::new(ErrorKind::FlowConfiguration, err))?;
        }
        self.extensions.load(&flow.extensions, bus, errors);

        let block_id = flow
            .select_block(params.activity_block_id.as_deref())
            .map_err(|err| SetupError::new(ErrorKind::FlowConfiguration, err))?;
        let plan = BlockPlanner::new(&flow)
            .plan(&block_id)
            .map_err(|err| SetupError::new(ErrorKind::FlowConfiguration, err))?;

        tracing::info!(
            flow_id = %flow.flow_id,
            block_id = %block_id,
            activities = plan.len(),
            "activity block planned"
        );
        Ok(Prepared {
            flow,
            block_id,
            plan,
        })
    }

    fn resolve_flow(
        &self,
        params: &InvocationParams,
        mode: Mode,
    ) -> Result<FlowConfiguration, SetupError> {
        if mode == Mode::Activity {
            return synthesize_flow(params);
        }
        if let Some(url) = &params.flow_config_url {
            return FlowLoader::from_url(url)
                .map_err(|err| SetupError::new(ErrorKind::FlowConfiguration, format!("{err:#}")));
        }
        self.flow.clone().ok_or_else(|| {
            SetupError::new(
                ErrorKind::FlowConfiguration,
                "no flow configuration given, set flow-config-url",
            )
        })
    }

    /// Fresh context for new flow runs, the kept or remote one otherwise.
    async fn prepare_context(
        &self,
        params: &InvocationParams,
        mode: Mode,
        errors: &mut ErrorRegistry,
    ) -> String {
        let mut store = self.context.lock().await;
        match mode {
            Mode::ActivityBlockRerun => {
                let flow_run_id = params
                    .flow_run_id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                if store.flow_run_id() != Some(flow_run_id.as_str()) {
                    store.reset(flow_run_id);
                }
                if let Err(err) = store.sync_remote() {
                    errors.register(ErrorKind::SetUp, None, format!("remote context load failed: {err}"));
                }
            }
            Mode::ActivityInBlock => {
                if store.flow_run_id().is_none() {
                    store.reset(Uuid::new_v4().to_string());
                }
            }
            Mode::ActivityBlock | Mode::Activity => {
                let flow_run_id = params
                    .flow_run_id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                store.reset(flow_run_id);
            }
        }
        let flow_run_id = store.flow_run_id().unwrap_or_default().to_string();
        tracing::info!(flow_run_id = %flow_run_id, mode = %mode, "context prepared");
        flow_run_id
    }

    async fn check_context(
        &self,
        params: &InvocationParams,
        mode: Mode,
        block_id: &str,
    ) -> Result<(), SetupError> {
        if mode != Mode::ActivityBlockRerun {
            return Ok(());
        }
        if self.context.lock().await.has_block(block_id) {
            return Ok(());
        }
        Err(SetupError::new(
            ErrorKind::ActivityBlock,
            format!(
                "flow run '{}' has no record of activity block '{block_id}', nothing to rerun",
                params.flow_run_id.as_deref().unwrap_or_default()
            ),
        ))
    }

    async fn write_activity_input(
        &self,
        params: &InvocationParams,
        block_id: &str,
    ) -> Result<(), SetupError> {
        let input = match &params.activity_input {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::Object(input)) => input,
            Some(_) => {
                return Err(SetupError::new(
                    ErrorKind::ActivityInput,
                    "activity-input must be a JSON object",
                ))
            }
        };
        let mut store = self.context.lock().await;
        for (key, value) in input {
            validate_input_key(key).map_err(|err| SetupError::new(ErrorKind::ActivityInput, err))?;
            store
                .set_on_block(block_id, key, value.clone())
                .map_err(|err| SetupError::new(ErrorKind::ActivityInput, err))?;
        }
        Ok(())
    }

    async fn persist(
        &self,
        flow: &FlowConfiguration,
        block_id: &str,
        mode: Mode,
        status: Status,
        state: &blockflow_core::BlockState,
        errors: &mut ErrorRegistry,
    ) -> (Option<PathBuf>, Option<PathBuf>) {
        let store = self.context.lock().await;
        let dir = &self.config.output_dir;

        let context_file = persist::write_context(dir, mode, block_id, status, &store)
            .map_err(|err| {
                errors.register(ErrorKind::TearDown, None, format!("{err:#}"));
            })
            .ok();

        let outputs = persist::collect_outputs(&store, state);
        let skip_file = persist::write_skip_with_outputs(dir, flow, block_id, &outputs)
            .map_err(|err| {
                errors.register(ErrorKind::TearDown, None, format!("{err:#}"));
            })
            .ok();

        (context_file, skip_file)
    }

    /// Report for a run that never got as far as a block.
    async fn abandon(
        &self,
        params: InvocationParams,
        mode: Mode,
        bus: &StateBus,
        mut errors: ErrorRegistry,
    ) -> BlockRunReport {
        let flow_run_id = params
            .flow_run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut end = StateData::new(State::FrameworkEnd, params);
        end.mode = Some(mode);
        end.flow_run_id = Some(flow_run_id.clone());
        end.block_status = Some(Status::Aborted);
        end.context = Some(self.context.clone());
        bus.emit(&mut end, &mut errors).await;

        let report = BlockRunReport {
            flow_id: None,
            flow_run_id,
            block_id: None,
            mode,
            status: Status::Aborted,
            activities: Vec::new(),
            errors: errors.errors().to_vec(),
            context_file: None,
            skip_with_outputs_file: None,
        };
        self.summarize(&report);
        report
    }

    fn summarize(&self, report: &BlockRunReport) {
        if !self.config.print_summary {
            return;
        }
        let logger = Logger::with_trace_id(report.flow_run_id.clone());
        logger.log_block_summary(
            report.block_id.as_deref().unwrap_or("-"),
            report.status,
            &report.activities,
        );
        logger.log_activity_details(&report.activities);
        logger.log_error_summary(&report.errors);
    }
}

/// `activity-id` as given, or the id of the first activity named
/// `activity-name`.
fn resolve_special_activity(
    params: &InvocationParams,
    mode: Mode,
    plan: &BlockPlan,
) -> Result<Option<String>, SetupError> {
    if !matches!(mode, Mode::ActivityInBlock | Mode::ActivityBlockRerun) {
        return Ok(None);
    }
    if let Some(activity_id) = &params.activity_id {
        return match plan.find(activity_id) {
            Some(spec) => Ok(Some(spec.id.clone())),
            None => Err(SetupError::new(
                ErrorKind::ActivityBlock,
                format!("activity '{activity_id}' is not part of block '{}'", plan.block_id),
            )),
        };
    }
    if let Some(name) = &params.activity_name {
        return match plan.specs().find(|spec| &spec.name == name) {
            Some(spec) => Ok(Some(spec.id.clone())),
            None => Err(SetupError::new(
                ErrorKind::ActivityBlock,
                format!("no activity named '{name}' in block '{}'", plan.block_id),
            )),
        };
    }
    Ok(None)
}

/// One block with one main activity built from the invocation parameters.
fn synthesize_flow(params: &InvocationParams) -> Result<FlowConfiguration, SetupError> {
    let activity_type = params.activity_type.clone().ok_or_else(|| {
        SetupError::new(
            ErrorKind::FlowConfiguration,
            "activity-type is required when activity-module is given",
        )
    })?;

    let mut activity = ActivityConfig::new(activity_type);
    activity.name = params.activity_name.clone();
    match &params.activity_config {
        None | Some(Value::Null) => {}
        Some(Value::Object(configuration)) => activity.configuration = configuration.clone(),
        Some(_) => {
            return Err(SetupError::new(
                ErrorKind::FlowConfiguration,
                "activity-config must be a JSON object",
            ))
        }
    }

    let block = BlockConfig {
        activities: ActivityGroup::new(vec![activity]),
        ..BlockConfig::default()
    };
    let block_id = params
        .activity_block_id
        .clone()
        .unwrap_or_else(|| ACTIVITY_BLOCK_ID.to_string());

    let mut flow = FlowConfiguration::new(ACTIVITY_FLOW_ID);
    flow.activity_modules = params.activity_module.iter().cloned().collect();
    flow.activity_blocks.insert(block_id, block);
    Ok(flow)
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    registry: ActivityRegistry,
    modules: ModuleCatalog,
    extensions: ExtensionCatalog,
    bus: StateBus,
    flow: Option<FlowConfiguration>,
    config: EngineConfig,
    remote: Option<Arc<dyn RemoteContext>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a module available to `activityModules` / `activity-module`.
    pub fn module<M>(mut self, module: M) -> Self
    where
        M: ActivityModule + 'static,
    {
        self.modules.add(module);
        self
    }

    /// Registers an activity type directly, without a module.
    pub fn activity<T>(mut self, tag: impl Into<String>) -> Self
    where
        T: Activity + Default + 'static,
    {
        self.registry.register_default::<T>(tag);
        self
    }

    pub fn register<F>(mut self, tag: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn Activity> + Send + Sync + 'static,
    {
        self.registry.register(tag, constructor);
        self
    }

    pub fn extension<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Listener> + Send + Sync + 'static,
    {
        self.extensions.add(name, factory);
        self
    }

    /// A listener active for every invocation.
    pub fn listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.bus.register(listener);
        self
    }

    /// Flow used when the invocation has no `flow-config-url`.
    pub fn flow(mut self, flow: FlowConfiguration) -> Self {
        self.flow = Some(flow);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteContext>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn build(self) -> Engine {
        let mut store = ContextStore::new();
        let remote = self.remote.or_else(|| {
            self.config
                .context_dir
                .clone()
                .map(|dir| Arc::new(JsonDirRemote::new(dir)) as Arc<dyn RemoteContext>)
        });
        if let Some(remote) = remote {
            store.attach_remote(remote);
        }

        Engine {
            registry: self.registry,
            modules: self.modules,
            extensions: self.extensions,
            bus: self.bus,
            flow: self.flow,
            context: store.shared(),
            config: self.config,
        }
    }
}

//! # Blockflow Runtime - activity 执行器
//!
//! 负责单个 activity 的完整生命周期：创建、绑定、执行、状态调整与输出保存

use crate::placeholders::{ExceptionActivity, ReuseActivity, SkipWithOutputsActivity};
use crate::state::{panic_message, RunInfo, State, StateBus, StateData};
use blockflow_context::{Scope, ACTION_KEY, RUN_ID_KEY, STATUS_KEY, TYPE_KEY};
use blockflow_core::{
    Action, Activity, ActivityContext, ActivityData, ActivityRegistry, ActivitySpec, BindError,
    BlockCallback, ErrorKind, ErrorRegistry, PropertyBinder, Status,
};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::panic::AssertUnwindSafe;

/// 单个 activity 执行的结果
#[derive(Debug)]
pub struct SlotOutcome {
    pub data: ActivityData,
    pub callbacks: Vec<BlockCallback>,
}

/// Runs one activity slot end to end.
pub struct ActivityRunner<'a> {
    registry: &'a ActivityRegistry,
    bus: &'a StateBus,
    info: &'a RunInfo,
}

impl<'a> ActivityRunner<'a> {
    pub fn new(registry: &'a ActivityRegistry, bus: &'a StateBus, info: &'a RunInfo) -> Self {
        Self {
            registry,
            bus,
            info,
        }
    }

    pub fn info(&self) -> &RunInfo {
        self.info
    }

    pub(crate) async fn emit(&self, state: State, data: &ActivityData, errors: &mut ErrorRegistry) {
        let mut state_data = self.info.activity_data(state, data);
        self.bus.emit(&mut state_data, errors).await;
    }

    pub(crate) async fn emit_state(&self, data: &mut StateData, errors: &mut ErrorRegistry) {
        self.bus.emit(data, errors).await;
    }

    /// 执行一个 activity，`data.action` 已由规则引擎决定
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(activity_id = %spec.id, action = %data.action)
    )]
    pub async fn run(
        &self,
        spec: &ActivitySpec,
        mut data: ActivityData,
        errors: &mut ErrorRegistry,
    ) -> SlotOutcome {
        self.emit(State::BeforeActivityPreprocess, &data, errors).await;

        let mut callbacks = Vec::new();
        if errors.is_aborted() {
            data.status = Status::Aborted;
            self.emit(State::AfterActivityRun, &data, errors).await;
            self.persist_meta(&data, errors).await;
        } else if data.action == Action::KeepAsIs {
            data.status = self.previous_status(&data).await.unwrap_or(Status::Unknown);
            self.emit(State::AfterActivityRun, &data, errors).await;
            // status and run id stay from the run that produced them
            self.write_meta(&data, &[(ACTION_KEY, Value::from(data.action.as_str()))], errors)
                .await;
        } else {
            callbacks = self.run_action(spec, &mut data, errors).await;
            self.persist_meta(&data, errors).await;
        }

        #[cfg(feature = "detailed-logging")]
        {
            tracing::info!(
                activity_id = %data.id,
                action = %data.action,
                status = %data.status,
                callbacks = callbacks.len(),
                "activity 执行完成"
            );
        }

        self.emit(State::AfterActivityPostprocess, &data, errors).await;
        SlotOutcome { data, callbacks }
    }

    async fn run_action(
        &self,
        spec: &ActivitySpec,
        data: &mut ActivityData,
        errors: &mut ErrorRegistry,
    ) -> Vec<BlockCallback> {
        let scope = Scope::activity(&data.block_id, &data.id);

        let mut activity: Box<dyn Activity> = match data.action {
            Action::Reuse => {
                let store = self.info.context.lock().await;
                let status = store
                    .meta(&scope, STATUS_KEY)
                    .and_then(Status::from_value)
                    .unwrap_or(Status::Success);
                Box::new(ReuseActivity {
                    outputs: store.user_values(&scope),
                    status,
                })
            }
            Action::SkipWithOutputValues => {
                let values = spec.skip_with_outputs_values.clone().unwrap_or_else(|| {
                    tracing::warn!(
                        activity_id = %data.id,
                        "skipWithOutputs is set without skipWithOutputsValues, nothing is written"
                    );
                    Map::new()
                });
                Box::new(SkipWithOutputsActivity { values })
            }
            _ => match self.registry.create(&data.activity_type) {
                Ok(activity) => activity,
                Err(err) => {
                    errors.register_fatal(ErrorKind::ActivityCreation, Some(&data.id), err.to_string());
                    Box::new(ExceptionActivity)
                }
            },
        };

        if data.action != Action::Reuse {
            // Earlier runs of the same activity id must not leak into this one.
            self.info.context.lock().await.clear_user_values(&scope);
        }

        let mut ctx = ActivityContext::new(data, self.info.context.clone());
        let binder = PropertyBinder::relaxed(data.action.is_skip());

        if errors.is_aborted() {
            data.status = Status::Error;
            self.emit(State::AfterActivityRun, data, errors).await;
            return Vec::new();
        }

        let bound = match self.bind(&mut *activity, &binder, data, &scope).await {
            Ok(()) => true,
            Err((kind, err)) if data.action.is_skip() => {
                tracing::debug!(activity_id = %data.id, kind = %kind, error = %err, "binding failed on a skipped activity");
                true
            }
            Err((kind, err)) => {
                register_bind_error(errors, kind, &data.id, &err);
                false
            }
        };

        let mut run_failed = !bound;
        if !bound {
            data.status = Status::Error;
        } else if data.action.is_skip() {
            data.status = Status::Skipped;
        } else {
            let outcome = AssertUnwindSafe(activity.run(&mut ctx)).catch_unwind().await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(format!("{err:#}")),
                Err(panic) => Some(format!("panicked: {}", panic_message(&*panic))),
            };
            data.status = ctx.status();
            if let Some(message) = failure {
                run_failed = true;
                errors.register(ErrorKind::ActivityRun, Some(&data.id), message);
                if data.status != Status::Fail {
                    data.status = Status::Error;
                }
            }
        }

        self.emit(State::AfterActivityRun, data, errors).await;

        if data.status == Status::Unknown {
            data.status = if run_failed {
                Status::Error
            } else {
                Status::Success
            };
        }

        if !run_failed && !data.action.is_skip() {
            let mut store = self.info.context.lock().await;
            if let Err(err) =
                binder.save_outputs(&*activity, data.status, &mut store, &data.block_id, &data.id)
            {
                drop(store);
                register_bind_error(errors, ErrorKind::ActivityOutput, &data.id, &err);
                data.status = Status::Error;
            }
        }

        ctx.take_callbacks()
    }

    async fn bind(
        &self,
        activity: &mut dyn Activity,
        binder: &PropertyBinder,
        data: &ActivityData,
        scope: &Scope,
    ) -> Result<(), (ErrorKind, BindError)> {
        binder
            .load_config(activity, &data.id, &data.configuration)
            .map_err(|err| (ErrorKind::ActivityConfiguration, err))?;
        let store = self.info.context.lock().await;
        binder
            .load_inputs(activity, &store, scope)
            .map_err(|err| (ErrorKind::ActivityInput, err))
    }

    async fn previous_status(&self, data: &ActivityData) -> Option<Status> {
        let store = self.info.context.lock().await;
        store
            .meta(&Scope::activity(&data.block_id, &data.id), STATUS_KEY)
            .and_then(Status::from_value)
    }

    async fn persist_meta(&self, data: &ActivityData, errors: &mut ErrorRegistry) {
        let meta = [
            (STATUS_KEY, Value::from(data.status.as_str())),
            (ACTION_KEY, Value::from(data.action.as_str())),
            (RUN_ID_KEY, Value::from(data.run_id.to_string())),
            (TYPE_KEY, Value::from(data.activity_type.as_str())),
        ];
        self.write_meta(data, &meta, errors).await;
    }

    async fn write_meta(&self, data: &ActivityData, meta: &[(&str, Value)], errors: &mut ErrorRegistry) {
        let scope = Scope::activity(&data.block_id, &data.id);
        let mut store = self.info.context.lock().await;
        let written = meta
            .iter()
            .try_for_each(|(key, value)| store.set_meta(&scope, key, value.clone()));
        if let Err(err) = written {
            drop(store);
            errors.register(ErrorKind::Internal, Some(&data.id), err.to_string());
        }
    }
}

/// Context errors mean a reserved or malformed key, which is a framework
/// problem and aborts the run.
fn register_bind_error(errors: &mut ErrorRegistry, kind: ErrorKind, activity_id: &str, err: &BindError) {
    if matches!(err, BindError::Context(_)) {
        errors.register_fatal(kind, Some(activity_id), err.to_string());
    } else {
        errors.register(kind, Some(activity_id), err.to_string());
    }
}

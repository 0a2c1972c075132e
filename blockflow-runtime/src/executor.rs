//! # Blockflow Runtime - block 执行器
//!
//! 按固定分组顺序遍历 block 中的每个 activity，向规则引擎请求动作，
//! 交给 [`ActivityRunner`] 执行并汇总 block 状态

use crate::runner::ActivityRunner;
use crate::state::State;
use blockflow_core::rules::{self, RuleInput};
use blockflow_core::{
    Action, ActivityData, ActivitySpec, BlockCallback, BlockPlan, BlockState, CallbackInfo,
    ErrorKind, ErrorRegistry, Mode,
};

/// 执行器对一个 block 的遍历状态
struct Traversal<'p> {
    state: BlockState,
    callbacks: Vec<BlockCallback>,
    special_activity_id: Option<&'p str>,
    special_reached: bool,
}

/// Drives one block through its five groups.
pub struct BlockExecutor<'a> {
    runner: ActivityRunner<'a>,
    special_activity_id: Option<String>,
}

impl<'a> BlockExecutor<'a> {
    pub fn new(runner: ActivityRunner<'a>) -> Self {
        Self {
            runner,
            special_activity_id: None,
        }
    }

    /// The activity targeted by `ACTIVITY_IN_BLOCK` and rerun modes.
    pub fn with_special_activity(mut self, activity_id: Option<String>) -> Self {
        self.special_activity_id = activity_id;
        self
    }

    fn mode(&self) -> Mode {
        self.runner.info().mode
    }

    /// 执行整个 block，返回最终的 block 状态与每个 activity 的记录
    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(block_id = %plan.block_id, mode = %self.mode(), activities = plan.len())
    )]
    pub async fn execute(&self, plan: &BlockPlan, errors: &mut ErrorRegistry) -> BlockState {
        let mut traversal = Traversal {
            state: BlockState::new(&plan.block_id),
            callbacks: Vec::new(),
            special_activity_id: self.special_activity_id.as_deref(),
            special_reached: false,
        };
        traversal.state.start();

        self.emit_block(State::BeforeActivityBlock, &traversal.state, errors)
            .await;

        for spec in &plan.before_block {
            self.cycle(spec, None, &mut traversal, errors).await;
        }

        for slot in &plan.mains {
            if traversal.special_activity_id == Some(slot.main.id.as_str()) {
                traversal.special_reached = true;
            }
            for before in &slot.before {
                self.cycle(before, Some(&slot.main), &mut traversal, errors)
                    .await;
            }
            self.cycle(&slot.main, None, &mut traversal, errors).await;
            for after in &slot.after {
                self.cycle(after, None, &mut traversal, errors).await;
            }
        }

        for spec in &plan.after_block {
            self.cycle(spec, None, &mut traversal, errors).await;
        }

        self.emit_block(State::BeforeActivityBlockCallbacks, &traversal.state, errors)
            .await;
        run_callbacks(&traversal.state, traversal.callbacks, errors);
        self.emit_block(State::AfterActivityBlock, &traversal.state, errors)
            .await;

        tracing::info!(
            block_id = %plan.block_id,
            status = %traversal.state.status,
            interrupted = traversal.state.interrupted,
            "activity block finished"
        );
        traversal.state
    }

    /// One per-activity cycle: select, run, fold the outcome into the block.
    async fn cycle(
        &self,
        spec: &ActivitySpec,
        main: Option<&ActivitySpec>,
        traversal: &mut Traversal<'_>,
        errors: &mut ErrorRegistry,
    ) {
        if traversal.special_activity_id == Some(spec.id.as_str()) {
            traversal.special_reached = true;
        }

        let mode = self.mode();
        let input = RuleInput {
            spec,
            main,
            state: &traversal.state,
            mode,
            special_activity_id: traversal.special_activity_id,
            special_reached: traversal.special_reached,
        };
        let action = match rules::action(&input) {
            Ok(action) => action,
            Err(err) => {
                errors.register_fatal(ErrorKind::FlowConfiguration, Some(&spec.id), err.to_string());
                Action::SkipByFramework
            }
        };
        tracing::debug!(activity_id = %spec.id, group = %spec.group, action = %action, "activity selected");

        let data = ActivityData::from_spec(spec, action);
        self.runner.emit(State::SelectActivity, &data, errors).await;

        let outcome = self.runner.run(spec, data, errors).await;
        let status = outcome.data.status;
        traversal.callbacks.extend(outcome.callbacks);

        let state = &mut traversal.state;
        state.push(outcome.data);
        let newly_interrupted =
            !state.interrupted && !rules::continue_on(spec, status, mode, action);
        state.status =
            rules::next_block_status(state.status, status, newly_interrupted, errors.is_aborted());
        if newly_interrupted {
            tracing::info!(activity_id = %spec.id, status = %status, "activity block interrupted");
            state.interrupted = true;
        }
    }

    async fn emit_block(&self, state: State, block: &BlockState, errors: &mut ErrorRegistry) {
        let mut data = self.runner.info().block_data(state, block.status);
        self.runner.emit_state(&mut data, errors).await;
    }
}

/// Invokes every callback whose filter matches the final status of the
/// activity that registered it. Failures never touch the block status.
fn run_callbacks(state: &BlockState, callbacks: Vec<BlockCallback>, errors: &mut ErrorRegistry) {
    for callback in callbacks {
        let Some(activity) = state.find(&callback.activity_id) else {
            continue;
        };
        if !callback.should_run(activity.status) {
            continue;
        }
        let info = CallbackInfo {
            block_id: activity.block_id.clone(),
            activity_id: activity.id.clone(),
            activity_name: activity.name.clone(),
            status: activity.status,
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback.invoke(&info)));
        let failure = match result {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => format!("{err:#}"),
            Err(panic) => format!("panicked: {}", crate::state::panic_message(&*panic)),
        };
        errors.register(
            ErrorKind::ActivityBlockCallback,
            Some(&info.activity_id),
            format!("block callback failed: {failure}"),
        );
    }
}

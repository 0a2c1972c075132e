//! Rule engine: decides the action of every activity slot and folds
//! activity outcomes into the block status.
//!
//! Everything here is a pure function of the plan, the block state and the
//! invocation mode.

use crate::data::BlockState;
use crate::model::{matches_any, Action, Group, Mode, Status, StatusMatcher};
use crate::plan::ActivitySpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// `activityStatus` name matching any preceding activity.
pub const ANY_ACTIVITY: &str = "_any";
/// `activityStatus` name for the immediately preceding activity.
pub const PREVIOUS_ACTIVITY: &str = "_previous";
/// `activityStatus` name for the latest activity that produced a result.
pub const LATEST_ACTIVITY: &str = "_latest";

/// Predicate tree gating whether an activity runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_status: Option<BTreeMap<String, Vec<StatusMatcher>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_activity_status: Option<Vec<StatusMatcher>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_block_status: Option<Vec<StatusMatcher>>,
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("activity '{activity}': {message}")]
    Config { activity: String, message: String },
}

/// Default `continueOn` list.
pub const DEFAULT_CONTINUE_ON: [StatusMatcher; 2] =
    [StatusMatcher::Success, StatusMatcher::Skipped];

/// Everything the rule engine looks at for one slot.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub spec: &'a ActivitySpec,
    /// The main activity a before-activity wrap precedes.
    pub main: Option<&'a ActivitySpec>,
    pub state: &'a BlockState,
    pub mode: Mode,
    pub special_activity_id: Option<&'a str>,
    /// Rerun only: whether the special activity has been reached.
    pub special_reached: bool,
}

/// The action table.
pub fn action(input: &RuleInput<'_>) -> Result<Action, RuleError> {
    let skip_with_outputs = input.spec.skip_with_outputs;
    let own_action = || {
        if skip_with_outputs {
            Ok(Action::SkipWithOutputValues)
        } else {
            base_action(input)
        }
    };

    match input.mode {
        Mode::Activity if skip_with_outputs => Ok(Action::SkipWithOutputValues),
        Mode::Activity => Ok(Action::Run),
        Mode::ActivityBlock => own_action(),
        Mode::ActivityInBlock => {
            if input.special_activity_id == Some(input.spec.id.as_str()) {
                own_action()
            } else {
                Ok(Action::KeepAsIs)
            }
        }
        Mode::ActivityBlockRerun => {
            if input.special_reached {
                own_action()
            } else {
                Ok(Action::Reuse)
            }
        }
    }
}

/// Most severe of the run-on, interrupt and necessity verdicts.
pub fn base_action(input: &RuleInput<'_>) -> Result<Action, RuleError> {
    let run_on = run_on_verdict(input.spec, input.state)?;
    let interrupt = interrupt_verdict(input.spec.group, input.state.interrupted);
    let necessity = necessity_verdict(input)?;
    Ok(run_on.most_severe(interrupt).most_severe(necessity))
}

pub fn run_on_verdict(spec: &ActivitySpec, state: &BlockState) -> Result<Action, RuleError> {
    let Some(run_on) = &spec.run_on else {
        return Ok(Action::Run);
    };

    if run_on.main_activity_status.is_some() && spec.group != Group::AfterActivity {
        return Err(RuleError::Config {
            activity: spec.id.clone(),
            message: format!(
                "runOn.mainActivityStatus is only allowed in afterActivity, not in {}",
                spec.group
            ),
        });
    }
    if run_on.activity_block_status.is_some() && spec.group != Group::AfterBlock {
        return Err(RuleError::Config {
            activity: spec.id.clone(),
            message: format!(
                "runOn.activityBlockStatus is only allowed in afterBlock, not in {}",
                spec.group
            ),
        });
    }

    if let Some(clauses) = &run_on.activity_status {
        for (name, allowed) in clauses {
            if !activity_clause(name, allowed, state) {
                tracing::debug!(activity_id = %spec.id, clause = %name, "runOn activityStatus not satisfied");
                return Ok(Action::SkipByConfiguration);
            }
        }
    }

    if let Some(allowed) = &run_on.main_activity_status {
        let status = spec
            .main_id
            .as_deref()
            .and_then(|id| state.find(id))
            .map_or(Status::Unknown, |main| main.status);
        if !matches_any(allowed, status) {
            return Ok(Action::SkipByConfiguration);
        }
    }

    if let Some(allowed) = &run_on.activity_block_status {
        if !matches_any(allowed, state.status) {
            return Ok(Action::SkipByConfiguration);
        }
    }

    Ok(Action::Run)
}

fn activity_clause(name: &str, allowed: &[StatusMatcher], state: &BlockState) -> bool {
    let referent = match name {
        ANY_ACTIVITY => {
            return if state.activities().is_empty() {
                matches_any(allowed, Status::Unknown)
            } else {
                state
                    .activities()
                    .iter()
                    .any(|a| matches_any(allowed, a.status))
            };
        }
        PREVIOUS_ACTIVITY => state.previous(),
        LATEST_ACTIVITY => state.latest_producing(),
        name => state.by_name(name),
    };
    matches_any(allowed, referent.map_or(Status::Unknown, |a| a.status))
}

pub fn interrupt_verdict(group: Group, interrupted: bool) -> Action {
    if interrupted && group.skipped_when_interrupted() {
        Action::SkipByFramework
    } else {
        Action::Run
    }
}

pub fn necessity_verdict(input: &RuleInput<'_>) -> Result<Action, RuleError> {
    let state = input.state;
    let skipped = match input.spec.group {
        Group::BeforeActivity => match input.main {
            Some(main) => run_on_verdict(main, state)? == Action::SkipByConfiguration,
            None => false,
        },
        Group::AfterActivity => {
            let Some(main_id) = input.spec.main_id.as_deref() else {
                return Ok(Action::Run);
            };
            let main_skipped = state
                .find(main_id)
                .is_some_and(|main| main.action == Action::SkipByFramework);
            main_skipped
                && state
                    .befores_of(main_id)
                    .all(|before| before.action == Action::SkipByFramework)
        }
        Group::AfterBlock => {
            let mut befores = state.group(Group::BeforeBlock).peekable();
            befores.peek().is_some()
                && befores.all(|before| before.action == Action::SkipByFramework)
        }
        Group::BeforeBlock | Group::MainActivity => false,
    };
    Ok(if skipped {
        Action::SkipByFramework
    } else {
        Action::Run
    })
}

/// Folds one activity outcome into the block status.
pub fn next_block_status(
    current: Status,
    activity_status: Status,
    newly_interrupted: bool,
    aborted: bool,
) -> Status {
    let current = match current {
        Status::Unknown => Status::Success,
        other => other,
    };
    if current == Status::Fail {
        return Status::Fail;
    }
    if aborted {
        return Status::Aborted;
    }

    match (current, activity_status) {
        (_, Status::Fail) => Status::Fail,
        (Status::Error, _) => Status::Error,
        (_, Status::Error) => Status::Error,
        (Status::Success, Status::Skipped | Status::Aborted) if newly_interrupted => {
            activity_status
        }
        (current, _) => current,
    }
}

/// Whether the block may continue after this activity.
pub fn continue_on(spec: &ActivitySpec, status: Status, mode: Mode, action: Action) -> bool {
    if mode == Mode::ActivityInBlock && action == Action::KeepAsIs && status == Status::Unknown {
        return true;
    }
    match &spec.continue_on {
        Some(allowed) => matches_any(allowed, status),
        None => matches_any(&DEFAULT_CONTINUE_ON, status),
    }
}

//! The resolved execution plan of one activity block.

use crate::model::{Group, StatusMatcher};
use crate::rules::RunOn;
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

/// Id of a main activity or of a block-level wrap: `{blockId}-{name}`.
pub fn block_activity_id(block_id: &str, name: &str) -> String {
    format!("{block_id}-{name}")
}

/// Id of an activity-level wrap: `{blockId}-{mainName}-{name}`.
pub fn wrap_activity_id(block_id: &str, main_name: &str, name: &str) -> String {
    format!("{block_id}-{main_name}-{name}")
}

/// Name given to an unnamed main activity, 1-indexed.
pub fn default_main_name(index: usize) -> String {
    format!("activity{}", index + 1)
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("block '{block_id}': duplicate activity id '{activity_id}'")]
    DuplicateId {
        block_id: String,
        activity_id: String,
    },
}

/// Configuration of one activity slot with its id and group resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySpec {
    pub id: String,
    pub name: String,
    pub activity_type: String,
    pub group: Group,
    pub block_id: String,
    /// Id of the main activity a before/after activity wrap belongs to.
    pub main_id: Option<String>,
    pub main_name: Option<String>,
    /// Merged flow, block and activity configuration.
    pub configuration: Map<String, Value>,
    pub run_on: Option<RunOn>,
    pub continue_on: Option<Vec<StatusMatcher>>,
    pub skip_with_outputs: bool,
    pub skip_with_outputs_values: Option<Map<String, Value>>,
}

impl ActivitySpec {
    pub fn new(
        block_id: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
        activity_type: impl Into<String>,
        group: Group,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            activity_type: activity_type.into(),
            group,
            block_id: block_id.into(),
            main_id: None,
            main_name: None,
            configuration: Map::new(),
            run_on: None,
            continue_on: None,
            skip_with_outputs: false,
            skip_with_outputs_values: None,
        }
    }

    pub fn with_main(mut self, main_id: impl Into<String>, main_name: impl Into<String>) -> Self {
        self.main_id = Some(main_id.into());
        self.main_name = Some(main_name.into());
        self
    }

    pub fn with_configuration(mut self, configuration: Map<String, Value>) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn with_run_on(mut self, run_on: RunOn) -> Self {
        self.run_on = Some(run_on);
        self
    }

    pub fn with_continue_on(mut self, continue_on: Vec<StatusMatcher>) -> Self {
        self.continue_on = Some(continue_on);
        self
    }

    pub fn with_skip_with_outputs(mut self, values: Option<Map<String, Value>>) -> Self {
        self.skip_with_outputs = true;
        self.skip_with_outputs_values = values;
        self
    }
}

/// A main activity with its activity-level wraps.
#[derive(Debug, Clone, PartialEq)]
pub struct MainSlot {
    pub before: Vec<ActivitySpec>,
    pub main: ActivitySpec,
    pub after: Vec<ActivitySpec>,
}

impl MainSlot {
    pub fn new(main: ActivitySpec) -> Self {
        Self {
            before: Vec::new(),
            main,
            after: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockPlan {
    pub block_id: String,
    pub before_block: Vec<ActivitySpec>,
    pub mains: Vec<MainSlot>,
    pub after_block: Vec<ActivitySpec>,
}

impl BlockPlan {
    pub fn new(block_id: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            before_block: Vec::new(),
            mains: Vec::new(),
            after_block: Vec::new(),
        }
    }

    /// All slots in execution order.
    pub fn specs(&self) -> impl Iterator<Item = &ActivitySpec> {
        self.before_block
            .iter()
            .chain(
                self.mains
                    .iter()
                    .flat_map(|slot| {
                        slot.before
                            .iter()
                            .chain(std::iter::once(&slot.main))
                            .chain(slot.after.iter())
                    }),
            )
            .chain(self.after_block.iter())
    }

    pub fn len(&self) -> usize {
        self.specs().count()
    }

    pub fn is_empty(&self) -> bool {
        self.before_block.is_empty() && self.mains.is_empty() && self.after_block.is_empty()
    }

    pub fn find(&self, activity_id: &str) -> Option<&ActivitySpec> {
        self.specs().find(|spec| spec.id == activity_id)
    }

    pub fn find_mut(&mut self, activity_id: &str) -> Option<&mut ActivitySpec> {
        self.before_block
            .iter_mut()
            .chain(self.mains.iter_mut().flat_map(|slot| {
                slot.before
                    .iter_mut()
                    .chain(std::iter::once(&mut slot.main))
                    .chain(slot.after.iter_mut())
            }))
            .chain(self.after_block.iter_mut())
            .find(|spec| spec.id == activity_id)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        let mut seen = HashSet::new();
        for spec in self.specs() {
            if !seen.insert(spec.id.as_str()) {
                return Err(PlanError::DuplicateId {
                    block_id: self.block_id.clone(),
                    activity_id: spec.id.clone(),
                });
            }
        }
        Ok(())
    }
}

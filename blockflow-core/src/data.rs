use crate::model::{Action, Group, Status};
use crate::plan::ActivitySpec;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Runtime record of one activity slot within a block execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityData {
    pub id: String,
    pub run_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub group: Group,
    pub block_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_id: Option<String>,
    pub status: Status,
    pub action: Action,
    #[serde(skip)]
    pub configuration: Map<String, Value>,
}

impl ActivityData {
    /// Starts a record for `spec` with a fresh run id.
    pub fn from_spec(spec: &ActivitySpec, action: Action) -> Self {
        Self {
            id: spec.id.clone(),
            run_id: Uuid::new_v4(),
            name: spec.name.clone(),
            activity_type: spec.activity_type.clone(),
            group: spec.group,
            block_id: spec.block_id.clone(),
            main_id: spec.main_id.clone(),
            status: Status::Unknown,
            action,
            configuration: spec.configuration.clone(),
        }
    }
}

/// Status of a block execution and the activities seen so far.
#[derive(Debug, Clone)]
pub struct BlockState {
    pub block_id: String,
    pub status: Status,
    pub interrupted: bool,
    activities: Vec<ActivityData>,
    by_name: HashMap<String, usize>,
}

impl BlockState {
    pub fn new(block_id: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            status: Status::Unknown,
            interrupted: false,
            activities: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// A block that starts executing is SUCCESS until something else happens.
    pub fn start(&mut self) {
        if self.status == Status::Unknown {
            self.status = Status::Success;
        }
    }

    pub fn push(&mut self, data: ActivityData) {
        self.by_name.insert(data.name.clone(), self.activities.len());
        self.activities.push(data);
    }

    pub fn activities(&self) -> &[ActivityData] {
        &self.activities
    }

    pub fn group(&self, group: Group) -> impl Iterator<Item = &ActivityData> {
        self.activities.iter().filter(move |a| a.group == group)
    }

    /// Most recent activity with the given name.
    pub fn by_name(&self, name: &str) -> Option<&ActivityData> {
        self.by_name.get(name).map(|&i| &self.activities[i])
    }

    pub fn find(&self, activity_id: &str) -> Option<&ActivityData> {
        self.activities.iter().rev().find(|a| a.id == activity_id)
    }

    pub fn previous(&self) -> Option<&ActivityData> {
        self.activities.last()
    }

    /// Most recent activity that produced a result of its own.
    pub fn latest_producing(&self) -> Option<&ActivityData> {
        self.activities
            .iter()
            .rev()
            .find(|a| a.action.produces_result())
    }

    /// Before-activity wraps recorded for a main activity.
    pub fn befores_of<'a>(
        &'a self,
        main_id: &'a str,
    ) -> impl Iterator<Item = &'a ActivityData> {
        self.activities.iter().filter(move |a| {
            a.group == Group::BeforeActivity && a.main_id.as_deref() == Some(main_id)
        })
    }
}

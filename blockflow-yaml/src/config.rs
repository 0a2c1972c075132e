use blockflow_core::{PlanError, RunOn, StatusMatcher};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// 流程配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("flow '{0}' defines no activity blocks")]
    NoBlocks(String),

    #[error("activity block '{0}' is not defined in the flow configuration")]
    UnknownBlock(String),

    #[error("flow defines several activity blocks ({0}), an activity block id is required")]
    AmbiguousBlock(String),

    #[error("block '{block_id}': {group} activity #{index} has an empty type")]
    EmptyType {
        block_id: String,
        group: &'static str,
        index: usize,
    },

    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// 完整的流程配置文档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowConfiguration {
    #[serde(default)]
    pub flow_id: String,
    /// 所有 block 共享的默认配置
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub configuration: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activity_modules: Vec<String>,
    #[serde(default)]
    pub activity_blocks: BTreeMap<String, BlockConfig>,
}

impl FlowConfiguration {
    pub fn new(flow_id: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            ..Self::default()
        }
    }

    /// 选择要执行的 block：显式指定，或唯一的 block
    pub fn select_block(&self, block_id: Option<&str>) -> Result<String, ConfigError> {
        if let Some(block_id) = block_id {
            return if self.activity_blocks.contains_key(block_id) {
                Ok(block_id.to_string())
            } else {
                Err(ConfigError::UnknownBlock(block_id.to_string()))
            };
        }
        let mut ids = self.activity_blocks.keys();
        match (ids.next(), ids.next()) {
            (Some(only), None) => Ok(only.clone()),
            (None, _) => Err(ConfigError::NoBlocks(self.flow_id.clone())),
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousBlock(
                self.activity_blocks
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
        }
    }
}

/// 单个 activity block 的配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockConfig {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub configuration: Map<String, Value>,
    #[serde(default, skip_serializing_if = "ActivityGroup::is_empty")]
    pub before_block: ActivityGroup,
    #[serde(default, skip_serializing_if = "ActivityGroup::is_empty")]
    pub before_activity: ActivityGroup,
    /// 主 activity 列表
    #[serde(default)]
    pub activities: ActivityGroup,
    #[serde(default, skip_serializing_if = "ActivityGroup::is_empty")]
    pub after_activity: ActivityGroup,
    #[serde(default, skip_serializing_if = "ActivityGroup::is_empty")]
    pub after_block: ActivityGroup,
    /// 资源提示，引擎不使用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<Value>,
}

/// 一个 activity 分组，接受 `{activities: [...]}` 或直接的列表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "GroupRepr")]
pub struct ActivityGroup {
    pub activities: Vec<ActivityConfig>,
}

impl ActivityGroup {
    pub fn new(activities: Vec<ActivityConfig>) -> Self {
        Self { activities }
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GroupRepr {
    Wrapped {
        #[serde(default)]
        activities: Vec<ActivityConfig>,
    },
    Plain(Vec<ActivityConfig>),
}

impl From<GroupRepr> for ActivityGroup {
    fn from(repr: GroupRepr) -> Self {
        match repr {
            GroupRepr::Wrapped { activities } | GroupRepr::Plain(activities) => {
                Self { activities }
            }
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// 单个 activity 的配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub configuration: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_on: Option<RunOn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on: Option<Vec<StatusMatcher>>,
    #[serde(default, alias = "skipReuse", skip_serializing_if = "is_false")]
    pub skip_with_outputs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_with_outputs_values: Option<Map<String, Value>>,
}

impl ActivityConfig {
    pub fn new(activity_type: impl Into<String>) -> Self {
        Self {
            activity_type: activity_type.into(),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.configuration.insert(key.into(), value);
        self
    }
}

/// 浅合并：子级的键覆盖父级
pub fn merge_configuration(
    parent: &Map<String, Value>,
    child: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = parent.clone();
    for (key, value) in child {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

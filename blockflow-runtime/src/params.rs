//! 调用参数：运行哪个流程、哪个 block、哪个 activity，以及单独运行
//! activity 时的配置与输入

use blockflow_core::Mode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 环境变量前缀，例如 `BLOCKFLOW_FLOW_CONFIG_URL`
pub const ENV_PREFIX: &str = "BLOCKFLOW_";

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("parameter '{name}' is not valid JSON: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 调用参数，可来自命令行、环境变量或代码
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InvocationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_config_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_extensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
}

impl InvocationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flow_config_url(mut self, url: impl Into<String>) -> Self {
        self.flow_config_url = Some(url.into());
        self
    }

    pub fn activity_block_id(mut self, block_id: impl Into<String>) -> Self {
        self.activity_block_id = Some(block_id.into());
        self
    }

    pub fn flow_run_id(mut self, flow_run_id: impl Into<String>) -> Self {
        self.flow_run_id = Some(flow_run_id.into());
        self
    }

    pub fn activity_name(mut self, name: impl Into<String>) -> Self {
        self.activity_name = Some(name.into());
        self
    }

    pub fn activity_id(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = Some(activity_id.into());
        self
    }

    pub fn activity_module(mut self, module: impl Into<String>) -> Self {
        self.activity_module = Some(module.into());
        self
    }

    pub fn activity_type(mut self, activity_type: impl Into<String>) -> Self {
        self.activity_type = Some(activity_type.into());
        self
    }

    pub fn activity_config(mut self, config: Value) -> Self {
        self.activity_config = Some(config);
        self
    }

    pub fn activity_input(mut self, input: Value) -> Self {
        self.activity_input = Some(input);
        self
    }

    pub fn extension(mut self, name: impl Into<String>) -> Self {
        self.additional_extensions.push(name.into());
        self
    }

    pub fn custom_data(mut self, data: Value) -> Self {
        self.custom_data = Some(data);
        self
    }

    /// 根据参数推导执行模式
    ///
    /// 单独的 `activity-id` 不足以进入 ACTIVITY_IN_BLOCK，只有 `activity-name` 可以
    pub fn mode(&self) -> Mode {
        let targets_activity = self.activity_id.is_some() || self.activity_name.is_some();
        if self.activity_module.is_some() {
            Mode::Activity
        } else if self.flow_run_id.is_some() && targets_activity {
            Mode::ActivityBlockRerun
        } else if self.activity_name.is_some() {
            Mode::ActivityInBlock
        } else {
            Mode::ActivityBlock
        }
    }

    /// 从环境变量读取参数
    pub fn from_env() -> Result<Self, ParamsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取参数，键为 `BLOCKFLOW_` 加大写的参数名
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ParamsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{}", name.replace('-', "_").to_uppercase());
            lookup(&key).filter(|value| !value.is_empty())
        };
        let json = |name: &str| get(name).map(|raw| parse_json(name, &raw)).transpose();

        Ok(Self {
            flow_config_url: get("flow-config-url"),
            activity_block_id: get("activity-block-id"),
            flow_run_id: get("flow-run-id"),
            activity_name: get("activity-name"),
            activity_id: get("activity-id"),
            activity_module: get("activity-module"),
            activity_type: get("activity-type"),
            activity_config: json("activity-config")?,
            activity_input: json("activity-input")?,
            additional_extensions: get("additional-extensions")
                .map(|raw| parse_csv(&raw))
                .unwrap_or_default(),
            custom_data: json("custom-data")?,
        })
    }

    /// 合并两组参数，`other` 中已设置的值优先
    pub fn overlay(mut self, other: InvocationParams) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            flow_config_url,
            activity_block_id,
            flow_run_id,
            activity_name,
            activity_id,
            activity_module,
            activity_type,
            activity_config,
            activity_input,
            custom_data
        );
        for extension in other.additional_extensions {
            if !self.additional_extensions.contains(&extension) {
                self.additional_extensions.push(extension);
            }
        }
        self
    }
}

pub fn parse_json(name: &str, raw: &str) -> Result<Value, ParamsError> {
    serde_json::from_str(raw).map_err(|source| ParamsError::Json {
        name: name.to_string(),
        source,
    })
}

pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

use crate::config::{ConfigError, FlowConfiguration};
use crate::parser::BlockPlanner;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// 流程配置加载器，支持从文件或字符串加载配置
pub struct FlowLoader;

impl FlowLoader {
    /// 将 `flow-config-url` 解析为本地路径，接受 `file://` 前缀
    pub fn resolve_url(url: &str) -> PathBuf {
        PathBuf::from(url.strip_prefix("file://").unwrap_or(url))
    }

    /// 按扩展名从 URL 加载 YAML 或 JSON 配置
    pub fn from_url(url: &str) -> Result<FlowConfiguration> {
        let path = Self::resolve_url(url);
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_file(&path),
            _ => Self::from_yaml_file(&path),
        }
    }

    /// 从 YAML 文件加载流程配置
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<FlowConfiguration> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read YAML file: {:?}", path.as_ref()))?;
        Self::from_yaml_str(&content)
    }

    /// 从 YAML 字符串加载流程配置
    pub fn from_yaml_str(content: &str) -> Result<FlowConfiguration> {
        serde_yaml::from_str(content).with_context(|| "Failed to parse YAML content")
    }

    /// 从 JSON 文件加载流程配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<FlowConfiguration> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read JSON file: {:?}", path.as_ref()))?;
        Self::from_json_str(&content)
    }

    /// 从 JSON 字符串加载流程配置
    pub fn from_json_str(content: &str) -> Result<FlowConfiguration> {
        serde_json::from_str(content).with_context(|| "Failed to parse JSON content")
    }

    /// 保存流程配置到 YAML 文件
    pub fn save_to_yaml<P: AsRef<Path>>(config: &FlowConfiguration, path: P) -> Result<()> {
        let yaml_content =
            serde_yaml::to_string(config).with_context(|| "Failed to serialize config to YAML")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {parent:?}"))?;
        }
        fs::write(&path, yaml_content)
            .with_context(|| format!("Failed to write YAML file: {:?}", path.as_ref()))?;

        Ok(())
    }

    /// 保存流程配置到 JSON 文件
    pub fn save_to_json<P: AsRef<Path>>(config: &FlowConfiguration, path: P) -> Result<()> {
        let json_content = serde_json::to_string_pretty(config)
            .with_context(|| "Failed to serialize config to JSON")?;

        fs::write(&path, json_content)
            .with_context(|| format!("Failed to write JSON file: {:?}", path.as_ref()))?;

        Ok(())
    }

    /// 验证流程配置的基本有效性：至少一个 block，且每个 block 都能生成执行计划
    pub fn validate(config: &FlowConfiguration) -> Result<(), ConfigError> {
        if config.activity_blocks.is_empty() {
            return Err(ConfigError::NoBlocks(config.flow_id.clone()));
        }

        let planner = BlockPlanner::new(config);
        for block_id in config.activity_blocks.keys() {
            planner.plan(block_id)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockflow_core::{Group, StatusMatcher};
    use serde_json::json;

    const FLOW: &str = r#"
flowId: calculateMax
configuration:
  region: eu
extensions:
  - tests.recorder
activityModules:
  - blockflow.builtin
activityBlocks:
  calculateMax:
    activities:
      activities:
        - type: max
          configuration:
            val: 1
          continueOn: [SUCCESS, SKIPPED, ERROR]
        - name: gated
          type: max
          runOn:
            activityStatus:
              _previous: [SUCCESS]
          skipReuse: true
          skipWithOutputsValues:
            max: 9
"#;

    #[test]
    fn test_load_from_yaml_str() {
        let config = FlowLoader::from_yaml_str(FLOW).unwrap();
        assert_eq!(config.flow_id, "calculateMax");
        assert_eq!(config.extensions, vec!["tests.recorder".to_string()]);
        assert_eq!(config.activity_modules, vec!["blockflow.builtin".to_string()]);

        let block = &config.activity_blocks["calculateMax"];
        assert_eq!(block.activities.len(), 2);
        let first = &block.activities.activities[0];
        assert_eq!(first.activity_type, "max");
        assert_eq!(first.configuration.get("val"), Some(&json!(1)));
        assert_eq!(
            first.continue_on.as_deref(),
            Some(&[StatusMatcher::Success, StatusMatcher::Skipped, StatusMatcher::Error][..])
        );

        let gated = &block.activities.activities[1];
        assert!(gated.skip_with_outputs);
        assert_eq!(
            gated.skip_with_outputs_values.as_ref().unwrap().get("max"),
            Some(&json!(9))
        );
        let run_on = gated.run_on.as_ref().unwrap();
        assert_eq!(
            run_on.activity_status.as_ref().unwrap()["_previous"],
            vec![StatusMatcher::Success]
        );
    }

    #[test]
    fn test_validate_config() {
        let config = FlowLoader::from_yaml_str(FLOW).unwrap();
        assert!(FlowLoader::validate(&config).is_ok());

        let empty = FlowLoader::from_yaml_str("flowId: empty\n").unwrap();
        assert!(matches!(
            FlowLoader::validate(&empty),
            Err(ConfigError::NoBlocks(_))
        ));
    }

    #[test]
    fn test_empty_type_rejected() {
        let yaml = r#"
flowId: bad
activityBlocks:
  block:
    activities:
      - type: ""
"#;
        let config = FlowLoader::from_yaml_str(yaml).unwrap();
        assert!(matches!(
            FlowLoader::validate(&config),
            Err(ConfigError::EmptyType { .. })
        ));
    }

    #[test]
    fn test_save_and_reload_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("flow.yml");
        let config = FlowLoader::from_yaml_str(FLOW).unwrap();
        FlowLoader::save_to_yaml(&config, &path).unwrap();

        let url = format!("file://{}", path.display());
        let reloaded = FlowLoader::from_url(&url).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_json_flow() {
        let json = r#"{
            "flowId": "json",
            "activityBlocks": {
                "b": { "activities": { "activities": [ { "type": "max" } ] } }
            }
        }"#;
        let config = FlowLoader::from_json_str(json).unwrap();
        let plan = BlockPlanner::new(&config).plan("b").unwrap();
        assert_eq!(plan.mains[0].main.group, Group::MainActivity);
    }
}

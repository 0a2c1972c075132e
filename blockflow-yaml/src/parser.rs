use crate::config::{merge_configuration, ActivityConfig, BlockConfig, ConfigError, FlowConfiguration};
use blockflow_core::{
    block_activity_id, default_main_name, wrap_activity_id, ActivitySpec, BlockPlan, Group,
    MainSlot,
};
use serde_json::{Map, Value};

/// 主 activity 的名称，未命名时为 `activityN`
pub fn main_name(index: usize, config: &ActivityConfig) -> String {
    config
        .name
        .clone()
        .unwrap_or_else(|| default_main_name(index))
}

/// wrap activity 的名称，未命名时为分组名加序号，例如 `beforeBlock1`
pub fn wrap_name(group: Group, index: usize, config: &ActivityConfig) -> String {
    config.name.clone().unwrap_or_else(|| {
        let prefix = match group {
            Group::BeforeBlock => "beforeBlock",
            Group::BeforeActivity => "beforeActivity",
            Group::MainActivity => "activity",
            Group::AfterActivity => "afterActivity",
            Group::AfterBlock => "afterBlock",
        };
        format!("{prefix}{}", index + 1)
    })
}

/// 将 block 配置解析为执行计划
pub struct BlockPlanner<'a> {
    flow: &'a FlowConfiguration,
}

impl<'a> BlockPlanner<'a> {
    pub fn new(flow: &'a FlowConfiguration) -> Self {
        Self { flow }
    }

    /// 构建指定 block 的执行计划
    pub fn plan(&self, block_id: &str) -> Result<BlockPlan, ConfigError> {
        let block = self
            .flow
            .activity_blocks
            .get(block_id)
            .ok_or_else(|| ConfigError::UnknownBlock(block_id.to_string()))?;
        check_types(block_id, block)?;

        let defaults = merge_configuration(&self.flow.configuration, &block.configuration);
        let mut plan = BlockPlan::new(block_id);

        for (index, config) in block.before_block.activities.iter().enumerate() {
            let name = wrap_name(Group::BeforeBlock, index, config);
            let id = block_activity_id(block_id, &name);
            plan.before_block
                .push(spec(block_id, id, name, Group::BeforeBlock, config, &defaults));
        }

        for (index, config) in block.activities.activities.iter().enumerate() {
            let main_name = main_name(index, config);
            let main_id = block_activity_id(block_id, &main_name);
            let mut slot = MainSlot::new(spec(
                block_id,
                main_id.clone(),
                main_name.clone(),
                Group::MainActivity,
                config,
                &defaults,
            ));

            for (group, configs, target) in [
                (Group::BeforeActivity, &block.before_activity, &mut slot.before),
                (Group::AfterActivity, &block.after_activity, &mut slot.after),
            ] {
                for (wrap_index, wrap) in configs.activities.iter().enumerate() {
                    let name = wrap_name(group, wrap_index, wrap);
                    let id = wrap_activity_id(block_id, &main_name, &name);
                    target.push(
                        spec(block_id, id, name, group, wrap, &defaults)
                            .with_main(main_id.clone(), main_name.clone()),
                    );
                }
            }
            plan.mains.push(slot);
        }

        for (index, config) in block.after_block.activities.iter().enumerate() {
            let name = wrap_name(Group::AfterBlock, index, config);
            let id = block_activity_id(block_id, &name);
            plan.after_block
                .push(spec(block_id, id, name, Group::AfterBlock, config, &defaults));
        }

        plan.validate()?;
        tracing::debug!(block_id, activities = plan.len(), "block planned");
        Ok(plan)
    }
}

fn spec(
    block_id: &str,
    id: String,
    name: String,
    group: Group,
    config: &ActivityConfig,
    defaults: &Map<String, Value>,
) -> ActivitySpec {
    let mut spec = ActivitySpec::new(block_id, id, name, config.activity_type.clone(), group)
        .with_configuration(merge_configuration(defaults, &config.configuration));
    spec.run_on = config.run_on.clone();
    spec.continue_on = config.continue_on.clone();
    if config.skip_with_outputs {
        spec = spec.with_skip_with_outputs(config.skip_with_outputs_values.clone());
    }
    spec
}

fn check_types(block_id: &str, block: &BlockConfig) -> Result<(), ConfigError> {
    let groups = [
        ("beforeBlock", &block.before_block),
        ("beforeActivity", &block.before_activity),
        ("activities", &block.activities),
        ("afterActivity", &block.after_activity),
        ("afterBlock", &block.after_block),
    ];
    for (group, configs) in groups {
        if let Some(index) = configs
            .activities
            .iter()
            .position(|c| c.activity_type.trim().is_empty())
        {
            return Err(ConfigError::EmptyType {
                block_id: block_id.to_string(),
                group,
                index,
            });
        }
    }
    Ok(())
}

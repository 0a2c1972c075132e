//! Builds the "skip-with-outputs" flow configuration: the original document
//! with the outputs of a finished block run attached to each activity, so a
//! later run can replay them instead of executing the activity.

use crate::config::{ActivityConfig, ConfigError, FlowConfiguration};
use crate::parser::{main_name, wrap_name};
use blockflow_core::{block_activity_id, Group};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Returns a copy of `flow` where every before-block, main and after-block
/// activity of `block_id` found in `outputs` (keyed by activity id) carries
/// those outputs as `skipWithOutputsValues` and has `skipWithOutputs` turned
/// on, so loading the result replays them. Activities without recorded
/// outputs are left as configured.
pub fn augment_with_outputs(
    flow: &FlowConfiguration,
    block_id: &str,
    outputs: &HashMap<String, Map<String, Value>>,
) -> Result<FlowConfiguration, ConfigError> {
    let mut augmented = flow.clone();
    let block = augmented
        .activity_blocks
        .get_mut(block_id)
        .ok_or_else(|| ConfigError::UnknownBlock(block_id.to_string()))?;

    let mut recorded = 0;
    let mut record = |id: String, config: &mut ActivityConfig| {
        if let Some(values) = outputs.get(&id) {
            config.skip_with_outputs = true;
            config.skip_with_outputs_values = Some(values.clone());
            recorded += 1;
        }
    };

    for (index, config) in block.before_block.activities.iter_mut().enumerate() {
        let name = wrap_name(Group::BeforeBlock, index, config);
        record(block_activity_id(block_id, &name), config);
    }
    for (index, config) in block.activities.activities.iter_mut().enumerate() {
        let name = main_name(index, config);
        record(block_activity_id(block_id, &name), config);
    }
    for (index, config) in block.after_block.activities.iter_mut().enumerate() {
        let name = wrap_name(Group::AfterBlock, index, config);
        record(block_activity_id(block_id, &name), config);
    }

    tracing::debug!(block_id, recorded, "skip-with-outputs configuration built");
    Ok(augmented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlowLoader;
    use serde_json::json;

    #[test]
    fn test_outputs_attached_by_activity_id() {
        let flow = FlowLoader::from_yaml_str(
            r#"
flowId: calculateMax
activityBlocks:
  calc:
    beforeActivity:
      - name: prep
        type: noop
    activities:
      activities:
        - type: max
        - name: last
          type: max
          skipWithOutputs: true
"#,
        )
        .unwrap();

        let mut outputs = HashMap::new();
        let mut first = Map::new();
        first.insert("max".to_string(), json!(1));
        outputs.insert("calc-activity1".to_string(), first);
        let mut prep = Map::new();
        prep.insert("ignored".to_string(), json!(true));
        outputs.insert("calc-activity1-prep".to_string(), prep);

        let augmented = augment_with_outputs(&flow, "calc", &outputs).unwrap();
        let block = &augmented.activity_blocks["calc"];
        let mains = &block.activities.activities;
        assert_eq!(
            mains[0].skip_with_outputs_values.as_ref().unwrap()["max"],
            json!(1)
        );
        assert!(mains[0].skip_with_outputs);
        assert!(mains[1].skip_with_outputs);
        assert!(mains[1].skip_with_outputs_values.is_none());
        assert!(block.before_activity.activities[0]
            .skip_with_outputs_values
            .is_none());
    }

    #[test]
    fn test_unknown_block() {
        let flow = FlowConfiguration::new("empty");
        assert!(augment_with_outputs(&flow, "missing", &HashMap::new()).is_err());
    }
}

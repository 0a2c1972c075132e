use blockflow_core::{Group, StatusMatcher};
use blockflow_yaml::{augment_with_outputs, BlockPlanner, FlowLoader};
use serde_json::{json, Map};
use std::collections::HashMap;

const CALCULATE_MAX: &str = r#"
flowId: calculateMax
activityModules:
  - blockflow.builtin
activityBlocks:
  calculateMax:
    configuration:
      val: 0
    activities:
      activities:
        - type: max
          configuration:
            val: 1
        - type: max
          configuration:
            val: 7
        - type: max
          configuration:
            val: 2
        - type: max
          configuration:
            val: 9
    afterBlock:
      activities:
        - name: report
          type: set-outputs
          runOn:
            activityBlockStatus: [SUCCESS]
"#;

#[test]
fn test_calculate_max_document() {
    let flow = FlowLoader::from_yaml_str(CALCULATE_MAX).unwrap();
    FlowLoader::validate(&flow).unwrap();

    let block_id = flow.select_block(None).unwrap();
    assert_eq!(block_id, "calculateMax");

    let plan = BlockPlanner::new(&flow).plan(&block_id).unwrap();
    let vals: Vec<_> = plan
        .mains
        .iter()
        .map(|slot| slot.main.configuration["val"].clone())
        .collect();
    assert_eq!(vals, vec![json!(1), json!(7), json!(2), json!(9)]);
    assert_eq!(plan.mains[2].main.id, "calculateMax-activity3");

    let report = plan.find("calculateMax-report").unwrap();
    assert_eq!(report.group, Group::AfterBlock);
    assert_eq!(
        report.run_on.as_ref().unwrap().activity_block_status,
        Some(vec![StatusMatcher::Success])
    );
}

#[test]
fn test_skip_with_outputs_document_replays() {
    let flow = FlowLoader::from_yaml_str(CALCULATE_MAX).unwrap();

    let mut outputs = HashMap::new();
    for (index, max) in [1, 7, 7, 9].into_iter().enumerate() {
        let mut values = Map::new();
        values.insert("max".to_string(), json!(max));
        outputs.insert(format!("calculateMax-activity{}", index + 1), values);
    }

    let mut augmented = augment_with_outputs(&flow, "calculateMax", &outputs).unwrap();
    for config in &mut augmented
        .activity_blocks
        .get_mut("calculateMax")
        .unwrap()
        .activities
        .activities
    {
        config.skip_with_outputs = true;
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skip.yml");
    FlowLoader::save_to_yaml(&augmented, &path).unwrap();
    let reloaded = FlowLoader::from_yaml_file(&path).unwrap();

    let plan = BlockPlanner::new(&reloaded).plan("calculateMax").unwrap();
    let last = &plan.mains[3].main;
    assert!(last.skip_with_outputs);
    assert_eq!(
        last.skip_with_outputs_values.as_ref().unwrap()["max"],
        json!(9)
    );
}

#[test]
fn test_several_blocks_need_explicit_id() {
    let yaml = r#"
flowId: two
activityBlocks:
  a:
    activities: [{ type: max }]
  b:
    activities: [{ type: max }]
"#;
    let flow = FlowLoader::from_yaml_str(yaml).unwrap();
    assert!(flow.select_block(None).is_err());
    assert_eq!(flow.select_block(Some("b")).unwrap(), "b");
    assert!(flow.select_block(Some("c")).is_err());
}

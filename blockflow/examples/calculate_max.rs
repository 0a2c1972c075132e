use blockflow::prelude::*;
use serde_json::json;

const FLOW: &str = r#"
flowId: calculate
activityModules: [blockflow.builtin]
activityBlocks:
  calculateMax:
    activities:
      activities:
        - type: max
          configuration: { val: 1 }
        - type: max
          configuration: { val: 7 }
        - type: max
          configuration: { val: 2 }
        - type: max
          configuration: { val: 9 }
    afterBlock:
      activities:
        - name: report
          type: set-outputs
          configuration:
            values: { reported: true }
          runOn:
            activityBlockStatus: [SUCCESS]
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Logger::init_tracing();
    println!("=== Blockflow calculateMax Demo ===\n");

    let engine = blockflow::engine_builder()
        .flow(FlowLoader::from_yaml_str(FLOW)?)
        .config(EngineConfig::default().persist(false))
        .build();

    println!("1. Full block run:");
    let report = engine.run(InvocationParams::new()).await?;
    for activity in &report.activities {
        let max = engine
            .output("calculateMax", &activity.id, "max")
            .await
            .unwrap_or(json!(null));
        println!("  {} [{}] -> {} (max = {max})", activity.id, activity.action, activity.status);
    }

    println!("\n2. Rerun from the third activity:");
    let rerun = engine
        .run(
            InvocationParams::new()
                .flow_run_id(report.flow_run_id.clone())
                .activity_id("calculateMax-activity3"),
        )
        .await?;
    for activity in &rerun.activities {
        println!("  {} [{}] -> {}", activity.id, activity.action, activity.status);
    }

    println!("\n=== Demo Completed: {} ===", rerun.status);
    Ok(())
}

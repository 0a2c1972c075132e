#![allow(dead_code)]

use blockflow::prelude::*;
use blockflow::runtime::EngineBuilder;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const CALCULATE_MAX: &str = r#"
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
"#;

pub const EVERY_SECOND_RUN: &str = "max-with-exception-every-second-run";

/// `max` that fails on the first, third, fifth... execution.
#[derive(Default, Properties)]
pub struct MaxWithExceptionEverySecondRun {
    #[config(mandatory)]
    val: Option<i64>,
    #[input]
    #[output(mandatory)]
    max: Option<i64>,
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Activity for MaxWithExceptionEverySecondRun {
    async fn run(&mut self, _ctx: &mut ActivityContext) -> anyhow::Result<()> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if run % 2 == 1 {
            anyhow::bail!("run {run} fails");
        }
        let val = self.val.unwrap_or_default();
        self.max = Some(self.max.map_or(val, |max| max.max(val)));
        Ok(())
    }
}

/// An activity that cannot run without its `required` input.
#[derive(Default, Properties)]
pub struct NeedsInput {
    #[input(mandatory)]
    required: Option<i64>,
}

#[async_trait]
impl Activity for NeedsInput {
    async fn run(&mut self, _ctx: &mut ActivityContext) -> anyhow::Result<()> {
        Ok(())
    }
}

pub fn quiet() -> EngineConfig {
    EngineConfig::default().persist(false).print_summary(false)
}

pub fn flow(yaml: &str) -> FlowConfiguration {
    FlowLoader::from_yaml_str(yaml).unwrap()
}

/// Builtin module, the test activity types and quiet defaults.
pub fn builder(runs: Arc<AtomicUsize>) -> EngineBuilder {
    blockflow::engine_builder()
        .register(EVERY_SECOND_RUN, move || {
            Box::new(MaxWithExceptionEverySecondRun {
                runs: runs.clone(),
                ..Default::default()
            })
        })
        .activity::<NeedsInput>("needs-input")
        .config(quiet())
}

pub fn engine(yaml: &str) -> Engine {
    builder(Arc::default()).flow(flow(yaml)).build()
}

/// `max` after every main activity, in order.
pub async fn max_trace(engine: &Engine, report: &BlockRunReport) -> Vec<Option<Value>> {
    let block_id = report.block_id.as_deref().unwrap();
    let mut trace = Vec::new();
    for activity in report.activities.iter().filter(|a| a.group == Group::MainActivity) {
        trace.push(engine.output(block_id, &activity.id, "max").await);
    }
    trace
}

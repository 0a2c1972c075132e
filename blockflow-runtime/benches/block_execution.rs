use async_trait::async_trait;
use blockflow_core::{Activity, ActivityContext};
use blockflow_macros::Properties;
use blockflow_runtime::{Engine, EngineConfig, InvocationParams};
use blockflow_yaml::{ActivityConfig, ActivityGroup, BlockConfig, FlowConfiguration};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

#[derive(Default, Properties)]
struct MaxActivity {
    #[config(mandatory)]
    val: Option<i64>,
    #[input]
    #[output(mandatory)]
    max: Option<i64>,
}

#[async_trait]
impl Activity for MaxActivity {
    async fn run(&mut self, _ctx: &mut ActivityContext) -> anyhow::Result<()> {
        let val = self.val.unwrap_or_default();
        self.max = Some(self.max.map_or(val, |max| max.max(val)));
        Ok(())
    }
}

fn build_flow(mains: usize, wrapped: bool) -> FlowConfiguration {
    let mut block = BlockConfig::default();
    block.activities = ActivityGroup::new(
        (0..mains)
            .map(|i| ActivityConfig::new("max").with_config("val", json!(i)))
            .collect(),
    );
    if wrapped {
        block.before_activity = ActivityGroup::new(vec![ActivityConfig::new("max").named("prep")]);
        block.after_activity = ActivityGroup::new(vec![ActivityConfig::new("max").named("check")]);
        block.configuration.insert("val".into(), json!(0));
    }

    let mut flow = FlowConfiguration::new("bench");
    flow.activity_blocks.insert("bench".into(), block);
    flow
}

fn engine(mains: usize, wrapped: bool) -> Engine {
    Engine::builder()
        .activity::<MaxActivity>("max")
        .flow(build_flow(mains, wrapped))
        .config(EngineConfig::default().persist(false).print_summary(false))
        .build()
}

fn bench_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_execution");

    for &mains in &[10usize, 50] {
        group.bench_function(format!("plain_{mains}"), |b| {
            let engine = engine(mains, false);
            b.to_async(tokio::runtime::Runtime::new().unwrap())
                .iter(|| async {
                    let report = engine.run(InvocationParams::new()).await.unwrap();
                    black_box(report.status);
                });
        });
        // 每个主 activity 带前后 wrap
        group.bench_function(format!("wrapped_{mains}"), |b| {
            let engine = engine(mains, true);
            b.to_async(tokio::runtime::Runtime::new().unwrap())
                .iter(|| async {
                    let report = engine.run(InvocationParams::new()).await.unwrap();
                    black_box(report.status);
                });
        });
    }
    group.finish();
}

criterion_group!(name=benches; config=Criterion::default(); targets=bench_block);
criterion_main!(benches);

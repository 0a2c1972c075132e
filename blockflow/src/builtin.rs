//! Activities shipped with the engine, registered under the
//! `blockflow.builtin` module.

use blockflow_core::{
    async_trait, Activity, ActivityContext, ActivityModule, ActivityRegistry, Status,
};
use blockflow_macros::Properties;
use serde_json::{Map, Value};

pub const BUILTIN_MODULE: &str = "blockflow.builtin";

/// `max`, `set-outputs` and `fail`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinModule;

impl ActivityModule for BuiltinModule {
    fn name(&self) -> &str {
        BUILTIN_MODULE
    }

    fn register(&self, registry: &mut ActivityRegistry) {
        registry.register_default::<MaxActivity>("max");
        registry.register_default::<SetOutputsActivity>("set-outputs");
        registry.register_default::<FailActivity>("fail");
    }
}

/// 取配置值与输入 `max` 中较大者作为输出 `max`
#[derive(Debug, Default, Properties)]
pub struct MaxActivity {
    #[config(mandatory)]
    pub val: Option<i64>,
    #[input]
    #[output(mandatory)]
    pub max: Option<i64>,
}

#[async_trait]
impl Activity for MaxActivity {
    async fn run(&mut self, ctx: &mut ActivityContext) -> anyhow::Result<()> {
        let val = self
            .val
            .ok_or_else(|| anyhow::anyhow!("configuration 'val' is not set"))?;
        let max = self.max.map_or(val, |current| current.max(val));
        tracing::debug!(activity_id = ctx.activity_id(), val, max, "max computed");
        self.max = Some(max);
        Ok(())
    }
}

/// Writes every entry of `values` into the context.
#[derive(Debug, Default, Properties)]
pub struct SetOutputsActivity {
    #[config(mandatory)]
    pub values: Option<Map<String, Value>>,
}

#[async_trait]
impl Activity for SetOutputsActivity {
    async fn run(&mut self, ctx: &mut ActivityContext) -> anyhow::Result<()> {
        for (key, value) in self.values.take().unwrap_or_default() {
            ctx.write(&key, value).await?;
        }
        Ok(())
    }
}

/// 以 FAIL 结束，整个 block 随之为 FAIL
#[derive(Debug, Default, Properties)]
pub struct FailActivity {
    #[config(default = "failed on request")]
    pub message: Option<String>,
}

#[async_trait]
impl Activity for FailActivity {
    async fn run(&mut self, ctx: &mut ActivityContext) -> anyhow::Result<()> {
        tracing::warn!(
            activity_id = ctx.activity_id(),
            message = self.message.as_deref().unwrap_or_default(),
            "activity failed"
        );
        ctx.set_status(Status::Fail);
        Ok(())
    }
}

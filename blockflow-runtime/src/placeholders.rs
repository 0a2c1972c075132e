//! Internal activities the runner substitutes for the configured one.

use blockflow_core::{
    async_trait, Activity, ActivityContext, Property, PropertyError, PropertySet, Status,
};
use serde_json::{Map, Value};

macro_rules! no_properties {
    ($($ty:ty),*) => {
        $(impl PropertySet for $ty {
            fn properties(&self) -> Vec<Property> {
                Vec::new()
            }

            fn property(&self, name: &str) -> Result<Option<Value>, PropertyError> {
                Err(PropertyError::Unknown(name.to_string()))
            }

            fn set_property(&mut self, name: &str, _value: Value) -> Result<(), PropertyError> {
                Err(PropertyError::Unknown(name.to_string()))
            }
        })*
    };
}

no_properties!(ReuseActivity, SkipWithOutputsActivity, ExceptionActivity);

/// 重放上一次运行的输出与状态
#[derive(Debug, Clone)]
pub struct ReuseActivity {
    pub outputs: Map<String, Value>,
    pub status: Status,
}

#[async_trait]
impl Activity for ReuseActivity {
    async fn run(&mut self, ctx: &mut ActivityContext) -> anyhow::Result<()> {
        for (key, value) in &self.outputs {
            ctx.write(key, value.clone()).await?;
        }
        ctx.set_status(self.status);
        Ok(())
    }
}

/// 用配置中给定的值代替执行
#[derive(Debug, Clone, Default)]
pub struct SkipWithOutputsActivity {
    pub values: Map<String, Value>,
}

#[async_trait]
impl Activity for SkipWithOutputsActivity {
    async fn run(&mut self, ctx: &mut ActivityContext) -> anyhow::Result<()> {
        for (key, value) in &self.values {
            ctx.write(key, value.clone()).await?;
        }
        ctx.set_status(Status::Success);
        Ok(())
    }
}

/// Stands in for an activity whose type could not be created. The creation
/// error has already latched abort, so this never does anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionActivity;

#[async_trait]
impl Activity for ExceptionActivity {
    async fn run(&mut self, _ctx: &mut ActivityContext) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockflow_context::{ContextStore, Scope};
    use blockflow_core::{Action, ActivityData, ActivitySpec, Group};
    use serde_json::json;

    fn context_for(store: ContextStore) -> (ActivityContext, blockflow_context::SharedContext) {
        let spec = ActivitySpec::new("b", "b-a", "a", "max", Group::MainActivity);
        let data = ActivityData::from_spec(&spec, Action::Reuse);
        let shared = store.shared();
        (ActivityContext::new(&data, shared.clone()), shared)
    }

    #[tokio::test]
    async fn test_reuse_replays_outputs_and_status() {
        let (mut ctx, shared) = context_for(ContextStore::new_with_flow_run_id("run"));
        let mut outputs = Map::new();
        outputs.insert("max".to_string(), json!(7));
        let mut reuse = ReuseActivity {
            outputs,
            status: Status::Fail,
        };
        reuse.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.status(), Status::Fail);
        let store = shared.lock().await;
        assert_eq!(store.get(&Scope::block("b"), "max").unwrap(), &json!(7));
    }

    #[tokio::test]
    async fn test_skip_with_outputs_writes_values() {
        let (mut ctx, shared) = context_for(ContextStore::new_with_flow_run_id("run"));
        let mut values = Map::new();
        values.insert("max".to_string(), json!(9));
        let mut skip = SkipWithOutputsActivity { values };
        skip.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.status(), Status::Success);
        let store = shared.lock().await;
        assert_eq!(store.get(&Scope::Flow, "max").unwrap(), &json!(9));
    }

    #[tokio::test]
    async fn test_exception_activity_is_a_no_op() {
        let (mut ctx, shared) = context_for(ContextStore::new());
        let mut activity = ExceptionActivity;
        activity.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.status(), Status::Unknown);
        assert!(activity.properties().is_empty());
        assert!(shared
            .lock()
            .await
            .user_values(&Scope::activity("b", "b-a"))
            .is_empty());
    }
}

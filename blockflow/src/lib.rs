//! # Blockflow - Activity Block Execution Engine
//!
//! Blockflow runs one *activity block* of a flow configuration: an ordered
//! set of activities with before/after wraps, a three-level context store
//! shared between them, rule-driven actions and rerun/replay support.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blockflow::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let flow = FlowLoader::from_yaml_str(
//!         r#"
//! flowId: demo
//! activityModules: [blockflow.builtin]
//! activityBlocks:
//!   calculateMax:
//!     activities:
//!       - { type: max, configuration: { val: 1 } }
//!       - { type: max, configuration: { val: 7 } }
//! "#,
//!     )?;
//!
//!     let engine = blockflow::engine_builder().flow(flow).build();
//!     let report = engine.run(InvocationParams::new()).await?;
//!     println!("block finished with {}", report.status);
//!     Ok(())
//! }
//! ```

pub mod builtin;

pub use blockflow_context as context;
pub use blockflow_core::*;
pub use blockflow_logger as logger;
pub use blockflow_macros::Properties;
pub use blockflow_runtime as runtime;
pub use blockflow_yaml as yaml;

/// An engine builder with the builtin activity module available.
pub fn engine_builder() -> runtime::EngineBuilder {
    runtime::Engine::builder().module(builtin::BuiltinModule)
}

/// Prelude module for easy imports
pub mod prelude {
    pub use crate::builtin::{BuiltinModule, BUILTIN_MODULE};
    pub use blockflow_core::prelude::*;
    pub use blockflow_core::{Action, ErrorKind, Group, Mode};
    pub use blockflow_logger::{LogFormat, Logger};
    pub use blockflow_macros::Properties;
    pub use blockflow_runtime::prelude::*;
    pub use blockflow_yaml::prelude::*;
}

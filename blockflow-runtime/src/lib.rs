//! # Blockflow Runtime
//!
//! Activity block execution: the state/event bus, the activity runner, the
//! block executor, invocation parameters and the engine that ties them to a
//! flow configuration and a context store.

mod engine;
mod executor;
mod params;
mod persist;
mod placeholders;
mod runner;
mod state;


pub use engine::{
    BlockRunReport, Engine, EngineBuilder, EngineConfig, ExtensionCatalog, ListenerFactory,
    ACTIVITY_BLOCK_ID, ACTIVITY_FLOW_ID,
};
pub use executor::BlockExecutor;
pub use params::{parse_csv, parse_json, InvocationParams, ParamsError, ENV_PREFIX};
pub use persist::{
    collect_outputs, context_file_name, skip_with_outputs_file_name, write_context,
    write_skip_with_outputs, CONTEXT_DIR, SKIP_WITH_OUTPUTS_DIR,
};
pub use placeholders::{ExceptionActivity, ReuseActivity, SkipWithOutputsActivity};
pub use runner::{ActivityRunner, SlotOutcome};
pub use state::{Listener, RunInfo, State, StateBus, StateData};

/// Prelude module for runtime functionality
pub mod prelude {
    pub use crate::{
        BlockRunReport, Engine, EngineBuilder, EngineConfig, InvocationParams, Listener, State,
        StateData,
    };
}

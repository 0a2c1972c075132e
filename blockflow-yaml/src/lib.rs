//! # Blockflow YAML
//!
//! Flow configuration documents (YAML/JSON), validation, block planning and
//! the skip-with-outputs document.

mod config;
mod loader;
mod parser;
mod skip_outputs;

pub use config::*;
pub use loader::*;
pub use parser::*;
pub use skip_outputs::*;

/// Prelude module for YAML functionality
pub mod prelude {
    pub use crate::{
        ActivityConfig, BlockConfig, BlockPlanner, ConfigError, FlowConfiguration, FlowLoader,
    };
}

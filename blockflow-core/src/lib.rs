//! # Blockflow Core
//!
//! Activity model, property binding, activity registry, block plan, rule
//! engine and error registry.

#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate self as blockflow_core;

mod activity;
mod binder;
mod data;
mod error;
mod model;
mod plan;
mod property;
mod registry;
pub mod rules;

#[cfg(test)]
mod tests;

pub use activity::{Activity, ActivityContext, BlockCallback, CallbackFn, CallbackInfo};
pub use binder::{BindError, PropertyBinder};
pub use data::{ActivityData, BlockState};
pub use error::{ErrorKind, ErrorRegistry, RegisteredError};
pub use model::{matches_any, Action, Group, Mode, Status, StatusMatcher};
pub use plan::{
    block_activity_id, default_main_name, wrap_activity_id, ActivitySpec, BlockPlan, MainSlot,
    PlanError,
};
pub use property::{Property, PropertyError, PropertyKind, PropertySet, PropertyType, PropertyValue};
pub use registry::{ActivityConstructor, ActivityModule, ActivityRegistry, ModuleCatalog, RegistryError};
pub use rules::{RuleError, RuleInput, RunOn};

// Used by code generated from `#[derive(Properties)]`.
pub use async_trait::async_trait;
pub use serde_json;

/// Prelude module for core functionality
pub mod prelude {
    pub use crate::{
        async_trait, Activity, ActivityContext, ActivityModule, ActivityRegistry, Property,
        PropertyKind, PropertySet, PropertyType, Status, StatusMatcher,
    };
    pub use blockflow_context::{ContextStore, Scope, SharedContext};
}

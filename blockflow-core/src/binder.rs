//! Moves values between configuration, the context store and the declared
//! properties of an activity.

use crate::model::Status;
use crate::property::{Property, PropertyError, PropertyKind, PropertySet, PropertyType};
use blockflow_context::{ContextError, ContextStore, Scope};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BindError {
    #[error("activity '{activity}': mandatory config '{name}' is missing")]
    MissingConfig { activity: String, name: String },

    #[error("activity '{activity}': mandatory input '{name}' is missing")]
    MissingInput { activity: String, name: String },

    #[error("activity '{activity}': mandatory output '{name}' was not set")]
    MissingOutput { activity: String, name: String },

    #[error(
        "activity '{activity}': {kind} '{name}' has both a declared default and a constructor value"
    )]
    DuplicateDefault {
        activity: String,
        kind: PropertyKind,
        name: String,
    },

    #[error("activity '{activity}': {kind} '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        activity: String,
        kind: PropertyKind,
        name: String,
        expected: PropertyType,
        found: String,
    },

    #[error("activity '{activity}': {source}")]
    Property {
        activity: String,
        #[source]
        source: PropertyError,
    },

    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Stateless binder between properties and their sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct PropertyBinder {
    relaxed: bool,
}

impl PropertyBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// In relaxed mode missing mandatory config and inputs are tolerated.
    pub fn relaxed(relaxed: bool) -> Self {
        Self { relaxed }
    }

    pub fn load_config<P>(
        &self,
        target: &mut P,
        activity_id: &str,
        configuration: &Map<String, Value>,
    ) -> Result<(), BindError>
    where
        P: PropertySet + ?Sized,
    {
        self.load(target, activity_id, PropertyKind::Config, |name| {
            configuration.get(name).cloned()
        })
    }

    /// Inputs are searched from the activity scope outward.
    pub fn load_inputs<P>(
        &self,
        target: &mut P,
        store: &ContextStore,
        scope: &Scope,
    ) -> Result<(), BindError>
    where
        P: PropertySet + ?Sized,
    {
        let activity_id = match scope {
            Scope::Activity { activity_id, .. } => activity_id.clone(),
            other => other.to_string(),
        };
        self.load(target, &activity_id, PropertyKind::Input, |name| {
            store.search(scope, name).cloned()
        })
    }

    fn load<P, F>(
        &self,
        target: &mut P,
        activity_id: &str,
        kind: PropertyKind,
        lookup: F,
    ) -> Result<(), BindError>
    where
        P: PropertySet + ?Sized,
        F: Fn(&str) -> Option<Value>,
    {
        for property in target.properties_of(kind) {
            match lookup(&property.name).filter(|v| !v.is_null()) {
                Some(value) => assign(target, activity_id, &property, value)?,
                None if property.mandatory => {
                    if self.relaxed {
                        tracing::debug!(
                            activity_id,
                            property = %property.name,
                            "relaxed binding, mandatory {kind} left unset"
                        );
                        continue;
                    }
                    return Err(missing(kind, activity_id, &property.name));
                }
                None => {
                    let Some(default) = property.default.clone() else {
                        continue;
                    };
                    if current(target, activity_id, &property.name)?.is_some() {
                        return Err(BindError::DuplicateDefault {
                            activity: activity_id.to_string(),
                            kind,
                            name: property.name.clone(),
                        });
                    }
                    assign(target, activity_id, &property, default)?;
                }
            }
        }
        Ok(())
    }

    /// Writes outputs into the context, propagated to block and flow.
    /// Nothing is written unless the status is `SUCCESS`.
    pub fn save_outputs<P>(
        &self,
        target: &P,
        status: Status,
        store: &mut ContextStore,
        block_id: &str,
        activity_id: &str,
    ) -> Result<usize, BindError>
    where
        P: PropertySet + ?Sized,
    {
        if status != Status::Success {
            return Ok(0);
        }

        let mut values = Vec::new();
        for property in target.properties_of(PropertyKind::Output) {
            match current(target, activity_id, &property.name)?.filter(|v| !v.is_null()) {
                Some(value) => {
                    check_type(activity_id, &property, &value)?;
                    values.push((property.name, value));
                }
                None if property.mandatory => {
                    return Err(BindError::MissingOutput {
                        activity: activity_id.to_string(),
                        name: property.name,
                    });
                }
                None => {}
            }
        }

        let count = values.len();
        for (name, value) in values {
            store.set_propagating(block_id, activity_id, &name, value)?;
        }
        Ok(count)
    }
}

fn missing(kind: PropertyKind, activity_id: &str, name: &str) -> BindError {
    let activity = activity_id.to_string();
    let name = name.to_string();
    match kind {
        PropertyKind::Config => BindError::MissingConfig { activity, name },
        PropertyKind::Input => BindError::MissingInput { activity, name },
        PropertyKind::Output => BindError::MissingOutput { activity, name },
    }
}

fn current<P>(target: &P, activity_id: &str, name: &str) -> Result<Option<Value>, BindError>
where
    P: PropertySet + ?Sized,
{
    target.property(name).map_err(|source| BindError::Property {
        activity: activity_id.to_string(),
        source,
    })
}

fn check_type(activity_id: &str, property: &Property, value: &Value) -> Result<(), BindError> {
    if property.ty.accepts(value) {
        return Ok(());
    }
    Err(BindError::TypeMismatch {
        activity: activity_id.to_string(),
        kind: property.kind,
        name: property.name.clone(),
        expected: property.ty,
        found: PropertyType::describe(value).to_string(),
    })
}

fn assign<P>(
    target: &mut P,
    activity_id: &str,
    property: &Property,
    value: Value,
) -> Result<(), BindError>
where
    P: PropertySet + ?Sized,
{
    check_type(activity_id, property, &value)?;
    let found = PropertyType::describe(&value).to_string();
    target
        .set_property(&property.name, value)
        .map_err(|source| match source {
            PropertyError::Conversion { .. } => BindError::TypeMismatch {
                activity: activity_id.to_string(),
                kind: property.kind,
                name: property.name.clone(),
                expected: property.ty,
                found,
            },
            source => BindError::Property {
                activity: activity_id.to_string(),
                source,
            },
        })
}

//! Declared input, config and output properties of an activity.
//!
//! Activities describe their properties through [`PropertySet`], usually
//! generated by `#[derive(Properties)]` from `blockflow-macros`.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Input,
    Config,
    Output,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::Input => f.write_str("input"),
            PropertyKind::Config => f.write_str("config"),
            PropertyKind::Output => f.write_str("output"),
        }
    }
}

/// The JSON shape a property accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Map,
    Any,
}

impl PropertyType {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            PropertyType::Any => true,
            PropertyType::String => value.is_string(),
            PropertyType::Integer => value.is_i64() || value.is_u64(),
            PropertyType::Float => value.is_number(),
            PropertyType::Boolean => value.is_boolean(),
            PropertyType::List => value.is_array(),
            PropertyType::Map => value.is_object(),
        }
    }

    /// Describes the shape of a JSON value for error messages.
    pub fn describe(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_f64() => "float",
            Value::Number(_) => "integer",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "map",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::String => "string",
            PropertyType::Integer => "integer",
            PropertyType::Float => "float",
            PropertyType::Boolean => "boolean",
            PropertyType::List => "list",
            PropertyType::Map => "map",
            PropertyType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Maps a Rust field type to its [`PropertyType`].
pub trait PropertyValue {
    fn property_type() -> PropertyType;
}

macro_rules! property_value {
    ($ty:expr => $($t:ty),+) => {
        $(impl PropertyValue for $t {
            fn property_type() -> PropertyType {
                $ty
            }
        })+
    };
}

property_value!(PropertyType::String => String);
property_value!(PropertyType::Integer => i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);
property_value!(PropertyType::Float => f32, f64);
property_value!(PropertyType::Boolean => bool);
property_value!(PropertyType::Any => Value);

impl<T> PropertyValue for Vec<T> {
    fn property_type() -> PropertyType {
        PropertyType::List
    }
}

impl<V> PropertyValue for HashMap<String, V> {
    fn property_type() -> PropertyType {
        PropertyType::Map
    }
}

impl<V> PropertyValue for BTreeMap<String, V> {
    fn property_type() -> PropertyType {
        PropertyType::Map
    }
}

impl PropertyValue for serde_json::Map<String, Value> {
    fn property_type() -> PropertyType {
        PropertyType::Map
    }
}

/// One declared property.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub kind: PropertyKind,
    pub ty: PropertyType,
    pub mandatory: bool,
    pub default: Option<Value>,
}

impl Property {
    pub fn new(name: impl Into<String>, kind: PropertyKind, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            mandatory: false,
            default: None,
        }
    }

    pub fn input(name: impl Into<String>, ty: PropertyType) -> Self {
        Self::new(name, PropertyKind::Input, ty)
    }

    pub fn config(name: impl Into<String>, ty: PropertyType) -> Self {
        Self::new(name, PropertyKind::Config, ty)
    }

    pub fn output(name: impl Into<String>, ty: PropertyType) -> Self {
        Self::new(name, PropertyKind::Output, ty)
    }

    pub fn mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("unknown property '{0}'")]
    Unknown(String),

    #[error("property '{name}': {message}")]
    Conversion { name: String, message: String },
}

impl PropertyError {
    pub fn conversion(name: &str, err: impl fmt::Display) -> Self {
        PropertyError::Conversion {
            name: name.to_string(),
            message: err.to_string(),
        }
    }
}

/// Descriptor table and accessors for the properties of an activity.
pub trait PropertySet {
    fn properties(&self) -> Vec<Property>;

    /// Current value of a property, `None` while unassigned.
    fn property(&self, name: &str) -> Result<Option<Value>, PropertyError>;

    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError>;

    fn properties_of(&self, kind: PropertyKind) -> Vec<Property> {
        self.properties()
            .into_iter()
            .filter(|p| p.kind == kind)
            .collect()
    }
}

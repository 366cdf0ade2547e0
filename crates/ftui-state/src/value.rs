#![forbid(unsafe_code)]

//! Dynamic values held by properties.
//!
//! A [`Value`] is either scalar-shaped (bool, number, text) or object-shaped
//! (a plain [`Record`], an [`ObservedObject`] wrapper, or a self-managing
//! observable). [`Value::Null`] is the "no value" sentinel and has no shape.
//!
//! # Equality
//!
//! `==` follows the change-detection rule used everywhere in the engine:
//! scalars compare by value, records structurally, and observed or managed
//! objects by reference identity.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Serialize, Serializer};

use crate::observed::{ManagedRef, ObservedObject};

/// Plain, unobserved field map.
pub type Record = BTreeMap<String, Value>;

/// The two value shapes a property can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Bool, number or text; compared by value.
    Scalar,
    /// Record, observed object or managed observable; compared by reference.
    Object,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => f.write_str("scalar"),
            Self::Object => f.write_str("object"),
        }
    }
}

#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value. Rejected by every store write.
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// A plain object that nothing observes yet.
    Record(Record),
    /// An object whose field writes notify its owners.
    Object(ObservedObject),
    /// An observable that manages its own owner set.
    Managed(ManagedRef),
}

impl Value {
    #[must_use]
    pub fn shape(&self) -> Option<Shape> {
        match self {
            Self::Null => None,
            Self::Bool(_) | Self::Number(_) | Self::Text(_) => Some(Shape::Scalar),
            Self::Record(_) | Self::Object(_) | Self::Managed(_) => Some(Shape::Object),
        }
    }

    /// Short name of the variant, for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Record(_) => "record",
            Self::Object(_) => "observed object",
            Self::Managed(_) => "managed observable",
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value already notifies owners on mutation.
    #[must_use]
    pub const fn is_observed(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Managed(_))
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObservedObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The unwrapped fields of a record or observed object.
    #[must_use]
    pub fn raw(&self) -> Option<Record> {
        match self {
            Self::Record(fields) => Some(fields.clone()),
            Self::Object(object) => Some(object.raw()),
            _ => None,
        }
    }

    /// Convert to JSON. Observed objects encode their current fields.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Record(fields) => record_to_json(fields),
            Self::Object(object) => object.with_fields(record_to_json),
            Self::Managed(managed) => managed.to_json(),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

fn record_to_json(fields: &Record) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    )
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Managed(a), Self::Managed(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Record(fields) => f.debug_tuple("Record").field(fields).finish(),
            Self::Object(object) => f.debug_tuple("Object").field(object).finish(),
            Self::Managed(_) => f.write_str("Managed(..)"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// JSON arrays decode to records keyed by index.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => Self::Record(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| (index.to_string(), Self::from(item)))
                    .collect(),
            ),
            serde_json::Value::Object(map) => Self::Record(
                map.into_iter()
                    .map(|(name, item)| (name, Self::from(item)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Record> for Value {
    fn from(fields: Record) -> Self {
        Self::Record(fields)
    }
}

impl From<ObservedObject> for Value {
    fn from(object: ObservedObject) -> Self {
        Self::Object(object)
    }
}

impl From<ManagedRef> for Value {
    fn from(managed: ManagedRef) -> Self {
        Self::Managed(managed)
    }
}

/// Build a [`Record`] from `(name, value)` pairs.
pub fn record<I, K, V>(fields: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    fields
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect()
}

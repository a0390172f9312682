//! Primitive values exchanged with the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use structlink_model::{Kind, Point3, Vector3};

/// Attribute set passed to or read from the engine.
pub type EngineAttributes = BTreeMap<String, EngineValue>;

/// Reference to another engine object by kind and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineRef {
    /// Kind of the referenced object.
    pub kind: Kind,
    /// External name of the referenced object.
    pub name: String,
}

impl EngineRef {
    /// Creates a reference.
    pub fn new(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for EngineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// A primitive engine value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineValue {
    /// Text.
    Text(String),
    /// Floating point number.
    Number(f64),
    /// Integer.
    Integer(i64),
    /// Flag.
    Bool(bool),
    /// Coordinates.
    Point(Point3),
    /// Vector components.
    Vector(Vector3),
    /// Name of another object.
    Ref(EngineRef),
    /// Names of several objects.
    RefList(Vec<EngineRef>),
}

impl EngineValue {
    /// Returns the text, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            EngineValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the point, if this is a point value.
    pub fn as_point(&self) -> Option<Point3> {
        match self {
            EngineValue::Point(p) => Some(*p),
            _ => None,
        }
    }

    /// Iterates over the objects this value references.
    pub fn references(&self) -> impl Iterator<Item = &EngineRef> {
        match self {
            EngineValue::Ref(r) => std::slice::from_ref(r).iter(),
            EngineValue::RefList(refs) => refs.iter(),
            _ => <&[EngineRef]>::default().iter(),
        }
    }

    /// Compares two values, treating numeric components within `tolerance` as equal.
    pub fn approx_eq(&self, other: &EngineValue, tolerance: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance;
        match (self, other) {
            (EngineValue::Number(a), EngineValue::Number(b)) => close(*a, *b),
            (EngineValue::Point(a), EngineValue::Point(b)) => a.distance(b) <= tolerance,
            (EngineValue::Vector(a), EngineValue::Vector(b)) => {
                close(a.x, b.x) && close(a.y, b.y) && close(a.z, b.z)
            }
            _ => self == other,
        }
    }
}

impl From<&str> for EngineValue {
    fn from(value: &str) -> Self {
        EngineValue::Text(value.to_string())
    }
}

impl From<f64> for EngineValue {
    fn from(value: f64) -> Self {
        EngineValue::Number(value)
    }
}

impl From<Point3> for EngineValue {
    fn from(value: Point3) -> Self {
        EngineValue::Point(value)
    }
}

impl From<EngineRef> for EngineValue {
    fn from(value: EngineRef) -> Self {
        EngineValue::Ref(value)
    }
}

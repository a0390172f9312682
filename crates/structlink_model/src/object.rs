//! Domain objects and their attributes.

use crate::geometry::{Point3, Vector3};
use crate::identity::{ExternalIdentity, ObjectId};
use crate::kind::Kind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute map of a domain object, ordered by attribute name.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Value of a single domain attribute.
///
/// References to other synchronizable objects are held by value
/// ([`AttributeValue::Object`], [`AttributeValue::Objects`]): a bar embeds
/// its end nodes, a section embeds its material. The adapter links the
/// embedded copy back to its pushed original through the shared
/// [`ObjectId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// Free text.
    Text(String),
    /// Floating point number.
    Number(f64),
    /// Integer.
    Integer(i64),
    /// Flag.
    Bool(bool),
    /// Position.
    Point(Point3),
    /// Direction or magnitude vector.
    Vector(Vector3),
    /// Reference to a single object.
    Object(Box<DomainObject>),
    /// Ordered references to several objects.
    Objects(Vec<DomainObject>),
}

impl AttributeValue {
    /// Returns the text, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number, widening integers.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the point, if this is a point value.
    #[must_use]
    pub fn as_point(&self) -> Option<Point3> {
        match self {
            AttributeValue::Point(p) => Some(*p),
            _ => None,
        }
    }

    /// Returns true if this value references other objects.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, AttributeValue::Object(_) | AttributeValue::Objects(_))
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<Point3> for AttributeValue {
    fn from(value: Point3) -> Self {
        AttributeValue::Point(value)
    }
}

impl From<Vector3> for AttributeValue {
    fn from(value: Vector3) -> Self {
        AttributeValue::Vector(value)
    }
}

impl From<DomainObject> for AttributeValue {
    fn from(value: DomainObject) -> Self {
        AttributeValue::Object(Box::new(value))
    }
}

impl From<Vec<DomainObject>> for AttributeValue {
    fn from(value: Vec<DomainObject>) -> Self {
        AttributeValue::Objects(value)
    }
}

/// A synchronizable structural entity.
///
/// A domain object is a [`Kind`] tag, an attribute map and an optional
/// [`ExternalIdentity`]. It is created and owned by the caller; the adapter
/// only attaches or refreshes the identity.
///
/// # Example
///
/// ```rust
/// use structlink_model::{DomainObject, Kind, Point3};
///
/// let start = DomainObject::node(Point3::new(0.0, 0.0, 0.0));
/// let end = DomainObject::node(Point3::new(1.0, 0.0, 0.0));
/// let bar = DomainObject::new(Kind::Bar)
///     .with_attribute("start", start)
///     .with_attribute("end", end);
///
/// assert_eq!(bar.references().count(), 2);
/// assert!(bar.identity().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainObject {
    id: ObjectId,
    kind: Kind,
    attributes: Attributes,
    identity: Option<ExternalIdentity>,
}

impl DomainObject {
    /// Attribute holding the position of positional kinds.
    pub const POSITION: &'static str = "position";
    /// Attribute holding the name of named-resource kinds.
    pub const NAME: &'static str = "name";

    /// Creates an empty object of the given kind.
    #[must_use]
    pub fn new(kind: Kind) -> Self {
        Self {
            id: ObjectId::new(),
            kind,
            attributes: Attributes::new(),
            identity: None,
        }
    }

    /// Creates a node at `position`.
    #[must_use]
    pub fn node(position: Point3) -> Self {
        Self::new(Kind::Node).with_attribute(Self::POSITION, position)
    }

    /// Creates a named object of the given kind.
    pub fn named(kind: Kind, name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self::new(kind).with_attribute(Self::NAME, name)
    }

    /// Replaces the object ID.
    #[must_use]
    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = id;
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Sets the external identity.
    #[must_use]
    pub fn with_identity(mut self, identity: ExternalIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Returns the object ID.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the kind.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Returns all attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns a single attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Sets an attribute, returning the previous value.
    pub fn set_attribute(
        &mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Option<AttributeValue> {
        self.attributes.insert(name.into(), value.into())
    }

    /// Removes an attribute.
    pub fn remove_attribute(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    /// Returns a text attribute.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(AttributeValue::as_text)
    }

    /// Returns the `name` attribute.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.text(Self::NAME)
    }

    /// Returns the `position` attribute.
    #[must_use]
    pub fn position(&self) -> Option<Point3> {
        self.attribute(Self::POSITION).and_then(AttributeValue::as_point)
    }

    /// Returns the external identity, if the object has been pushed or pulled.
    #[must_use]
    pub fn identity(&self) -> Option<&ExternalIdentity> {
        self.identity.as_ref()
    }

    /// Returns the external name, if any.
    #[must_use]
    pub fn external_name(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.name.as_str())
    }

    /// Attaches or refreshes the external identity.
    pub fn set_identity(&mut self, identity: ExternalIdentity) {
        self.identity = Some(identity);
    }

    /// Detaches the external identity.
    pub fn clear_identity(&mut self) -> Option<ExternalIdentity> {
        self.identity.take()
    }

    /// Iterates over directly embedded referenced objects.
    pub fn references(&self) -> impl Iterator<Item = &DomainObject> {
        self.attributes
            .values()
            .flat_map(|value| match value {
                AttributeValue::Object(object) => std::slice::from_ref(object.as_ref()),
                AttributeValue::Objects(objects) => objects.as_slice(),
                _ => &[][..],
            })
    }

    /// Iterates mutably over directly embedded referenced objects.
    pub fn references_mut(&mut self) -> impl Iterator<Item = &mut DomainObject> {
        self.attributes
            .values_mut()
            .flat_map(|value| match value {
                AttributeValue::Object(object) => std::slice::from_mut(object.as_mut()),
                AttributeValue::Objects(objects) => objects.as_mut_slice(),
                _ => &mut [][..],
            })
    }
}

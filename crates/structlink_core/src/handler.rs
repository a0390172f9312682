//! Per-kind handlers and the dispatch table.
//!
//! Dispatch is by [`Kind`] through an explicit [`HandlerRegistry`] built at
//! startup. A kind without a handler is [`SyncError::UnsupportedKind`].

use crate::allocator::NamingScheme;
use crate::comparer::{ExactKeyComparer, IdentityComparer, KeyField, ProximityComparer};
use crate::error::{SyncError, SyncResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use structlink_gateway::{EngineAttributes, EngineRef, EngineValue, LABEL_ATTRIBUTE};
use structlink_model::{AttributeValue, DomainObject, Kind};

/// How an attribute is stored in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// A primitive value.
    Scalar,
    /// A position in space.
    Point,
    /// The name of one other object.
    Reference,
    /// The names of several other objects.
    ReferenceList,
}

/// One attribute a kind exchanges with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Attribute name, shared by the domain object and the engine.
    pub name: &'static str,
    /// Storage shape.
    pub shape: FieldShape,
    /// Whether an object without the attribute is invalid.
    pub required: bool,
}

impl FieldSpec {
    /// A required primitive attribute.
    pub const fn scalar(name: &'static str) -> Self {
        Self {
            name,
            shape: FieldShape::Scalar,
            required: true,
        }
    }

    /// A required position.
    pub const fn point(name: &'static str) -> Self {
        Self {
            name,
            shape: FieldShape::Point,
            required: true,
        }
    }

    /// A required reference.
    pub const fn reference(name: &'static str) -> Self {
        Self {
            name,
            shape: FieldShape::Reference,
            required: true,
        }
    }

    /// A required list of references.
    pub const fn references(name: &'static str) -> Self {
        Self {
            name,
            shape: FieldShape::ReferenceList,
            required: true,
        }
    }

    /// Makes the attribute optional.
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Field-by-field mapping between domain objects and engine attributes.
///
/// Shape-specific conversions (profile dimensions, material constants) plug
/// in here; the router never interprets attribute values itself.
pub trait ElementConverter: Send + Sync {
    /// Builds the attribute set to create or update `object` with.
    ///
    /// Every referenced object must already carry an external identity.
    fn to_engine(&self, fields: &[FieldSpec], object: &DomainObject) -> SyncResult<EngineAttributes>;

    /// Maps one primitive engine value back to a domain attribute.
    fn scalar_from_engine(&self, kind: Kind, field: &FieldSpec, value: EngineValue)
        -> SyncResult<AttributeValue>;
}

/// Converter that copies primitive values unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectConverter;

impl DirectConverter {
    fn reference(owner: Kind, target: &DomainObject) -> SyncResult<EngineRef> {
        match target.external_name() {
            Some(name) => Ok(EngineRef::new(target.kind(), name)),
            None => Err(SyncError::MissingReference {
                kind: owner,
                target: format!("{} {}", target.kind(), target.id()),
            }),
        }
    }
}

impl ElementConverter for DirectConverter {
    fn to_engine(&self, fields: &[FieldSpec], object: &DomainObject) -> SyncResult<EngineAttributes> {
        let kind = object.kind();
        let mut attributes = EngineAttributes::new();

        for field in fields {
            let Some(value) = object.attribute(field.name) else {
                if field.required {
                    return Err(SyncError::invalid_object(
                        kind,
                        format!("missing attribute '{}'", field.name),
                    ));
                }
                continue;
            };

            let converted = match (field.shape, value) {
                (FieldShape::Scalar, AttributeValue::Text(s)) => EngineValue::Text(s.clone()),
                (FieldShape::Scalar, AttributeValue::Number(n)) => EngineValue::Number(*n),
                (FieldShape::Scalar, AttributeValue::Integer(i)) => EngineValue::Integer(*i),
                (FieldShape::Scalar, AttributeValue::Bool(b)) => EngineValue::Bool(*b),
                (FieldShape::Scalar, AttributeValue::Point(p)) => EngineValue::Point(*p),
                (FieldShape::Scalar, AttributeValue::Vector(v)) => EngineValue::Vector(*v),
                (FieldShape::Point, AttributeValue::Point(p)) => EngineValue::Point(*p),
                (FieldShape::Reference, AttributeValue::Object(target)) => {
                    EngineValue::Ref(Self::reference(kind, target)?)
                }
                (FieldShape::ReferenceList, AttributeValue::Objects(targets)) => EngineValue::RefList(
                    targets
                        .iter()
                        .map(|target| Self::reference(kind, target))
                        .collect::<SyncResult<_>>()?,
                ),
                _ => {
                    return Err(SyncError::invalid_object(
                        kind,
                        format!("attribute '{}' has the wrong shape", field.name),
                    ))
                }
            };
            attributes.insert(field.name.to_string(), converted);
        }

        if let Some(label) = object.text(LABEL_ATTRIBUTE) {
            attributes.insert(LABEL_ATTRIBUTE.to_string(), EngineValue::from(label));
        }
        Ok(attributes)
    }

    fn scalar_from_engine(
        &self,
        kind: Kind,
        field: &FieldSpec,
        value: EngineValue,
    ) -> SyncResult<AttributeValue> {
        Ok(match value {
            EngineValue::Text(s) => AttributeValue::Text(s),
            EngineValue::Number(n) => AttributeValue::Number(n),
            EngineValue::Integer(i) => AttributeValue::Integer(i),
            EngineValue::Bool(b) => AttributeValue::Bool(b),
            EngineValue::Point(p) => AttributeValue::Point(p),
            EngineValue::Vector(v) => AttributeValue::Vector(v),
            EngineValue::Ref(_) | EngineValue::RefList(_) => {
                return Err(SyncError::invalid_object(
                    kind,
                    format!("engine returned a reference for scalar '{}'", field.name),
                ))
            }
        })
    }
}

/// Everything the router needs to know about one kind.
pub struct KindHandler {
    kind: Kind,
    fields: Vec<FieldSpec>,
    naming: NamingScheme,
    comparer: Box<dyn IdentityComparer>,
    converter: Arc<dyn ElementConverter>,
    position_field: Option<&'static str>,
}

impl KindHandler {
    /// Creates a handler using the [`DirectConverter`].
    pub fn new(
        kind: Kind,
        fields: impl IntoIterator<Item = FieldSpec>,
        naming: NamingScheme,
        comparer: impl IdentityComparer + 'static,
    ) -> Self {
        Self {
            kind,
            fields: fields.into_iter().collect(),
            naming,
            comparer: Box::new(comparer),
            converter: Arc::new(DirectConverter),
            position_field: None,
        }
    }

    /// Replaces the converter.
    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn ElementConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Marks a point attribute as movable through grouped transforms.
    #[must_use]
    pub fn with_position_field(mut self, field: &'static str) -> Self {
        self.position_field = Some(field);
        self
    }

    /// Returns the kind.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Returns the exchanged fields.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Returns the naming scheme.
    pub fn naming(&self) -> NamingScheme {
        self.naming
    }

    /// Returns the identity comparer.
    pub fn comparer(&self) -> &dyn IdentityComparer {
        self.comparer.as_ref()
    }

    /// Returns the converter.
    pub fn converter(&self) -> &dyn ElementConverter {
        self.converter.as_ref()
    }

    /// Returns the point attribute moved by transforms, if any.
    pub fn position_field(&self) -> Option<&'static str> {
        self.position_field
    }

    /// Converts an object to engine attributes.
    pub fn to_engine(&self, object: &DomainObject) -> SyncResult<EngineAttributes> {
        self.converter.to_engine(&self.fields, object)
    }
}

impl fmt::Debug for KindHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindHandler")
            .field("kind", &self.kind)
            .field("fields", &self.fields)
            .field("naming", &self.naming)
            .field("position_field", &self.position_field)
            .finish_non_exhaustive()
    }
}

/// Dispatch table from kind to handler.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Kind, KindHandler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with a handler for every structural kind.
    pub fn structural(tolerance: f64) -> Self {
        let mut registry = Self::new();
        let name = FieldSpec::scalar(DomainObject::NAME);

        registry.register(KindHandler::new(
            Kind::Material,
            [
                name,
                FieldSpec::scalar("modulus").optional(),
                FieldSpec::scalar("density").optional(),
                FieldSpec::scalar("poisson").optional(),
            ],
            NamingScheme::Prefixed,
            ExactKeyComparer::by_name(),
        ));
        registry.register(KindHandler::new(
            Kind::SectionProperty,
            [
                name,
                FieldSpec::reference("material"),
                FieldSpec::scalar("shape").optional(),
                FieldSpec::scalar("area").optional(),
            ],
            NamingScheme::Prefixed,
            ExactKeyComparer::by_name(),
        ));
        registry.register(KindHandler::new(
            Kind::SurfaceProperty,
            [
                name,
                FieldSpec::reference("material"),
                FieldSpec::scalar("thickness").optional(),
            ],
            NamingScheme::Prefixed,
            ExactKeyComparer::by_name(),
        ));
        registry.register(
            KindHandler::new(
                Kind::Node,
                [
                    FieldSpec::point(DomainObject::POSITION),
                    FieldSpec::scalar("support").optional(),
                ],
                NamingScheme::Numeric,
                ProximityComparer::new(tolerance),
            )
            .with_position_field(DomainObject::POSITION),
        );
        registry.register(KindHandler::new(
            Kind::Bar,
            [
                FieldSpec::reference("start"),
                FieldSpec::reference("end"),
                FieldSpec::reference("section").optional(),
                FieldSpec::scalar("angle").optional(),
            ],
            NamingScheme::Numeric,
            ExactKeyComparer::by_references(&["start", "end"]),
        ));
        registry.register(KindHandler::new(
            Kind::Panel,
            [
                FieldSpec::references("corners"),
                FieldSpec::reference("property").optional(),
            ],
            NamingScheme::Numeric,
            ExactKeyComparer::by_references(&["corners"]),
        ));
        registry.register(KindHandler::new(
            Kind::LoadCase,
            [name, FieldSpec::scalar("nature").optional()],
            NamingScheme::Prefixed,
            ExactKeyComparer::by_name(),
        ));
        registry.register(KindHandler::new(
            Kind::LoadCombination,
            [
                name,
                FieldSpec::scalar("description").optional(),
                FieldSpec::references("cases").optional(),
            ],
            NamingScheme::Prefixed,
            ExactKeyComparer::new([KeyField::Text(DomainObject::NAME), KeyField::OptionalText("description")]),
        ));
        registry.register(KindHandler::new(
            Kind::Load,
            [
                name,
                FieldSpec::reference("case"),
                FieldSpec::reference("target"),
                FieldSpec::scalar("force").optional(),
            ],
            NamingScheme::Prefixed,
            ExactKeyComparer::by_name(),
        ));
        registry
    }

    /// Registers a handler, returning the one it replaces.
    pub fn register(&mut self, handler: KindHandler) -> Option<KindHandler> {
        self.handlers.insert(handler.kind(), handler)
    }

    /// Removes the handler of a kind.
    pub fn unregister(&mut self, kind: Kind) -> Option<KindHandler> {
        self.handlers.remove(&kind)
    }

    /// Returns the handler of a kind.
    pub fn get(&self, kind: Kind) -> SyncResult<&KindHandler> {
        self.handlers
            .get(&kind)
            .ok_or_else(|| SyncError::UnsupportedKind(kind.to_string()))
    }

    /// Returns true if the kind has a handler.
    pub fn supports(&self, kind: Kind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

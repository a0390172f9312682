//! Identity comparers.
//!
//! A comparer decides whether two domain objects of one kind denote the
//! same external object. Two policies exist:
//!
//! - [`ExactKeyComparer`]: equal iff a canonical key matches exactly
//! - [`ProximityComparer`]: equal iff positions are within a tolerance
//!
//! # Hash contract
//!
//! `is_same(a, b)` implies `b`'s home bucket is among `a`'s probe buckets.
//! Proximity hashing buckets coordinates by the tolerance and probes the
//! neighbouring cells, so near-equal positions on opposite sides of a cell
//! boundary still meet.
//!
//! Proximity equality is not transitive: with `p1~p2` and `p2~p3` but not
//! `p1~p3`, [`IdentityIndex`] resolves ties by insertion order, and the
//! earliest matching entry wins.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use structlink_model::{AttributeValue, DomainObject, Point3};

/// Per-kind equality and hashing.
pub trait IdentityComparer: Send + Sync {
    /// Returns true if both objects denote the same external object.
    fn is_same(&self, a: &DomainObject, b: &DomainObject) -> bool;

    /// Returns the home bucket of an object.
    fn hash(&self, object: &DomainObject) -> u64;

    /// Returns every bucket a matching object may live in.
    fn probe(&self, object: &DomainObject) -> Vec<u64> {
        vec![self.hash(object)]
    }

    /// Returns true if the object carries the attributes the comparison needs.
    fn has_key(&self, object: &DomainObject) -> bool;
}

/// One component of an exact key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    /// A required text attribute.
    Text(&'static str),
    /// A text attribute that reads as empty when absent.
    OptionalText(&'static str),
    /// External names of the objects referenced by these attributes.
    References {
        /// Reference attributes to collect.
        attributes: &'static [&'static str],
        /// Keep the collected names in attribute order instead of sorting them.
        ordered: bool,
    },
}

/// Equality by a canonical key.
#[derive(Debug, Clone)]
pub struct ExactKeyComparer {
    fields: Vec<KeyField>,
}

impl ExactKeyComparer {
    /// Creates a comparer over the given key fields.
    pub fn new(fields: impl IntoIterator<Item = KeyField>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Equality by the `name` attribute.
    pub fn by_name() -> Self {
        Self::new([KeyField::Text(DomainObject::NAME)])
    }

    /// Equality by the unordered set of referenced objects.
    pub fn by_references(attributes: &'static [&'static str]) -> Self {
        Self::new([KeyField::References {
            attributes,
            ordered: false,
        }])
    }

    /// Returns the canonical key, or `None` if a component is missing.
    ///
    /// Referenced objects only contribute once they carry an external
    /// identity.
    pub fn key(&self, object: &DomainObject) -> Option<Vec<String>> {
        let mut key = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match *field {
                KeyField::Text(name) => key.push(object.text(name)?.to_string()),
                KeyField::OptionalText(name) => {
                    key.push(object.text(name).unwrap_or_default().to_string())
                }
                KeyField::References {
                    attributes,
                    ordered,
                } => {
                    let mut names = Vec::new();
                    for attribute in attributes {
                        match object.attribute(attribute)? {
                            AttributeValue::Object(target) => {
                                names.push(target.external_name()?.to_string())
                            }
                            AttributeValue::Objects(targets) => {
                                for target in targets {
                                    names.push(target.external_name()?.to_string());
                                }
                            }
                            _ => return None,
                        }
                    }
                    if !ordered {
                        names.sort();
                    }
                    key.push(names.join("|"));
                }
            }
        }
        Some(key)
    }
}

impl IdentityComparer for ExactKeyComparer {
    fn is_same(&self, a: &DomainObject, b: &DomainObject) -> bool {
        match (self.key(a), self.key(b)) {
            (Some(ka), Some(kb)) => ka == kb,
            _ => false,
        }
    }

    fn hash(&self, object: &DomainObject) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.key(object).hash(&mut hasher);
        hasher.finish()
    }

    fn has_key(&self, object: &DomainObject) -> bool {
        self.key(object).is_some()
    }
}

/// Equality by distance between positions.
#[derive(Debug, Clone)]
pub struct ProximityComparer {
    tolerance: f64,
    attribute: &'static str,
}

impl ProximityComparer {
    /// Creates a comparer on the `position` attribute.
    pub fn new(tolerance: f64) -> Self {
        Self::on(DomainObject::POSITION, tolerance)
    }

    /// Creates a comparer on a point attribute.
    pub fn on(attribute: &'static str, tolerance: f64) -> Self {
        Self {
            tolerance: tolerance.max(f64::MIN_POSITIVE),
            attribute,
        }
    }

    /// Returns the tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    fn point(&self, object: &DomainObject) -> Option<Point3> {
        object.attribute(self.attribute).and_then(AttributeValue::as_point)
    }

    fn cell(&self, point: Point3) -> [i64; 3] {
        let bucket = |v: f64| (v / self.tolerance).floor() as i64;
        [bucket(point.x), bucket(point.y), bucket(point.z)]
    }

    fn hash_cell(cell: [i64; 3]) -> u64 {
        let mut hasher = DefaultHasher::new();
        cell.hash(&mut hasher);
        hasher.finish()
    }
}

impl IdentityComparer for ProximityComparer {
    fn is_same(&self, a: &DomainObject, b: &DomainObject) -> bool {
        match (self.point(a), self.point(b)) {
            (Some(pa), Some(pb)) => pa.distance(&pb) <= self.tolerance,
            _ => false,
        }
    }

    fn hash(&self, object: &DomainObject) -> u64 {
        match self.point(object) {
            Some(point) => Self::hash_cell(self.cell(point)),
            None => 0,
        }
    }

    fn probe(&self, object: &DomainObject) -> Vec<u64> {
        let Some(point) = self.point(object) else {
            return vec![0];
        };
        let [x, y, z] = self.cell(point);
        let mut buckets = Vec::with_capacity(27);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    buckets.push(Self::hash_cell([
                        x.saturating_add(dx),
                        y.saturating_add(dy),
                        z.saturating_add(dz),
                    ]));
                }
            }
        }
        buckets
    }

    fn has_key(&self, object: &DomainObject) -> bool {
        self.point(object).is_some()
    }
}

/// Bucketed lookup of objects by a comparer.
///
/// Entries keep insertion order; when several entries match a probe, the
/// earliest inserted one is returned.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    buckets: HashMap<u64, Vec<usize>>,
    objects: Vec<DomainObject>,
}

impl IdentityIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object and returns its position.
    pub fn insert(&mut self, comparer: &dyn IdentityComparer, object: DomainObject) -> usize {
        let position = self.objects.len();
        self.buckets
            .entry(comparer.hash(&object))
            .or_default()
            .push(position);
        self.objects.push(object);
        position
    }

    /// Returns the position of the earliest entry that matches `object`.
    pub fn find(&self, comparer: &dyn IdentityComparer, object: &DomainObject) -> Option<usize> {
        comparer
            .probe(object)
            .into_iter()
            .filter_map(|bucket| self.buckets.get(&bucket))
            .flatten()
            .copied()
            .filter(|&position| comparer.is_same(&self.objects[position], object))
            .min()
    }

    /// Returns the matching entry, or inserts `object` if none matches.
    ///
    /// `Ok` carries the position of an existing match, `Err` the position of
    /// the newly inserted object.
    pub fn find_or_insert(
        &mut self,
        comparer: &dyn IdentityComparer,
        object: DomainObject,
    ) -> Result<usize, usize> {
        match self.find(comparer, &object) {
            Some(position) => Ok(position),
            None => Err(self.insert(comparer, object)),
        }
    }

    /// Returns the entry at `position`.
    pub fn get(&self, position: usize) -> Option<&DomainObject> {
        self.objects.get(position)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &DomainObject> {
        self.objects.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use structlink_model::{ExternalIdentity, Kind};

    const EPS: f64 = 1e-3;

    fn node(x: f64, y: f64, z: f64) -> DomainObject {
        DomainObject::node(Point3::new(x, y, z))
    }

    fn named_node(name: &str, x: f64) -> DomainObject {
        node(x, 0.0, 0.0).with_identity(ExternalIdentity::named(name))
    }

    fn bar(start: DomainObject, end: DomainObject) -> DomainObject {
        DomainObject::new(Kind::Bar)
            .with_attribute("start", start)
            .with_attribute("end", end)
    }

    #[test]
    fn proximity_equality() {
        let comparer = ProximityComparer::new(EPS);
        assert!(comparer.is_same(&node(0.0, 0.0, 0.0), &node(0.0005, 0.0, 0.0)));
        assert!(!comparer.is_same(&node(0.0, 0.0, 0.0), &node(0.002, 0.0, 0.0)));
        assert!(!comparer.is_same(&node(0.0, 0.0, 0.0), &DomainObject::new(Kind::Node)));
    }

    #[test]
    fn proximity_probe_crosses_cell_boundary() {
        let comparer = ProximityComparer::new(EPS);
        let a = node(0.0009999, 0.0, 0.0);
        let b = node(0.0010001, 0.0, 0.0);
        assert!(comparer.is_same(&a, &b));
        assert_ne!(comparer.hash(&a), comparer.hash(&b));
        assert!(comparer.probe(&a).contains(&comparer.hash(&b)));

        let mut index = IdentityIndex::new();
        index.insert(&comparer, a);
        assert_eq!(index.find(&comparer, &b), Some(0));
    }

    #[test]
    fn proximity_hash_is_stable_for_negative_coordinates() {
        let comparer = ProximityComparer::new(EPS);
        let a = node(-1.2345, -0.0001, 3.0);
        let b = node(-1.2345, -0.0001, 3.0);
        assert_eq!(comparer.hash(&a), comparer.hash(&b));
    }

    #[test]
    fn proximity_tie_break_is_first_seen() {
        let comparer = ProximityComparer::new(EPS);
        let p1 = node(0.0, 0.0, 0.0);
        let p2 = node(0.0008, 0.0, 0.0);
        let p3 = node(0.0016, 0.0, 0.0);

        assert!(comparer.is_same(&p1, &p2));
        assert!(comparer.is_same(&p2, &p3));
        assert!(!comparer.is_same(&p1, &p3));

        let mut index = IdentityIndex::new();
        assert_eq!(index.find_or_insert(&comparer, p1), Err(0));
        assert_eq!(index.find_or_insert(&comparer, p2), Ok(0));
        assert_eq!(index.find_or_insert(&comparer, p3), Err(1));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn earliest_match_wins() {
        let comparer = ProximityComparer::new(EPS);
        let mut index = IdentityIndex::new();
        index.insert(&comparer, node(0.0, 0.0, 0.0));
        index.insert(&comparer, node(0.0016, 0.0, 0.0));

        // Within tolerance of both entries.
        assert_eq!(index.find(&comparer, &node(0.0008, 0.0, 0.0)), Some(0));
    }

    #[test]
    fn exact_by_name() {
        let comparer = ExactKeyComparer::by_name();
        let a = DomainObject::named(Kind::Material, "S355");
        let b = DomainObject::named(Kind::Material, "S355");
        let c = DomainObject::named(Kind::Material, "S275");

        assert!(comparer.is_same(&a, &b));
        assert_eq!(comparer.hash(&a), comparer.hash(&b));
        assert!(!comparer.is_same(&a, &c));
        assert!(!comparer.has_key(&DomainObject::new(Kind::Material)));
    }

    #[test]
    fn exact_name_and_optional_description() {
        let comparer = ExactKeyComparer::new([
            KeyField::Text("name"),
            KeyField::OptionalText("description"),
        ]);
        let plain = DomainObject::named(Kind::LoadCombination, "ULS");
        let described = plain.clone().with_attribute("description", "1.35G + 1.5Q");

        assert!(comparer.has_key(&plain));
        assert!(comparer.is_same(&plain, &plain.clone()));
        assert!(!comparer.is_same(&plain, &described));
    }

    #[test]
    fn bars_compare_by_endpoint_names() {
        let comparer = ExactKeyComparer::by_references(&["start", "end"]);
        let forward = bar(named_node("1", 0.0), named_node("2", 1.0));
        let reversed = bar(named_node("2", 1.0), named_node("1", 0.0));
        let other = bar(named_node("1", 0.0), named_node("3", 2.0));

        assert!(comparer.is_same(&forward, &reversed));
        assert_eq!(comparer.hash(&forward), comparer.hash(&reversed));
        assert!(!comparer.is_same(&forward, &other));
    }

    #[test]
    fn unresolved_references_have_no_key() {
        let comparer = ExactKeyComparer::by_references(&["start", "end"]);
        let unresolved = bar(node(0.0, 0.0, 0.0), named_node("2", 1.0));
        assert!(!comparer.has_key(&unresolved));
        assert!(!comparer.is_same(&unresolved, &unresolved));
    }

    #[test]
    fn panels_compare_by_corner_set() {
        let comparer = ExactKeyComparer::by_references(&["corners"]);
        let corners = |names: &[&str]| {
            names
                .iter()
                .map(|n| named_node(n, 0.0))
                .collect::<Vec<_>>()
        };
        let a = DomainObject::new(Kind::Panel).with_attribute("corners", corners(&["1", "2", "3"]));
        let b = DomainObject::new(Kind::Panel).with_attribute("corners", corners(&["3", "1", "2"]));
        assert!(comparer.is_same(&a, &b));
    }
}

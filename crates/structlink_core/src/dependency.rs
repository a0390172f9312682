//! Dependency ordering of kinds.
//!
//! A push must create prerequisite objects before the objects that
//! reference them. The requirement table is a directed graph that must be
//! acyclic; [`DependencyGraph::order`] sorts a set of kinds so every kind
//! follows all of its prerequisites.

use crate::error::{SyncError, SyncResult};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::hash::Hash;
use structlink_model::Kind;

/// Prerequisites of each structural kind.
pub const fn requirements(kind: Kind) -> &'static [Kind] {
    match kind {
        Kind::Material | Kind::Node | Kind::LoadCase => &[],
        Kind::SectionProperty | Kind::SurfaceProperty => &[Kind::Material],
        Kind::Bar => &[Kind::Node, Kind::SectionProperty],
        Kind::Panel => &[Kind::Node, Kind::SurfaceProperty],
        Kind::LoadCombination => &[Kind::LoadCase],
        Kind::Load => &[Kind::LoadCase, Kind::Node, Kind::Bar, Kind::Panel],
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// A requirement table between kinds.
#[derive(Debug, Clone)]
pub struct DependencyGraph<K> {
    edges: BTreeMap<K, Vec<K>>,
}

impl<K: Copy + Ord + Hash + Display> DependencyGraph<K> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            edges: BTreeMap::new(),
        }
    }

    /// Records that `kind` requires `prerequisite`.
    pub fn add_requirement(&mut self, kind: K, prerequisite: K) {
        let deps = self.edges.entry(kind).or_default();
        if !deps.contains(&prerequisite) {
            deps.push(prerequisite);
        }
        self.edges.entry(prerequisite).or_default();
    }

    /// Returns the direct prerequisites of `kind`.
    pub fn requirements(&self, kind: K) -> &[K] {
        self.edges.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns every kind known to the graph.
    pub fn kinds(&self) -> impl Iterator<Item = K> + '_ {
        self.edges.keys().copied()
    }

    /// Sorts `kinds` so every kind follows its prerequisites.
    ///
    /// Only the requested kinds are returned, but the walk goes through
    /// prerequisites that were not requested, so indirect requirements
    /// (`A` requires `B` requires `C`, with only `A` and `C` requested)
    /// still order `C` before `A`. Duplicate inputs appear once. Ties keep
    /// the input order.
    pub fn order(&self, kinds: &[K]) -> SyncResult<Vec<K>> {
        let requested: Vec<K> = kinds.to_vec();
        let mut marks: HashMap<K, Mark> = HashMap::new();
        let mut stack: Vec<K> = Vec::new();
        let mut output = Vec::with_capacity(kinds.len());

        for &kind in kinds {
            self.visit(kind, &requested, &mut marks, &mut stack, &mut output)?;
        }
        Ok(output)
    }

    /// Checks the whole table for cycles.
    pub fn validate(&self) -> SyncResult<()> {
        let all: Vec<K> = self.kinds().collect();
        self.order(&all).map(|_| ())
    }

    fn visit(
        &self,
        kind: K,
        requested: &[K],
        marks: &mut HashMap<K, Mark>,
        stack: &mut Vec<K>,
        output: &mut Vec<K>,
    ) -> SyncResult<()> {
        match marks.get(&kind) {
            Some(Mark::Visited) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|k| *k == kind).unwrap_or(0);
                let mut path: Vec<String> = stack[start..].iter().map(K::to_string).collect();
                path.push(kind.to_string());
                return Err(SyncError::DependencyCycle { path });
            }
            None => {}
        }

        marks.insert(kind, Mark::Visiting);
        stack.push(kind);
        for &prerequisite in self.requirements(kind) {
            self.visit(prerequisite, requested, marks, stack, output)?;
        }
        stack.pop();
        marks.insert(kind, Mark::Visited);

        if requested.contains(&kind) {
            output.push(kind);
        }
        Ok(())
    }
}

impl<K: Copy + Ord + Hash + Display> Default for DependencyGraph<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Ord + Hash + Display> FromIterator<(K, K)> for DependencyGraph<K> {
    fn from_iter<I: IntoIterator<Item = (K, K)>>(iter: I) -> Self {
        let mut graph = Self::new();
        for (kind, prerequisite) in iter {
            graph.add_requirement(kind, prerequisite);
        }
        graph
    }
}

impl DependencyGraph<Kind> {
    /// Builds the graph of the structural kinds.
    pub fn structural() -> Self {
        let mut graph = Self::new();
        for kind in Kind::ALL {
            graph.edges.entry(kind).or_default();
            for &prerequisite in requirements(kind) {
                graph.add_requirement(kind, prerequisite);
            }
        }
        graph
    }
}

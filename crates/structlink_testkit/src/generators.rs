//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;
use structlink_model::{Point3, Vector3};

/// A random acyclic dependency table over kinds `0..kinds`.
#[derive(Debug, Clone)]
pub struct AcyclicTable {
    /// Number of kinds.
    pub kinds: usize,
    /// `(dependent, requirement)` pairs; the requirement always has the
    /// lower index, which keeps the table acyclic.
    pub edges: Vec<(usize, usize)>,
    /// Kinds to order, shuffled.
    pub request: Vec<usize>,
}

impl AcyclicTable {
    /// Returns true if `from` requires `to`, directly or transitively.
    pub fn requires(&self, from: usize, to: usize) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.kinds];
        while let Some(kind) = stack.pop() {
            for &(dependent, requirement) in &self.edges {
                if dependent == kind && !seen[requirement] {
                    if requirement == to {
                        return true;
                    }
                    seen[requirement] = true;
                    stack.push(requirement);
                }
            }
        }
        false
    }
}

/// Strategy for acyclic dependency tables of up to `max_kinds` kinds.
pub fn acyclic_table_strategy(max_kinds: usize) -> impl Strategy<Value = AcyclicTable> {
    (1..=max_kinds.max(1)).prop_flat_map(|kinds| {
        let pairs: Vec<(usize, usize)> = (0..kinds)
            .flat_map(|dependent| (0..dependent).map(move |requirement| (dependent, requirement)))
            .collect();
        let max_edges = pairs.len();
        let all: Vec<usize> = (0..kinds).collect();
        (
            Just(kinds),
            proptest::sample::subsequence(pairs, 0..=max_edges),
            proptest::sample::subsequence(all, 1..=kinds).prop_shuffle(),
        )
            .prop_map(|(kinds, edges, request)| AcyclicTable {
                kinds,
                edges,
                request,
            })
    })
}

/// Strategy for node positions inside a 200 m cube.
pub fn position_strategy() -> impl Strategy<Value = Point3> {
    (-100.0..100.0f64, -100.0..100.0f64, -100.0..100.0f64)
        .prop_map(|(x, y, z)| Point3::new(x, y, z))
}

/// Strategy for position deltas drawn from a small palette, so that many
/// objects share the same axis amounts.
pub fn delta_grid_strategy(max_objects: usize) -> impl Strategy<Value = Vec<Vector3>> {
    let amount = || prop::sample::select(vec![0.0, 0.5, -1.0, 2.0, 3.25]);
    prop::collection::vec(
        (amount(), amount(), amount()).prop_map(|(x, y, z)| Vector3::new(x, y, z)),
        1..max_objects.max(2),
    )
}

/// Strategy for names already present in an engine: numeric names mixed
/// with names no numeric scheme would produce.
pub fn taken_names_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop_oneof![
            3 => (1u32..500).prop_map(|n| n.to_string()),
            1 => prop::string::string_regex("[a-z]{1,4}").expect("Invalid regex"),
        ],
        0..40,
    )
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

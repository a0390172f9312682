//! Benchmark utilities.

#![warn(missing_docs)]

use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use structlink_core::{AdapterConfig, SyncAdapter};
use structlink_gateway::InMemoryEngine;
use structlink_model::{DomainObject, Point3, Vector3};

/// Adapter over the in-memory engine.
pub type BenchAdapter = SyncAdapter<InMemoryEngine, InMemoryEngine>;

/// Story heights a shift is drawn from.
pub const SHIFTS: [f64; 4] = [0.5, 1.0, 3.0, 3.5];

/// Generate a square grid of nodes with a little random jitter in plan.
pub fn jittered_grid(side: usize, spacing: f64) -> Vec<DomainObject> {
    let mut rng = rand::thread_rng();
    let mut nodes = Vec::with_capacity(side * side);
    for row in 0..side {
        for column in 0..side {
            let x = column as f64 * spacing + rng.gen_range(-0.1..0.1);
            let y = row as f64 * spacing + rng.gen_range(-0.1..0.1);
            nodes.push(DomainObject::node(Point3::new(x, y, 0.0)));
        }
    }
    nodes
}

/// Generate one vertical shift per node, drawn from `distinct` story heights.
pub fn random_shifts(count: usize, distinct: usize) -> Vec<Vector3> {
    let mut rng = rand::thread_rng();
    let palette = &SHIFTS[..distinct.clamp(1, SHIFTS.len())];
    (0..count)
        .map(|_| {
            let z = palette.choose(&mut rng).copied().unwrap_or(1.0);
            Vector3::new(0.0, 0.0, z)
        })
        .collect()
}

/// Apply shifts to node positions.
pub fn apply_shifts(nodes: &mut [DomainObject], shifts: &[Vector3]) {
    for (node, shift) in nodes.iter_mut().zip(shifts) {
        if let Some(position) = node.position() {
            node.set_attribute(DomainObject::POSITION, position + *shift);
        }
    }
}

/// Create an engine holding `nodes`, returning the adapter that pushed them.
pub fn engine_with(nodes: &mut [DomainObject], config: AdapterConfig) -> BenchAdapter {
    let engine = Arc::new(InMemoryEngine::new());
    let adapter = SyncAdapter::new(config, engine.clone(), engine).unwrap();
    adapter.push(nodes).unwrap();
    adapter
}

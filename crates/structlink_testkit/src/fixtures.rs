//! Test fixtures and engine helpers.
//!
//! Provides an in-memory engine wired to an adapter, plus the frames most
//! tests push: the four-node ring, rectangular story grids and frames
//! described in JSON.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use structlink_core::{AdapterConfig, SyncAdapter};
use structlink_gateway::InMemoryEngine;
use structlink_model::{DomainObject, Kind, Point3, Vector3};

/// Adapter type used throughout the tests.
pub type TestAdapter = SyncAdapter<InMemoryEngine, InMemoryEngine>;

/// An in-memory engine with an adapter attached.
pub struct TestEngine {
    /// The engine, shared with the adapter.
    pub engine: Arc<InMemoryEngine>,
    /// The adapter.
    pub adapter: TestAdapter,
}

impl TestEngine {
    /// Creates an empty engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(AdapterConfig::default())
    }

    /// Creates an empty engine with the given configuration.
    pub fn with_config(config: AdapterConfig) -> Self {
        let engine = Arc::new(InMemoryEngine::new());
        let adapter = SyncAdapter::new(config, engine.clone(), engine.clone())
            .expect("Structural dependency table is acyclic");
        Self { engine, adapter }
    }

    /// Opens a second adapter on the same engine, as a new session would.
    pub fn reopen(&self, config: AdapterConfig) -> TestAdapter {
        SyncAdapter::new(config, self.engine.clone(), self.engine.clone())
            .expect("Structural dependency table is acyclic")
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestEngine {
    type Target = TestAdapter;

    fn deref(&self) -> &Self::Target {
        &self.adapter
    }
}

/// Creates a bar between two nodes.
pub fn bar(start: &DomainObject, end: &DomainObject) -> DomainObject {
    DomainObject::new(Kind::Bar)
        .with_attribute("start", start.clone())
        .with_attribute("end", end.clone())
}

/// Creates bars between pairs of node indices.
pub fn bars_between(nodes: &[DomainObject], pairs: &[[usize; 2]]) -> Vec<DomainObject> {
    pairs
        .iter()
        .map(|[start, end]| bar(&nodes[*start], &nodes[*end]))
        .collect()
}

/// Four nodes on the unit square at z = 0 and the four bars joining them.
pub fn ring() -> (Vec<DomainObject>, Vec<DomainObject>) {
    let nodes: Vec<DomainObject> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
        .into_iter()
        .map(|(x, y)| DomainObject::node(Point3::new(x, y, 0.0)))
        .collect();
    let bars = bars_between(&nodes, &[[0, 1], [1, 2], [2, 3], [3, 0]]);
    (nodes, bars)
}

/// A `columns` x `rows` grid of nodes at `elevation`, `spacing` apart.
pub fn story_grid(columns: usize, rows: usize, spacing: f64, elevation: f64) -> Vec<DomainObject> {
    let mut nodes = Vec::with_capacity(columns * rows);
    for row in 0..rows {
        for column in 0..columns {
            let position = Point3::new(column as f64 * spacing, row as f64 * spacing, elevation);
            nodes.push(DomainObject::node(position));
        }
    }
    nodes
}

/// Moves every positioned object by `delta`.
pub fn shift(objects: &mut [DomainObject], delta: Vector3) {
    for object in objects.iter_mut() {
        if let Some(position) = object.position() {
            object.set_attribute(DomainObject::POSITION, position + delta);
        }
    }
}

/// A frame described by node coordinates and bar index pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameFixture {
    /// Node coordinates.
    pub nodes: Vec<[f64; 3]>,
    /// Bars as pairs of node indices.
    #[serde(default)]
    pub bars: Vec<[usize; 2]>,
}

impl FrameFixture {
    /// Parses a fixture from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Builds the domain objects: nodes first, then bars.
    pub fn build(&self) -> (Vec<DomainObject>, Vec<DomainObject>) {
        let nodes: Vec<DomainObject> = self
            .nodes
            .iter()
            .map(|[x, y, z]| DomainObject::node(Point3::new(*x, *y, *z)))
            .collect();
        let bars = bars_between(&nodes, &self.bars);
        (nodes, bars)
    }
}

/// A two-bay portal frame.
pub const PORTAL_JSON: &str = r#"{
    "nodes": [[0, 0, 0], [0, 0, 3], [5, 0, 3], [5, 0, 0], [10, 0, 3], [10, 0, 0]],
    "bars": [[0, 1], [1, 2], [2, 3], [2, 4], [4, 5]]
}"#;

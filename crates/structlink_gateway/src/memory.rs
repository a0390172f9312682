//! In-memory engine for testing.

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{
    EngineGateway, EngineSession, LABEL_ATTRIBUTE, PERSISTENT_ID_ATTRIBUTE, UNTITLED_MODEL,
};
use crate::value::{EngineAttributes, EngineRef, EngineValue};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use structlink_model::{Axis, Kind};
use uuid::Uuid;

/// Number of calls made to each engine verb.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `add_element` calls.
    pub add: u64,
    /// `set_attribute` calls.
    pub set: u64,
    /// `get_attribute` calls.
    pub get: u64,
    /// `list_names` calls.
    pub list: u64,
    /// `select` calls.
    pub select: u64,
    /// `clear_selection` calls.
    pub clear: u64,
    /// `apply_transform` calls.
    pub transform: u64,
    /// `remove` calls.
    pub remove: u64,
}

impl CallCounts {
    /// Calls that change the model.
    pub fn mutating(&self) -> u64 {
        self.add + self.set + self.transform + self.remove
    }
}

#[derive(Debug, Clone)]
struct Row {
    attributes: EngineAttributes,
    label: String,
    guid: String,
}

#[derive(Debug, Default)]
struct Table {
    order: Vec<String>,
    rows: HashMap<String, Row>,
}

#[derive(Debug)]
struct EngineState {
    tables: HashMap<Kind, Table>,
    selection: Vec<(Kind, String)>,
    ready: bool,
    model_path: Option<String>,
}

#[derive(Debug, Default)]
struct FaultPlan {
    list: HashSet<Kind>,
    add: HashSet<Kind>,
    get: HashSet<(Kind, String)>,
    select: HashSet<(Kind, String)>,
    transform_calls: HashSet<u64>,
}

/// An engine that keeps its model in memory.
///
/// This engine behaves like the external engine at the call boundary:
/// - names are unique per kind
/// - every created object gets a random persistent id
/// - attributes may only reference existing objects
/// - referenced objects cannot be removed
/// - transforms move the `position` of every selected object
///
/// It also records how many times each verb was called and can be told to
/// fail specific calls, which makes it suitable for:
/// - Unit tests
/// - Integration tests
/// - Benchmarks
///
/// # Example
///
/// ```rust
/// use structlink_gateway::{EngineAttributes, EngineGateway, InMemoryEngine};
/// use structlink_model::{Kind, Point3};
///
/// let engine = InMemoryEngine::new();
/// let mut attrs = EngineAttributes::new();
/// attrs.insert("position".into(), Point3::new(0.0, 0.0, 3.0).into());
///
/// let name = engine.add_element(Kind::Node, "1", &attrs).unwrap();
/// assert_eq!(name, "1");
/// assert_eq!(engine.list_names(Kind::Node).unwrap(), vec!["1".to_string()]);
/// assert_eq!(engine.calls().add, 1);
/// ```
#[derive(Debug)]
pub struct InMemoryEngine {
    state: Mutex<EngineState>,
    calls: Mutex<CallCounts>,
    faults: Mutex<FaultPlan>,
}

impl InMemoryEngine {
    /// Creates a ready engine with an empty, untitled model.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState {
                tables: HashMap::new(),
                selection: Vec::new(),
                ready: true,
                model_path: None,
            }),
            calls: Mutex::new(CallCounts::default()),
            faults: Mutex::new(FaultPlan::default()),
        }
    }

    /// Sets whether the engine reports itself ready.
    pub fn set_ready(&self, ready: bool) {
        self.state.lock().ready = ready;
    }

    /// Sets the path of the open model; `None` means untitled.
    pub fn set_model_path(&self, path: Option<&str>) {
        self.state.lock().model_path = path.map(str::to_string);
    }

    /// Returns a snapshot of the call counters.
    pub fn calls(&self) -> CallCounts {
        *self.calls.lock()
    }

    /// Resets the call counters.
    pub fn reset_calls(&self) {
        *self.calls.lock() = CallCounts::default();
    }

    /// Returns the current selection.
    pub fn selection(&self) -> Vec<(Kind, String)> {
        self.state.lock().selection.clone()
    }

    /// Returns the names of a kind without counting a call.
    pub fn names(&self, kind: Kind) -> Vec<String> {
        self.state
            .lock()
            .tables
            .get(&kind)
            .map(|table| table.order.clone())
            .unwrap_or_default()
    }

    /// Returns the number of objects of a kind.
    pub fn object_count(&self, kind: Kind) -> usize {
        self.state
            .lock()
            .tables
            .get(&kind)
            .map_or(0, |table| table.order.len())
    }

    /// Returns the stored attributes of an object without counting a call.
    pub fn attributes_of(&self, kind: Kind, name: &str) -> Option<EngineAttributes> {
        self.state
            .lock()
            .tables
            .get(&kind)
            .and_then(|table| table.rows.get(name))
            .map(|row| row.attributes.clone())
    }

    /// Returns the persistent id of an object without counting a call.
    pub fn persistent_id_of(&self, kind: Kind, name: &str) -> Option<String> {
        self.state
            .lock()
            .tables
            .get(&kind)
            .and_then(|table| table.rows.get(name))
            .map(|row| row.guid.clone())
    }

    /// Inserts an object as if a previous session had created it.
    ///
    /// Referential integrity is enforced, but no call is counted.
    pub fn seed(&self, kind: Kind, name: &str, attributes: EngineAttributes) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.insert(kind, name, attributes)
    }

    /// Renames an object the way a user editing the model would.
    ///
    /// The persistent id is kept and references are rewritten.
    pub fn rename(&self, kind: Kind, from: &str, to: &str) -> GatewayResult<()> {
        let mut state = self.state.lock();
        let table = state.tables.entry(kind).or_default();
        if table.rows.contains_key(to) {
            return Err(GatewayError::NameInUse {
                kind,
                name: to.to_string(),
            });
        }
        let row = table.rows.remove(from).ok_or_else(|| GatewayError::NotFound {
            kind,
            name: from.to_string(),
        })?;
        table.rows.insert(to.to_string(), row);
        for entry in &mut table.order {
            if entry == from {
                *entry = to.to_string();
            }
        }

        let old = EngineRef::new(kind, from);
        for table in state.tables.values_mut() {
            for row in table.rows.values_mut() {
                for value in row.attributes.values_mut() {
                    rewrite_reference(value, &old, to);
                }
            }
        }
        Ok(())
    }

    /// Makes every `list_names` call for `kind` fail.
    pub fn fail_list_names(&self, kind: Kind) {
        self.faults.lock().list.insert(kind);
    }

    /// Makes every `add_element` call for `kind` fail.
    pub fn fail_add(&self, kind: Kind) {
        self.faults.lock().add.insert(kind);
    }

    /// Makes every `get_attribute` call on one object fail.
    pub fn fail_get(&self, kind: Kind, name: &str) {
        self.faults.lock().get.insert((kind, name.to_string()));
    }

    /// Makes every `select` call on one object fail.
    pub fn fail_select(&self, kind: Kind, name: &str) {
        self.faults.lock().select.insert((kind, name.to_string()));
    }

    /// Makes the n-th `apply_transform` call (1-based, counted from creation
    /// or the last [`reset_calls`](Self::reset_calls)) fail.
    pub fn fail_transform_call(&self, n: u64) {
        self.faults.lock().transform_calls.insert(n);
    }

    /// Removes every injected fault.
    pub fn clear_faults(&self) {
        *self.faults.lock() = FaultPlan::default();
    }

    fn count(&self, f: impl FnOnce(&mut CallCounts)) {
        f(&mut self.calls.lock());
    }

    fn ensure_ready(&self) -> GatewayResult<()> {
        if self.state.lock().ready {
            Ok(())
        } else {
            Err(GatewayError::NotReady)
        }
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    fn row(&self, kind: Kind, name: &str) -> GatewayResult<&Row> {
        self.tables
            .get(&kind)
            .and_then(|table| table.rows.get(name))
            .ok_or_else(|| GatewayError::NotFound {
                kind,
                name: name.to_string(),
            })
    }

    fn exists(&self, reference: &EngineRef) -> bool {
        self.tables
            .get(&reference.kind)
            .is_some_and(|table| table.rows.contains_key(&reference.name))
    }

    fn check_references<'v>(
        &self,
        values: impl IntoIterator<Item = &'v EngineValue>,
    ) -> GatewayResult<()> {
        for value in values {
            for reference in value.references() {
                if !self.exists(reference) {
                    return Err(GatewayError::MissingReference {
                        kind: reference.kind,
                        name: reference.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn referenced_by(&self, target: &EngineRef) -> Option<(Kind, String)> {
        self.tables.iter().find_map(|(kind, table)| {
            table.order.iter().find_map(|name| {
                let row = &table.rows[name];
                row.attributes
                    .values()
                    .any(|value| value.references().any(|r| r == target))
                    .then(|| (*kind, name.clone()))
            })
        })
    }

    fn insert(&mut self, kind: Kind, name: &str, mut attributes: EngineAttributes) -> GatewayResult<()> {
        if name.is_empty() {
            return Err(GatewayError::rejected("add_element", "empty name"));
        }
        if self
            .tables
            .get(&kind)
            .is_some_and(|table| table.rows.contains_key(name))
        {
            return Err(GatewayError::NameInUse {
                kind,
                name: name.to_string(),
            });
        }
        self.check_references(attributes.values())?;

        attributes.remove(PERSISTENT_ID_ATTRIBUTE);
        let label = match attributes.remove(LABEL_ATTRIBUTE) {
            Some(EngineValue::Text(label)) => label,
            _ => name.to_string(),
        };

        let table = self.tables.entry(kind).or_default();
        table.order.push(name.to_string());
        table.rows.insert(
            name.to_string(),
            Row {
                attributes,
                label,
                guid: Uuid::new_v4().to_string(),
            },
        );
        Ok(())
    }
}

fn rewrite_reference(value: &mut EngineValue, old: &EngineRef, new_name: &str) {
    match value {
        EngineValue::Ref(r) if r == old => r.name = new_name.to_string(),
        EngineValue::RefList(refs) => {
            for r in refs.iter_mut().filter(|r| **r == *old) {
                r.name = new_name.to_string();
            }
        }
        _ => {}
    }
}

impl EngineGateway for InMemoryEngine {
    fn add_element(
        &self,
        kind: Kind,
        name: &str,
        attributes: &EngineAttributes,
    ) -> GatewayResult<String> {
        self.count(|c| c.add += 1);
        self.ensure_ready()?;
        if self.faults.lock().add.contains(&kind) {
            return Err(GatewayError::rejected("add_element", format!("{kind} creation disabled")));
        }

        self.state.lock().insert(kind, name, attributes.clone())?;
        Ok(name.to_string())
    }

    fn set_attribute(
        &self,
        kind: Kind,
        name: &str,
        attribute: &str,
        value: &EngineValue,
    ) -> GatewayResult<()> {
        self.count(|c| c.set += 1);
        self.ensure_ready()?;

        let mut state = self.state.lock();
        state.row(kind, name)?;
        if attribute == PERSISTENT_ID_ATTRIBUTE {
            return Err(GatewayError::rejected("set_attribute", "persistent id is read-only"));
        }
        state.check_references(std::iter::once(value))?;

        let row = state
            .tables
            .get_mut(&kind)
            .and_then(|table| table.rows.get_mut(name))
            .ok_or_else(|| GatewayError::NotFound {
                kind,
                name: name.to_string(),
            })?;
        if attribute == LABEL_ATTRIBUTE {
            row.label = value.as_text().unwrap_or_default().to_string();
        } else {
            row.attributes.insert(attribute.to_string(), value.clone());
        }
        Ok(())
    }

    fn get_attribute(&self, kind: Kind, name: &str, attribute: &str) -> GatewayResult<EngineValue> {
        self.count(|c| c.get += 1);
        self.ensure_ready()?;
        if self.faults.lock().get.contains(&(kind, name.to_string())) {
            return Err(GatewayError::rejected("get_attribute", format!("{kind} '{name}' unreadable")));
        }

        let state = self.state.lock();
        let row = state.row(kind, name)?;
        match attribute {
            LABEL_ATTRIBUTE => Ok(EngineValue::Text(row.label.clone())),
            PERSISTENT_ID_ATTRIBUTE => Ok(EngineValue::Text(row.guid.clone())),
            _ => row
                .attributes
                .get(attribute)
                .cloned()
                .ok_or_else(|| GatewayError::AttributeNotFound {
                    kind,
                    name: name.to_string(),
                    attribute: attribute.to_string(),
                }),
        }
    }

    fn list_names(&self, kind: Kind) -> GatewayResult<Vec<String>> {
        self.count(|c| c.list += 1);
        self.ensure_ready()?;
        if self.faults.lock().list.contains(&kind) {
            return Err(GatewayError::rejected("list_names", format!("{kind} table unavailable")));
        }
        Ok(self.names(kind))
    }

    fn select(&self, kind: Kind, name: &str) -> GatewayResult<()> {
        self.count(|c| c.select += 1);
        self.ensure_ready()?;
        if self.faults.lock().select.contains(&(kind, name.to_string())) {
            return Err(GatewayError::rejected("select", format!("{kind} '{name}' locked")));
        }

        let mut state = self.state.lock();
        state.row(kind, name)?;
        let entry = (kind, name.to_string());
        if !state.selection.contains(&entry) {
            state.selection.push(entry);
        }
        Ok(())
    }

    fn clear_selection(&self) -> GatewayResult<()> {
        self.count(|c| c.clear += 1);
        self.ensure_ready()?;
        self.state.lock().selection.clear();
        Ok(())
    }

    fn apply_transform(&self, axis: Axis, amount: f64) -> GatewayResult<()> {
        let call = {
            let mut calls = self.calls.lock();
            calls.transform += 1;
            calls.transform
        };
        self.ensure_ready()?;
        if self.faults.lock().transform_calls.contains(&call) {
            return Err(GatewayError::rejected("apply_transform", format!("move {axis} {amount} failed")));
        }

        let mut state = self.state.lock();
        if state.selection.is_empty() {
            return Err(GatewayError::EmptySelection);
        }
        let selection = state.selection.clone();
        for (kind, name) in selection {
            let position = state
                .tables
                .get_mut(&kind)
                .and_then(|table| table.rows.get_mut(&name))
                .and_then(|row| row.attributes.get_mut("position"));
            if let Some(EngineValue::Point(point)) = position {
                *point = point.translated(axis, amount);
            }
        }
        Ok(())
    }

    fn remove(&self, kind: Kind, name: &str) -> GatewayResult<()> {
        self.count(|c| c.remove += 1);
        self.ensure_ready()?;

        let mut state = self.state.lock();
        state.row(kind, name)?;
        let target = EngineRef::new(kind, name);
        if let Some((by_kind, by_name)) = state.referenced_by(&target) {
            return Err(GatewayError::InUse {
                kind,
                name: name.to_string(),
                by_kind,
                by_name,
            });
        }

        if let Some(table) = state.tables.get_mut(&kind) {
            table.rows.remove(name);
            table.order.retain(|entry| entry != name);
        }
        state.selection.retain(|(k, n)| !(*k == kind && n == name));
        Ok(())
    }
}

impl EngineSession for InMemoryEngine {
    fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    fn current_model_path(&self) -> String {
        self.state
            .lock()
            .model_path
            .clone()
            .unwrap_or_else(|| UNTITLED_MODEL.to_string())
    }
}

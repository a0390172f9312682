//! Grouped position updates.
//!
//! Moving N objects one call at a time costs N round trips. Structured
//! models usually move many objects by the same amount (a whole storey
//! shifts up), so deltas are split per axis, objects sharing an axis delta
//! are selected together, and one transform moves the whole group.
//!
//! The engine's selection is global. Groups are applied one after another,
//! each inside [`with_selection`], so the selection is empty again after
//! every group whether its transform succeeded or not.

use crate::error::{recoverable, SyncError, SyncResult};
use crate::report::{DeltaGroupStatus, ItemFailure};
use std::collections::{BTreeMap, HashMap};
use structlink_gateway::{with_selection, EngineGateway, GatewayError};
use structlink_model::{Axis, DomainObject, Kind, ObjectId, Vector3};
use tracing::{debug, warn};

/// Objects sharing one delta along one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaGroup {
    /// Axis of the move.
    pub axis: Axis,
    /// Amount of the move.
    pub amount: f64,
    /// Indices of the members in the planned list.
    pub members: Vec<usize>,
}

/// Fraction of the tolerance that separates two grouped amounts.
const GROUPING_RESOLUTION: f64 = 1e-3;

/// Groups per-object deltas by axis and quantized amount.
///
/// Amounts are quantized to multiples of `tolerance * 1e-3`, and a group
/// moves by the exact delta of its first member. Every member therefore
/// ends within `tolerance * 1e-3` of its target on each axis. Components
/// that round to zero at that resolution form no group. Groups come out X
/// first, then Y, then Z, and by ascending amount within an axis.
pub fn group_deltas(deltas: &[Vector3], tolerance: f64) -> Vec<DeltaGroup> {
    let resolution = (tolerance * GROUPING_RESOLUTION).max(f64::MIN_POSITIVE);
    let mut groups = Vec::new();

    for axis in Axis::ALL {
        let mut buckets: BTreeMap<i64, DeltaGroup> = BTreeMap::new();
        for (index, delta) in deltas.iter().enumerate() {
            let amount = delta.component(axis);
            let key = (amount / resolution).round() as i64;
            if key == 0 {
                continue;
            }
            buckets
                .entry(key)
                .or_insert_with(|| DeltaGroup {
                    axis,
                    amount,
                    members: Vec::new(),
                })
                .members
                .push(index);
        }
        groups.extend(buckets.into_values());
    }
    groups
}

/// Result of a scheduled update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleOutcome {
    /// Status of every transform issued.
    pub groups: Vec<DeltaGroupStatus>,
    /// Objects moved by transforms that all succeeded.
    pub moved: Vec<ObjectId>,
    /// Objects already in place.
    pub unchanged: Vec<ObjectId>,
    /// Objects that could not be moved.
    pub failures: Vec<ItemFailure>,
}

impl ScheduleOutcome {
    /// Number of transform calls issued.
    pub fn transform_calls(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if nothing failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.groups.iter().all(DeltaGroupStatus::is_success)
    }
}

/// Applies position changes with one transform per distinct axis delta.
pub struct BatchScheduler<'a, G: EngineGateway + ?Sized> {
    gateway: &'a G,
    tolerance: f64,
}

impl<'a, G: EngineGateway + ?Sized> BatchScheduler<'a, G> {
    /// Creates a scheduler.
    pub fn new(gateway: &'a G, tolerance: f64) -> Self {
        Self { gateway, tolerance }
    }

    /// Moves `objects` by the deltas `compute_delta` returns.
    ///
    /// Every object must carry an external identity. A failed group is
    /// recorded in its [`DeltaGroupStatus`] and its members in
    /// [`ScheduleOutcome::failures`]; the remaining groups still run. Only
    /// an engine that stops responding aborts the schedule.
    pub fn schedule_and_apply<'o, I, F>(
        &self,
        kind: Kind,
        objects: I,
        mut compute_delta: F,
    ) -> SyncResult<ScheduleOutcome>
    where
        I: IntoIterator<Item = &'o DomainObject>,
        F: FnMut(&DomainObject) -> SyncResult<Vector3>,
    {
        let mut outcome = ScheduleOutcome::default();
        let mut planned: Vec<(&'o DomainObject, String)> = Vec::new();
        let mut deltas = Vec::new();

        for object in objects {
            let Some(name) = object.external_name() else {
                outcome.failures.push(ItemFailure::for_object(
                    object,
                    SyncError::MissingIdentity { kind },
                ));
                continue;
            };
            match compute_delta(object) {
                Ok(delta) if delta.is_negligible(self.tolerance) => {
                    outcome.unchanged.push(object.id());
                }
                Ok(delta) => {
                    planned.push((object, name.to_string()));
                    deltas.push(delta);
                }
                Err(e) => {
                    let error = recoverable(e)?;
                    outcome.failures.push(ItemFailure::for_object(object, error));
                }
            }
        }

        let groups = group_deltas(&deltas, self.tolerance);
        debug!(%kind, objects = planned.len(), groups = groups.len(), "applying grouped transforms");

        let mut failed: HashMap<usize, SyncError> = HashMap::new();
        for group in groups {
            let members: Vec<String> = group
                .members
                .iter()
                .map(|&i| planned[i].1.clone())
                .collect();

            let result = with_selection(self.gateway, |scope| {
                for name in &members {
                    scope.select(kind, name)?;
                }
                self.gateway.apply_transform(group.axis, group.amount)
            });

            let error = match result {
                Ok(()) => None,
                Err(GatewayError::NotReady) => return Err(SyncError::EngineNotReady),
                Err(e) => {
                    warn!(
                        %kind,
                        axis = %group.axis,
                        amount = group.amount,
                        members = members.len(),
                        "grouped transform failed: {}", e
                    );
                    let error = SyncError::TransformFailed {
                        axis: group.axis,
                        amount: group.amount,
                        count: members.len(),
                        reason: e.to_string(),
                    };
                    for &member in &group.members {
                        failed.entry(member).or_insert_with(|| error.clone());
                    }
                    Some(error)
                }
            };

            outcome.groups.push(DeltaGroupStatus {
                kind,
                axis: group.axis,
                amount: group.amount,
                members,
                error,
            });
        }

        for (index, (object, _)) in planned.iter().enumerate() {
            match failed.remove(&index) {
                Some(error) => outcome.failures.push(ItemFailure::for_object(object, error)),
                None => outcome.moved.push(object.id()),
            }
        }
        Ok(outcome)
    }
}

/// Delta function that reads the current position from the engine.
pub fn engine_position_delta<'g, G: EngineGateway + ?Sized + 'g>(
    gateway: &'g G,
    kind: Kind,
    attribute: &'static str,
) -> impl FnMut(&DomainObject) -> SyncResult<Vector3> + 'g {
    move |object| {
        let desired = object
            .attribute(attribute)
            .and_then(|v| v.as_point())
            .ok_or_else(|| SyncError::invalid_object(kind, format!("missing point '{attribute}'")))?;
        let name = object
            .external_name()
            .ok_or(SyncError::MissingIdentity { kind })?;
        let current = gateway
            .get_attribute(kind, name, attribute)?
            .as_point()
            .ok_or_else(|| SyncError::invalid_object(kind, format!("engine '{attribute}' is not a point")))?;
        Ok(desired - current)
    }
}

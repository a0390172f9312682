//! Results of synchronization operations.

use crate::error::SyncError;
use std::fmt;
use structlink_model::{Axis, DomainObject, Kind, ObjectId};

/// What happened to one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// A new engine object was created.
    Created,
    /// An existing engine object was changed.
    Updated,
    /// An existing engine object already matched.
    Unchanged,
    /// The object duplicated another object of the same batch.
    Merged,
    /// The engine object was deleted.
    Removed,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncAction::Created => "created",
            SyncAction::Updated => "updated",
            SyncAction::Unchanged => "unchanged",
            SyncAction::Merged => "merged",
            SyncAction::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Successful outcome for one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    /// Kind of the object.
    pub kind: Kind,
    /// Domain id, absent for removals by name.
    pub object: Option<ObjectId>,
    /// External name.
    pub name: String,
    /// What happened.
    pub action: SyncAction,
}

/// Failure for one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    /// Kind of the object.
    pub kind: Kind,
    /// Domain id, if the failure concerns a domain object.
    pub object: Option<ObjectId>,
    /// External name, if known.
    pub name: Option<String>,
    /// The error.
    pub error: SyncError,
}

impl ItemFailure {
    /// Creates a failure for a domain object.
    pub fn for_object(object: &DomainObject, error: SyncError) -> Self {
        Self {
            kind: object.kind(),
            object: Some(object.id()),
            name: object.external_name().map(str::to_string),
            error,
        }
    }

    /// Creates a failure for an external name.
    pub fn for_name(kind: Kind, name: impl Into<String>, error: SyncError) -> Self {
        Self {
            kind,
            object: None,
            name: Some(name.into()),
            error,
        }
    }

    /// Creates a failure that concerns a whole kind.
    pub fn for_kind(kind: Kind, error: SyncError) -> Self {
        Self {
            kind,
            object: None,
            name: None,
            error,
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.object) {
            (Some(name), _) => write!(f, "{} '{}': {}", self.kind, name, self.error),
            (None, Some(id)) => write!(f, "{} {}: {}", self.kind, id, self.error),
            (None, None) => write!(f, "{}: {}", self.kind, self.error),
        }
    }
}

/// A non-fatal condition noticed during an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncWarning {
    /// Kind concerned.
    pub kind: Kind,
    /// The condition.
    pub error: SyncError,
}

/// Status of one grouped transform.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaGroupStatus {
    /// Kind of the moved objects.
    pub kind: Kind,
    /// Axis of the transform.
    pub axis: Axis,
    /// Amount applied along the axis.
    pub amount: f64,
    /// External names of the moved objects.
    pub members: Vec<String>,
    /// Failure, if the group could not be applied.
    pub error: Option<SyncError>,
}

impl DeltaGroupStatus {
    /// Returns true if the transform was applied.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a push or remove.
///
/// Partial success is normal: every object ends up in exactly one of
/// `outcomes` or `failures`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Objects that were handled.
    pub outcomes: Vec<ItemOutcome>,
    /// Objects that failed.
    pub failures: Vec<ItemFailure>,
    /// Non-fatal conditions.
    pub warnings: Vec<SyncWarning>,
    /// Grouped transforms issued for position updates.
    pub transform_groups: Vec<DeltaGroupStatus>,
}

impl SyncReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if every object and every transform group succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.transform_groups.iter().all(DeltaGroupStatus::is_success)
    }

    /// Counts outcomes with the given action.
    pub fn count(&self, action: SyncAction) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }

    /// Returns the outcome of a domain object.
    pub fn outcome_of(&self, object: ObjectId) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|o| o.object == Some(object))
    }

    /// Returns the failure of a domain object.
    pub fn failure_of(&self, object: ObjectId) -> Option<&ItemFailure> {
        self.failures.iter().find(|f| f.object == Some(object))
    }

    pub(crate) fn record(&mut self, object: &DomainObject, name: &str, action: SyncAction) {
        self.outcomes.push(ItemOutcome {
            kind: object.kind(),
            object: Some(object.id()),
            name: name.to_string(),
            action,
        });
    }

    pub(crate) fn fail(&mut self, failure: ItemFailure) {
        tracing::warn!("{}", failure);
        self.failures.push(failure);
    }

    pub(crate) fn warn(&mut self, kind: Kind, error: SyncError) {
        tracing::warn!(%kind, "{}", error);
        self.warnings.push(SyncWarning { kind, error });
    }

    /// Appends another report.
    pub fn merge(&mut self, other: SyncReport) {
        self.outcomes.extend(other.outcomes);
        self.failures.extend(other.failures);
        self.warnings.extend(other.warnings);
        self.transform_groups.extend(other.transform_groups);
    }
}

/// Result of a pull.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullReport {
    /// Objects read back, in engine order.
    pub objects: Vec<DomainObject>,
    /// Objects that could not be read.
    pub failures: Vec<ItemFailure>,
}

impl PullReport {
    /// Returns true if every object was read.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the pulled object with the given external name.
    pub fn by_name(&self, name: &str) -> Option<&DomainObject> {
        self.objects.iter().find(|o| o.external_name() == Some(name))
    }
}

/// Counters accumulated over the lifetime of an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterStats {
    /// Push operations run.
    pub pushes: u64,
    /// Pull operations run.
    pub pulls: u64,
    /// Remove operations run.
    pub removes: u64,
    /// Objects created.
    pub created: u64,
    /// Objects updated.
    pub updated: u64,
    /// Objects already up to date.
    pub unchanged: u64,
    /// In-batch duplicates merged.
    pub merged: u64,
    /// Objects removed.
    pub removed: u64,
    /// Objects pulled.
    pub pulled: u64,
    /// Objects that failed.
    pub failed: u64,
    /// Grouped transform calls issued.
    pub transform_calls: u64,
}

impl AdapterStats {
    pub(crate) fn absorb(&mut self, report: &SyncReport) {
        self.created += report.count(SyncAction::Created) as u64;
        self.updated += report.count(SyncAction::Updated) as u64;
        self.unchanged += report.count(SyncAction::Unchanged) as u64;
        self.merged += report.count(SyncAction::Merged) as u64;
        self.removed += report.count(SyncAction::Removed) as u64;
        self.failed += report.failures.len() as u64;
        self.transform_calls += report.transform_groups.len() as u64;
    }
}

//! Error types for the synchronization engine.

use structlink_gateway::GatewayError;
use structlink_model::{Axis, Kind, ParseKindError};
use thiserror::Error;

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing with the engine.
///
/// Errors fall in two classes (see [`SyncError::is_fatal`]):
/// - session-level errors abort the whole operation
/// - item-level errors are recorded against one object and the batch continues
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The engine is not running or has no model open.
    #[error("engine not ready")]
    EngineNotReady,

    /// The operation requires a saved model.
    #[error("model has not been saved: {path}")]
    UnsavedModel {
        /// Path reported by the session.
        path: String,
    },

    /// The dependency table contains a cycle.
    #[error("dependency cycle: {}", path.join(" -> "))]
    DependencyCycle {
        /// Kinds along the cycle, first kind repeated at the end.
        path: Vec<String>,
    },

    /// No handler is registered for the kind.
    #[error("unsupported kind: {0}")]
    UnsupportedKind(String),

    /// The next identifier could not be produced.
    #[error("identifier allocation failed for {kind}: {reason}")]
    AllocationFailed {
        /// Kind being allocated.
        kind: Kind,
        /// Underlying failure.
        reason: String,
    },

    /// An identifier collided with an external object this session did not create.
    #[error("identifier '{name}' for {kind} collides with an existing external object")]
    IdentifierCollision {
        /// Kind being allocated.
        kind: Kind,
        /// Colliding name.
        name: String,
    },

    /// A referenced object does not exist externally.
    #[error("{kind} references {target}, which does not exist in the engine")]
    MissingReference {
        /// Kind of the referencing object.
        kind: Kind,
        /// Description of the missing target.
        target: String,
    },

    /// A single object could not be read back.
    #[error("failed to pull {kind} '{name}': {reason}")]
    ObjectPullFailed {
        /// Kind of the object.
        kind: Kind,
        /// External name of the object.
        name: String,
        /// Underlying failure.
        reason: String,
    },

    /// An object expected to exist externally was not found.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind searched.
        kind: Kind,
        /// Name or description searched.
        name: String,
    },

    /// The object has no external identity.
    #[error("{kind} object has no external identity")]
    MissingIdentity {
        /// Kind of the object.
        kind: Kind,
    },

    /// The object does not carry the attributes its kind requires.
    #[error("invalid {kind} object: {message}")]
    InvalidObject {
        /// Kind of the object.
        kind: Kind,
        /// Description of the problem.
        message: String,
    },

    /// A grouped transform call failed.
    #[error("moving {count} objects by {amount} along {axis} failed: {reason}")]
    TransformFailed {
        /// Axis of the transform.
        axis: Axis,
        /// Amount of the transform.
        amount: f64,
        /// Number of objects in the group.
        count: usize,
        /// Underlying failure.
        reason: String,
    },

    /// A call to the engine failed.
    #[error("engine error: {0}")]
    Gateway(#[from] GatewayError),
}

impl SyncError {
    /// Creates an invalid object error.
    pub fn invalid_object(kind: Kind, message: impl Into<String>) -> Self {
        Self::InvalidObject {
            kind,
            message: message.into(),
        }
    }

    /// Creates an allocation failure.
    pub fn allocation_failed(kind: Kind, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            kind,
            reason: reason.into(),
        }
    }

    /// Returns true for session-level errors that abort the whole operation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::EngineNotReady
                | SyncError::UnsavedModel { .. }
                | SyncError::DependencyCycle { .. }
                | SyncError::Gateway(GatewayError::NotReady)
        )
    }
}

impl From<ParseKindError> for SyncError {
    fn from(err: ParseKindError) -> Self {
        SyncError::UnsupportedKind(err.0)
    }
}

/// Passes item-level errors through and escalates fatal ones.
pub(crate) fn recoverable(err: SyncError) -> SyncResult<SyncError> {
    if err.is_fatal() {
        Err(err)
    } else {
        Ok(err)
    }
}

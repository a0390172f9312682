//! Error types for engine calls.

use structlink_model::Kind;
use thiserror::Error;

/// Result type for engine calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Status codes returned by the external engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The engine has no open model or is not running.
    #[error("engine not ready")]
    NotReady,

    /// No object with this name exists.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind searched.
        kind: Kind,
        /// Name searched.
        name: String,
    },

    /// The object exists but has no such attribute.
    #[error("{kind} '{name}' has no attribute '{attribute}'")]
    AttributeNotFound {
        /// Kind of the object.
        kind: Kind,
        /// Name of the object.
        name: String,
        /// Requested attribute.
        attribute: String,
    },

    /// The requested name is already taken.
    #[error("{kind} name '{name}' already in use")]
    NameInUse {
        /// Kind of the object.
        kind: Kind,
        /// Conflicting name.
        name: String,
    },

    /// An attribute references an object that does not exist.
    #[error("reference to missing {kind} '{name}'")]
    MissingReference {
        /// Kind of the referenced object.
        kind: Kind,
        /// Name of the referenced object.
        name: String,
    },

    /// The object is still referenced and cannot be removed.
    #[error("{kind} '{name}' is referenced by {by_kind} '{by_name}'")]
    InUse {
        /// Kind of the object.
        kind: Kind,
        /// Name of the object.
        name: String,
        /// Kind of the referencing object.
        by_kind: Kind,
        /// Name of the referencing object.
        by_name: String,
    },

    /// The engine refused the call.
    #[error("engine rejected {call}: {message}")]
    Rejected {
        /// Verb that failed.
        call: &'static str,
        /// Engine message.
        message: String,
    },

    /// A transform was requested with nothing selected.
    #[error("transform requested with empty selection")]
    EmptySelection,
}

impl GatewayError {
    /// Creates a rejection for the given verb.
    pub fn rejected(call: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            call,
            message: message.into(),
        }
    }

    /// Returns true if the error means the object or attribute is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GatewayError::NotFound { .. } | GatewayError::AttributeNotFound { .. }
        )
    }
}

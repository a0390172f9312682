//! Engine call interface.

use crate::error::GatewayResult;
use crate::value::{EngineAttributes, EngineValue};
use structlink_model::{Axis, Kind};

/// Attribute holding the human readable label of an engine object.
pub const LABEL_ATTRIBUTE: &str = "label";

/// Read-only attribute holding the engine's persistent id of an object.
pub const PERSISTENT_ID_ATTRIBUTE: &str = "guid";

/// Model path reported by a session whose model was never saved.
pub const UNTITLED_MODEL: &str = "(untitled)";

/// Typed verbs of the external engine.
///
/// This trait is the only route to the engine. Every call is a blocking
/// round trip; every call can fail and reports failure through its
/// [`GatewayResult`].
///
/// The engine keeps one global selection. [`select`](Self::select),
/// [`clear_selection`](Self::clear_selection) and
/// [`apply_transform`](Self::apply_transform) operate on it; use
/// [`crate::with_selection`] rather than calling them directly so the
/// selection is released on every path.
///
/// # Implementors
///
/// - [`crate::InMemoryEngine`] - For testing
pub trait EngineGateway: Send + Sync {
    /// Creates an object named `name` and returns the name the engine assigned.
    fn add_element(&self, kind: Kind, name: &str, attributes: &EngineAttributes)
        -> GatewayResult<String>;

    /// Sets one attribute of an existing object.
    fn set_attribute(
        &self,
        kind: Kind,
        name: &str,
        attribute: &str,
        value: &EngineValue,
    ) -> GatewayResult<()>;

    /// Reads one attribute of an existing object.
    fn get_attribute(&self, kind: Kind, name: &str, attribute: &str) -> GatewayResult<EngineValue>;

    /// Lists the names of every object of a kind.
    fn list_names(&self, kind: Kind) -> GatewayResult<Vec<String>>;

    /// Adds an object to the global selection.
    fn select(&self, kind: Kind, name: &str) -> GatewayResult<()>;

    /// Empties the global selection.
    fn clear_selection(&self) -> GatewayResult<()>;

    /// Moves every selected object by `amount` along `axis`.
    fn apply_transform(&self, axis: Axis, amount: f64) -> GatewayResult<()>;

    /// Deletes an object.
    fn remove(&self, kind: Kind, name: &str) -> GatewayResult<()>;
}

/// Lifecycle queries of the engine session.
pub trait EngineSession: Send + Sync {
    /// Returns true if the engine is running with a model open.
    fn is_ready(&self) -> bool;

    /// Returns the path of the open model, or [`UNTITLED_MODEL`].
    fn current_model_path(&self) -> String;
}

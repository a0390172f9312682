//! # StructLink Gateway
//!
//! The only layer that talks to the external analysis engine.
//!
//! This crate provides:
//! - [`EngineGateway`] - the typed call verbs (add, set, get, list, select, transform, remove)
//! - [`EngineSession`] - readiness and model-path queries used to gate operations
//! - [`SelectionScope`] / [`with_selection`] - scoped access to the engine's global selection
//! - [`InMemoryEngine`] - a complete in-memory engine for tests and benchmarks
//!
//! ## Key Invariants
//!
//! - Every verb returns a status distinguishable from success; callers never assume success
//! - The engine holds one global selection; it is always cleared on every exit path
//! - The engine enforces referential integrity: an element cannot reference a missing object

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod gateway;
mod memory;
mod selection;
mod value;

pub use error::{GatewayError, GatewayResult};
pub use gateway::{
    EngineGateway, EngineSession, LABEL_ATTRIBUTE, PERSISTENT_ID_ATTRIBUTE, UNTITLED_MODEL,
};
pub use memory::{CallCounts, InMemoryEngine};
pub use selection::{with_selection, SelectionScope};
pub use value::{EngineAttributes, EngineRef, EngineValue};

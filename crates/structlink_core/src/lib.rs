//! # StructLink Core
//!
//! CRUD synchronization between a structural domain model and an external
//! analysis engine.
//!
//! This crate provides:
//! - Type dispatch from [`Kind`](structlink_model::Kind) to per-kind handlers
//! - Dependency-ordered push (materials before sections before bars)
//! - Identity matching by exact key or by proximity within a tolerance
//! - Collision-free name allocation (numeric and prefixed schemes)
//! - Grouped position updates, one transform per distinct axis delta
//! - Memoized pull of objects and the objects they reference
//!
//! ## Architecture
//!
//! Push runs per kind, in dependency order:
//! 1. Resolve the references of every object to engine names
//! 2. Collapse duplicates within the batch (first seen wins)
//! 3. Match the survivors against the engine's objects
//! 4. Create unmatched objects under freshly allocated names
//! 5. Update matched objects, attribute by attribute, moving positions in groups
//!
//! ## Key Invariants
//!
//! - A kind is never created before the kinds it requires
//! - Pushing an unchanged object twice creates one engine object
//! - The engine selection is empty after every grouped transform
//! - Per-object failures are reported, never thrown; only session-level
//!   failures abort an operation

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod allocator;
mod comparer;
mod config;
mod dependency;
mod error;
mod handler;
mod projector;
mod report;
mod scheduler;

pub use adapter::SyncAdapter;
pub use allocator::{AllocatedName, IdAllocator, NamingScheme};
pub use comparer::{ExactKeyComparer, IdentityComparer, IdentityIndex, KeyField, ProximityComparer};
pub use config::{AdapterConfig, PushMode, DEFAULT_TOLERANCE};
pub use dependency::{requirements, DependencyGraph};
pub use error::{SyncError, SyncResult};
pub use handler::{DirectConverter, ElementConverter, FieldShape, FieldSpec, HandlerRegistry, KindHandler};
pub use projector::{Projector, PullMemo};
pub use report::{
    AdapterStats, DeltaGroupStatus, ItemFailure, ItemOutcome, PullReport, SyncAction, SyncReport,
    SyncWarning,
};
pub use scheduler::{engine_position_delta, group_deltas, BatchScheduler, DeltaGroup, ScheduleOutcome};

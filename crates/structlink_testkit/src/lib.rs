//! # StructLink Testkit
//!
//! Test utilities for StructLink.
//!
//! This crate provides:
//! - Fixtures: an in-memory engine wired to an adapter, the four-node ring,
//!   story grids and frames loaded from JSON
//! - Property-based test generators using proptest
//! - A tracing subscriber for test binaries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use structlink_testkit::prelude::*;
//!
//! #[test]
//! fn push_ring() {
//!     let fixture = TestEngine::new();
//!     let (mut nodes, _) = ring();
//!     fixture.adapter.push(&mut nodes).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;

use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber for test output.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Calling this
/// more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

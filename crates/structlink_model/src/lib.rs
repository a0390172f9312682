//! # StructLink Model
//!
//! Typed domain model shared by every StructLink crate.
//!
//! This crate provides:
//! - [`Kind`] - the closed enumeration of synchronizable structural kinds
//! - [`DomainObject`] - a kind-tagged bag of attributes with an optional external identity
//! - [`ExternalIdentity`] - name, label and persistent id assigned by the external engine
//! - [`Point3`], [`Vector3`], [`Axis`] - the geometry used by positional kinds
//!
//! The model owns no I/O. Objects are created and owned by the caller; the
//! adapter only attaches or reads their [`ExternalIdentity`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod geometry;
mod identity;
mod kind;
mod object;

pub use geometry::{Axis, Point3, Vector3};
pub use identity::{ExternalIdentity, ObjectId};
pub use kind::{Kind, ParseKindError};
pub use object::{AttributeValue, Attributes, DomainObject};

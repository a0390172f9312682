//! Structural kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The type tag of a synchronizable object.
///
/// Kinds form a closed set. Dispatch, dependency ordering and identifier
/// allocation are all keyed by `Kind`, never by the Rust type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// Material with elastic constants.
    Material,
    /// Cross-section assigned to bars.
    SectionProperty,
    /// Thickness/material property assigned to panels.
    SurfaceProperty,
    /// Point in space; endpoints of bars and corners of panels.
    Node,
    /// Linear element between two nodes.
    Bar,
    /// Planar element bounded by corner nodes.
    Panel,
    /// Named load case.
    LoadCase,
    /// Factored combination of load cases.
    LoadCombination,
    /// Load applied to a node, bar or panel within a load case.
    Load,
}

impl Kind {
    /// Every kind, in declaration order.
    pub const ALL: [Kind; 9] = [
        Kind::Material,
        Kind::SectionProperty,
        Kind::SurfaceProperty,
        Kind::Node,
        Kind::Bar,
        Kind::Panel,
        Kind::LoadCase,
        Kind::LoadCombination,
        Kind::Load,
    ];

    /// Returns the canonical name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Kind::Material => "Material",
            Kind::SectionProperty => "SectionProperty",
            Kind::SurfaceProperty => "SurfaceProperty",
            Kind::Node => "Node",
            Kind::Bar => "Bar",
            Kind::Panel => "Panel",
            Kind::LoadCase => "LoadCase",
            Kind::LoadCombination => "LoadCombination",
            Kind::Load => "Load",
        }
    }

    /// Returns true for kinds that live at a position in space.
    #[must_use]
    pub const fn is_positional(&self) -> bool {
        matches!(self, Kind::Node)
    }

    /// Returns true for element kinds that are numbered by the engine.
    #[must_use]
    pub const fn is_element(&self) -> bool {
        matches!(self, Kind::Node | Kind::Bar | Kind::Panel)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a kind name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown kind: {0}")]
pub struct ParseKindError(pub String);

impl FromStr for Kind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

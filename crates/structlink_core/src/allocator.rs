//! External name allocation.
//!
//! Counters are created lazily from the engine's current name list and then
//! advance locally. A refresh discards the counter and re-scans the engine,
//! which is required after changes the adapter did not make itself.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use structlink_gateway::EngineGateway;
use structlink_model::Kind;
use tracing::{debug, warn};

/// Naming policy of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingScheme {
    /// Integer names, `max + 1` of the numeric names in use.
    Numeric,
    /// `"{Kind}-{count + 1}"`.
    Prefixed,
}

/// A freshly allocated name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedName {
    /// The name to create the object under.
    pub name: String,
    /// Names passed over because the engine already used them.
    pub collisions: Vec<String>,
}

#[derive(Debug)]
struct Counter {
    last: u64,
    taken: HashSet<String>,
}

impl Counter {
    fn scan(scheme: NamingScheme, names: Vec<String>) -> Self {
        let last = match scheme {
            NamingScheme::Numeric => names
                .iter()
                .filter_map(|name| name.trim().parse::<u64>().ok())
                .max()
                .unwrap_or(0),
            NamingScheme::Prefixed => names.len() as u64,
        };
        Self {
            last,
            taken: names.into_iter().collect(),
        }
    }
}

/// Per-kind name allocator.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counters: Mutex<HashMap<Kind, Counter>>,
}

impl IdAllocator {
    /// Creates an allocator with no counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next free name for `kind`.
    ///
    /// The first call for a kind, and every call with `refresh`, lists the
    /// engine's names for the kind. If the engine cannot be queried the
    /// result is [`SyncError::AllocationFailed`] and no name is produced.
    pub fn next_id<G: EngineGateway + ?Sized>(
        &self,
        gateway: &G,
        kind: Kind,
        scheme: NamingScheme,
        refresh: bool,
    ) -> SyncResult<AllocatedName> {
        let mut counters = self.counters.lock();

        if refresh || !counters.contains_key(&kind) {
            let names = gateway
                .list_names(kind)
                .map_err(|e| SyncError::allocation_failed(kind, e.to_string()))?;
            debug!(%kind, existing = names.len(), "scanned engine names");
            counters.insert(kind, Counter::scan(scheme, names));
        }

        let counter = counters
            .get_mut(&kind)
            .ok_or_else(|| SyncError::allocation_failed(kind, "counter missing"))?;

        let mut collisions = Vec::new();
        loop {
            counter.last = counter
                .last
                .checked_add(1)
                .ok_or_else(|| SyncError::allocation_failed(kind, "counter overflow"))?;
            let candidate = match scheme {
                NamingScheme::Numeric => counter.last.to_string(),
                NamingScheme::Prefixed => format!("{}-{}", kind, counter.last),
            };
            if counter.taken.insert(candidate.clone()) {
                return Ok(AllocatedName {
                    name: candidate,
                    collisions,
                });
            }
            warn!(%kind, name = %candidate, "allocated name already in use, skipping");
            collisions.push(candidate);
        }
    }

    /// Marks a name as used, e.g. when the engine assigned a different one.
    pub fn reserve(&self, kind: Kind, name: &str) {
        if let Some(counter) = self.counters.lock().get_mut(&kind) {
            counter.taken.insert(name.to_string());
        }
    }

    /// Forgets the counter of a kind; the next allocation re-scans.
    pub fn invalidate(&self, kind: Kind) {
        self.counters.lock().remove(&kind);
    }

    /// Forgets every counter.
    pub fn invalidate_all(&self) {
        self.counters.lock().clear();
    }
}

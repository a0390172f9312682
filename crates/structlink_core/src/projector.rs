//! Reading engine objects back into domain objects.
//!
//! Hydrating a composite object pulls the objects it references. A
//! [`PullMemo`] remembers every object read during one projection, so an
//! object referenced by many others is fetched once and all referencing
//! objects embed copies with the same [`structlink_model::ObjectId`].

use crate::error::{recoverable, SyncError, SyncResult};
use crate::handler::{FieldShape, HandlerRegistry};
use crate::report::{ItemFailure, PullReport};
use std::collections::{HashMap, HashSet};
use structlink_gateway::{
    EngineGateway, EngineRef, EngineValue, GatewayError, LABEL_ATTRIBUTE, PERSISTENT_ID_ATTRIBUTE,
};
use structlink_model::{AttributeValue, DomainObject, ExternalIdentity, Kind};
use tracing::debug;

type MemoKey = (Kind, String);

/// Objects already read, keyed by kind and external name.
#[derive(Debug, Default)]
pub struct PullMemo {
    entries: HashMap<MemoKey, SyncResult<DomainObject>>,
    in_progress: HashSet<MemoKey>,
}

impl PullMemo {
    /// Creates an empty memo.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of remembered objects, failures included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the object was already read.
    pub fn contains(&self, kind: Kind, name: &str) -> bool {
        self.entries.contains_key(&(kind, name.to_string()))
    }

    /// Forgets every object of a kind, e.g. after the kind was modified.
    pub fn forget_kind(&mut self, kind: Kind) {
        self.entries.retain(|(k, _), _| *k != kind);
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Reads engine objects into domain objects.
pub struct Projector<'a, G: EngineGateway + ?Sized> {
    gateway: &'a G,
    handlers: &'a HandlerRegistry,
}

impl<'a, G: EngineGateway + ?Sized> Projector<'a, G> {
    /// Creates a projector.
    pub fn new(gateway: &'a G, handlers: &'a HandlerRegistry) -> Self {
        Self { gateway, handlers }
    }

    /// Reads objects of `kind`, all of them when `ids` is `None`.
    pub fn project(&self, kind: Kind, ids: Option<&[String]>) -> SyncResult<PullReport> {
        let mut memo = PullMemo::new();
        self.project_with(kind, ids, &mut memo)
    }

    /// Reads objects of `kind` sharing an existing memo.
    ///
    /// An object that cannot be read is recorded as a failure and skipped.
    /// Errors are only returned for an unsupported kind, a failed name
    /// listing, or an engine that stops responding.
    pub fn project_with(
        &self,
        kind: Kind,
        ids: Option<&[String]>,
        memo: &mut PullMemo,
    ) -> SyncResult<PullReport> {
        self.handlers.get(kind)?;
        let names = match ids {
            Some(ids) => ids.to_vec(),
            None => self.gateway.list_names(kind).map_err(engine_error)?,
        };
        debug!(%kind, count = names.len(), "projecting engine objects");

        let mut report = PullReport::default();
        for name in names {
            match self.hydrate(kind, &name, memo) {
                Ok(object) => report.objects.push(object),
                Err(e) => {
                    let error = recoverable(e)?;
                    tracing::warn!(%kind, %name, "pull failed: {}", error);
                    report.failures.push(ItemFailure::for_name(kind, name, error));
                }
            }
        }
        Ok(report)
    }

    /// Reads one object, consulting the memo first.
    pub fn hydrate(&self, kind: Kind, name: &str, memo: &mut PullMemo) -> SyncResult<DomainObject> {
        let key = (kind, name.to_string());
        if let Some(cached) = memo.entries.get(&key) {
            return cached.clone();
        }
        if !memo.in_progress.insert(key.clone()) {
            return Err(SyncError::ObjectPullFailed {
                kind,
                name: name.to_string(),
                reason: "reference cycle".into(),
            });
        }

        let result = self.fetch(kind, name, memo);
        memo.in_progress.remove(&key);

        match &result {
            Err(e) if e.is_fatal() => {}
            _ => {
                memo.entries.insert(key, result.clone());
            }
        }
        result
    }

    fn fetch(&self, kind: Kind, name: &str, memo: &mut PullMemo) -> SyncResult<DomainObject> {
        let handler = self.handlers.get(kind)?;
        let pull_failed = |reason: String| SyncError::ObjectPullFailed {
            kind,
            name: name.to_string(),
            reason,
        };

        let mut object = DomainObject::new(kind);
        for field in handler.fields() {
            let value = match self.gateway.get_attribute(kind, name, field.name) {
                Ok(value) => value,
                Err(GatewayError::AttributeNotFound { .. }) if !field.required => continue,
                Err(GatewayError::NotReady) => return Err(SyncError::EngineNotReady),
                Err(e) => return Err(pull_failed(e.to_string())),
            };

            let attribute = match (field.shape, value) {
                (FieldShape::Scalar, value) => handler
                    .converter()
                    .scalar_from_engine(kind, field, value)
                    .map_err(|e| pull_failed(e.to_string()))?,
                (FieldShape::Point, EngineValue::Point(point)) => AttributeValue::Point(point),
                (FieldShape::Reference, EngineValue::Ref(target)) => {
                    AttributeValue::Object(Box::new(self.hydrate_reference(kind, name, &target, memo)?))
                }
                (FieldShape::ReferenceList, EngineValue::RefList(targets)) => AttributeValue::Objects(
                    targets
                        .iter()
                        .map(|target| self.hydrate_reference(kind, name, target, memo))
                        .collect::<SyncResult<_>>()?,
                ),
                _ => {
                    return Err(pull_failed(format!(
                        "attribute '{}' has the wrong shape",
                        field.name
                    )))
                }
            };
            object.set_attribute(field.name, attribute);
        }

        let label = self.read_text(kind, name, LABEL_ATTRIBUTE)?;
        let guid = self.read_text(kind, name, PERSISTENT_ID_ATTRIBUTE)?;
        object.set_identity(ExternalIdentity::new(name, label, guid));
        Ok(object)
    }

    fn hydrate_reference(
        &self,
        kind: Kind,
        name: &str,
        target: &EngineRef,
        memo: &mut PullMemo,
    ) -> SyncResult<DomainObject> {
        self.hydrate(target.kind, &target.name, memo).map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                SyncError::ObjectPullFailed {
                    kind,
                    name: name.to_string(),
                    reason: format!("reference {target}: {e}"),
                }
            }
        })
    }

    fn read_text(&self, kind: Kind, name: &str, attribute: &str) -> SyncResult<String> {
        match self.gateway.get_attribute(kind, name, attribute) {
            Ok(value) => Ok(value.as_text().unwrap_or_default().to_string()),
            Err(GatewayError::AttributeNotFound { .. }) => Ok(String::new()),
            Err(e) => Err(match engine_error(e) {
                SyncError::Gateway(e) => SyncError::ObjectPullFailed {
                    kind,
                    name: name.to_string(),
                    reason: e.to_string(),
                },
                fatal => fatal,
            }),
        }
    }
}

/// Maps an engine error, turning an unresponsive engine into the session error.
pub(crate) fn engine_error(err: GatewayError) -> SyncError {
    match err {
        GatewayError::NotReady => SyncError::EngineNotReady,
        other => SyncError::Gateway(other),
    }
}

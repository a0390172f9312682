//! The CRUD router.

use crate::allocator::{AllocatedName, IdAllocator};
use crate::comparer::{IdentityComparer, IdentityIndex};
use crate::config::{AdapterConfig, PushMode};
use crate::dependency::DependencyGraph;
use crate::error::{recoverable, SyncError, SyncResult};
use crate::handler::{HandlerRegistry, KindHandler};
use crate::projector::{engine_error, Projector, PullMemo};
use crate::report::{
    AdapterStats, ItemFailure, ItemOutcome, PullReport, SyncAction, SyncReport, SyncWarning,
};
use crate::scheduler::{engine_position_delta, BatchScheduler, ScheduleOutcome};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use structlink_gateway::{
    EngineGateway, EngineSession, EngineValue, GatewayError, LABEL_ATTRIBUTE,
    PERSISTENT_ID_ATTRIBUTE, UNTITLED_MODEL,
};
use structlink_model::{DomainObject, ExternalIdentity, Kind, ObjectId, Vector3};
use tracing::{debug, info};

/// Engine objects of one kind, indexed for matching.
#[derive(Default)]
struct ExistingSet {
    index: IdentityIndex,
    by_name: HashMap<String, usize>,
    by_guid: HashMap<String, usize>,
}

impl ExistingSet {
    fn insert(&mut self, comparer: &dyn IdentityComparer, object: DomainObject) {
        let identity = object.identity().cloned().unwrap_or_default();
        let position = self.index.insert(comparer, object);
        self.by_name.insert(identity.name.clone(), position);
        if let Some(guid) = identity.persistent_id() {
            self.by_guid.insert(guid.to_string(), position);
        }
    }

    /// Persistent id first, then name, then the comparer.
    fn find(&self, comparer: &dyn IdentityComparer, object: &DomainObject) -> Option<&DomainObject> {
        let by_identity = object.identity().and_then(|identity| {
            identity
                .persistent_id()
                .and_then(|guid| self.by_guid.get(guid))
                .or_else(|| self.by_name.get(&identity.name))
                .copied()
        });
        by_identity
            .or_else(|| self.index.find(comparer, object))
            .and_then(|position| self.index.get(position))
    }
}

/// State shared by the batches of one push.
struct PushContext {
    mode: PushMode,
    memo: PullMemo,
    existing: HashMap<Kind, ExistingSet>,
    names: HashMap<Kind, HashSet<String>>,
    refreshed: HashSet<Kind>,
    warnings: Vec<SyncWarning>,
}

impl PushContext {
    fn new(mode: PushMode) -> Self {
        Self {
            mode,
            memo: PullMemo::new(),
            existing: HashMap::new(),
            names: HashMap::new(),
            refreshed: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    fn note_created(&mut self, kind: Kind, name: &str) {
        if let Some(names) = self.names.get_mut(&kind) {
            names.insert(name.to_string());
        }
    }

    /// Drops everything read for a kind that was just modified.
    fn invalidate(&mut self, kind: Kind) {
        self.memo.forget_kind(kind);
        self.existing.remove(&kind);
    }
}

struct UpdatePlan {
    changed: usize,
    delta: Option<Vector3>,
}

/// Keeps domain objects in step with an external engine.
///
/// The adapter is the single entry point for push, pull and remove. It
/// dispatches by [`Kind`] through its [`HandlerRegistry`], orders pushes by
/// its [`DependencyGraph`], matches incoming objects against engine objects
/// with each kind's comparer, allocates names for new objects and routes
/// position changes through the [`BatchScheduler`].
///
/// Identities attached during a session are remembered by [`ObjectId`], so
/// later pushes resolve references to objects pushed earlier.
///
/// Calls to the engine are strictly sequential. The engine is assumed to
/// have a single writer.
pub struct SyncAdapter<G: EngineGateway, S: EngineSession> {
    config: AdapterConfig,
    gateway: Arc<G>,
    session: Arc<S>,
    handlers: HandlerRegistry,
    dependencies: DependencyGraph<Kind>,
    allocator: IdAllocator,
    identities: RwLock<HashMap<ObjectId, (Kind, ExternalIdentity)>>,
    stats: RwLock<AdapterStats>,
}

impl<G: EngineGateway, S: EngineSession> SyncAdapter<G, S> {
    /// Creates an adapter for the structural kinds.
    pub fn new(config: AdapterConfig, gateway: Arc<G>, session: Arc<S>) -> SyncResult<Self> {
        let handlers = HandlerRegistry::structural(config.tolerance);
        Self::with_handlers(config, gateway, session, handlers, DependencyGraph::structural())
    }

    /// Creates an adapter with custom handlers and dependencies.
    ///
    /// With [`AdapterConfig::verify_dependency_table`] set, a cyclic table
    /// is rejected here with [`SyncError::DependencyCycle`].
    pub fn with_handlers(
        config: AdapterConfig,
        gateway: Arc<G>,
        session: Arc<S>,
        handlers: HandlerRegistry,
        dependencies: DependencyGraph<Kind>,
    ) -> SyncResult<Self> {
        if config.verify_dependency_table {
            dependencies.validate()?;
        }
        debug!(handlers = handlers.len(), "sync adapter created");
        Ok(Self {
            config,
            gateway,
            session,
            handlers,
            dependencies,
            allocator: IdAllocator::new(),
            identities: RwLock::new(HashMap::new()),
            stats: RwLock::new(AdapterStats::default()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Returns the handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Returns the dependency table.
    pub fn dependencies(&self) -> &DependencyGraph<Kind> {
        &self.dependencies
    }

    /// Returns the gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Gets the current stats.
    pub fn stats(&self) -> AdapterStats {
        self.stats.read().clone()
    }

    /// Returns the identity attached to an object during this session.
    pub fn identity_of(&self, object: ObjectId) -> Option<ExternalIdentity> {
        self.identities.read().get(&object).map(|(_, identity)| identity.clone())
    }

    /// Forgets every identity and name counter of this session.
    pub fn reset_session(&self) {
        self.identities.write().clear();
        self.allocator.invalidate_all();
    }

    /// Returns the next free name for a kind.
    pub fn next_id(&self, kind: Kind, refresh: bool) -> SyncResult<AllocatedName> {
        let handler = self.handlers.get(kind)?;
        self.allocator
            .next_id(self.gateway.as_ref(), kind, handler.naming(), refresh)
    }

    /// Pushes a heterogeneous collection using the configured mode.
    pub fn push(&self, objects: &mut [DomainObject]) -> SyncResult<SyncReport> {
        self.push_with_mode(objects, self.config.push_mode)
    }

    /// Pushes a heterogeneous collection.
    ///
    /// Referenced objects embedded in `objects` that have no identity yet
    /// are pushed too. Kinds are pushed in dependency order, so every
    /// object's references exist before it is created. On return every
    /// pushed object, and every embedded copy of one, carries its identity.
    ///
    /// Only session-level failures are returned as errors; everything else
    /// is recorded in the report.
    pub fn push_with_mode(
        &self,
        objects: &mut [DomainObject],
        mode: PushMode,
    ) -> SyncResult<SyncReport> {
        self.check_session(true)?;

        let mut extracted = self.extract_dependencies(objects);
        let mut kinds: Vec<Kind> = Vec::new();
        for object in objects.iter().chain(extracted.iter()) {
            if !kinds.contains(&object.kind()) {
                kinds.push(object.kind());
            }
        }
        let order = self.dependencies.order(&kinds)?;
        info!(
            objects = objects.len(),
            extracted = extracted.len(),
            kinds = order.len(),
            ?mode,
            "push started"
        );

        let mut report = SyncReport::new();
        let mut ctx = PushContext::new(mode);
        for kind in order {
            let mut batch: Vec<&mut DomainObject> = objects
                .iter_mut()
                .chain(extracted.iter_mut())
                .filter(|object| object.kind() == kind)
                .collect();
            self.push_batch(kind, &mut batch, &mut ctx, &mut report)?;
        }

        for object in objects.iter_mut() {
            self.write_back(object);
        }
        Ok(self.finish_push(ctx, report))
    }

    /// Pushes objects of a single kind using the configured mode.
    pub fn push_kind(&self, kind: Kind, objects: &mut [DomainObject]) -> SyncResult<SyncReport> {
        self.push_kind_with_mode(kind, objects, self.config.push_mode)
    }

    /// Updates existing objects of a single kind; unmatched objects fail.
    pub fn update(&self, kind: Kind, objects: &mut [DomainObject]) -> SyncResult<SyncReport> {
        self.push_kind_with_mode(kind, objects, PushMode::UpdateOnly)
    }

    /// Pushes objects of a single kind.
    ///
    /// Referenced objects must already exist in the engine. Objects of
    /// another kind are rejected individually.
    pub fn push_kind_with_mode(
        &self,
        kind: Kind,
        objects: &mut [DomainObject],
        mode: PushMode,
    ) -> SyncResult<SyncReport> {
        self.check_session(true)?;
        info!(%kind, objects = objects.len(), ?mode, "push started");

        let mut report = SyncReport::new();
        let mut ctx = PushContext::new(mode);
        let mut batch = Vec::with_capacity(objects.len());
        for object in objects.iter_mut() {
            if object.kind() == kind {
                batch.push(object);
            } else {
                let error = SyncError::invalid_object(
                    object.kind(),
                    format!("pushed in a {kind} batch"),
                );
                report.fail(ItemFailure::for_object(object, error));
            }
        }
        self.push_batch(kind, &mut batch, &mut ctx, &mut report)?;
        Ok(self.finish_push(ctx, report))
    }

    /// Reads objects of `kind` back, all of them when `ids` is `None`.
    ///
    /// Objects that cannot be read are reported and skipped. An unsupported
    /// kind is reported, not returned as an error.
    pub fn pull(&self, kind: Kind, ids: Option<&[String]>) -> SyncResult<PullReport> {
        self.check_session(false)?;

        let projector = Projector::new(self.gateway.as_ref(), &self.handlers);
        let report = match projector.project(kind, ids) {
            Ok(report) => report,
            Err(e) => {
                let error = recoverable(e)?;
                tracing::warn!(%kind, "pull failed: {}", error);
                PullReport {
                    objects: Vec::new(),
                    failures: vec![ItemFailure::for_kind(kind, error)],
                }
            }
        };

        {
            let mut identities = self.identities.write();
            for object in &report.objects {
                if let Some(identity) = object.identity() {
                    identities.insert(object.id(), (kind, identity.clone()));
                }
            }
        }

        let mut stats = self.stats.write();
        stats.pulls += 1;
        stats.pulled += report.objects.len() as u64;
        stats.failed += report.failures.len() as u64;
        info!(%kind, pulled = report.objects.len(), failed = report.failures.len(), "pull finished");
        Ok(report)
    }

    /// Deletes engine objects of `kind` by name.
    ///
    /// A missing name, or an object the engine refuses to delete because
    /// others still reference it, is an item failure.
    pub fn remove(&self, kind: Kind, ids: &[String]) -> SyncResult<SyncReport> {
        self.check_session(false)?;
        let mut report = SyncReport::new();

        match self.handlers.get(kind) {
            Err(error) => {
                for name in ids {
                    report.fail(ItemFailure::for_name(kind, name.as_str(), error.clone()));
                }
            }
            Ok(_) => {
                for name in ids {
                    match self.gateway.remove(kind, name) {
                        Ok(()) => {
                            self.forget_name(kind, name);
                            report.outcomes.push(ItemOutcome {
                                kind,
                                object: None,
                                name: name.clone(),
                                action: SyncAction::Removed,
                            });
                        }
                        Err(GatewayError::NotFound { .. }) => {
                            let error = SyncError::NotFound {
                                kind,
                                name: name.clone(),
                            };
                            report.fail(ItemFailure::for_name(kind, name.as_str(), error));
                        }
                        Err(e) => {
                            let error = recoverable(engine_error(e))?;
                            report.fail(ItemFailure::for_name(kind, name.as_str(), error));
                        }
                    }
                }
            }
        }

        let mut stats = self.stats.write();
        stats.removes += 1;
        stats.absorb(&report);
        info!(%kind, removed = report.count(SyncAction::Removed), failed = report.failures.len(), "remove finished");
        Ok(report)
    }

    /// Deletes the engine objects of previously pushed domain objects.
    ///
    /// Dependents are removed before the objects they reference. Removed
    /// objects lose their identity.
    pub fn remove_objects(&self, objects: &mut [DomainObject]) -> SyncResult<SyncReport> {
        self.check_session(false)?;
        let mut kinds: Vec<Kind> = Vec::new();
        for object in objects.iter() {
            if !kinds.contains(&object.kind()) {
                kinds.push(object.kind());
            }
        }
        let mut order = self.dependencies.order(&kinds)?;
        order.reverse();

        let mut report = SyncReport::new();
        for kind in order {
            let mut names = Vec::new();
            for object in objects.iter().filter(|o| o.kind() == kind) {
                match object.external_name() {
                    Some(name) => names.push(name.to_string()),
                    None => report.fail(ItemFailure::for_object(
                        object,
                        SyncError::MissingIdentity { kind },
                    )),
                }
            }
            let removed = self.remove(kind, &names)?;
            report.merge(removed);
        }

        for object in objects.iter_mut() {
            let removed = object.external_name().is_some_and(|name| {
                report
                    .outcomes
                    .iter()
                    .any(|o| o.kind == object.kind() && o.name == name)
            });
            if removed {
                object.clear_identity();
            }
        }
        Ok(report)
    }

    /// Moves objects of a positional kind to their `position`, one
    /// transform per distinct axis delta.
    pub fn move_objects(&self, kind: Kind, objects: &[DomainObject]) -> SyncResult<ScheduleOutcome> {
        self.check_session(true)?;
        let handler = self.handlers.get(kind)?;
        let field = handler
            .position_field()
            .ok_or_else(|| SyncError::invalid_object(kind, "kind has no position"))?;
        let delta = engine_position_delta(self.gateway.as_ref(), kind, field);
        self.schedule_and_apply(kind, objects, delta)
    }

    /// Applies caller-computed deltas with one transform per distinct axis delta.
    pub fn schedule_and_apply<F>(
        &self,
        kind: Kind,
        objects: &[DomainObject],
        compute_delta: F,
    ) -> SyncResult<ScheduleOutcome>
    where
        F: FnMut(&DomainObject) -> SyncResult<Vector3>,
    {
        let scheduler = BatchScheduler::new(self.gateway.as_ref(), self.config.tolerance);
        let outcome = scheduler.schedule_and_apply(kind, objects, compute_delta)?;
        self.stats.write().transform_calls += outcome.transform_calls() as u64;
        Ok(outcome)
    }

    fn check_session(&self, pushing: bool) -> SyncResult<()> {
        if !self.session.is_ready() {
            return Err(SyncError::EngineNotReady);
        }
        if pushing && self.config.require_saved_model {
            let path = self.session.current_model_path();
            if path == UNTITLED_MODEL {
                return Err(SyncError::UnsavedModel { path });
            }
        }
        Ok(())
    }

    fn finish_push(&self, ctx: PushContext, mut report: SyncReport) -> SyncReport {
        for warning in ctx.warnings {
            report.warn(warning.kind, warning.error);
        }
        let mut stats = self.stats.write();
        stats.pushes += 1;
        stats.absorb(&report);
        info!(
            created = report.count(SyncAction::Created),
            updated = report.count(SyncAction::Updated),
            unchanged = report.count(SyncAction::Unchanged),
            failed = report.failures.len(),
            "push finished"
        );
        report
    }

    /// Collects embedded objects that are neither in `objects` nor known to
    /// the engine, breadth first.
    fn extract_dependencies(&self, objects: &[DomainObject]) -> Vec<DomainObject> {
        let identities = self.identities.read();
        let mut seen: HashSet<ObjectId> = objects.iter().map(DomainObject::id).collect();
        let mut queue: VecDeque<&DomainObject> =
            objects.iter().flat_map(|object| object.references()).collect();
        let mut extracted = Vec::new();

        while let Some(object) = queue.pop_front() {
            if !seen.insert(object.id()) {
                continue;
            }
            queue.extend(object.references());
            if object.identity().is_none() && !identities.contains_key(&object.id()) {
                extracted.push(object.clone());
            }
        }
        extracted
    }

    fn push_batch(
        &self,
        kind: Kind,
        batch: &mut [&mut DomainObject],
        ctx: &mut PushContext,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let handler = match self.handlers.get(kind) {
            Ok(handler) => handler,
            Err(error) => {
                for object in batch.iter() {
                    report.fail(ItemFailure::for_object(object, error.clone()));
                }
                return Ok(());
            }
        };
        let comparer = handler.comparer();
        debug!(%kind, count = batch.len(), "pushing batch");

        // Resolve references and check the identity key
        let mut ready = Vec::with_capacity(batch.len());
        for (i, object) in batch.iter_mut().enumerate() {
            let result = match self.resolve_references(object, ctx) {
                Ok(()) if !comparer.has_key(object) => Err(SyncError::invalid_object(
                    kind,
                    "missing the attributes that identify it",
                )),
                other => other,
            };
            match result {
                Ok(()) => ready.push(i),
                Err(e) => report.fail(ItemFailure::for_object(object, recoverable(e)?)),
            }
        }

        // Collapse duplicates within the batch, first seen wins
        let mut survivors: Vec<usize> = Vec::new();
        let mut duplicates: Vec<(usize, usize)> = Vec::new();
        let mut seen = IdentityIndex::new();
        for &i in &ready {
            match seen.find_or_insert(comparer, (*batch[i]).clone()) {
                Ok(position) => duplicates.push((i, survivors[position])),
                Err(_) => survivors.push(i),
            }
        }

        // Match against the engine
        let matches: Vec<Option<DomainObject>> = if ctx.mode.matches_existing() {
            match self.existing(kind, ctx) {
                Ok(existing) => survivors
                    .iter()
                    .map(|&i| existing.find(comparer, &*batch[i]).cloned())
                    .collect(),
                Err(e) => {
                    let error = recoverable(e)?;
                    for &i in survivors.iter().chain(duplicates.iter().map(|(d, _)| d)) {
                        report.fail(ItemFailure::for_object(&*batch[i], error.clone()));
                    }
                    return Ok(());
                }
            }
        } else {
            vec![None; survivors.len()]
        };

        let mut creates = Vec::new();
        let mut updates = Vec::new();
        for (&i, matched) in survivors.iter().zip(matches) {
            match matched {
                Some(existing) if ctx.mode.updates() => updates.push((i, existing)),
                Some(existing) => {
                    let object = &mut *batch[i];
                    let identity = existing.identity().cloned().unwrap_or_default();
                    self.attach(object, identity.clone());
                    report.record(object, &identity.name, SyncAction::Unchanged);
                }
                None if ctx.mode.creates() => creates.push(i),
                None => {
                    let object = &*batch[i];
                    let error = SyncError::NotFound {
                        kind,
                        name: describe(object),
                    };
                    report.fail(ItemFailure::for_object(object, error));
                }
            }
        }

        // Create
        for i in creates {
            let object = &mut *batch[i];
            match self.create(handler, object, ctx) {
                Ok(identity) => {
                    let name = identity.name.clone();
                    self.attach(object, identity);
                    report.record(object, &name, SyncAction::Created);
                }
                Err(e) => report.fail(ItemFailure::for_object(object, recoverable(e)?)),
            }
        }

        // Update attributes, collecting position moves
        let mut moves: HashMap<ObjectId, (usize, Vector3)> = HashMap::new();
        let mut move_order: Vec<usize> = Vec::new();
        for (i, existing) in updates {
            let object = &mut *batch[i];
            let mut identity = existing.identity().cloned().unwrap_or_default();
            match self.update_attributes(handler, object, &existing) {
                Ok(plan) => {
                    if let Some(label) = object.text(LABEL_ATTRIBUTE) {
                        identity.label = label.to_string();
                    }
                    let name = identity.name.clone();
                    self.attach(object, identity);
                    match plan.delta {
                        Some(delta) => {
                            moves.insert(object.id(), (plan.changed, delta));
                            move_order.push(i);
                        }
                        None if plan.changed > 0 => report.record(object, &name, SyncAction::Updated),
                        None => report.record(object, &name, SyncAction::Unchanged),
                    }
                }
                Err(e) => {
                    self.attach(object, identity);
                    report.fail(ItemFailure::for_object(object, recoverable(e)?));
                }
            }
        }

        // Move positions, one transform per distinct axis delta
        if !move_order.is_empty() {
            let objects: Vec<&DomainObject> = move_order.iter().map(|&i| &*batch[i]).collect();
            let scheduler = BatchScheduler::new(self.gateway.as_ref(), self.config.tolerance);
            let outcome = scheduler.schedule_and_apply(kind, objects.iter().copied(), |object| {
                Ok(moves
                    .get(&object.id())
                    .map(|(_, delta)| *delta)
                    .unwrap_or(Vector3::ZERO))
            })?;

            let moved: HashSet<ObjectId> = outcome.moved.iter().copied().collect();
            for object in &objects {
                let name = object.external_name().unwrap_or_default();
                let changed = moves.get(&object.id()).map_or(0, |(changed, _)| *changed);
                if moved.contains(&object.id()) || changed > 0 {
                    report.record(object, name, SyncAction::Updated);
                } else if outcome.unchanged.contains(&object.id()) {
                    report.record(object, name, SyncAction::Unchanged);
                }
            }
            for failure in outcome.failures {
                report.outcomes.retain(|o| o.object != failure.object);
                report.fail(failure);
            }
            report.transform_groups.extend(outcome.groups);
        }

        // Duplicates take the identity of the object they collapsed into
        for (duplicate, survivor) in duplicates {
            let survivor_id = batch[survivor].id();
            let identity = match report.failure_of(survivor_id) {
                Some(_) => None,
                None => batch[survivor].identity().cloned(),
            };
            let object = &mut *batch[duplicate];
            match identity {
                Some(identity) => {
                    let name = identity.name.clone();
                    self.attach(object, identity);
                    report.record(object, &name, SyncAction::Merged);
                }
                None => {
                    let error = SyncError::invalid_object(
                        kind,
                        format!("duplicate of {survivor_id}, which was not pushed"),
                    );
                    report.fail(ItemFailure::for_object(object, error));
                }
            }
        }

        ctx.invalidate(kind);
        Ok(())
    }

    fn resolve_references(&self, object: &mut DomainObject, ctx: &mut PushContext) -> SyncResult<()> {
        let owner = object.kind();
        for target in object.references_mut() {
            self.resolve_reference(owner, target, ctx)?;
        }
        Ok(())
    }

    /// Attaches the engine identity of a referenced object.
    ///
    /// Identities attached earlier in the session win. A reference that
    /// already carries an identity is checked against the engine when
    /// [`AdapterConfig::verify_references`] is set. Anything else is
    /// looked up among the engine objects with the kind's comparer.
    fn resolve_reference(
        &self,
        owner: Kind,
        target: &mut DomainObject,
        ctx: &mut PushContext,
    ) -> SyncResult<()> {
        let kind = target.kind();
        if let Some(identity) = self.identity_of(target.id()) {
            target.set_identity(identity);
            return Ok(());
        }

        if let Some(identity) = target.identity().cloned() {
            if !self.config.verify_references || self.exists(kind, &identity.name, ctx)? {
                return Ok(());
            }
            if identity.persistent_id().is_some() {
                let comparer = self.handlers.get(kind)?.comparer();
                if let Some(found) = self.existing(kind, ctx)?.find(comparer, target) {
                    let found = found.identity().cloned().unwrap_or_default();
                    target.set_identity(found);
                    return Ok(());
                }
            }
            return Err(SyncError::MissingReference {
                kind: owner,
                target: format!("{kind} '{}'", identity.name),
            });
        }

        for nested in target.references_mut() {
            self.resolve_reference(kind, nested, ctx)?;
        }
        let comparer = self.handlers.get(kind)?.comparer();
        let found = self
            .existing(kind, ctx)?
            .find(comparer, target)
            .and_then(|found| found.identity().cloned());
        match found {
            Some(identity) => {
                target.set_identity(identity);
                Ok(())
            }
            None => Err(SyncError::MissingReference {
                kind: owner,
                target: format!("{kind} {}", target.id()),
            }),
        }
    }

    fn exists(&self, kind: Kind, name: &str, ctx: &mut PushContext) -> SyncResult<bool> {
        let names = match ctx.names.entry(kind) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let names = self.gateway.list_names(kind).map_err(engine_error)?;
                entry.insert(names.into_iter().collect())
            }
        };
        Ok(names.contains(name))
    }

    fn existing<'c>(&self, kind: Kind, ctx: &'c mut PushContext) -> SyncResult<&'c ExistingSet> {
        match ctx.existing.entry(kind) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let handler = self.handlers.get(kind)?;
                let projector = Projector::new(self.gateway.as_ref(), &self.handlers);
                let pulled = projector.project_with(kind, None, &mut ctx.memo)?;
                for failure in pulled.failures {
                    ctx.warnings.push(SyncWarning {
                        kind,
                        error: failure.error,
                    });
                }

                let mut set = ExistingSet::default();
                for object in pulled.objects {
                    set.insert(handler.comparer(), object);
                }
                debug!(%kind, existing = set.index.len(), "indexed engine objects");
                Ok(entry.insert(set))
            }
        }
    }

    fn create(
        &self,
        handler: &KindHandler,
        object: &DomainObject,
        ctx: &mut PushContext,
    ) -> SyncResult<ExternalIdentity> {
        let kind = handler.kind();
        let attributes = handler.to_engine(object)?;
        let mut retried = false;

        loop {
            let refresh = self.config.refresh_ids_per_push && ctx.refreshed.insert(kind);
            let allocated =
                self.allocator
                    .next_id(self.gateway.as_ref(), kind, handler.naming(), refresh)?;
            for name in allocated.collisions {
                ctx.warnings.push(SyncWarning {
                    kind,
                    error: SyncError::IdentifierCollision { kind, name },
                });
            }

            match self.gateway.add_element(kind, &allocated.name, &attributes) {
                Ok(assigned) => {
                    if assigned != allocated.name {
                        self.allocator.reserve(kind, &assigned);
                    }
                    ctx.note_created(kind, &assigned);
                    return match self.read_identity(kind, &assigned) {
                        Ok(identity) => Ok(identity),
                        Err(e) => {
                            let error = recoverable(e)?;
                            ctx.warnings.push(SyncWarning { kind, error });
                            Ok(ExternalIdentity::named(assigned))
                        }
                    };
                }
                Err(GatewayError::NameInUse { name, .. }) if !retried => {
                    ctx.warnings.push(SyncWarning {
                        kind,
                        error: SyncError::IdentifierCollision { kind, name },
                    });
                    self.allocator.invalidate(kind);
                    retried = true;
                }
                Err(e) => return Err(engine_error(e)),
            }
        }
    }

    /// Sets the attributes that differ from the engine's state.
    ///
    /// A changed position is not written when position batching is on; it
    /// is returned as a delta for the scheduler instead.
    fn update_attributes(
        &self,
        handler: &KindHandler,
        object: &DomainObject,
        existing: &DomainObject,
    ) -> SyncResult<UpdatePlan> {
        let kind = handler.kind();
        let name = existing
            .external_name()
            .ok_or(SyncError::MissingIdentity { kind })?;
        let desired = handler.to_engine(object)?;
        let mut current = handler.to_engine(existing)?;
        let label = existing.identity().map(|i| i.label.as_str()).unwrap_or_default();
        current.insert(LABEL_ATTRIBUTE.to_string(), EngineValue::from(label));

        let mut plan = UpdatePlan {
            changed: 0,
            delta: None,
        };
        for (attribute, value) in &desired {
            let current_value = current.get(attribute);
            if current_value.is_some_and(|c| c.approx_eq(value, self.config.tolerance)) {
                continue;
            }
            if self.config.batch_position_updates
                && handler.position_field() == Some(attribute.as_str())
            {
                if let (Some(from), Some(to)) =
                    (current_value.and_then(EngineValue::as_point), value.as_point())
                {
                    plan.delta = Some(to - from);
                    continue;
                }
            }
            self.gateway
                .set_attribute(kind, name, attribute, value)
                .map_err(engine_error)?;
            plan.changed += 1;
        }
        Ok(plan)
    }

    fn read_identity(&self, kind: Kind, name: &str) -> SyncResult<ExternalIdentity> {
        let read = |attribute: &str| match self.gateway.get_attribute(kind, name, attribute) {
            Ok(value) => Ok(value.as_text().unwrap_or_default().to_string()),
            Err(GatewayError::AttributeNotFound { .. }) => Ok(String::new()),
            Err(e) => Err(engine_error(e)),
        };
        Ok(ExternalIdentity::new(
            name,
            read(LABEL_ATTRIBUTE)?,
            read(PERSISTENT_ID_ATTRIBUTE)?,
        ))
    }

    fn attach(&self, object: &mut DomainObject, identity: ExternalIdentity) {
        self.identities
            .write()
            .insert(object.id(), (object.kind(), identity.clone()));
        object.set_identity(identity);
    }

    fn forget_name(&self, kind: Kind, name: &str) {
        self.identities
            .write()
            .retain(|_, (k, identity)| !(*k == kind && identity.name == name));
    }

    /// Copies session identities into embedded references, recursively.
    fn write_back(&self, object: &mut DomainObject) {
        for reference in object.references_mut() {
            if let Some(identity) = self.identity_of(reference.id()) {
                reference.set_identity(identity);
            }
            self.write_back(reference);
        }
    }
}

fn describe(object: &DomainObject) -> String {
    match object.external_name() {
        Some(name) => name.to_string(),
        None => object.id().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use structlink_gateway::{EngineAttributes, EngineRef, InMemoryEngine};
    use structlink_model::{AttributeValue, Point3};

    fn setup_with(config: AdapterConfig) -> (Arc<InMemoryEngine>, SyncAdapter<InMemoryEngine, InMemoryEngine>) {
        let engine = Arc::new(InMemoryEngine::new());
        let adapter = SyncAdapter::new(config, engine.clone(), engine.clone()).unwrap();
        (engine, adapter)
    }

    fn setup() -> (Arc<InMemoryEngine>, SyncAdapter<InMemoryEngine, InMemoryEngine>) {
        setup_with(AdapterConfig::default())
    }

    fn node(x: f64, y: f64, z: f64) -> DomainObject {
        DomainObject::node(Point3::new(x, y, z))
    }

    fn bar(start: &DomainObject, end: &DomainObject) -> DomainObject {
        DomainObject::new(Kind::Bar)
            .with_attribute("start", start.clone())
            .with_attribute("end", end.clone())
    }

    fn engine_position(engine: &InMemoryEngine, name: &str) -> Point3 {
        engine.attributes_of(Kind::Node, name).unwrap()["position"]
            .as_point()
            .unwrap()
    }

    #[test]
    fn unready_engine_is_fatal() {
        let (engine, adapter) = setup();
        engine.set_ready(false);

        let mut objects = vec![node(0.0, 0.0, 0.0)];
        assert_eq!(adapter.push(&mut objects), Err(SyncError::EngineNotReady));
        assert_eq!(adapter.pull(Kind::Node, None), Err(SyncError::EngineNotReady));
        assert_eq!(adapter.remove(Kind::Node, &[]), Err(SyncError::EngineNotReady));
    }

    #[test]
    fn unsaved_model_refused_when_required() {
        let (engine, adapter) = setup_with(AdapterConfig::new().with_require_saved_model(true));
        let mut objects = vec![node(0.0, 0.0, 0.0)];

        assert!(matches!(
            adapter.push(&mut objects),
            Err(SyncError::UnsavedModel { .. })
        ));
        assert!(adapter.pull(Kind::Node, None).is_ok());

        engine.set_model_path(Some("/models/frame.mdl"));
        assert!(adapter.push(&mut objects).unwrap().is_success());
    }

    #[test]
    fn cyclic_table_rejected_at_startup() {
        let engine = Arc::new(InMemoryEngine::new());
        let mut graph = DependencyGraph::structural();
        graph.add_requirement(Kind::Material, Kind::Bar);

        let result = SyncAdapter::with_handlers(
            AdapterConfig::new().with_verify_dependency_table(true),
            engine.clone(),
            engine,
            HandlerRegistry::structural(1e-3),
            graph,
        );
        assert!(matches!(result, Err(SyncError::DependencyCycle { .. })));
    }

    #[test]
    fn unsupported_kind_does_not_stop_other_kinds() {
        let engine = Arc::new(InMemoryEngine::new());
        let mut handlers = HandlerRegistry::structural(1e-3);
        handlers.unregister(Kind::Panel);
        let adapter = SyncAdapter::with_handlers(
            AdapterConfig::default(),
            engine.clone(),
            engine.clone(),
            handlers,
            DependencyGraph::structural(),
        )
        .unwrap();

        let corner = node(0.0, 0.0, 0.0);
        let panel = DomainObject::new(Kind::Panel).with_attribute("corners", vec![corner.clone()]);
        let mut objects = vec![corner, panel];
        let report = adapter.push(&mut objects).unwrap();

        assert_eq!(report.count(SyncAction::Created), 1);
        assert_eq!(
            report.failure_of(objects[1].id()).unwrap().error,
            SyncError::UnsupportedKind("Panel".into())
        );
        assert_eq!(engine.object_count(Kind::Node), 1);
    }

    #[test]
    fn create_only_skips_matching() {
        let (engine, adapter) = setup();
        adapter
            .push_with_mode(&mut [node(0.0, 0.0, 0.0)], PushMode::CreateOnly)
            .unwrap();
        adapter
            .push_with_mode(&mut [node(0.0, 0.0, 0.0)], PushMode::CreateOnly)
            .unwrap();
        assert_eq!(engine.names(Kind::Node), vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn update_only_reports_unmatched() {
        let (engine, adapter) = setup();
        let mut objects = vec![node(0.0, 0.0, 0.0)];
        let report = adapter.update(Kind::Node, &mut objects).unwrap();

        assert!(matches!(report.failures[0].error, SyncError::NotFound { kind: Kind::Node, .. }));
        assert_eq!(engine.object_count(Kind::Node), 0);
    }

    #[test]
    fn create_non_existing_leaves_matches_untouched() {
        let (engine, adapter) = setup();
        let mut attrs = EngineAttributes::new();
        attrs.insert("position".into(), Point3::ORIGIN.into());
        attrs.insert("support".into(), "fixed".into());
        engine.seed(Kind::Node, "1", attrs).unwrap();

        let mut objects = vec![
            node(0.0, 0.0, 0.0).with_attribute("support", "pinned"),
            node(5.0, 0.0, 0.0),
        ];
        let report = adapter
            .push_with_mode(&mut objects, PushMode::CreateNonExisting)
            .unwrap();

        assert_eq!(report.outcome_of(objects[0].id()).unwrap().action, SyncAction::Unchanged);
        assert_eq!(report.outcome_of(objects[1].id()).unwrap().action, SyncAction::Created);
        assert_eq!(objects[0].external_name(), Some("1"));
        assert_eq!(engine.calls().set, 0);
        assert_eq!(
            engine.attributes_of(Kind::Node, "1").unwrap()["support"],
            EngineValue::from("fixed")
        );
    }

    #[test]
    fn duplicates_in_batch_are_merged() {
        let (engine, adapter) = setup();
        let mut objects = vec![node(0.0, 0.0, 0.0), node(0.0005, 0.0, 0.0)];
        let report = adapter.push(&mut objects).unwrap();

        assert_eq!(engine.object_count(Kind::Node), 1);
        assert_eq!(report.count(SyncAction::Created), 1);
        assert_eq!(report.count(SyncAction::Merged), 1);
        assert_eq!(objects[0].identity(), objects[1].identity());
    }

    #[test]
    fn embedded_dependencies_are_pushed_first() {
        let (engine, adapter) = setup();
        let material = DomainObject::named(Kind::Material, "S355").with_attribute("modulus", 210e9);
        let section = DomainObject::named(Kind::SectionProperty, "IPE200")
            .with_attribute("material", material.clone());

        let mut objects = vec![section];
        let report = adapter.push(&mut objects).unwrap();

        assert!(report.is_success());
        assert_eq!(report.count(SyncAction::Created), 2);
        assert_eq!(engine.names(Kind::Material), vec!["Material-1".to_string()]);
        assert_eq!(objects[0].external_name(), Some("SectionProperty-1"));

        let Some(AttributeValue::Object(embedded)) = objects[0].attribute("material") else {
            panic!("material is not embedded");
        };
        assert_eq!(embedded.external_name(), Some("Material-1"));
        assert_eq!(
            adapter.identity_of(material.id()).map(|i| i.name),
            Some("Material-1".to_string())
        );
        assert_eq!(
            engine.attributes_of(Kind::SectionProperty, "SectionProperty-1").unwrap()["material"],
            EngineValue::Ref(EngineRef::new(Kind::Material, "Material-1"))
        );
    }

    #[test]
    fn references_resolve_against_engine_objects() {
        let (engine, adapter) = setup();
        adapter.push(&mut [node(0.0, 0.0, 0.0), node(1.0, 0.0, 0.0)]).unwrap();

        // Fresh domain objects at the same positions, never pushed.
        let a = node(0.0, 0.0, 0.0);
        let b = node(1.0, 0.0, 0.0005);
        let mut bars = vec![bar(&a, &b)];
        let report = adapter.push_kind(Kind::Bar, &mut bars).unwrap();

        assert!(report.is_success());
        assert_eq!(engine.object_count(Kind::Node), 2);
        assert_eq!(
            engine.attributes_of(Kind::Bar, "1").unwrap()["end"],
            EngineValue::Ref(EngineRef::new(Kind::Node, "2"))
        );
    }

    #[test]
    fn missing_reference_is_an_item_failure() {
        let (engine, adapter) = setup();
        let ghost_a = node(0.0, 0.0, 0.0).with_identity(ExternalIdentity::named("77"));
        let ghost_b = node(1.0, 0.0, 0.0).with_identity(ExternalIdentity::named("78"));
        let mut bars = vec![bar(&ghost_a, &ghost_b)];

        let report = adapter.push_kind(Kind::Bar, &mut bars).unwrap();

        assert!(matches!(
            report.failures[0].error,
            SyncError::MissingReference { kind: Kind::Bar, .. }
        ));
        assert_eq!(engine.calls().add, 0);
    }

    #[test]
    fn name_collision_is_retried_with_fresh_scan() {
        let (engine, adapter) = setup_with(AdapterConfig::new().with_refresh_ids_per_push(false));
        adapter.push(&mut [node(0.0, 0.0, 0.0)]).unwrap();

        let mut attrs = EngineAttributes::new();
        attrs.insert("position".into(), Point3::new(9.0, 9.0, 9.0).into());
        engine.seed(Kind::Node, "2", attrs).unwrap();

        let mut objects = vec![node(5.0, 0.0, 0.0)];
        let report = adapter.push(&mut objects).unwrap();

        assert!(report.is_success());
        assert_eq!(objects[0].external_name(), Some("3"));
        assert!(report.warnings.iter().any(|w| matches!(
            &w.error,
            SyncError::IdentifierCollision { name, .. } if name == "2"
        )));
    }

    #[test]
    fn only_changed_attributes_are_set() {
        let (engine, adapter) = setup();
        let mut objects = vec![DomainObject::named(Kind::Material, "S355").with_attribute("modulus", 210e9)];
        adapter.push(&mut objects).unwrap();
        engine.reset_calls();

        objects[0].set_attribute("modulus", 200e9);
        objects[0].set_attribute("density", 7850.0);
        let report = adapter.push(&mut objects).unwrap();

        assert_eq!(report.outcome_of(objects[0].id()).unwrap().action, SyncAction::Updated);
        assert_eq!(engine.calls().set, 2);
        assert_eq!(engine.calls().add, 0);
    }

    #[test]
    fn renamed_object_is_found_by_persistent_id() {
        let (engine, adapter) = setup();
        let mut objects = vec![node(0.0, 0.0, 0.0)];
        adapter.push(&mut objects).unwrap();
        engine.rename(Kind::Node, "1", "100").unwrap();

        objects[0].set_attribute("position", Point3::new(0.0, 0.0, 2.0));
        let report = adapter.push(&mut objects).unwrap();

        assert!(report.is_success());
        assert_eq!(report.outcome_of(objects[0].id()).unwrap().action, SyncAction::Updated);
        assert_eq!(objects[0].external_name(), Some("100"));
        assert_eq!(engine.object_count(Kind::Node), 1);
        assert_eq!(engine_position(&engine, "100"), Point3::new(0.0, 0.0, 2.0));
        assert_eq!(engine.calls().transform, 1);
    }

    #[test]
    fn unbatched_position_update_uses_set_attribute() {
        let (engine, adapter) =
            setup_with(AdapterConfig::new().with_batch_position_updates(false));
        let mut objects = vec![node(0.0, 0.0, 0.0)];
        adapter.push(&mut objects).unwrap();

        objects[0].set_attribute("position", Point3::new(1.0, 0.0, 0.0));
        let report = adapter.push(&mut objects).unwrap();

        assert!(report.transform_groups.is_empty());
        assert_eq!(engine.calls().transform, 0);
        assert_eq!(engine_position(&engine, "1"), Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn remove_reports_missing_and_referenced() {
        let (engine, adapter) = setup();
        let a = node(0.0, 0.0, 0.0);
        let b = node(1.0, 0.0, 0.0);
        let mut objects = vec![a.clone(), b.clone(), bar(&a, &b)];
        adapter.push(&mut objects).unwrap();

        let report = adapter
            .remove(Kind::Node, &["1".to_string(), "5".to_string()])
            .unwrap();
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(
            report.failures[0].error,
            SyncError::Gateway(GatewayError::InUse { .. })
        ));
        assert!(matches!(report.failures[1].error, SyncError::NotFound { .. }));

        let report = adapter.remove_objects(&mut objects).unwrap();
        assert!(report.is_success());
        assert_eq!(report.count(SyncAction::Removed), 3);
        assert!(objects.iter().all(|o| o.identity().is_none()));
        assert_eq!(engine.object_count(Kind::Node), 0);
        assert_eq!(adapter.stats().removed, 3);
    }

    #[test]
    fn stats_accumulate() {
        let (_engine, adapter) = setup();
        let mut objects = vec![node(0.0, 0.0, 0.0), node(1.0, 0.0, 0.0)];
        adapter.push(&mut objects).unwrap();
        adapter.push(&mut objects).unwrap();
        adapter.pull(Kind::Node, None).unwrap();

        let stats = adapter.stats();
        assert_eq!(stats.pushes, 2);
        assert_eq!(stats.created, 2);
        assert_eq!(stats.unchanged, 2);
        assert_eq!(stats.pulls, 1);
        assert_eq!(stats.pulled, 2);
        assert_eq!(stats.failed, 0);
    }
}

//! Configuration for the sync adapter.

/// Default proximity tolerance, in model length units.
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// How a push treats objects that already exist in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushMode {
    /// Create unmatched objects and update matched ones.
    #[default]
    FullPush,
    /// Create every object without looking for matches.
    CreateOnly,
    /// Update matched objects; unmatched objects are reported as not found.
    UpdateOnly,
    /// Create unmatched objects and leave matched ones untouched.
    CreateNonExisting,
}

impl PushMode {
    /// Returns true if incoming objects are matched against the engine.
    pub const fn matches_existing(&self) -> bool {
        !matches!(self, PushMode::CreateOnly)
    }

    /// Returns true if unmatched objects are created.
    pub const fn creates(&self) -> bool {
        !matches!(self, PushMode::UpdateOnly)
    }

    /// Returns true if matched objects are updated.
    pub const fn updates(&self) -> bool {
        matches!(self, PushMode::FullPush | PushMode::UpdateOnly)
    }
}

/// Configuration for a [`crate::SyncAdapter`].
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Distance under which two positions are the same point.
    pub tolerance: f64,
    /// Mode used by [`crate::SyncAdapter::push`].
    pub push_mode: PushMode,
    /// Check that referenced objects outside the batch exist before creating.
    pub verify_references: bool,
    /// Route position changes through grouped transforms.
    pub batch_position_updates: bool,
    /// Re-scan engine names on the first allocation of every push.
    pub refresh_ids_per_push: bool,
    /// Refuse to push into a model that was never saved.
    pub require_saved_model: bool,
    /// Check the dependency table for cycles when the adapter is built.
    pub verify_dependency_table: bool,
}

impl AdapterConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            push_mode: PushMode::default(),
            verify_references: true,
            batch_position_updates: true,
            refresh_ids_per_push: true,
            require_saved_model: false,
            verify_dependency_table: cfg!(debug_assertions),
        }
    }

    /// Sets the proximity tolerance. Non-positive values fall back to the default.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = if tolerance > 0.0 {
            tolerance
        } else {
            DEFAULT_TOLERANCE
        };
        self
    }

    /// Sets the default push mode.
    #[must_use]
    pub fn with_push_mode(mut self, mode: PushMode) -> Self {
        self.push_mode = mode;
        self
    }

    /// Enables or disables the existence check of out-of-batch references.
    #[must_use]
    pub fn with_verify_references(mut self, enabled: bool) -> Self {
        self.verify_references = enabled;
        self
    }

    /// Enables or disables grouped position updates.
    #[must_use]
    pub fn with_batch_position_updates(mut self, enabled: bool) -> Self {
        self.batch_position_updates = enabled;
        self
    }

    /// Enables or disables the per-push name re-scan.
    #[must_use]
    pub fn with_refresh_ids_per_push(mut self, enabled: bool) -> Self {
        self.refresh_ids_per_push = enabled;
        self
    }

    /// Requires a saved model before pushing.
    #[must_use]
    pub fn with_require_saved_model(mut self, enabled: bool) -> Self {
        self.require_saved_model = enabled;
        self
    }

    /// Enables or disables the startup dependency table check.
    #[must_use]
    pub fn with_verify_dependency_table(mut self, enabled: bool) -> Self {
        self.verify_dependency_table = enabled;
        self
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = AdapterConfig::default();
        assert_eq!(config.tolerance, DEFAULT_TOLERANCE);
        assert_eq!(config.push_mode, PushMode::FullPush);
        assert!(config.verify_references);
        assert!(config.batch_position_updates);
        assert!(config.refresh_ids_per_push);
        assert!(!config.require_saved_model);
    }

    #[test]
    fn config_builder() {
        let config = AdapterConfig::new()
            .with_tolerance(0.01)
            .with_push_mode(PushMode::UpdateOnly)
            .with_verify_references(false)
            .with_batch_position_updates(false)
            .with_require_saved_model(true);

        assert_eq!(config.tolerance, 0.01);
        assert_eq!(config.push_mode, PushMode::UpdateOnly);
        assert!(!config.verify_references);
        assert!(!config.batch_position_updates);
        assert!(config.require_saved_model);
    }

    #[test]
    fn non_positive_tolerance_falls_back() {
        assert_eq!(AdapterConfig::new().with_tolerance(0.0).tolerance, DEFAULT_TOLERANCE);
        assert_eq!(AdapterConfig::new().with_tolerance(-1.0).tolerance, DEFAULT_TOLERANCE);
    }

    #[test]
    fn push_mode_flags() {
        assert!(PushMode::FullPush.matches_existing());
        assert!(PushMode::FullPush.creates() && PushMode::FullPush.updates());
        assert!(!PushMode::CreateOnly.matches_existing());
        assert!(!PushMode::UpdateOnly.creates());
        assert!(PushMode::CreateNonExisting.creates());
        assert!(!PushMode::CreateNonExisting.updates());
    }
}

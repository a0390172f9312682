//! Scoped access to the engine's global selection.

use crate::error::GatewayResult;
use crate::gateway::EngineGateway;
use structlink_model::Kind;
use tracing::warn;

/// An acquired engine selection.
///
/// Acquiring clears any stale selection left by a previous operation.
/// Releasing clears the selection again. If the scope is dropped without an
/// explicit [`release`](Self::release) (early return, panic), `Drop` clears
/// it, so the selection never outlives the scope.
pub struct SelectionScope<'a, G: EngineGateway + ?Sized> {
    gateway: &'a G,
    selected: usize,
    released: bool,
}

impl<'a, G: EngineGateway + ?Sized> SelectionScope<'a, G> {
    /// Clears the engine selection and starts a new scope.
    pub fn acquire(gateway: &'a G) -> GatewayResult<Self> {
        gateway.clear_selection()?;
        Ok(Self {
            gateway,
            selected: 0,
            released: false,
        })
    }

    /// Adds an object to the selection.
    pub fn select(&mut self, kind: Kind, name: &str) -> GatewayResult<()> {
        self.gateway.select(kind, name)?;
        self.selected += 1;
        Ok(())
    }

    /// Number of objects selected through this scope.
    pub fn len(&self) -> usize {
        self.selected
    }

    /// Returns true if nothing was selected through this scope.
    pub fn is_empty(&self) -> bool {
        self.selected == 0
    }

    /// Clears the selection and ends the scope.
    pub fn release(mut self) -> GatewayResult<()> {
        self.released = true;
        self.gateway.clear_selection()
    }
}

impl<G: EngineGateway + ?Sized> Drop for SelectionScope<'_, G> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.gateway.clear_selection() {
                warn!("failed to clear engine selection: {}", e);
            }
        }
    }
}

/// Runs `f` inside a selection scope.
///
/// The selection is cleared before `f` runs and after it returns, whether
/// it succeeded or not. An error from `f` takes precedence over an error
/// from the final clear.
pub fn with_selection<G, T, F>(gateway: &G, f: F) -> GatewayResult<T>
where
    G: EngineGateway + ?Sized,
    F: FnOnce(&mut SelectionScope<'_, G>) -> GatewayResult<T>,
{
    let mut scope = SelectionScope::acquire(gateway)?;
    let result = f(&mut scope);
    let released = scope.release();

    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(release_error)) => {
            warn!("failed to clear engine selection after error: {}", release_error);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::memory::InMemoryEngine;
    use crate::value::EngineAttributes;
    use structlink_model::{Axis, Point3};

    fn engine_with_nodes(count: usize) -> InMemoryEngine {
        let engine = InMemoryEngine::new();
        for i in 1..=count {
            let mut attrs = EngineAttributes::new();
            attrs.insert("position".into(), Point3::new(i as f64, 0.0, 0.0).into());
            engine.seed(Kind::Node, &i.to_string(), attrs).unwrap();
        }
        engine
    }

    #[test]
    fn selection_cleared_after_success() {
        let engine = engine_with_nodes(2);

        with_selection(&engine, |scope| {
            scope.select(Kind::Node, "1")?;
            scope.select(Kind::Node, "2")?;
            assert_eq!(scope.len(), 2);
            engine.apply_transform(Axis::Z, 1.0)
        })
        .unwrap();

        assert!(engine.selection().is_empty());
        assert_eq!(engine.calls().clear, 2);
    }

    #[test]
    fn selection_cleared_after_error() {
        let engine = engine_with_nodes(1);

        let result = with_selection(&engine, |scope| {
            scope.select(Kind::Node, "1")?;
            scope.select(Kind::Node, "missing")
        });

        assert!(matches!(result, Err(GatewayError::NotFound { .. })));
        assert!(engine.selection().is_empty());
    }

    #[test]
    fn drop_clears_unreleased_scope() {
        let engine = engine_with_nodes(1);
        {
            let mut scope = SelectionScope::acquire(&engine).unwrap();
            scope.select(Kind::Node, "1").unwrap();
            assert_eq!(engine.selection().len(), 1);
        }
        assert!(engine.selection().is_empty());
    }

    #[test]
    fn acquire_clears_stale_selection() {
        let engine = engine_with_nodes(2);
        engine.select(Kind::Node, "2").unwrap();

        with_selection(&engine, |scope| {
            scope.select(Kind::Node, "1")?;
            engine.apply_transform(Axis::X, 5.0)
        })
        .unwrap();

        let moved = engine.attributes_of(Kind::Node, "1").unwrap();
        let untouched = engine.attributes_of(Kind::Node, "2").unwrap();
        assert_eq!(moved["position"].as_point(), Some(Point3::new(6.0, 0.0, 0.0)));
        assert_eq!(untouched["position"].as_point(), Some(Point3::new(2.0, 0.0, 0.0)));
    }
}

use crate::EntityId;
use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

/// Observability surface of the engine. Listeners run synchronously on the
/// calling thread; keep them cheap.
pub trait EntityListener: Send + Sync {
    /// An enumeration is about to materialize `expected` entities.
    fn begin_listing(&self, _entity: &'static str, _expected: i64) {}
    /// One entity finished loading (from the store or the identity cache).
    fn entity_loaded(&self, _entity: &'static str, _identifier: Option<&EntityId>) {}
    /// An enumeration completed with `actual` entities materialized.
    fn end_listing(&self, _entity: &'static str, _actual: i64) {}
    /// A public operation finished.
    fn operation_complete(&self, _operation: &str, _success: bool, _elapsed: Duration) {}
}

#[derive(Default)]
pub(crate) struct Listeners {
    inner: RwLock<Vec<Arc<dyn EntityListener>>>,
}

impl Listeners {
    pub(crate) fn subscribe(&self, listener: Arc<dyn EntityListener>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn each(&self, f: impl Fn(&dyn EntityListener)) {
        for listener in self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            f(listener.as_ref());
        }
    }

    pub(crate) fn begin_listing(&self, entity: &'static str, expected: i64) {
        log::trace!("listing {} entities of {}", expected, entity);
        self.each(|l| l.begin_listing(entity, expected));
    }

    pub(crate) fn entity_loaded(&self, entity: &'static str, identifier: Option<&EntityId>) {
        self.each(|l| l.entity_loaded(entity, identifier));
    }

    pub(crate) fn end_listing(&self, entity: &'static str, actual: i64) {
        log::trace!("listed {} entities of {}", actual, entity);
        self.each(|l| l.end_listing(entity, actual));
    }

    pub(crate) fn operation_complete(&self, operation: &str, success: bool, elapsed: Duration) {
        log::debug!(
            "{} {} in {:?}",
            operation,
            if success { "completed" } else { "failed" },
            elapsed
        );
        self.each(|l| l.operation_complete(operation, success, elapsed));
    }
}

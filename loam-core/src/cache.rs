use crate::{Entity, EntityId, Shared};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

/// Process-wide identity map: at most one live instance per
/// `(entity type, identifier)` is ever handed to callers. Entries are added
/// when an entity is materialized or freshly written, replaced on update,
/// and never evicted; this is a correctness mechanism, not a bounded cache.
#[derive(Default)]
pub struct CacheManager {
    entries: RwLock<HashMap<(TypeId, EntityId), Box<dyn Any + Send + Sync>>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains<E: Entity>(&self, identifier: &EntityId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&(TypeId::of::<E>(), identifier.clone()))
    }

    pub fn get<E: Entity>(&self, identifier: &EntityId) -> Option<Shared<E>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(TypeId::of::<E>(), identifier.clone()))
            .and_then(|entry| entry.downcast_ref::<Shared<E>>())
            .cloned()
    }

    /// Unconditional insert; an existing entry is replaced (last writer
    /// wins). Used by the write path to refresh the canonical copy.
    pub fn add<E: Entity>(&self, identifier: EntityId, entity: Shared<E>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((TypeId::of::<E>(), identifier), Box::new(entity));
    }

    /// Insert if absent and return the canonical instance. When a concurrent
    /// hydration got there first, its instance wins and the caller's loses,
    /// so two racing materializations never leak two live objects.
    pub fn add_or_get<E: Entity>(&self, identifier: EntityId, entity: Shared<E>) -> Shared<E> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .entry((TypeId::of::<E>(), identifier))
            .or_insert_with(|| Box::new(entity.clone()));
        entry
            .downcast_ref::<Shared<E>>()
            .cloned()
            .unwrap_or(entity)
    }

    pub fn remove<E: Entity>(&self, identifier: &EntityId) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(TypeId::of::<E>(), identifier.clone()));
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

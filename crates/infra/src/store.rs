//! Keyed record storage.
//!
//! The store is the only shared mutable resource of the pipeline. Every
//! operation is a short critical section; `update` is an atomic
//! read-modify-write and concurrent writers resolve as last write wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use officedesk_core::{DomainError, Entity};

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    /// The update closure refused the change; nothing was written.
    #[error("update rejected: {0}")]
    Rejected(#[from] DomainError),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Records keyed by their entity id.
pub trait KeyedStore<V: Entity>: Send + Sync {
    fn get(&self, key: &V::Id) -> Result<Option<V>, StoreError>;

    /// Insert a new record; fails if its id is taken.
    fn insert(&self, value: V) -> Result<(), StoreError>;

    /// Apply `change` to a copy of the record and write it back if `change` succeeds.
    /// Returns the stored result.
    fn update(
        &self,
        key: &V::Id,
        change: &mut dyn FnMut(&mut V) -> Result<(), DomainError>,
    ) -> Result<V, StoreError>;

    /// All records matching `predicate` (unordered).
    fn query(&self, predicate: &dyn Fn(&V) -> bool) -> Result<Vec<V>, StoreError>;
}

impl<V, S> KeyedStore<V> for Arc<S>
where
    V: Entity,
    S: KeyedStore<V> + ?Sized,
{
    fn get(&self, key: &V::Id) -> Result<Option<V>, StoreError> {
        (**self).get(key)
    }

    fn insert(&self, value: V) -> Result<(), StoreError> {
        (**self).insert(value)
    }

    fn update(
        &self,
        key: &V::Id,
        change: &mut dyn FnMut(&mut V) -> Result<(), DomainError>,
    ) -> Result<V, StoreError> {
        (**self).update(key, change)
    }

    fn query(&self, predicate: &dyn Fn(&V) -> bool) -> Result<Vec<V>, StoreError> {
        (**self).query(predicate)
    }
}

/// In-memory keyed store for tests/dev.
pub struct InMemoryKeyedStore<V: Entity> {
    inner: RwLock<HashMap<V::Id, V>>,
}

impl<V: Entity> InMemoryKeyedStore<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Entity> Default for InMemoryKeyedStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Entity> fmt::Debug for InMemoryKeyedStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryKeyedStore")
            .field("len", &self.len())
            .finish()
    }
}

impl<V> KeyedStore<V> for InMemoryKeyedStore<V>
where
    V: Entity + Clone + Send + Sync + 'static,
    V::Id: Send + Sync,
{
    fn get(&self, key: &V::Id) -> Result<Option<V>, StoreError> {
        let map = self.inner.read().map_err(lock_poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn insert(&self, value: V) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(lock_poisoned)?;
        let key = value.id().clone();
        if map.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("{key:?}")));
        }
        map.insert(key, value);
        Ok(())
    }

    fn update(
        &self,
        key: &V::Id,
        change: &mut dyn FnMut(&mut V) -> Result<(), DomainError>,
    ) -> Result<V, StoreError> {
        let mut map = self.inner.write().map_err(lock_poisoned)?;
        let current = map
            .get(key)
            .ok_or_else(|| StoreError::NotFound(format!("{key:?}")))?;

        let mut next = current.clone();
        change(&mut next)?;
        map.insert(key.clone(), next.clone());
        Ok(next)
    }

    fn query(&self, predicate: &dyn Fn(&V) -> bool) -> Result<Vec<V>, StoreError> {
        let map = self.inner.read().map_err(lock_poisoned)?;
        Ok(map.values().filter(|v| predicate(v)).cloned().collect())
    }
}

fn lock_poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Storage("store lock poisoned".to_string())
}

//! Identity registry.
//!
//! Maps (record kind, id) to the one shared in-memory instance of that
//! record, so repeated lookups hand back the same object instead of copies.
//! Entries live until they are evicted explicitly; there is no expiry or
//! capacity bound.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use stratum_core::Record;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle to a record instance.
///
/// Clones point at the same record; use [`RecordRef::ptr_eq`] to check
/// instance identity.
pub struct RecordRef<R> {
    inner: Arc<RwLock<R>>,
}

impl<R: Record> RecordRef<R> {
    /// Wrap a record in a new shared handle.
    pub fn new(record: R) -> Self {
        Self {
            inner: Arc::new(RwLock::new(record)),
        }
    }

    /// Lock the record for reading.
    pub async fn read(&self) -> RwLockReadGuard<'_, R> {
        self.inner.read().await
    }

    /// Lock the record for writing.
    pub async fn write(&self) -> RwLockWriteGuard<'_, R> {
        self.inner.write().await
    }

    /// Current id of the record.
    pub async fn id(&self) -> String {
        self.inner.read().await.id().to_string()
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    fn erase(&self) -> Arc<dyn Any + Send + Sync> {
        self.inner.clone()
    }

    fn restore(erased: Arc<dyn Any + Send + Sync>) -> Option<Self> {
        erased
            .downcast::<RwLock<R>>()
            .ok()
            .map(|inner| Self { inner })
    }
}

impl<R> Clone for RecordRef<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> fmt::Debug for RecordRef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordRef")
            .field("ptr", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

type RegistryKey = (&'static str, String);

/// Process-wide map from (kind, id) to the canonical record instance.
///
/// Construct one and share it through an `Arc`; a single registry can serve
/// any number of record kinds.
#[derive(Default)]
pub struct IdentityRegistry {
    entries: DashMap<RegistryKey, Arc<dyn Any + Send + Sync>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key<R: Record>(id: &str) -> RegistryKey {
        (R::KIND, id.to_string())
    }

    /// The registered instance for `id`, if any.
    pub fn get<R: Record>(&self, id: &str) -> Option<RecordRef<R>> {
        let erased = self.entries.get(&Self::key::<R>(id))?.value().clone();
        let restored = RecordRef::restore(erased);
        if restored.is_none() {
            tracing::warn!(
                kind = R::KIND,
                id,
                "Registry entry holds a different record type under this kind"
            );
        }
        restored
    }

    /// Register `record` under `id`, replacing any previous entry.
    pub fn insert<R: Record>(&self, id: &str, record: &RecordRef<R>) {
        self.entries.insert(Self::key::<R>(id), record.erase());
    }

    /// Register `record` under its current id.
    ///
    /// Records without an id are not registered; returns whether an entry
    /// was written.
    pub async fn save<R: Record>(&self, record: &RecordRef<R>) -> bool {
        let id = record.id().await;
        if id.is_empty() {
            tracing::debug!(kind = R::KIND, "Skipping registry save for record without id");
            return false;
        }
        self.insert(&id, record);
        true
    }

    /// Register `record` under `id` only if no entry exists yet.
    ///
    /// The check and the insert happen under the same shard lock, so two
    /// callers reserving the same id cannot both succeed.
    pub fn reserve<R: Record>(&self, id: &str, record: &RecordRef<R>) -> bool {
        match self.entries.entry(Self::key::<R>(id)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record.erase());
                true
            }
        }
    }

    /// Register `record` under `id` unless an instance is already there, and
    /// return whichever instance the registry now holds.
    ///
    /// An entry of the wrong record type is replaced.
    pub fn get_or_insert<R: Record>(&self, id: &str, record: &RecordRef<R>) -> RecordRef<R> {
        match self.entries.entry(Self::key::<R>(id)) {
            Entry::Occupied(mut slot) => {
                if let Some(existing) = RecordRef::restore(slot.get().clone()) {
                    return existing;
                }
                tracing::warn!(
                    kind = R::KIND,
                    id,
                    "Replacing registry entry that holds a different record type"
                );
                slot.insert(record.erase());
                record.clone()
            }
            Entry::Vacant(slot) => {
                slot.insert(record.erase());
                record.clone()
            }
        }
    }

    /// Remove the entry for `id`; returns whether one existed.
    pub fn evict<R: Record>(&self, id: &str) -> bool {
        self.entries.remove(&Self::key::<R>(id)).is_some()
    }

    pub fn contains<R: Record>(&self, id: &str) -> bool {
        self.entries.contains_key(&Self::key::<R>(id))
    }

    /// Number of registered instances across all kinds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

//! Tiered orchestrator.
//!
//! Reads fall through the registry, cache, NoSQL, and relational tiers,
//! stopping at the first hit and writing the record back into every faster
//! enabled tier. Writes and deletes fan out to every enabled tier in the
//! fixed order relational, NoSQL, search, cache.
//!
//! There are no cross-tier transactions. A failed save can leave the record
//! written to the tiers before the failing one; callers retry the whole save.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use stratum_core::{
    random_id, ConfigError, KindDescriptor, Record, StorageError, StoreSettings, StratumError,
    StratumResult, Tier, ValidationError,
};

use crate::driver::{DriverFactory, TierDriver};
use crate::registry::{IdentityRegistry, RecordRef};

/// Orchestrates one record kind across its enabled tiers.
///
/// # Type Parameters
///
/// - `R`: The record kind
/// - `F`: The factory supplying a driver per tier
///
/// # Example
///
/// ```ignore
/// let store = TieredStore::new(descriptor, registry, factory)?;
///
/// let account = store.insert(Account::new("ada")).await?;
/// let id = account.id().await;
///
/// // Served from the registry, same instance as `account`
/// let again = store.get(&id, false).await?.unwrap();
///
/// // Re-read ground truth, warming registry and cache afterwards
/// let fresh = store.get(&id, true).await?;
/// ```
pub struct TieredStore<R, F>
where
    R: Record,
    F: DriverFactory<R>,
{
    /// Tier enablement for `R`.
    descriptor: KindDescriptor,
    /// Store-wide settings.
    settings: StoreSettings,
    /// Shared identity registry.
    registry: Arc<IdentityRegistry>,
    /// Driver source, consulted per operation.
    factory: Arc<F>,
    _record: PhantomData<fn() -> R>,
}

impl<R, F> TieredStore<R, F>
where
    R: Record,
    F: DriverFactory<R>,
{
    /// Create a store for `R` with default settings.
    ///
    /// Fails if the descriptor is invalid or an enabled tier has no driver.
    pub fn new(
        descriptor: KindDescriptor,
        registry: Arc<IdentityRegistry>,
        factory: Arc<F>,
    ) -> StratumResult<Self> {
        Self::with_settings(descriptor, StoreSettings::default(), registry, factory)
    }

    /// Create a store for `R` with explicit settings.
    pub fn with_settings(
        descriptor: KindDescriptor,
        settings: StoreSettings,
        registry: Arc<IdentityRegistry>,
        factory: Arc<F>,
    ) -> StratumResult<Self> {
        descriptor.validate()?;
        settings.validate()?;

        for tier in descriptor.write_tiers() {
            if factory.driver(tier).is_none() {
                return Err(StratumError::Config(ConfigError::MissingDriver {
                    kind: R::KIND,
                    tier,
                }));
            }
        }

        Ok(Self {
            descriptor,
            settings,
            registry,
            factory,
            _record: PhantomData,
        })
    }

    pub fn descriptor(&self) -> &KindDescriptor {
        &self.descriptor
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    /// Name of the identity attribute for `R`.
    pub fn id_field(&self) -> &str {
        self.descriptor.id_field()
    }

    /// Cache lifetime for `R`; zero when caching is off or unbounded.
    pub fn cache_time(&self) -> Duration {
        self.descriptor.cache_time()
    }

    fn driver(&self, tier: Tier) -> StratumResult<Arc<dyn TierDriver<R>>> {
        self.factory.driver(tier).ok_or_else(|| {
            StratumError::Config(ConfigError::MissingDriver {
                kind: R::KIND,
                tier,
            })
        })
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    /// Look up the record with `id`.
    ///
    /// Returns `Ok(None)` when no enabled tier has it. With `force_refresh`
    /// the registry and cache are skipped as sources, but a registered
    /// instance is still the one that gets refreshed and returned.
    pub async fn get(&self, id: &str, force_refresh: bool) -> StratumResult<Option<RecordRef<R>>> {
        if id.is_empty() {
            return Err(StratumError::Validation(ValidationError::RequiredFieldMissing {
                field: self.descriptor.id_field.clone(),
            }));
        }

        let mut registered = None;
        if self.descriptor.registry {
            if let Some(instance) = self.registry.get::<R>(id) {
                if !force_refresh {
                    tracing::debug!(kind = R::KIND, id, "Registry hit");
                    return Ok(Some(instance));
                }
                registered = Some(instance);
            }
        }
        let from_registry = registered.is_some();
        let record = registered.unwrap_or_else(|| RecordRef::new(R::with_id(id.to_string())));

        for (position, &tier) in Tier::READ_ORDER.iter().enumerate() {
            if !self.descriptor.is_enabled(tier) || (force_refresh && tier == Tier::Cache) {
                continue;
            }
            if self.read_tier(tier, id, &record).await? {
                let record = self.remember(id, record, from_registry).await;
                self.backfill(id, &record, &Tier::READ_ORDER[..position]).await;
                return Ok(Some(record));
            }
        }

        tracing::debug!(kind = R::KIND, id, force_refresh, "Record not found in any tier");
        Ok(None)
    }

    /// Ask one tier for the record. Driver errors count as a miss.
    async fn read_tier(&self, tier: Tier, id: &str, record: &RecordRef<R>) -> StratumResult<bool> {
        let driver = self.driver(tier)?;
        let mut guard = record.write().await;
        match driver.get(&mut guard).await {
            Ok(found) => {
                tracing::debug!(kind = R::KIND, id, tier = %tier, found, "Tier read");
                Ok(found)
            }
            Err(e) => {
                tracing::warn!(
                    kind = R::KIND,
                    id,
                    tier = %tier,
                    error = %e,
                    "Tier read failed, treating as miss"
                );
                Ok(false)
            }
        }
    }

    /// Settle on the one instance the registry hands out for `id`.
    ///
    /// A candidate built for this read is registered only if no concurrent
    /// read got there first. Otherwise the registered instance takes the
    /// freshly read state and is returned instead.
    async fn remember(&self, id: &str, record: RecordRef<R>, from_registry: bool) -> RecordRef<R> {
        if !self.descriptor.registry {
            return record;
        }
        if from_registry {
            self.registry.insert(id, &record);
            return record;
        }

        let canonical = self.registry.get_or_insert(id, &record);
        if !RecordRef::ptr_eq(&canonical, &record) {
            tracing::debug!(kind = R::KIND, id, "Concurrent read registered first");
            let fresh = std::mem::replace(&mut *record.write().await, R::with_id(id.to_string()));
            *canonical.write().await = fresh;
        }
        canonical
    }

    /// Write `record` into each enabled tier of `tiers`. Failures are logged
    /// and otherwise ignored.
    async fn backfill(&self, id: &str, record: &RecordRef<R>, tiers: &[Tier]) {
        let guard = record.read().await;
        for &tier in tiers {
            if !self.descriptor.is_enabled(tier) {
                continue;
            }
            let result = match self.driver(tier) {
                Ok(driver) => driver.save(&guard).await.map_err(StratumError::from),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => tracing::debug!(kind = R::KIND, id, tier = %tier, "Back-filled tier"),
                Err(e) => tracing::warn!(
                    kind = R::KIND,
                    id,
                    tier = %tier,
                    error = %e,
                    "Back-fill failed"
                ),
            }
        }
    }

    // ========================================================================
    // WRITE PATH
    // ========================================================================

    /// Persist the record to every enabled tier.
    ///
    /// A record without an id first gets a generated one and, when the
    /// registry is enabled, is registered before any tier is written. The
    /// first failing tier aborts the save; tiers already written are not
    /// rolled back.
    pub async fn save(&self, record: &RecordRef<R>) -> StratumResult<()> {
        if record.read().await.is_new() {
            self.assign_id(record).await?;
        }

        let guard = record.read().await;
        for tier in self.descriptor.write_tiers() {
            let driver = self.driver(tier)?;
            if let Err(source) = driver.save(&guard).await {
                tracing::debug!(
                    kind = R::KIND,
                    id = guard.id(),
                    tier = %tier,
                    error = %source,
                    "Save aborted"
                );
                return Err(StratumError::Storage(StorageError::WriteFailed {
                    kind: R::KIND,
                    id: guard.id().to_string(),
                    tier,
                    source,
                }));
            }
        }
        Ok(())
    }

    /// Wrap a new record in a shared handle and save it.
    pub async fn insert(&self, record: R) -> StratumResult<RecordRef<R>> {
        let record = RecordRef::new(record);
        self.save(&record).await?;
        Ok(record)
    }

    /// Draw ids until one is free in every tier, then claim it.
    ///
    /// With the registry enabled the claim is an atomic reservation, so two
    /// concurrent saves cannot end up with the same id; a lost race draws
    /// again. Without the registry the existence probe is the only guard.
    async fn assign_id(&self, record: &RecordRef<R>) -> StratumResult<String> {
        let attempts = self.settings.max_id_attempts;
        for attempt in 1..=attempts {
            let candidate = random_id(&mut rand::rng(), self.descriptor.id_length);

            if self.get(&candidate, false).await?.is_some() {
                tracing::debug!(kind = R::KIND, attempt, "Generated id already in use");
                continue;
            }

            let mut guard = record.write().await;
            if !guard.is_new() {
                // Another task assigned an id while we were probing.
                return Ok(guard.id().to_string());
            }
            if self.descriptor.registry && !self.registry.reserve(&candidate, record) {
                tracing::debug!(kind = R::KIND, attempt, "Lost id reservation race");
                continue;
            }
            guard.set_id(candidate.clone());
            tracing::debug!(kind = R::KIND, id = %candidate, attempt, "Assigned new id");
            return Ok(candidate);
        }

        Err(StratumError::Storage(StorageError::IdSpaceExhausted {
            kind: R::KIND,
            attempts,
        }))
    }

    /// Remove the record from every enabled tier.
    ///
    /// Every tier is attempted even after a failure; the error lists each
    /// tier that failed. The registry entry is evicted either way.
    pub async fn delete(&self, record: &RecordRef<R>) -> StratumResult<()> {
        let guard = record.read().await;
        if guard.is_new() {
            return Err(StratumError::Validation(ValidationError::RequiredFieldMissing {
                field: self.descriptor.id_field.clone(),
            }));
        }

        let mut failures = Vec::new();
        for tier in self.descriptor.write_tiers() {
            let driver = self.driver(tier)?;
            if let Err(e) = driver.delete(&guard).await {
                tracing::warn!(
                    kind = R::KIND,
                    id = guard.id(),
                    tier = %tier,
                    error = %e,
                    "Tier delete failed"
                );
                failures.push(e);
            }
        }

        if self.descriptor.registry {
            self.registry.evict::<R>(guard.id());
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(StratumError::Storage(StorageError::DeleteFailed {
                kind: R::KIND,
                id: guard.id().to_string(),
                failures,
            }))
        }
    }
}

impl<R, F> Clone for TieredStore<R, F>
where
    R: Record,
    F: DriverFactory<R>,
{
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            settings: self.settings.clone(),
            registry: Arc::clone(&self.registry),
            factory: Arc::clone(&self.factory),
            _record: PhantomData,
        }
    }
}

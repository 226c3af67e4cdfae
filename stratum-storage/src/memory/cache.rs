//! TTL-aware in-memory cache driver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use stratum_core::{CacheSetting, DriverResult, Record, Tier};

use super::{CallCounts, FaultPlan, MemoryDriver};
use crate::driver::TierDriver;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of entries dropped because they outlived the ttl.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache tier keeping each entry alongside the time it was cached.
///
/// Entries older than the ttl read as misses and are dropped on access.
pub struct MemoryCache<R> {
    inner: MemoryDriver<R>,
    cached_at: DashMap<String, DateTime<Utc>>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl<R> MemoryCache<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    /// Create a cache whose entries expire after `ttl`, or never when `None`.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            inner: MemoryDriver::new(Tier::Cache),
            cached_at: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Create a cache matching a kind's cache setting.
    pub fn from_setting(setting: &CacheSetting) -> Self {
        Self::new(setting.lifetime())
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains(id)
    }

    /// Cached copy of the record with `id`, ignoring expiry.
    pub fn load(&self, id: &str) -> DriverResult<Option<R>> {
        self.inner.load(id)
    }

    /// When the entry for `id` was cached.
    pub fn cached_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.cached_at.get(id).map(|at| *at.value())
    }

    pub fn calls(&self) -> CallCounts {
        self.inner.calls()
    }

    pub fn reset_calls(&self) {
        self.inner.reset_calls();
    }

    pub fn faults(&self) -> &FaultPlan {
        self.inner.faults()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.inner.len() as u64,
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    fn is_expired(&self, id: &str) -> bool {
        let (Some(ttl), Some(cached_at)) = (self.ttl, self.cached_at(id)) else {
            return false;
        };
        let age = Utc::now()
            .signed_duration_since(cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age > ttl
    }

    fn expire(&self, id: &str) {
        self.inner.documents.remove(id);
        self.cached_at.remove(id);
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl<R> TierDriver<R> for MemoryCache<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    fn tier(&self) -> Tier {
        Tier::Cache
    }

    async fn get(&self, record: &mut R) -> DriverResult<bool> {
        if self.is_expired(record.id()) {
            self.expire(record.id());
        }

        let found = self.inner.get(record).await?;
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    async fn save(&self, record: &R) -> DriverResult<()> {
        self.inner.save(record).await?;
        self.cached_at.insert(record.id().to_string(), Utc::now());
        Ok(())
    }

    async fn delete(&self, record: &R) -> DriverResult<()> {
        self.inner.delete(record).await?;
        self.cached_at.remove(record.id());
        Ok(())
    }
}

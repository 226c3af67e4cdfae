//! In-memory tier drivers.
//!
//! Reference implementations of [`TierDriver`] that keep records as JSON
//! documents keyed by id. They count calls and accept injected failures,
//! which makes them the fakes of choice when exercising the orchestrator.

pub mod cache;
pub mod search;

pub use cache::{CacheStats, MemoryCache};
pub use search::MemorySearchIndex;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use stratum_core::{DriverError, DriverResult, Record, Tier};

use crate::driver::TierDriver;

// ============================================================================
// CALL COUNTS & FAULTS
// ============================================================================

/// Snapshot of how often each driver operation was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub gets: u64,
    pub saves: u64,
    pub deletes: u64,
}

impl CallCounts {
    pub fn total(&self) -> u64 {
        self.gets + self.saves + self.deletes
    }
}

#[derive(Debug, Default)]
struct CallCounter {
    gets: AtomicU64,
    saves: AtomicU64,
    deletes: AtomicU64,
}

impl CallCounter {
    fn snapshot(&self) -> CallCounts {
        CallCounts {
            gets: self.gets.load(Ordering::Relaxed),
            saves: self.saves.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.gets.store(0, Ordering::Relaxed);
        self.saves.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
    }
}

/// Switches that make a memory driver fail an operation.
#[derive(Debug, Default)]
pub struct FaultPlan {
    gets: AtomicBool,
    saves: AtomicBool,
    deletes: AtomicBool,
}

impl FaultPlan {
    pub fn fail_gets(&self, fail: bool) {
        self.gets.store(fail, Ordering::Relaxed);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.saves.store(fail, Ordering::Relaxed);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.deletes.store(fail, Ordering::Relaxed);
    }

    fn check(flag: &AtomicBool, tier: Tier, op: &str) -> DriverResult<()> {
        if flag.load(Ordering::Relaxed) {
            return Err(DriverError::Unavailable {
                tier,
                reason: format!("injected {op} failure"),
            });
        }
        Ok(())
    }
}

// ============================================================================
// DOCUMENT ENCODING
// ============================================================================

pub(crate) fn encode<R: Serialize>(tier: Tier, record: &R) -> DriverResult<Value> {
    serde_json::to_value(record).map_err(|e| DriverError::Serialization {
        tier,
        reason: e.to_string(),
    })
}

pub(crate) fn decode<R: Record + DeserializeOwned>(
    tier: Tier,
    id: &str,
    document: Value,
) -> DriverResult<R> {
    let mut record: R = serde_json::from_value(document).map_err(|e| DriverError::Serialization {
        tier,
        reason: e.to_string(),
    })?;
    if record.id() != id {
        record.set_id(id.to_string());
    }
    Ok(record)
}

// ============================================================================
// MEMORY DRIVER
// ============================================================================

/// Document map standing in for a NoSQL, relational, or search backend.
pub struct MemoryDriver<R> {
    tier: Tier,
    documents: DashMap<String, Value>,
    calls: CallCounter,
    faults: FaultPlan,
    _record: std::marker::PhantomData<fn() -> R>,
}

impl<R> MemoryDriver<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    /// Create an empty driver serving `tier`.
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            documents: DashMap::new(),
            calls: CallCounter::default(),
            faults: FaultPlan::default(),
            _record: std::marker::PhantomData,
        }
    }

    /// Store `record` directly, bypassing call counting and faults.
    pub fn seed(&self, record: &R) -> DriverResult<()> {
        let document = encode(self.tier, record)?;
        self.documents.insert(record.id().to_string(), document);
        Ok(())
    }

    /// Stored copy of the record with `id`, if any.
    pub fn load(&self, id: &str) -> DriverResult<Option<R>> {
        let document = self.documents.get(id).map(|doc| doc.value().clone());
        document.map(|doc| decode(self.tier, id, doc)).transpose()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Stored ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.documents.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn calls(&self) -> CallCounts {
        self.calls.snapshot()
    }

    pub fn reset_calls(&self) {
        self.calls.reset();
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub(crate) fn document(&self, id: &str) -> Option<Value> {
        self.documents.get(id).map(|doc| doc.value().clone())
    }
}

#[async_trait]
impl<R> TierDriver<R> for MemoryDriver<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    fn tier(&self) -> Tier {
        self.tier
    }

    async fn get(&self, record: &mut R) -> DriverResult<bool> {
        self.calls.gets.fetch_add(1, Ordering::Relaxed);
        FaultPlan::check(&self.faults.gets, self.tier, "get")?;

        let id = record.id().to_string();
        match self.document(&id) {
            Some(document) => {
                *record = decode(self.tier, &id, document)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn save(&self, record: &R) -> DriverResult<()> {
        self.calls.saves.fetch_add(1, Ordering::Relaxed);
        FaultPlan::check(&self.faults.saves, self.tier, "save")?;

        if record.id().is_empty() {
            return Err(DriverError::Rejected {
                tier: self.tier,
                reason: "record has no id".to_string(),
            });
        }
        let document = encode(self.tier, record)?;
        self.documents.insert(record.id().to_string(), document);
        Ok(())
    }

    async fn delete(&self, record: &R) -> DriverResult<()> {
        self.calls.deletes.fetch_add(1, Ordering::Relaxed);
        FaultPlan::check(&self.faults.deletes, self.tier, "delete")?;

        self.documents.remove(record.id());
        Ok(())
    }
}

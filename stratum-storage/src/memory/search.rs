//! In-memory search index driver.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use stratum_core::{DriverResult, Record, SearchSetting, Tier};

use super::{encode, CallCounts, FaultPlan, MemoryDriver};
use crate::driver::TierDriver;

/// Search tier that indexes the configured top-level fields of each record.
///
/// The full document is kept too, so `get` never returns a partial record.
pub struct MemorySearchIndex<R> {
    inner: MemoryDriver<R>,
    fields: SearchSetting,
    index: DashMap<String, BTreeMap<String, String>>,
}

impl<R> MemorySearchIndex<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    /// Create an index over the fields selected by `fields`.
    pub fn new(fields: SearchSetting) -> Self {
        Self {
            inner: MemoryDriver::new(Tier::Search),
            fields,
            index: DashMap::new(),
        }
    }

    /// Ids of records whose indexed `field` equals `value`, sorted.
    pub fn search(&self, field: &str, value: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .index
            .iter()
            .filter(|entry| entry.value().get(field).is_some_and(|v| v == value))
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Indexed field values for `id`.
    pub fn indexed_fields(&self, id: &str) -> Option<BTreeMap<String, String>> {
        self.index.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains(id)
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

    fn project(&self, document: &Value) -> BTreeMap<String, String> {
        let Value::Object(map) = document else {
            return BTreeMap::new();
        };
        map.iter()
            .filter(|(field, _)| self.fields.indexes(field))
            .filter_map(|(field, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((field.clone(), text))
            })
            .collect()
    }
}

#[async_trait]
impl<R> TierDriver<R> for MemorySearchIndex<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    fn tier(&self) -> Tier {
        Tier::Search
    }

    async fn get(&self, record: &mut R) -> DriverResult<bool> {
        self.inner.get(record).await
    }

    async fn save(&self, record: &R) -> DriverResult<()> {
        self.inner.save(record).await?;
        let projection = self.project(&encode(Tier::Search, record)?);
        self.index.insert(record.id().to_string(), projection);
        Ok(())
    }

    async fn delete(&self, record: &R) -> DriverResult<()> {
        self.inner.delete(record).await?;
        self.index.remove(record.id());
        Ok(())
    }
}

//! STRATUM Test Utilities
//!
//! Centralized test infrastructure for the STRATUM workspace:
//! - A fixture record kind (`Account`)
//! - A bundle of in-memory drivers wired into a factory
//! - Proptest generators for ids, descriptors, and accounts

// Re-export core and storage types for convenience
pub use stratum_core::{
    is_valid_id, CacheSetting, KindDescriptor, Record, SearchSetting, StoreSettings,
    StratumError, StratumResult, Tier, ID_ALPHABET,
};
pub use stratum_storage::{
    CallCounts, IdentityRegistry, MemoryCache, MemoryDriver, MemorySearchIndex, RecordRef,
    StaticDriverFactory, TieredStore,
};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// FIXTURE RECORD
// ============================================================================

/// A small record kind used throughout the tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
    pub balance: i64,
}

impl Account {
    /// New, unsaved account.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            email: format!("{}@example.com", name.to_lowercase()),
            name,
            ..Self::default()
        }
    }

    /// Account with a preassigned id.
    pub fn stored(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::new(name)
        }
    }
}

impl Record for Account {
    const KIND: &'static str = "account";

    fn with_id(id: String) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

// ============================================================================
// MEMORY TIERS
// ============================================================================

/// One in-memory driver per tier, kept around so tests can inspect them.
pub struct MemoryTiers<R> {
    pub cache: Arc<MemoryCache<R>>,
    pub nosql: Arc<MemoryDriver<R>>,
    pub relational: Arc<MemoryDriver<R>>,
    pub search: Arc<MemorySearchIndex<R>>,
}

impl<R> MemoryTiers<R>
where
    R: Record + Serialize + for<'de> Deserialize<'de>,
{
    /// Drivers sized for `descriptor` (cache ttl, search fields).
    pub fn for_descriptor(descriptor: &KindDescriptor) -> Self {
        Self {
            cache: Arc::new(MemoryCache::from_setting(&descriptor.cache)),
            nosql: Arc::new(MemoryDriver::new(Tier::NoSql)),
            relational: Arc::new(MemoryDriver::new(Tier::Relational)),
            search: Arc::new(MemorySearchIndex::new(descriptor.search.clone())),
        }
    }

    /// Factory serving every driver in the bundle.
    pub fn factory(&self) -> Arc<StaticDriverFactory<R>> {
        Arc::new(
            StaticDriverFactory::<R>::new()
                .with_driver(self.cache.clone())
                .with_driver(self.nosql.clone())
                .with_driver(self.relational.clone())
                .with_driver(self.search.clone()),
        )
    }

    /// Call counts per tier, in write order.
    pub fn calls(&self) -> [(Tier, CallCounts); 4] {
        [
            (Tier::Relational, self.relational.calls()),
            (Tier::NoSql, self.nosql.calls()),
            (Tier::Search, self.search.calls()),
            (Tier::Cache, self.cache.calls()),
        ]
    }

    /// Total driver calls across all tiers.
    pub fn total_calls(&self) -> u64 {
        self.calls().iter().map(|(_, c)| c.total()).sum()
    }

    pub fn reset_calls(&self) {
        self.cache.reset_calls();
        self.nosql.reset_calls();
        self.relational.reset_calls();
        self.search.reset_calls();
    }
}

pub mod fixtures {
    //! Pre-built stores for common testing scenarios.

    use super::*;

    /// A store for `Account` over fresh memory tiers and a fresh registry.
    pub fn account_store(
        descriptor: KindDescriptor,
    ) -> (
        TieredStore<Account, StaticDriverFactory<Account>>,
        MemoryTiers<Account>,
        Arc<IdentityRegistry>,
    ) {
        let tiers = MemoryTiers::for_descriptor(&descriptor);
        let registry = Arc::new(IdentityRegistry::new());
        let store = TieredStore::new(descriptor, registry.clone(), tiers.factory())
            .expect("fixture descriptor is valid and fully backed");
        (store, tiers, registry)
    }

    /// Registry on, 60 second cache, relational on, everything else off.
    pub fn cached_relational() -> KindDescriptor {
        KindDescriptor::new().with_cache(CacheSetting::ttl(std::time::Duration::from_secs(60)))
    }

    /// Every tier on, searching by name and email.
    pub fn all_tiers() -> KindDescriptor {
        cached_relational()
            .with_nosql(true)
            .with_search(SearchSetting::fields(["name", "email"]))
    }

    /// Install a test subscriber honoring `RUST_LOG`; safe to call repeatedly.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

pub mod generators {
    //! Proptest strategies for STRATUM types.

    use super::*;
    use proptest::prelude::*;

    /// An id of `length` characters from the id alphabet.
    pub fn arb_record_id(length: usize) -> impl Strategy<Value = String> {
        prop::collection::vec(prop::sample::select(ID_ALPHABET.to_vec()), length)
            .prop_map(|bytes| bytes.into_iter().map(char::from).collect())
    }

    pub fn arb_cache_setting() -> impl Strategy<Value = CacheSetting> {
        prop_oneof![
            Just(CacheSetting::Disabled),
            Just(CacheSetting::forever()),
            (1u64..86_400).prop_map(|s| CacheSetting::ttl(std::time::Duration::from_secs(s))),
        ]
    }

    pub fn arb_search_setting() -> impl Strategy<Value = SearchSetting> {
        prop_oneof![
            Just(SearchSetting::Disabled),
            Just(SearchSetting::AllFields),
            prop::sample::subsequence(vec!["name", "email", "balance"], 1..=3)
                .prop_map(|fields| SearchSetting::fields(fields)),
        ]
    }

    /// Any valid descriptor.
    pub fn arb_kind_descriptor() -> impl Strategy<Value = KindDescriptor> {
        (
            1usize..=64,
            any::<bool>(),
            arb_cache_setting(),
            any::<bool>(),
            any::<bool>(),
            arb_search_setting(),
        )
            .prop_map(|(id_length, registry, cache, nosql, relational, search)| {
                KindDescriptor::new()
                    .with_id_length(id_length)
                    .with_registry(registry)
                    .with_cache(cache)
                    .with_nosql(nosql)
                    .with_relational(relational)
                    .with_search(search)
            })
    }

    /// An unsaved account.
    pub fn arb_new_account() -> impl Strategy<Value = Account> {
        ("[a-z]{1,12}", any::<i64>()).prop_map(|(name, balance)| Account {
            balance,
            ..Account::new(name)
        })
    }
}

//! Behavioral tests for the tiered orchestrator over in-memory tiers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stratum_core::{ConfigError, DriverResult, StorageError, ValidationError};
use stratum_storage::{
    CacheSetting, IdentityRegistry, KindDescriptor, MemoryDriver, Record, RecordRef,
    StaticDriverFactory, StratumError, Tier, TierDriver, TieredStore,
};
use tokio::sync::Barrier;
use stratum_test_utils::fixtures::{account_store, all_tiers, cached_relational, init_tracing};
use stratum_test_utils::generators::{arb_kind_descriptor, arb_new_account};
use stratum_test_utils::{is_valid_id, Account, MemoryTiers};

// ============================================================================
// READ PATH
// ============================================================================

#[tokio::test]
async fn test_backfill_then_registry_hit() {
    init_tracing();
    let (store, tiers, registry) = account_store(cached_relational());
    tiers.relational.seed(&Account::stored("abc123", "Ada")).unwrap();

    let first = store.get("abc123", false).await.unwrap().unwrap();
    assert_eq!(first.read().await.name, "Ada");
    assert!(registry.contains::<Account>("abc123"));
    assert!(tiers.cache.contains("abc123"));
    assert_eq!(tiers.relational.calls().gets, 1);

    tiers.reset_calls();
    let second = store.get("abc123", false).await.unwrap().unwrap();
    assert!(RecordRef::ptr_eq(&first, &second));
    assert_eq!(tiers.total_calls(), 0);
}

#[tokio::test]
async fn test_registry_and_cache_disabled_consult_nosql_then_relational() {
    let descriptor = KindDescriptor::none().with_nosql(true).with_relational(true);
    let (store, tiers, registry) = account_store(descriptor);

    assert!(store.get("missing", false).await.unwrap().is_none());
    assert_eq!(tiers.nosql.calls().gets, 1);
    assert_eq!(tiers.relational.calls().gets, 1);
    assert_eq!(tiers.cache.calls().total(), 0);
    // A miss writes nothing anywhere
    for (_, calls) in tiers.calls() {
        assert_eq!(calls.saves, 0);
        assert_eq!(calls.deletes, 0);
    }
    assert!(registry.is_empty());

    tiers.nosql.seed(&Account::stored("doc1", "Bea")).unwrap();
    tiers.reset_calls();
    let found = store.get("doc1", false).await.unwrap().unwrap();
    assert_eq!(found.read().await.name, "Bea");
    assert_eq!(tiers.relational.calls().gets, 0);
}

#[tokio::test]
async fn test_cache_hit_registers_without_backfill() {
    let (store, tiers, registry) = account_store(all_tiers());
    tiers.cache.save(&Account::stored("c1", "Cy")).await.unwrap();
    tiers.reset_calls();

    let found = store.get("c1", false).await.unwrap().unwrap();
    assert_eq!(found.read().await.name, "Cy");
    assert!(registry.contains::<Account>("c1"));
    assert_eq!(tiers.nosql.calls().total(), 0);
    assert_eq!(tiers.relational.calls().total(), 0);
    assert_eq!(tiers.cache.calls().saves, 0);
}

#[tokio::test]
async fn test_nosql_hit_backfills_cache_only() {
    let (store, tiers, registry) = account_store(all_tiers());
    tiers.nosql.seed(&Account::stored("n1", "Dee")).unwrap();

    let found = store.get("n1", false).await.unwrap().unwrap();
    let held = registry.get::<Account>("n1").unwrap();
    assert!(RecordRef::ptr_eq(&found, &held));
    assert!(tiers.cache.contains("n1"));
    assert_eq!(tiers.relational.calls().total(), 0);
    assert_eq!(tiers.nosql.calls().saves, 0);
}

#[tokio::test]
async fn test_relational_hit_backfills_cache_and_nosql() {
    let (store, tiers, _registry) = account_store(all_tiers());
    tiers.relational.seed(&Account::stored("r1", "Eve")).unwrap();

    store.get("r1", false).await.unwrap().unwrap();
    assert!(tiers.cache.contains("r1"));
    assert!(tiers.nosql.contains("r1"));
    // Search is never written on the read path
    assert_eq!(tiers.search.calls().total(), 0);
}

#[tokio::test]
async fn test_force_refresh_rereads_into_registered_instance() {
    let (store, tiers, _registry) = account_store(cached_relational());
    tiers.relational.seed(&Account::stored("f1", "Old")).unwrap();
    let first = store.get("f1", false).await.unwrap().unwrap();

    tiers.relational.seed(&Account::stored("f1", "New")).unwrap();
    tiers.reset_calls();

    let refreshed = store.get("f1", true).await.unwrap().unwrap();
    assert!(RecordRef::ptr_eq(&first, &refreshed));
    assert_eq!(first.read().await.name, "New");
    assert_eq!(tiers.cache.calls().gets, 0);
    assert_eq!(tiers.cache.calls().saves, 1);
    assert_eq!(tiers.cache.load("f1").unwrap().unwrap().name, "New");
}

#[tokio::test]
async fn test_force_refresh_miss_keeps_registry_entry() {
    let (store, tiers, registry) = account_store(cached_relational());
    tiers.relational.seed(&Account::stored("gone", "Ula")).unwrap();
    let first = store.get("gone", false).await.unwrap().unwrap();

    tiers.relational.delete(&Account::stored("gone", "Ula")).await.unwrap();
    assert!(store.get("gone", true).await.unwrap().is_none());

    assert!(registry.contains::<Account>("gone"));
    let again = store.get("gone", false).await.unwrap().unwrap();
    assert!(RecordRef::ptr_eq(&first, &again));
    assert_eq!(again.read().await.name, "Ula");
}

/// Relational driver whose reads wait until two of them are in flight.
struct GatedRelational {
    inner: MemoryDriver<Account>,
    gate: Barrier,
}

#[async_trait]
impl TierDriver<Account> for GatedRelational {
    fn tier(&self) -> Tier {
        Tier::Relational
    }

    async fn get(&self, record: &mut Account) -> DriverResult<bool> {
        self.gate.wait().await;
        self.inner.get(record).await
    }

    async fn save(&self, record: &Account) -> DriverResult<()> {
        self.inner.save(record).await
    }

    async fn delete(&self, record: &Account) -> DriverResult<()> {
        self.inner.delete(record).await
    }
}

#[tokio::test]
async fn test_concurrent_first_reads_share_one_instance() {
    let relational = MemoryDriver::<Account>::new(Tier::Relational);
    relational.seed(&Account::stored("abc", "Uma")).unwrap();
    let gated = Arc::new(GatedRelational {
        inner: relational,
        gate: Barrier::new(2),
    });
    let registry = Arc::new(IdentityRegistry::new());
    let factory = Arc::new(StaticDriverFactory::<Account>::new().with_driver(gated));
    let store = TieredStore::new(KindDescriptor::new(), registry.clone(), factory).unwrap();

    let (a, b) = tokio::join!(store.get("abc", false), store.get("abc", false));
    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();

    assert!(RecordRef::ptr_eq(&a, &b));
    let held = registry.get::<Account>("abc").unwrap();
    assert!(RecordRef::ptr_eq(&a, &held));
    assert_eq!(a.read().await.name, "Uma");
}

#[tokio::test]
async fn test_read_errors_count_as_miss() {
    let (store, tiers, _registry) = account_store(all_tiers());
    tiers.cache.faults().fail_gets(true);
    tiers.nosql.faults().fail_gets(true);
    tiers.relational.seed(&Account::stored("e1", "Fay")).unwrap();

    let found = store.get("e1", false).await.unwrap();
    assert!(found.is_some());
}

#[tokio::test]
async fn test_backfill_failure_does_not_fail_get() {
    let (store, tiers, registry) = account_store(cached_relational());
    tiers.cache.faults().fail_saves(true);
    tiers.relational.seed(&Account::stored("b1", "Gil")).unwrap();

    let found = store.get("b1", false).await.unwrap();
    assert!(found.is_some());
    assert!(!tiers.cache.contains("b1"));
    assert!(registry.contains::<Account>("b1"));
}

#[tokio::test]
async fn test_empty_id_is_rejected() {
    let (store, _tiers, _registry) = account_store(cached_relational());
    let err = store.get("", false).await.unwrap_err();
    assert!(matches!(
        err,
        StratumError::Validation(ValidationError::RequiredFieldMissing { .. })
    ));
}

#[tokio::test]
async fn test_expired_cache_falls_through() {
    let descriptor =
        KindDescriptor::new().with_cache(CacheSetting::ttl(Duration::from_millis(20)));
    let (store, tiers, _registry) = account_store(descriptor.with_registry(false));
    tiers.relational.seed(&Account::stored("x1", "Hal")).unwrap();

    store.get("x1", false).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    tiers.reset_calls();

    store.get("x1", false).await.unwrap().unwrap();
    assert_eq!(tiers.relational.calls().gets, 1);
    assert_eq!(tiers.cache.stats().expirations, 1);
}

// ============================================================================
// WRITE PATH
// ============================================================================

#[tokio::test]
async fn test_save_assigns_id_and_writes_every_tier() {
    let (store, tiers, registry) = account_store(all_tiers());
    let account = store.insert(Account::new("Ivy")).await.unwrap();
    let id = account.id().await;

    assert!(is_valid_id(&id, 16));
    assert!(registry.contains::<Account>(&id));
    assert!(tiers.relational.contains(&id));
    assert!(tiers.nosql.contains(&id));
    assert!(tiers.cache.contains(&id));
    assert_eq!(tiers.search.search("name", "Ivy"), vec![id.clone()]);
}

#[tokio::test]
async fn test_save_keeps_existing_id() {
    let (store, tiers, _registry) = account_store(cached_relational());
    let account = RecordRef::new(Account::stored("keep-me", "Jo"));
    store.save(&account).await.unwrap();

    assert_eq!(account.id().await, "keep-me");
    assert!(tiers.relational.contains("keep-me"));

    account.write().await.balance = 42;
    store.save(&account).await.unwrap();
    assert_eq!(account.id().await, "keep-me");
    assert_eq!(tiers.relational.load("keep-me").unwrap().unwrap().balance, 42);
}

#[tokio::test]
async fn test_relational_save_failure_short_circuits() {
    let (store, tiers, _registry) = account_store(all_tiers());
    tiers.relational.faults().fail_saves(true);

    let err = store.insert(Account::new("Kay")).await.unwrap_err();
    match err {
        StratumError::Storage(StorageError::WriteFailed { tier, kind, .. }) => {
            assert_eq!(tier, Tier::Relational);
            assert_eq!(kind, "account");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(tiers.nosql.calls().saves, 0);
    assert_eq!(tiers.search.calls().saves, 0);
    assert_eq!(tiers.cache.calls().saves, 0);
}

#[tokio::test]
async fn test_partial_write_is_not_rolled_back() {
    let (store, tiers, _registry) = account_store(all_tiers());
    tiers.search.faults().fail_saves(true);

    let account = RecordRef::new(Account::stored("p1", "Lu"));
    let err = store.save(&account).await.unwrap_err();
    assert!(matches!(
        err,
        StratumError::Storage(StorageError::WriteFailed { tier: Tier::Search, .. })
    ));
    assert!(tiers.relational.contains("p1"));
    assert!(tiers.nosql.contains("p1"));
    assert!(!tiers.cache.contains("p1"));
}

/// Relational driver that notes whether the record was already registered
/// when its save ran.
struct RegistrationCheck {
    registry: Arc<IdentityRegistry>,
    registered_before_save: AtomicBool,
}

#[async_trait]
impl TierDriver<Account> for RegistrationCheck {
    fn tier(&self) -> Tier {
        Tier::Relational
    }

    async fn get(&self, _record: &mut Account) -> DriverResult<bool> {
        Ok(false)
    }

    async fn save(&self, record: &Account) -> DriverResult<()> {
        let registered = self.registry.contains::<Account>(record.id());
        self.registered_before_save.store(registered, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, _record: &Account) -> DriverResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_new_record_registered_before_relational_save() {
    let registry = Arc::new(IdentityRegistry::new());
    let check = Arc::new(RegistrationCheck {
        registry: registry.clone(),
        registered_before_save: AtomicBool::new(false),
    });
    let factory = Arc::new(StaticDriverFactory::<Account>::new().with_driver(check.clone()));
    let store = TieredStore::new(KindDescriptor::new(), registry.clone(), factory).unwrap();

    let account = store.insert(Account::new("Max")).await.unwrap();
    assert_eq!(account.id().await.len(), 16);
    assert!(check.registered_before_save.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_id_space_exhaustion() {
    let descriptor = KindDescriptor::new().with_id_length(1);
    let tiers = MemoryTiers::<Account>::for_descriptor(&descriptor);
    for symbol in stratum_test_utils::ID_ALPHABET {
        let id = char::from(*symbol).to_string();
        tiers.relational.seed(&Account::stored(id, "Taken")).unwrap();
    }
    let store = TieredStore::with_settings(
        descriptor,
        stratum_test_utils::StoreSettings::new().with_max_id_attempts(8),
        Arc::new(IdentityRegistry::new()),
        tiers.factory(),
    )
    .unwrap();

    let err = store.insert(Account::new("Ned")).await.unwrap_err();
    assert!(matches!(
        err,
        StratumError::Storage(StorageError::IdSpaceExhausted { attempts: 8, .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_get_distinct_ids() {
    let (store, _tiers, registry) = account_store(KindDescriptor::new().with_id_length(3));
    let mut handles = Vec::new();
    for n in 0..32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.insert(Account::new(format!("user{n}"))).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let account = handle.await.unwrap().unwrap();
        ids.push(account.id().await);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 32);
    assert_eq!(registry.len(), 32);
}

// ============================================================================
// DELETE PATH
// ============================================================================

#[tokio::test]
async fn test_delete_is_best_effort() {
    let (store, tiers, registry) = account_store(all_tiers());
    let account = store.insert(Account::new("Oz")).await.unwrap();
    let id = account.id().await;
    tiers.relational.faults().fail_deletes(true);

    let err = store.delete(&account).await.unwrap_err();
    match err {
        StratumError::Storage(StorageError::DeleteFailed { failures, .. }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].tier(), Tier::Relational);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(tiers.nosql.calls().deletes, 1);
    assert!(!tiers.nosql.contains(&id));
    assert!(!tiers.cache.contains(&id));
    assert!(tiers.relational.contains(&id));
    assert!(!registry.contains::<Account>(&id));
}

#[tokio::test]
async fn test_delete_purges_registry() {
    let (store, tiers, registry) = account_store(cached_relational());
    let account = store.insert(Account::new("Pam")).await.unwrap();
    let id = account.id().await;

    store.delete(&account).await.unwrap();
    assert!(!registry.contains::<Account>(&id));
    assert!(!tiers.relational.contains(&id));
    assert!(store.get(&id, false).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_requires_id() {
    let (store, _tiers, _registry) = account_store(cached_relational());
    let account = RecordRef::new(Account::new("Quinn"));
    assert!(matches!(
        store.delete(&account).await,
        Err(StratumError::Validation(_))
    ));
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[tokio::test]
async fn test_all_tiers_disabled_is_valid_but_inert() {
    let (store, tiers, registry) = account_store(KindDescriptor::none());

    let account = store.insert(Account::new("Rae")).await.unwrap();
    let id = account.id().await;
    assert!(is_valid_id(&id, 16));
    assert!(store.get(&id, false).await.unwrap().is_none());
    store.delete(&account).await.unwrap();

    assert_eq!(tiers.total_calls(), 0);
    assert!(registry.is_empty());
}

#[test]
fn test_missing_driver_rejected_at_construction() {
    let factory = Arc::new(StaticDriverFactory::<Account>::new());
    let result = TieredStore::new(
        KindDescriptor::new(),
        Arc::new(IdentityRegistry::new()),
        factory,
    );
    assert!(matches!(
        result,
        Err(StratumError::Config(ConfigError::MissingDriver {
            tier: Tier::Relational,
            ..
        }))
    ));
}

#[test]
fn test_store_exposes_kind_settings() {
    let (store, _tiers, _registry) =
        account_store(cached_relational().with_id_field("account_id"));
    assert_eq!(store.id_field(), "account_id");
    assert_eq!(store.cache_time(), Duration::from_secs(60));
}

// ============================================================================
// PROPERTIES
// ============================================================================

mod props {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_insert_then_get(descriptor in arb_kind_descriptor(), account in arb_new_account()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let readable = descriptor.registry
                    || descriptor.cache.is_enabled()
                    || descriptor.nosql
                    || descriptor.relational;
                let id_length = descriptor.id_length;
                let (store, _tiers, _registry) = account_store(descriptor);

                let saved = store.insert(account.clone()).await.unwrap();
                let id = saved.id().await;
                prop_assert!(is_valid_id(&id, id_length));

                let found = store.get(&id, false).await.unwrap();
                prop_assert_eq!(found.is_some(), readable);
                if let Some(found) = found {
                    let found = found.read().await;
                    prop_assert_eq!(&found.name, &account.name);
                    prop_assert_eq!(found.balance, account.balance);
                }
                Ok(())
            })?;
        }
    }
}

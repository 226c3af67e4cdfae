//! STRATUM Storage - Tiered Orchestrator
//!
//! Reads and writes records through the identity registry, cache, NoSQL,
//! relational, and search tiers. Concrete backends plug in through
//! [`TierDriver`]; in-memory drivers live in [`memory`].

pub mod driver;
pub mod memory;
pub mod registry;
pub mod tiered;

pub use driver::{DriverFactory, StaticDriverFactory, TierDriver};
pub use memory::{CacheStats, CallCounts, FaultPlan, MemoryCache, MemoryDriver, MemorySearchIndex};
pub use registry::{IdentityRegistry, RecordRef};
pub use tiered::TieredStore;

// Re-export core types used in this crate's signatures
pub use stratum_core::{
    CacheSetting, DriverError, DriverResult, KindDescriptor, Record, SearchSetting,
    StoreSettings, StratumError, StratumResult, Tier,
};

//! Tier driver traits and a static driver factory.
//!
//! A driver is everything the orchestrator knows about a storage tier:
//! three operations against a record instance. Connections, schemas, and
//! query building stay private to the driver.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use stratum_core::{DriverResult, Record, Tier};

/// Driver for one storage tier (cache, NoSQL, relational, or search).
///
/// # Implementation Requirements
///
/// - `get` returns `Ok(false)` on a miss and must leave `record` untouched
///   in that case
/// - `delete` of an absent record succeeds
/// - Implementations must be `Send + Sync`; one driver serves concurrent
///   orchestrator calls
#[async_trait]
pub trait TierDriver<R: Record>: Send + Sync {
    /// The tier this driver serves, used in errors and logs.
    fn tier(&self) -> Tier;

    /// Populate `record` from the tier by its id; returns whether it was found.
    async fn get(&self, record: &mut R) -> DriverResult<bool>;

    /// Persist the record's current state.
    async fn save(&self, record: &R) -> DriverResult<()>;

    /// Remove the record's entry by id.
    async fn delete(&self, record: &R) -> DriverResult<()>;
}

/// Supplies the driver for each tier on demand.
///
/// Returning `None` means the tier has no backend; a store whose descriptor
/// enables such a tier fails to construct.
pub trait DriverFactory<R: Record>: Send + Sync {
    fn driver(&self, tier: Tier) -> Option<Arc<dyn TierDriver<R>>>;
}

/// Factory backed by a fixed driver per tier.
pub struct StaticDriverFactory<R: Record> {
    drivers: HashMap<Tier, Arc<dyn TierDriver<R>>>,
}

impl<R: Record> Default for StaticDriverFactory<R> {
    fn default() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }
}

impl<R: Record> StaticDriverFactory<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `driver` for the tier it reports.
    pub fn with_driver(mut self, driver: Arc<dyn TierDriver<R>>) -> Self {
        self.drivers.insert(driver.tier(), driver);
        self
    }

    /// Serve `driver` for `tier`, whatever tier the driver reports.
    pub fn with_driver_for(mut self, tier: Tier, driver: Arc<dyn TierDriver<R>>) -> Self {
        self.drivers.insert(tier, driver);
        self
    }
}

impl<R: Record> DriverFactory<R> for StaticDriverFactory<R> {
    fn driver(&self, tier: Tier) -> Option<Arc<dyn TierDriver<R>>> {
        self.drivers.get(&tier).cloned()
    }
}

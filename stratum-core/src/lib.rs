//! STRATUM Core - Record and Configuration Types
//!
//! Data types shared by every STRATUM crate: the [`Record`] trait, the
//! per-kind [`KindDescriptor`], identifier generation, and the error
//! hierarchy. This crate performs no I/O.

pub mod config;
pub mod error;
pub mod id;
pub mod record;

pub use config::{StoreSettings, StratumConfig, DEFAULT_MAX_ID_ATTEMPTS};
pub use error::{
    ConfigError, DriverError, DriverResult, StorageError, StratumError, StratumResult,
    ValidationError,
};
pub use id::{is_valid_id, random_id, DEFAULT_ID_LENGTH, ID_ALPHABET};
pub use record::{CacheSetting, KindDescriptor, Record, SearchSetting, DEFAULT_ID_FIELD};

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TIERS
// ============================================================================

/// Storage tier a record can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Process-local identity registry
    Registry,
    /// Key/value cache
    Cache,
    /// Document store
    NoSql,
    /// Relational database
    Relational,
    /// Search index
    Search,
}

impl Tier {
    /// Driver-backed tiers consulted by `get`, fastest first.
    /// Search is write-only from the orchestrator's point of view.
    pub const READ_ORDER: [Tier; 3] = [Tier::Cache, Tier::NoSql, Tier::Relational];

    /// Order in which `save` and `delete` fan out.
    pub const WRITE_ORDER: [Tier; 4] = [Tier::Relational, Tier::NoSql, Tier::Search, Tier::Cache];

    /// Lowercase name used in logs and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Registry => "registry",
            Tier::Cache => "cache",
            Tier::NoSql => "nosql",
            Tier::Relational => "relational",
            Tier::Search => "search",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

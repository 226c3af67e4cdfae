//! Record trait and per-kind tier configuration

use crate::id::DEFAULT_ID_LENGTH;
use crate::{StratumError, StratumResult, Tier, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Identity attribute name used when a kind does not configure one.
pub const DEFAULT_ID_FIELD: &str = "id";

/// Longest identifier a kind may request.
const MAX_ID_LENGTH: usize = 128;

// ============================================================================
// RECORD
// ============================================================================

/// A uniquely identified entity persisted through the tiered store.
///
/// An empty id marks a record that has never been saved. Once an id is set
/// the store never replaces it.
pub trait Record: Send + Sync + 'static {
    /// Kind name, used to namespace the identity registry and in logs.
    const KIND: &'static str;

    /// Build an empty candidate that carries only `id`.
    fn with_id(id: String) -> Self;

    /// Current identifier, empty for unsaved records.
    fn id(&self) -> &str;

    /// Assign the identifier.
    ///
    /// Callers must not pass an id already claimed by another live record of
    /// the same kind; externally supplied ids are trusted as-is.
    fn set_id(&mut self, id: String);

    /// True until the record has been assigned an id.
    fn is_new(&self) -> bool {
        self.id().is_empty()
    }
}

// ============================================================================
// TIER SETTINGS
// ============================================================================

/// Cache enablement and lifetime for a record kind.
///
/// In configuration files this is written as `false`, `true`, or a number
/// of seconds; `0` disables the cache like `false` does. Lifetimes are
/// written rounded up to the next whole second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawCacheSetting", into = "RawCacheSetting")]
pub enum CacheSetting {
    #[default]
    Disabled,
    /// Cached; entries expire after `ttl`, or never when `None`.
    Enabled { ttl: Option<Duration> },
}

impl CacheSetting {
    /// Cache with a finite lifetime.
    pub fn ttl(ttl: Duration) -> Self {
        Self::Enabled { ttl: Some(ttl) }
    }

    /// Cache without expiry.
    pub fn forever() -> Self {
        Self::Enabled { ttl: None }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }

    /// Entry lifetime, `None` when disabled or unbounded.
    pub fn lifetime(&self) -> Option<Duration> {
        match self {
            Self::Enabled { ttl } => *ttl,
            Self::Disabled => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawCacheSetting {
    Toggle(bool),
    Seconds(u64),
}

impl From<RawCacheSetting> for CacheSetting {
    fn from(raw: RawCacheSetting) -> Self {
        match raw {
            RawCacheSetting::Toggle(false) | RawCacheSetting::Seconds(0) => Self::Disabled,
            RawCacheSetting::Toggle(true) => Self::forever(),
            RawCacheSetting::Seconds(secs) => Self::ttl(Duration::from_secs(secs)),
        }
    }
}

impl From<CacheSetting> for RawCacheSetting {
    fn from(setting: CacheSetting) -> Self {
        match setting {
            CacheSetting::Disabled => Self::Toggle(false),
            CacheSetting::Enabled { ttl: None } => Self::Toggle(true),
            CacheSetting::Enabled { ttl: Some(ttl) } => Self::Seconds(whole_seconds(ttl)),
        }
    }
}

/// Seconds in `ttl`, rounded up so a non-zero lifetime never reads back as
/// a disabled cache.
fn whole_seconds(ttl: Duration) -> u64 {
    ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)
}

/// Search-index enablement for a record kind.
///
/// In configuration files: `false`, `true` (index every field), or a list
/// of field names. An empty list disables indexing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawSearchSetting", into = "RawSearchSetting")]
pub enum SearchSetting {
    #[default]
    Disabled,
    AllFields,
    Fields(BTreeSet<String>),
}

impl SearchSetting {
    /// Index only the named fields.
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
        if set.is_empty() {
            Self::Disabled
        } else {
            Self::Fields(set)
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Whether `field` should be indexed under this setting.
    pub fn indexes(&self, field: &str) -> bool {
        match self {
            Self::Disabled => false,
            Self::AllFields => true,
            Self::Fields(fields) => fields.contains(field),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawSearchSetting {
    Toggle(bool),
    Fields(Vec<String>),
}

impl From<RawSearchSetting> for SearchSetting {
    fn from(raw: RawSearchSetting) -> Self {
        match raw {
            RawSearchSetting::Toggle(false) => Self::Disabled,
            RawSearchSetting::Toggle(true) => Self::AllFields,
            RawSearchSetting::Fields(fields) => Self::fields(fields),
        }
    }
}

impl From<SearchSetting> for RawSearchSetting {
    fn from(setting: SearchSetting) -> Self {
        match setting {
            SearchSetting::Disabled => Self::Toggle(false),
            SearchSetting::AllFields => Self::Toggle(true),
            SearchSetting::Fields(fields) => Self::Fields(fields.into_iter().collect()),
        }
    }
}

// ============================================================================
// KIND DESCRIPTOR
// ============================================================================

/// Tier enablement and identity settings for one record kind.
///
/// Built once per kind and handed to the tiered store. The defaults match a
/// plain relational model: registry and relational tiers on, everything
/// else off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindDescriptor {
    /// Name of the identity attribute, for callers building queries.
    pub id_field: String,
    /// Length of generated identifiers.
    pub id_length: usize,
    pub registry: bool,
    pub cache: CacheSetting,
    pub nosql: bool,
    pub relational: bool,
    pub search: SearchSetting,
}

impl Default for KindDescriptor {
    fn default() -> Self {
        Self {
            id_field: DEFAULT_ID_FIELD.to_string(),
            id_length: DEFAULT_ID_LENGTH,
            registry: true,
            cache: CacheSetting::Disabled,
            nosql: false,
            relational: true,
            search: SearchSetting::Disabled,
        }
    }
}

impl KindDescriptor {
    /// Create a descriptor with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A descriptor with every tier disabled.
    pub fn none() -> Self {
        Self {
            registry: false,
            relational: false,
            ..Self::default()
        }
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn with_id_length(mut self, length: usize) -> Self {
        self.id_length = length;
        self
    }

    pub fn with_registry(mut self, enabled: bool) -> Self {
        self.registry = enabled;
        self
    }

    pub fn with_cache(mut self, cache: CacheSetting) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_nosql(mut self, enabled: bool) -> Self {
        self.nosql = enabled;
        self
    }

    pub fn with_relational(mut self, enabled: bool) -> Self {
        self.relational = enabled;
        self
    }

    pub fn with_search(mut self, search: SearchSetting) -> Self {
        self.search = search;
        self
    }

    /// Name of the identity attribute.
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Cache lifetime; zero when caching is disabled or unbounded.
    pub fn cache_time(&self) -> Duration {
        self.cache.lifetime().unwrap_or(Duration::ZERO)
    }

    /// Whether `tier` is enabled for this kind.
    pub fn is_enabled(&self, tier: Tier) -> bool {
        match tier {
            Tier::Registry => self.registry,
            Tier::Cache => self.cache.is_enabled(),
            Tier::NoSql => self.nosql,
            Tier::Relational => self.relational,
            Tier::Search => self.search.is_enabled(),
        }
    }

    /// Enabled driver-backed tiers, in write order.
    pub fn write_tiers(&self) -> impl Iterator<Item = Tier> + '_ {
        Tier::WRITE_ORDER
            .into_iter()
            .filter(move |tier| self.is_enabled(*tier))
    }

    /// Validate the descriptor.
    ///
    /// Validates:
    /// - id_field is not empty
    /// - id_length in 1..=128
    /// - a finite cache ttl is non-zero
    pub fn validate(&self) -> StratumResult<()> {
        if self.id_field.trim().is_empty() {
            return Err(StratumError::Validation(ValidationError::RequiredFieldMissing {
                field: "id_field".to_string(),
            }));
        }

        if self.id_length == 0 || self.id_length > MAX_ID_LENGTH {
            return Err(StratumError::Validation(ValidationError::InvalidValue {
                field: "id_length".to_string(),
                reason: format!("must be between 1 and {MAX_ID_LENGTH}, got {}", self.id_length),
            }));
        }

        if self.cache.lifetime().is_some_and(|ttl| ttl.is_zero()) {
            return Err(StratumError::Validation(ValidationError::InvalidValue {
                field: "cache".to_string(),
                reason: "cache ttl must be positive".to_string(),
            }));
        }

        Ok(())
    }
}

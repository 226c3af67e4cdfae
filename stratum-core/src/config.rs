//! Configuration types

use crate::{ConfigError, KindDescriptor, StratumError, StratumResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Draws attempted before id generation gives up.
pub const DEFAULT_MAX_ID_ATTEMPTS: u32 = 64;

/// Orchestrator-wide settings shared by every record kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Maximum random draws (including reservation conflicts) per new id.
    pub max_id_attempts: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
        }
    }
}

impl StoreSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the id generation attempt limit.
    pub fn with_max_id_attempts(mut self, attempts: u32) -> Self {
        self.max_id_attempts = attempts;
        self
    }

    /// Validate the settings.
    pub fn validate(&self) -> StratumResult<()> {
        if self.max_id_attempts == 0 {
            return Err(StratumError::Config(ConfigError::InvalidValue {
                field: "max_id_attempts".to_string(),
                value: self.max_id_attempts.to_string(),
                reason: "max_id_attempts must be greater than 0".to_string(),
            }));
        }
        Ok(())
    }
}

/// File-level configuration: store settings plus one descriptor per kind.
///
/// ```toml
/// [settings]
/// max_id_attempts = 32
///
/// [kinds.account]
/// cache = 60
/// search = ["name", "email"]
///
/// [kinds.session]
/// relational = false
/// nosql = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StratumConfig {
    pub settings: StoreSettings,
    pub kinds: BTreeMap<String, KindDescriptor>,
}

impl StratumConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> StratumResult<Self> {
        let config: Self = toml::from_str(input).map_err(|e| {
            StratumError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Descriptor configured for `kind`.
    pub fn descriptor(&self, kind: &str) -> StratumResult<&KindDescriptor> {
        self.kinds.get(kind).ok_or_else(|| {
            StratumError::Config(ConfigError::UnknownKind {
                kind: kind.to_string(),
            })
        })
    }

    /// Add or replace the descriptor for `kind`.
    pub fn with_kind(mut self, kind: impl Into<String>, descriptor: KindDescriptor) -> Self {
        self.kinds.insert(kind.into(), descriptor);
        self
    }

    /// Validate the settings and every kind descriptor.
    pub fn validate(&self) -> StratumResult<()> {
        self.settings.validate()?;
        for (kind, descriptor) in &self.kinds {
            descriptor.validate().map_err(|e| {
                StratumError::Config(ConfigError::InvalidValue {
                    field: format!("kinds.{kind}"),
                    value: format!("{descriptor:?}"),
                    reason: e.to_string(),
                })
            })?;
        }
        Ok(())
    }
}

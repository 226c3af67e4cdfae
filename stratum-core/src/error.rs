//! Error types for STRATUM operations

use crate::Tier;
use thiserror::Error;

/// Errors reported by a single tier driver.
///
/// A read miss is not an error: drivers report it as `Ok(false)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("{tier} tier unavailable: {reason}")]
    Unavailable { tier: Tier, reason: String },

    #[error("{tier} tier could not (de)serialize record: {reason}")]
    Serialization { tier: Tier, reason: String },

    #[error("{tier} tier rejected record: {reason}")]
    Rejected { tier: Tier, reason: String },

    #[error("{tier} tier internal error: {reason}")]
    Internal { tier: Tier, reason: String },
}

impl DriverError {
    /// The tier that produced this error.
    pub fn tier(&self) -> Tier {
        match self {
            Self::Unavailable { tier, .. }
            | Self::Serialization { tier, .. }
            | Self::Rejected { tier, .. }
            | Self::Internal { tier, .. } => *tier,
        }
    }
}

/// Result type alias for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// Orchestrator-level storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Save of {kind} '{id}' aborted at {tier} tier: {source}")]
    WriteFailed {
        kind: &'static str,
        id: String,
        tier: Tier,
        source: DriverError,
    },

    #[error("Delete of {kind} '{id}' failed on {} tier(s)", failures.len())]
    DeleteFailed {
        kind: &'static str,
        id: String,
        failures: Vec<DriverError>,
    },

    #[error("No free {kind} id found after {attempts} attempts")]
    IdSpaceExhausted { kind: &'static str, attempts: u32 },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("No driver registered for enabled {tier} tier of {kind}")]
    MissingDriver { kind: &'static str, tier: Tier },

    #[error("Unknown record kind: {kind}")]
    UnknownKind { kind: String },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all STRATUM errors.
#[derive(Debug, Clone, Error)]
pub enum StratumError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for STRATUM operations.
pub type StratumResult<T> = Result<T, StratumError>;

// =============================================================================
// TESTS
// =============================================================================

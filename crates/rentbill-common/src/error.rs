//! Error types for Rentbill
//!
//! Provides a unified error type plus the typed gateway failure used by
//! provider and notification collaborators.

use thiserror::Error;

/// Result type alias using RentbillError
pub type Result<T> = std::result::Result<T, RentbillError>;

/// Unified error type for Rentbill operations
#[derive(Debug, Error)]
pub enum RentbillError {
    // Wallet errors
    #[error("Wallet error: {0}")]
    Wallet(#[from] crate::types::wallet::WalletError),

    // Provider / external collaborator errors
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Missing records
    #[error("Not found: {0}")]
    NotFound(String),

    // Rejected debit (manual settlement, purchase gate)
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    // Operation not allowed in the order's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failure of a call to an external collaborator.
///
/// The scheduler logs and continues on `Transient`, and escalates
/// `Permanent` to operators; neither blocks the ledger decision.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            GatewayError::Transient(msg) | GatewayError::Permanent(msg) => msg,
        }
    }
}

// Implement From for common external error types
impl From<serde_json::Error> for RentbillError {
    fn from(err: serde_json::Error) -> Self {
        RentbillError::Serialization(err.to_string())
    }
}

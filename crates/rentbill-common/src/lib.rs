//! # Rentbill Common
//!
//! Shared types, errors, and collaborator contracts for the Rentbill reconciler.
//!
//! ## Core Types
//!
//! - [`Order`]: a rented compute instance and its billing checkpoints
//! - [`OrderStatus`]: lifecycle state (`active`, `suspended`, `suspended_balance`, `deleted`)
//! - [`Wallet`]: prepaid balance in minor currency units
//! - [`Invoice`]: immutable audit record of a balance change
//!
//! ## Gateways
//!
//! - [`gateway::LedgerGateway`]: wallet, invoice and order persistence
//! - [`gateway::ResourceGateway`]: compute provider power/delete/metrics
//! - [`gateway::Notifier`]: user and operator notifications
//! - [`gateway::SettingsStore`]: runtime settings and flags

pub mod error;
pub mod gateway;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{GatewayError, RentbillError, Result};
pub use types::{
    invoice::{Invoice, InvoiceMethod, InvoiceStatus, NewInvoice},
    order::{BillingMode, Grace, Order, OrderStatus, SuspendReason},
    wallet::{Wallet, WalletError},
};

/// Rentbill version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Unix timestamp in whole seconds
pub type Timestamp = i64;

/// Seconds in one billing hour
pub const SECS_PER_HOUR: i64 = 3600;

/// Bytes per reported traffic gigabyte (binary GB, as the provider meters it)
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Current unix time in seconds
pub fn now_ts() -> Timestamp {
    chrono::Utc::now().timestamp()
}

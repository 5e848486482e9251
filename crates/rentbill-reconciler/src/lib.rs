//! # Rentbill Reconciler
//!
//! Background service that bills hourly orders against prepaid wallets,
//! suspends expired, over-traffic and unfunded orders, and deletes servers
//! whose grace period ran out.
//!
//! - [`scheduler`]: the periodic [`Reconciler`] plus manual delete and top-up resume
//! - [`notify`]: Telegram and log notifiers, message texts
//! - [`telemetry`]: Prometheus counters fed from each pass
//! - [`config`]: layered service configuration

pub mod config;
pub mod notify;
pub mod scheduler;
pub mod telemetry;

pub use config::ReconcilerConfig;
pub use scheduler::{DeleteOutcome, OrderOutcome, PassReport, Reconciler, KEY_BILLING_ENABLED};
pub use telemetry::ReconcilerMetrics;

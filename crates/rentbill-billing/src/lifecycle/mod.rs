//! Order lifecycle module
//!
//! Pure decision logic for live orders:
//! - Thresholds: wallet levels and intervals that drive hourly orders
//! - Machine: the per-tick state machine
//! - Settlement: owed amount when an hourly order is deleted by hand
//! - Traffic: egress readings and cap checks

pub mod machine;
pub mod settlement;
pub mod thresholds;
pub mod traffic;

pub use machine::{decide, decide_resume, Decision, HourlyCharge, ResourceAction, Transition};
pub use settlement::{settle_hourly_delete, Settlement};
pub use thresholds::{ensure_can_start_hourly, BillingThresholds};
pub use traffic::{TrafficReading, TrafficUsage};

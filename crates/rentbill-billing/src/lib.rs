//! # Rentbill Billing
//!
//! Pure billing logic for rented compute orders.
//!
//! ## Retail Price Formula
//!
//! ```text
//! retail = round_step(wholesale × rate × (1 + margin% / 100))
//! ```
//!
//! Where the margin is either flat or chosen by comparing the plan's
//! *monthly* wholesale price against a threshold (tiered).
//!
//! ## Lifecycle
//!
//! [`lifecycle::decide`] maps `(order, balance, traffic, now)` onto a
//! [`lifecycle::Decision`] without performing any I/O; the reconciler
//! applies the decision against the ledger and the provider.

pub mod lifecycle;
pub mod pricing;

pub use lifecycle::{
    decide, decide_resume, ensure_can_start_hourly, settle_hourly_delete, BillingThresholds,
    Decision, HourlyCharge, ResourceAction, Settlement, TrafficReading, TrafficUsage, Transition,
};
pub use pricing::{plan_prices, retail, MarginMode, PlanPrices, PlanPricing, PricingPolicy};

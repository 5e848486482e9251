//! Pricing module
//!
//! Converts wholesale provider prices into retail prices:
//! - Flat or tiered margin policy
//! - Distinct rounding steps for monthly and hourly prices
//! - Policy read fresh from the settings store on every use

pub mod converter;
pub mod policy;

pub use converter::{
    margin_pct, parse_amount, plan_prices, retail, round_to_step, PlanPrices, PlanPricing,
    HOURLY_ROUNDING_STEP, MONTHLY_ROUNDING_STEP,
};
pub use policy::{MarginMode, PricingPolicy};

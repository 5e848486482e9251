//! Wholesale to retail conversion
//!
//! All arithmetic is done in `Decimal`. Conversion never fails: missing or
//! malformed inputs count as zero and overflow yields a zero price.

use super::policy::{MarginMode, PricingPolicy};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Monthly retail prices are rounded to this many minor units
pub const MONTHLY_ROUNDING_STEP: i64 = 1000;

/// Hourly retail prices are rounded to this many minor units
pub const HOURLY_ROUNDING_STEP: i64 = 100;

/// Parse a stored numeric field, treating anything unusable as zero
pub fn parse_amount(raw: Option<&str>) -> Decimal {
    raw.and_then(|s| s.trim().parse::<Decimal>().ok())
        .unwrap_or(Decimal::ZERO)
}

/// Margin percentage for a plan whose monthly wholesale price is `tier_basis`
pub fn margin_pct(tier_basis: Option<Decimal>, policy: &PricingPolicy) -> Decimal {
    match policy.mode {
        MarginMode::Flat => policy.flat_pct,
        MarginMode::Tiered => {
            if tier_basis.unwrap_or(Decimal::ZERO) <= policy.threshold {
                policy.low_pct
            } else {
                policy.high_pct
            }
        }
    }
}

/// Round to the nearest multiple of `step`; `step <= 1` rounds to an integer.
/// Midpoints go to the even neighbour.
pub fn round_to_step(value: Decimal, step: i64) -> i64 {
    let rounded = if step <= 1 {
        Some(value.round())
    } else {
        let step = Decimal::from(step);
        value
            .checked_div(step)
            .and_then(|units| units.round().checked_mul(step))
    };

    rounded.and_then(|v| v.to_i64()).unwrap_or_else(|| {
        warn!(%value, step, "Retail price out of range");
        0
    })
}

/// Retail price of `wholesale` in minor units of the billing currency.
///
/// `tier_basis` is always the plan's monthly wholesale price, even when the
/// hourly price is being converted.
pub fn retail(
    wholesale: Decimal,
    tier_basis: Option<Decimal>,
    policy: &PricingPolicy,
    step: i64,
) -> i64 {
    let pct = margin_pct(tier_basis, policy);
    let factor = dec!(1) + pct / dec!(100);

    match wholesale
        .checked_mul(policy.exchange_rate)
        .and_then(|v| v.checked_mul(factor))
    {
        Some(raw) => round_to_step(raw, step),
        None => {
            warn!(%wholesale, "Retail conversion overflowed");
            0
        }
    }
}

/// Price inputs of a sellable plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanPricing {
    /// Wholesale monthly price, when the plan tracks the provider price
    pub monthly_wholesale: Option<Decimal>,
    /// Wholesale hourly price
    pub hourly_wholesale: Option<Decimal>,
    pub hourly_enabled: bool,
    /// Fixed retail monthly price used when there is no wholesale price
    pub fixed_monthly: i64,
    /// Fixed retail hourly price used when hourly conversion does not apply
    pub fixed_hourly: i64,
}

/// Effective retail prices of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPrices {
    pub monthly: i64,
    pub hourly: i64,
}

/// Effective retail prices under the current policy
pub fn plan_prices(plan: &PlanPricing, policy: &PricingPolicy) -> PlanPrices {
    let monthly_wholesale = plan.monthly_wholesale.filter(|m| *m > Decimal::ZERO);

    let monthly = match monthly_wholesale {
        Some(m) => retail(m, Some(m), policy, MONTHLY_ROUNDING_STEP),
        None => plan.fixed_monthly,
    };

    let hourly = match plan.hourly_wholesale {
        Some(h) if h > Decimal::ZERO && plan.hourly_enabled => {
            retail(h, plan.monthly_wholesale, policy, HOURLY_ROUNDING_STEP)
        }
        _ => plan.fixed_hourly,
    };

    PlanPrices { monthly, hourly }
}

//! Manual-delete settlement for hourly orders

use rentbill_common::{BillingMode, Order, OrderStatus, Timestamp, SECS_PER_HOUR};
use serde::{Deserialize, Serialize};

/// Amount owed for the unbilled tail of an hourly order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub full_hours: i64,
    /// Remaining minutes, rounded up
    pub minutes: i64,
    pub amount: i64,
    /// New checkpoint once the debit is committed
    pub billed_until: Timestamp,
}

impl Settlement {
    pub fn is_free(&self) -> bool {
        self.amount == 0
    }
}

/// Charge for usage since the last checkpoint.
///
/// Whole hours are billed at the hourly rate; the remainder is rounded up
/// to whole minutes and then charged per minute, again rounding up.
/// Monthly orders and a zero rate settle at 0 with no refund. A
/// balance-suspended order is billed only up to its suspension.
pub fn settle_hourly_delete(order: &Order, now: Timestamp) -> Settlement {
    let free = Settlement {
        full_hours: 0,
        minutes: 0,
        amount: 0,
        billed_until: now,
    };
    if order.billing_mode != BillingMode::Hourly || order.price_hourly <= 0 {
        return free;
    }

    let since = order.last_hourly_charge_at.unwrap_or(if order.purchased_at > 0 {
        order.purchased_at
    } else {
        now
    });
    let until = match order.status {
        OrderStatus::SuspendedBalance { suspended_at, .. } => suspended_at.min(now),
        _ => now,
    };
    let elapsed = (until - since).max(0);
    let rate = order.price_hourly;

    let full_hours = elapsed / SECS_PER_HOUR;
    let rem = elapsed % SECS_PER_HOUR;
    let minutes = (rem + 59) / 60;

    let hours_cost = full_hours.saturating_mul(rate);
    let minutes_cost = minutes.saturating_mul(rate).saturating_add(59) / 60;

    Settlement {
        full_hours,
        minutes,
        amount: hours_cost.saturating_add(minutes_cost),
        billed_until: until,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: Timestamp = 1_700_000_000;

    fn hourly(rate: i64) -> Order {
        Order::new(1, 7, BillingMode::Hourly, NOW - 86_400).with_prices(0, rate)
    }

    #[test]
    fn test_ninety_minutes() {
        let order = hourly(1000).with_checkpoint(NOW - 90 * 60);
        let s = settle_hourly_delete(&order, NOW);

        assert_eq!(s.full_hours, 1);
        assert_eq!(s.minutes, 30);
        assert_eq!(s.amount, 1500);
        assert_eq!(s.billed_until, NOW);
    }

    #[test]
    fn test_partial_minute_rounds_up() {
        // 61 seconds -> 2 minutes at 700/h -> ceil(1400 / 60) = 24
        let order = hourly(700).with_checkpoint(NOW - 61);
        let s = settle_hourly_delete(&order, NOW);

        assert_eq!(s.minutes, 2);
        assert_eq!(s.amount, 24);
    }

    #[test]
    fn test_falls_back_to_purchase_time() {
        let order = hourly(1000);
        assert_eq!(settle_hourly_delete(&order, NOW).amount, 24 * 1000);
    }

    #[test]
    fn test_monthly_settles_free() {
        let order = Order::new(2, 7, BillingMode::Monthly, NOW - 86_400).with_prices(500_000, 1000);
        assert!(settle_hourly_delete(&order, NOW).is_free());
    }

    #[test]
    fn test_balance_suspension_stops_the_meter() {
        let order = hourly(500)
            .with_checkpoint(NOW - 50_000)
            .with_status(OrderStatus::SuspendedBalance {
                suspended_at: NOW - 40_000,
                grace: rentbill_common::Grace::Until(NOW + 46_400),
            });
        let s = settle_hourly_delete(&order, NOW);

        // 10_000s: 2h and 47 started minutes -> 1000 + ceil(23_500 / 60)
        assert_eq!(s.full_hours, 2);
        assert_eq!(s.minutes, 47);
        assert_eq!(s.amount, 1_392);
        assert_eq!(s.billed_until, NOW - 40_000);
    }

    #[test]
    fn test_future_checkpoint_is_free() {
        let order = hourly(1000).with_checkpoint(NOW + 600);
        assert!(settle_hourly_delete(&order, NOW).is_free());
    }
}

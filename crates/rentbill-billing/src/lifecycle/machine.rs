//! Per-tick lifecycle state machine
//!
//! `decide` is pure: it reads an order snapshot, the owner's balance, an
//! optional traffic reading and the current time, and returns what should
//! change. Applying the decision is the reconciler's job.

use super::thresholds::BillingThresholds;
use super::traffic::{TrafficReading, TrafficUsage};
use rentbill_common::{
    BillingMode, Grace, Order, OrderStatus, SuspendReason, Timestamp, SECS_PER_HOUR,
};
use serde::{Deserialize, Serialize};

/// Debit of whole elapsed hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyCharge {
    pub hours: i64,
    pub amount: i64,
    /// Old checkpoint plus exactly `hours * 3600`
    pub new_checkpoint: Timestamp,
}

/// Provider call that accompanies a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceAction {
    PowerOn,
    PowerOff,
    Delete,
}

/// Status change of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Suspend(SuspendReason),
    SuspendBalance {
        suspended_at: Timestamp,
        delete_at: Timestamp,
    },
    Resume,
    Delete,
}

impl Transition {
    /// Status the order ends up in
    pub fn target_status(&self) -> OrderStatus {
        match *self {
            Transition::Suspend(reason) => OrderStatus::Suspended { reason },
            Transition::SuspendBalance {
                suspended_at,
                delete_at,
            } => OrderStatus::SuspendedBalance {
                suspended_at,
                grace: Grace::Until(delete_at),
            },
            Transition::Resume => OrderStatus::Active,
            Transition::Delete => OrderStatus::Deleted,
        }
    }

    pub fn resource_action(&self) -> ResourceAction {
        match self {
            Transition::Suspend(_) | Transition::SuspendBalance { .. } => ResourceAction::PowerOff,
            Transition::Resume => ResourceAction::PowerOn,
            Transition::Delete => ResourceAction::Delete,
        }
    }
}

/// Outcome of one tick for one order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    /// Wallet debit to commit before the checkpoint moves
    pub charge: Option<HourlyCharge>,
    /// New `last_hourly_charge_at` (first observation or after a charge)
    pub checkpoint: Option<Timestamp>,
    /// Low-balance warning emitted at this instant
    pub warned_at: Option<Timestamp>,
    pub traffic: Option<TrafficUsage>,
    pub transition: Option<Transition>,
}

impl Decision {
    pub fn is_noop(&self) -> bool {
        self.charge.is_none()
            && self.checkpoint.is_none()
            && self.warned_at.is_none()
            && self.traffic.is_none()
            && self.transition.is_none()
    }

    /// Whether `last_hourly_charge_at` or `last_warn_at` must be written
    pub fn touches_checkpoint(&self) -> bool {
        self.checkpoint.is_some() || self.warned_at.is_some()
    }

    pub fn resource_action(&self) -> Option<ResourceAction> {
        self.transition.as_ref().map(Transition::resource_action)
    }
}

/// Decide the next step for `order`.
///
/// Traffic usage is recorded for any provider-backed live order with a
/// reading. Balance suspension takes precedence over a traffic-cap
/// suspension raised in the same tick; an hourly charge is kept either way.
pub fn decide(
    order: &Order,
    balance: i64,
    traffic: TrafficReading,
    thresholds: &BillingThresholds,
    now: Timestamp,
) -> Decision {
    let mut decision = Decision::default();

    if !order.is_live() {
        return decision;
    }

    if order.resource_id.is_some() {
        decision.traffic = traffic
            .gigabytes()
            .map(|used_gb| TrafficUsage { used_gb, ts: now });
    }

    match order.status {
        OrderStatus::Active => {
            match order.billing_mode {
                BillingMode::Monthly => {
                    if now >= order.expires_at {
                        decision.transition = Some(Transition::Suspend(SuspendReason::Expired));
                    }
                }
                BillingMode::Hourly => {
                    if order.is_hourly_metered() {
                        decide_hourly(order, balance, thresholds, now, &mut decision);
                    }
                }
            }

            let breached = decision
                .traffic
                .map_or(false, |usage| usage.exceeds(order.traffic_limit_gb));
            if breached && decision.transition.is_none() {
                decision.transition = Some(Transition::Suspend(SuspendReason::TrafficCap));
            }
        }
        OrderStatus::SuspendedBalance { grace, .. } => match grace {
            Grace::Until(delete_at) if now >= delete_at => {
                decision.transition = Some(Transition::Delete);
            }
            Grace::Until(_) | Grace::Indefinite => {}
        },
        OrderStatus::Suspended { .. } | OrderStatus::Deleted => {}
    }

    decision
}

fn decide_hourly(
    order: &Order,
    balance: i64,
    thresholds: &BillingThresholds,
    now: Timestamp,
    decision: &mut Decision,
) {
    let suspend = Transition::SuspendBalance {
        suspended_at: now,
        delete_at: now.saturating_add(thresholds.delete_grace_secs),
    };

    if balance <= thresholds.cutoff_balance {
        decision.transition = Some(suspend);
        return;
    }

    if balance <= thresholds.warn_balance {
        let last_warn = order.last_warn_at.unwrap_or(0);
        if now - last_warn >= thresholds.warn_interval_secs {
            decision.warned_at = Some(now);
        }
    }

    // First observation starts the clock; usage before tracking is not billed.
    let Some(checkpoint) = order.last_hourly_charge_at else {
        decision.checkpoint = Some(now);
        return;
    };

    let hours = (now - checkpoint).max(0) / SECS_PER_HOUR;
    if hours < 1 {
        return;
    }

    let amount = hours.saturating_mul(order.price_hourly);
    if balance >= amount {
        let new_checkpoint = checkpoint + hours * SECS_PER_HOUR;
        decision.charge = Some(HourlyCharge {
            hours,
            amount,
            new_checkpoint,
        });
        decision.checkpoint = Some(new_checkpoint);
    } else {
        // The suspension notice replaces the warning.
        decision.warned_at = None;
        decision.transition = Some(suspend);
    }
}

/// Top-up trigger: resume a balance-suspended hourly order once the
/// balance is back at the warning level and its grace has not run out.
pub fn decide_resume(
    order: &Order,
    balance: i64,
    thresholds: &BillingThresholds,
    now: Timestamp,
) -> Option<Transition> {
    match order.status {
        OrderStatus::SuspendedBalance { grace, .. }
            if order.price_hourly > 0 && balance >= thresholds.warn_balance =>
        {
            match grace {
                Grace::Until(delete_at) if now >= delete_at => None,
                Grace::Until(_) | Grace::Indefinite => Some(Transition::Resume),
            }
        }
        _ => None,
    }
}

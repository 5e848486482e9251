//! Message texts for users and operators

use chrono::{DateTime, Utc};
use rentbill_billing::{HourlyCharge, Settlement, Transition};
use rentbill_common::{GatewayError, Order, SuspendReason, Timestamp};

/// Amount in minor units with thousands separators (`1600000` -> `1,600,000`)
pub fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_time(ts: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Whole hours the balance still covers at the order's rate
pub fn hours_left(order: &Order, balance: i64) -> i64 {
    if order.price_hourly <= 0 {
        return 0;
    }
    (balance / order.price_hourly).max(0)
}

pub fn low_balance_warning(order: &Order, balance: i64) -> String {
    format!(
        "Low balance on your hourly server {}: rate {}/h, wallet {}, about {} hours left. \
         Top up to keep it running.",
        order.label(),
        format_amount(order.price_hourly),
        format_amount(balance),
        hours_left(order, balance)
    )
}

pub fn low_balance_for_operators(order: &Order, balance: i64) -> String {
    format!(
        "Low balance warning for user {} on order {}: wallet {}, rate {}/h",
        order.user_id,
        order.label(),
        format_amount(balance),
        format_amount(order.price_hourly)
    )
}

/// User text for a transition; `None` when the user is not told
pub fn transition_for_user(order: &Order, transition: &Transition, balance: i64) -> Option<String> {
    let label = order.label();
    let text = match transition {
        Transition::Suspend(SuspendReason::Expired) => format!(
            "Your server {} has expired and was powered off. Renew it to bring it back.",
            label
        ),
        Transition::Suspend(SuspendReason::TrafficCap) => format!(
            "Your server {} reached its {} GB traffic limit and was powered off.",
            label, order.traffic_limit_gb
        ),
        Transition::Suspend(SuspendReason::Manual) => return None,
        Transition::SuspendBalance { delete_at, .. } => format!(
            "Your hourly server {} was powered off: wallet balance is {}. Top up before {} or \
             the server will be deleted.",
            label,
            format_amount(balance),
            format_time(*delete_at)
        ),
        Transition::Resume => format!(
            "Your wallet was topped up and your hourly server {} is running again.",
            label
        ),
        Transition::Delete => format!(
            "Your server {} was deleted because the wallet was not topped up in time.",
            label
        ),
    };
    Some(text)
}

pub fn transition_for_operators(order: &Order, transition: &Transition, balance: i64) -> String {
    let what = match transition {
        Transition::Suspend(SuspendReason::Expired) => "suspended (expired)".to_string(),
        Transition::Suspend(SuspendReason::TrafficCap) => {
            format!("suspended (traffic cap {} GB)", order.traffic_limit_gb)
        }
        Transition::Suspend(SuspendReason::Manual) => "suspended".to_string(),
        Transition::SuspendBalance { delete_at, .. } => {
            format!("suspended for balance, deletion at {}", format_time(*delete_at))
        }
        Transition::Resume => "resumed after top-up".to_string(),
        Transition::Delete => "deleted after grace period".to_string(),
    };
    format!(
        "Order {} of user {} {}; balance {}",
        order.label(),
        order.user_id,
        what,
        format_amount(balance)
    )
}

pub fn charge_receipt(order: &Order, charge: &HourlyCharge) -> String {
    format!("Hourly charge order #{} ({}h)", order.id, charge.hours)
}

pub fn settlement_receipt(order: &Order, settlement: &Settlement) -> String {
    format!(
        "Hourly final charge order #{} ({}h {}m)",
        order.id, settlement.full_hours, settlement.minutes
    )
}

pub fn manual_delete_report(order: &Order, actor: &str, settlement: &Settlement) -> String {
    let mut text = format!(
        "Order {} of user {} deleted by {}",
        order.label(),
        order.user_id,
        actor
    );
    if !settlement.is_free() {
        text.push_str(&format!(
            "; final charge {} for {}h {}m",
            format_amount(settlement.amount),
            settlement.full_hours,
            settlement.minutes
        ));
    }
    if let Some(server_type) = &order.server_type {
        text.push_str(&format!("; type {}", server_type));
    }
    if let Some(location) = &order.location {
        text.push_str(&format!("; location {}", location));
    }
    text
}

pub fn provider_failure(order: &Order, action: &str, err: &GatewayError) -> String {
    let kind = if err.is_transient() { "transient" } else { "permanent" };
    format!(
        "Provider {} failed for order {} (resource {}): {} error: {}",
        action,
        order.label(),
        order
            .resource_id
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
        kind,
        err.message()
    )
}

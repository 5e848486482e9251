//! Orders - rented compute instances and their lifecycle state
//!
//! An order is billed either monthly (flat subscription with an expiry) or
//! hourly (metered against the owner's wallet). Lifecycle:
//!
//! ```text
//! active ──expiry/traffic──▶ suspended
//!   │  ▲
//!   │  └──────top-up────────┐
//!   └──low balance──▶ suspended_balance ──grace elapsed──▶ deleted
//! ```

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// How an order is billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    /// Flat subscription until `expires_at`
    Monthly,
    /// Whole hours debited from the wallet
    Hourly,
}

impl BillingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingMode::Monthly => "monthly",
            BillingMode::Hourly => "hourly",
        }
    }

    /// Parse a stored billing mode, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "monthly" => Some(BillingMode::Monthly),
            "hourly" => Some(BillingMode::Hourly),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an order was powered off without a balance grace period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendReason {
    /// Monthly subscription reached `expires_at`
    Expired,
    /// Egress traffic reached the order's cap
    TrafficCap,
    /// Suspended outside the reconciler (admin action, legacy rows)
    Manual,
}

/// Deletion deadline of a balance suspension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grace {
    /// Deleted at the provider once `now >= delete_at`
    Until(Timestamp),
    /// Never deleted automatically; waits for a top-up
    Indefinite,
}

impl Grace {
    pub fn delete_at(&self) -> Option<Timestamp> {
        match self {
            Grace::Until(at) => Some(*at),
            Grace::Indefinite => None,
        }
    }

    /// Map a stored `delete_at` column (0 = none) onto a grace variant
    pub fn from_column(delete_at: Timestamp) -> Self {
        if delete_at > 0 {
            Grace::Until(delete_at)
        } else {
            Grace::Indefinite
        }
    }
}

/// Lifecycle state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrderStatus {
    Active,
    Suspended {
        reason: SuspendReason,
    },
    SuspendedBalance {
        suspended_at: Timestamp,
        grace: Grace,
    },
    /// Terminal
    Deleted,
}

impl OrderStatus {
    /// Storage label of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Active => "active",
            OrderStatus::Suspended { .. } => "suspended",
            OrderStatus::SuspendedBalance { .. } => "suspended_balance",
            OrderStatus::Deleted => "deleted",
        }
    }

    /// Rebuild a status from the flat columns of a legacy order row
    pub fn from_columns(
        status: &str,
        suspended_at: Timestamp,
        delete_at: Timestamp,
    ) -> Option<Self> {
        match status.trim() {
            "active" => Some(OrderStatus::Active),
            "suspended" => Some(OrderStatus::Suspended {
                reason: SuspendReason::Manual,
            }),
            "suspended_balance" => Some(OrderStatus::SuspendedBalance {
                suspended_at,
                grace: Grace::from_column(delete_at),
            }),
            "deleted" => Some(OrderStatus::Deleted),
            _ => None,
        }
    }

    /// Every state except `deleted` is live
    pub fn is_live(&self) -> bool {
        !matches!(self, OrderStatus::Deleted)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rented compute instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub billing_mode: BillingMode,
    pub status: OrderStatus,

    /// Monthly retail price snapshot (minor units)
    pub price_monthly: i64,
    /// Hourly retail price snapshot; 0 disables hourly metering
    pub price_hourly: i64,

    pub purchased_at: Timestamp,
    /// Monthly deadline; informational for hourly orders
    pub expires_at: Timestamp,
    /// Instant up to which hourly usage has been billed
    #[serde(default)]
    pub last_hourly_charge_at: Option<Timestamp>,
    /// Last low-balance notice
    #[serde(default)]
    pub last_warn_at: Option<Timestamp>,

    /// Traffic cap in GB; 0 = unlimited
    #[serde(default)]
    pub traffic_limit_gb: i64,
    #[serde(default)]
    pub traffic_used_gb: f64,
    #[serde(default)]
    pub traffic_last_ts: Timestamp,

    /// Provider server id; absent for manually fulfilled orders
    #[serde(default)]
    pub resource_id: Option<i64>,

    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip4: Option<String>,
    #[serde(default)]
    pub server_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl Order {
    /// Create a new active order with empty checkpoints
    pub fn new(id: i64, user_id: i64, billing_mode: BillingMode, purchased_at: Timestamp) -> Self {
        Self {
            id,
            user_id,
            billing_mode,
            status: OrderStatus::Active,
            price_monthly: 0,
            price_hourly: 0,
            purchased_at,
            expires_at: purchased_at + 30 * 24 * 3600,
            last_hourly_charge_at: None,
            last_warn_at: None,
            traffic_limit_gb: 0,
            traffic_used_gb: 0.0,
            traffic_last_ts: 0,
            resource_id: None,
            name: None,
            ip4: None,
            server_type: None,
            location: None,
        }
    }

    pub fn with_prices(mut self, price_monthly: i64, price_hourly: i64) -> Self {
        self.price_monthly = price_monthly;
        self.price_hourly = price_hourly;
        self
    }

    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn with_resource(mut self, resource_id: i64) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn with_traffic_limit(mut self, limit_gb: i64) -> Self {
        self.traffic_limit_gb = limit_gb;
        self
    }

    pub fn with_checkpoint(mut self, last_hourly_charge_at: Timestamp) -> Self {
        self.last_hourly_charge_at = Some(last_hourly_charge_at);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    /// Hourly order with a positive rate
    pub fn is_hourly_metered(&self) -> bool {
        self.billing_mode == BillingMode::Hourly && self.price_hourly > 0
    }

    /// Grace deadline when suspended for balance
    pub fn delete_at(&self) -> Option<Timestamp> {
        match self.status {
            OrderStatus::SuspendedBalance { grace, .. } => grace.delete_at(),
            _ => None,
        }
    }

    /// Short human label used in notifications
    pub fn label(&self) -> String {
        match (&self.name, &self.ip4) {
            (Some(name), Some(ip)) => format!("#{} {} ({})", self.id, name, ip),
            (None, Some(ip)) => format!("#{} ({})", self.id, ip),
            (Some(name), None) => format!("#{} {}", self.id, name),
            (None, None) => format!("#{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_columns() {
        assert_eq!(
            OrderStatus::from_columns("suspended_balance", 100, 0),
            Some(OrderStatus::SuspendedBalance {
                suspended_at: 100,
                grace: Grace::Indefinite
            })
        );
        assert_eq!(
            OrderStatus::from_columns("suspended_balance", 100, 500),
            Some(OrderStatus::SuspendedBalance {
                suspended_at: 100,
                grace: Grace::Until(500)
            })
        );
        assert_eq!(OrderStatus::from_columns("bogus", 0, 0), None);
    }

    #[test]
    fn test_live_states() {
        assert!(OrderStatus::Active.is_live());
        assert!(OrderStatus::Suspended {
            reason: SuspendReason::Expired
        }
        .is_live());
        assert!(!OrderStatus::Deleted.is_live());
    }

    #[test]
    fn test_status_serde_shape() {
        let status = OrderStatus::SuspendedBalance {
            suspended_at: 10,
            grace: Grace::Until(20),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"state\":\"suspended_balance\""));
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_order_delete_at() {
        let order = Order::new(1, 7, BillingMode::Hourly, 0).with_status(
            OrderStatus::SuspendedBalance {
                suspended_at: 5,
                grace: Grace::Until(86_405),
            },
        );
        assert_eq!(order.delete_at(), Some(86_405));
        assert_eq!(order.label(), "#1");
    }

    #[test]
    fn test_hourly_metering_requires_rate() {
        let order = Order::new(1, 7, BillingMode::Hourly, 0);
        assert!(!order.is_hourly_metered());
        assert!(order.with_prices(0, 500).is_hourly_metered());
    }
}

//! Versioned startup migrations
//!
//! The store records a `schema_version`. Each step upgrades persisted order
//! records in place and bumps the version; a store already at
//! [`CURRENT_SCHEMA_VERSION`] is left untouched.
//!
//! Version history:
//! - 1: flat order rows (`status` text plus `suspended_at` / `delete_at`
//!   columns, zero meaning "unset" for every timestamp)
//! - 2: tagged [`OrderStatus`] with optional checkpoints

use async_trait::async_trait;
use rentbill_common::{
    BillingMode, Order, OrderStatus, RentbillError, Result, Timestamp,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Storage hooks a backend exposes to the migration runner
#[async_trait]
pub trait MigrationTarget: Send + Sync {
    /// Recorded version; 0 when the store was never stamped
    async fn schema_version(&self) -> Result<u32>;

    async fn set_schema_version(&self, version: u32) -> Result<()>;

    /// Every persisted order as `(id, raw JSON)`
    async fn raw_order_records(&self) -> Result<Vec<(i64, String)>>;

    async fn replace_order(&self, order: Order) -> Result<()>;
}

/// Outcome of a migration run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    /// Records rewritten to the current layout
    pub upgraded: usize,
    /// Records that could not be parsed in either layout
    pub skipped: usize,
}

/// Order row as persisted before version 2
#[derive(Debug, Deserialize)]
struct LegacyOrderRecord {
    id: i64,
    user_id: i64,
    billing_mode: String,
    status: String,
    #[serde(alias = "price_monthly_irt", default)]
    price_monthly: i64,
    #[serde(alias = "price_hourly_irt", default)]
    price_hourly: i64,
    purchased_at: Timestamp,
    #[serde(default)]
    expires_at: Timestamp,
    #[serde(default)]
    last_hourly_charge_at: Timestamp,
    #[serde(default)]
    last_warn_at: Timestamp,
    #[serde(default)]
    suspended_at: Timestamp,
    #[serde(default)]
    delete_at: Timestamp,
    #[serde(default)]
    traffic_limit_gb: i64,
    #[serde(default)]
    traffic_used_gb: f64,
    #[serde(default)]
    traffic_last_ts: Timestamp,
    #[serde(alias = "hcloud_server_id", default)]
    resource_id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    ip4: Option<String>,
    #[serde(default)]
    server_type: Option<String>,
    #[serde(alias = "location_name", default)]
    location: Option<String>,
}

fn non_zero(ts: Timestamp) -> Option<Timestamp> {
    (ts > 0).then_some(ts)
}

impl TryFrom<LegacyOrderRecord> for Order {
    type Error = RentbillError;

    fn try_from(row: LegacyOrderRecord) -> Result<Self> {
        let billing_mode = BillingMode::parse(&row.billing_mode).ok_or_else(|| {
            RentbillError::Serialization(format!(
                "order {}: unknown billing mode {:?}",
                row.id, row.billing_mode
            ))
        })?;
        let status = OrderStatus::from_columns(&row.status, row.suspended_at, row.delete_at)
            .ok_or_else(|| {
                RentbillError::Serialization(format!(
                    "order {}: unknown status {:?}",
                    row.id, row.status
                ))
            })?;

        let mut order = Order::new(row.id, row.user_id, billing_mode, row.purchased_at)
            .with_prices(row.price_monthly, row.price_hourly)
            .with_traffic_limit(row.traffic_limit_gb)
            .with_status(status);
        if row.expires_at > 0 {
            order.expires_at = row.expires_at;
        }
        order.last_hourly_charge_at = non_zero(row.last_hourly_charge_at);
        order.last_warn_at = non_zero(row.last_warn_at);
        order.traffic_used_gb = row.traffic_used_gb;
        order.traffic_last_ts = row.traffic_last_ts;
        order.resource_id = row.resource_id.filter(|id| *id > 0);
        order.name = row.name;
        order.ip4 = row.ip4;
        order.server_type = row.server_type;
        order.location = row.location;
        Ok(order)
    }
}

/// Parse a raw record; `Ok(None)` when it is already in the current layout
pub fn upgrade_order_record(raw: &str) -> Result<Option<Order>> {
    if serde_json::from_str::<Order>(raw).is_ok() {
        return Ok(None);
    }
    let legacy: LegacyOrderRecord = serde_json::from_str(raw)?;
    Order::try_from(legacy).map(Some)
}

/// Bring `target` up to [`CURRENT_SCHEMA_VERSION`]
#[instrument(skip(target))]
pub async fn run_migrations(target: &dyn MigrationTarget) -> Result<MigrationReport> {
    let from_version = target.schema_version().await?;
    let mut report = MigrationReport {
        from_version,
        to_version: from_version,
        ..Default::default()
    };

    if from_version >= CURRENT_SCHEMA_VERSION {
        return Ok(report);
    }

    if from_version < 2 {
        normalize_flat_orders(target, &mut report).await?;
        target.set_schema_version(2).await?;
        report.to_version = 2;
    }

    info!(
        from = report.from_version,
        to = report.to_version,
        upgraded = report.upgraded,
        skipped = report.skipped,
        "Store migrated"
    );
    Ok(report)
}

async fn normalize_flat_orders(
    target: &dyn MigrationTarget,
    report: &mut MigrationReport,
) -> Result<()> {
    for (id, raw) in target.raw_order_records().await? {
        match upgrade_order_record(&raw) {
            Ok(Some(order)) => {
                target.replace_order(order).await?;
                report.upgraded += 1;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(order_id = id, error = %e, "Skipping unreadable order record");
                report.skipped += 1;
            }
        }
    }
    Ok(())
}

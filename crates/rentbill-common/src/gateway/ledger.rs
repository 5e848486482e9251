//! Ledger gateway - wallet, invoice and order persistence

use crate::{NewInvoice, Order, OrderStatus, Result, Timestamp};
use async_trait::async_trait;

/// Minimal storage contract the reconciler needs.
///
/// Balance changes are signed deltas applied atomically by the store, so
/// they interleave safely with purchase and top-up flows running elsewhere.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Current wallet balance; unknown users have a zero balance
    async fn get_wallet_balance(&self, user_id: i64) -> Result<i64>;

    /// Apply a signed delta and return the resulting balance
    async fn adjust_wallet_balance(&self, user_id: i64, delta: i64) -> Result<i64>;

    /// Append an invoice and return its id
    async fn record_invoice(&self, invoice: NewInvoice) -> Result<i64>;

    /// All orders that are not deleted
    async fn list_live_orders(&self) -> Result<Vec<Order>>;

    /// Live and deleted orders owned by a user
    async fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>>;

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>>;

    async fn update_order_status(&self, order_id: i64, status: OrderStatus) -> Result<()>;

    async fn update_order_checkpoint(
        &self,
        order_id: i64,
        last_hourly_charge_at: Option<Timestamp>,
        last_warn_at: Option<Timestamp>,
    ) -> Result<()>;

    /// Enter `suspended_balance`; `delete_at = None` means no automatic deletion
    async fn set_order_suspended_balance(
        &self,
        order_id: i64,
        suspended_at: Timestamp,
        delete_at: Option<Timestamp>,
    ) -> Result<()>;

    /// Leave `suspended_balance` and return to `active`
    async fn clear_order_suspension(&self, order_id: i64) -> Result<()>;

    async fn update_order_traffic(&self, order_id: i64, used_gb: f64, ts: Timestamp) -> Result<()>;
}

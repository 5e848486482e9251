//! In-memory ledger and settings
//!
//! Process-local backend on `DashMap`. Wallet deltas apply under the
//! entry lock, so concurrent adjustments never lose an update.

use crate::migrate::MigrationTarget;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use rentbill_common::{
    gateway::{LedgerGateway, SettingsStore},
    now_ts, Grace, Invoice, NewInvoice, Order, OrderStatus, RentbillError, Result, Timestamp,
    Wallet,
};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use tracing::debug;

/// Ledger kept entirely in memory
pub struct InMemoryLedger {
    orders: DashMap<i64, Order>,
    wallets: DashMap<i64, Wallet>,
    invoices: RwLock<Vec<Invoice>>,
    next_invoice_id: AtomicI64,
    schema_version: AtomicU32,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            wallets: DashMap::new(),
            invoices: RwLock::new(Vec::new()),
            next_invoice_id: AtomicI64::new(1),
            schema_version: AtomicU32::new(0),
        }
    }

    /// Insert or replace an order
    pub fn insert_order(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    /// Snapshot of an order
    pub fn order(&self, order_id: i64) -> Option<Order> {
        self.orders.get(&order_id).map(|o| o.clone())
    }

    /// Overwrite a wallet balance (seeding only; runtime paths use deltas)
    pub fn set_balance(&self, user_id: i64, balance: i64) {
        self.wallets
            .insert(user_id, Wallet::with_balance(user_id, balance));
    }

    pub fn balance(&self, user_id: i64) -> i64 {
        self.wallets.get(&user_id).map_or(0, |w| w.balance)
    }

    /// All recorded invoices, oldest first
    pub fn invoices(&self) -> Vec<Invoice> {
        self.invoices.read().clone()
    }

    pub fn invoices_for_order(&self, order_id: i64) -> Vec<Invoice> {
        self.invoices
            .read()
            .iter()
            .filter(|i| i.order_id == Some(order_id))
            .cloned()
            .collect()
    }

    fn with_order<F>(&self, order_id: i64, f: F) -> Result<()>
    where
        F: FnOnce(&mut Order),
    {
        let mut entry = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| RentbillError::NotFound(format!("order {}", order_id)))?;
        f(entry.value_mut());
        Ok(())
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn get_wallet_balance(&self, user_id: i64) -> Result<i64> {
        Ok(self.balance(user_id))
    }

    async fn adjust_wallet_balance(&self, user_id: i64, delta: i64) -> Result<i64> {
        let mut wallet = self
            .wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::new(user_id));
        let balance = wallet.apply_delta(delta)?;
        debug!(user_id, delta, balance, "Wallet adjusted");
        Ok(balance)
    }

    async fn record_invoice(&self, invoice: NewInvoice) -> Result<i64> {
        let id = self.next_invoice_id.fetch_add(1, Ordering::SeqCst);
        self.invoices
            .write()
            .push(Invoice::from_new(id, now_ts(), invoice));
        Ok(id)
    }

    async fn list_live_orders(&self) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| o.is_live())
            .map(|o| o.clone())
            .collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }

    async fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .map(|o| o.clone())
            .collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        Ok(self.order(order_id))
    }

    async fn update_order_status(&self, order_id: i64, status: OrderStatus) -> Result<()> {
        self.with_order(order_id, |o| o.status = status)
    }

    async fn update_order_checkpoint(
        &self,
        order_id: i64,
        last_hourly_charge_at: Option<Timestamp>,
        last_warn_at: Option<Timestamp>,
    ) -> Result<()> {
        self.with_order(order_id, |o| {
            if let Some(ts) = last_hourly_charge_at {
                o.last_hourly_charge_at = Some(ts);
            }
            if let Some(ts) = last_warn_at {
                o.last_warn_at = Some(ts);
            }
        })
    }

    async fn set_order_suspended_balance(
        &self,
        order_id: i64,
        suspended_at: Timestamp,
        delete_at: Option<Timestamp>,
    ) -> Result<()> {
        self.with_order(order_id, |o| {
            o.status = OrderStatus::SuspendedBalance {
                suspended_at,
                grace: delete_at.map_or(Grace::Indefinite, Grace::Until),
            }
        })
    }

    async fn clear_order_suspension(&self, order_id: i64) -> Result<()> {
        self.with_order(order_id, |o| {
            if matches!(o.status, OrderStatus::SuspendedBalance { .. }) {
                o.status = OrderStatus::Active;
            }
        })
    }

    async fn update_order_traffic(&self, order_id: i64, used_gb: f64, ts: Timestamp) -> Result<()> {
        self.with_order(order_id, |o| {
            o.traffic_used_gb = used_gb;
            o.traffic_last_ts = ts;
        })
    }
}

#[async_trait]
impl MigrationTarget for InMemoryLedger {
    async fn schema_version(&self) -> Result<u32> {
        Ok(self.schema_version.load(Ordering::SeqCst))
    }

    async fn set_schema_version(&self, version: u32) -> Result<()> {
        self.schema_version.store(version, Ordering::SeqCst);
        Ok(())
    }

    async fn raw_order_records(&self) -> Result<Vec<(i64, String)>> {
        self.orders
            .iter()
            .map(|o| -> Result<(i64, String)> { Ok((o.id, serde_json::to_string(o.value())?)) })
            .collect()
    }

    async fn replace_order(&self, order: Order) -> Result<()> {
        self.insert_order(order);
        Ok(())
    }
}

/// Settings kept in memory
#[derive(Default)]
pub struct InMemorySettings {
    values: DashMap<String, String>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.values.remove(key);
    }
}

#[async_trait]
impl SettingsStore for InMemorySettings {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|v| v.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentbill_common::{BillingMode, InvoiceMethod, InvoiceStatus};

    #[tokio::test]
    async fn test_wallet_deltas() {
        let ledger = InMemoryLedger::new();
        assert_eq!(ledger.get_wallet_balance(7).await.unwrap(), 0);

        assert_eq!(ledger.adjust_wallet_balance(7, 1_600).await.unwrap(), 1_600);
        assert_eq!(ledger.adjust_wallet_balance(7, -1_000).await.unwrap(), 600);
        assert_eq!(ledger.get_wallet_balance(7).await.unwrap(), 600);
    }

    #[tokio::test]
    async fn test_wallet_overflow_is_rejected() {
        let ledger = InMemoryLedger::new();
        ledger.set_balance(7, i64::MAX);

        let err = ledger.adjust_wallet_balance(7, 1).await.unwrap_err();
        assert!(matches!(err, RentbillError::Wallet(_)));
        assert_eq!(ledger.balance(7), i64::MAX);
    }

    #[tokio::test]
    async fn test_invoice_ids_increase() {
        let ledger = InMemoryLedger::new();
        let a = ledger
            .record_invoice(NewInvoice::wallet_debit(7, 1, 500, "hourly"))
            .await
            .unwrap();
        let b = ledger
            .record_invoice(NewInvoice::wallet_debit(7, 1, 500, "hourly"))
            .await
            .unwrap();

        assert!(b > a);
        let invoices = ledger.invoices_for_order(1);
        assert_eq!(invoices.len(), 2);
        assert_eq!(invoices[0].amount, -500);
        assert_eq!(invoices[0].method, InvoiceMethod::Wallet);
        assert_eq!(invoices[0].status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn test_live_orders_exclude_deleted() {
        let ledger = InMemoryLedger::new();
        ledger.insert_order(Order::new(2, 7, BillingMode::Hourly, 100));
        ledger.insert_order(Order::new(1, 7, BillingMode::Monthly, 100));
        ledger.insert_order(
            Order::new(3, 8, BillingMode::Hourly, 100).with_status(OrderStatus::Deleted),
        );

        let live = ledger.list_live_orders().await.unwrap();
        assert_eq!(live.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1, 2]);

        let user = ledger.list_orders_for_user(8).await.unwrap();
        assert_eq!(user.len(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_writes_are_partial() {
        let ledger = InMemoryLedger::new();
        ledger.insert_order(Order::new(1, 7, BillingMode::Hourly, 100).with_checkpoint(3_700));

        ledger.update_order_checkpoint(1, None, Some(5_000)).await.unwrap();
        let order = ledger.order(1).unwrap();
        assert_eq!(order.last_hourly_charge_at, Some(3_700));
        assert_eq!(order.last_warn_at, Some(5_000));
    }

    #[tokio::test]
    async fn test_balance_suspension_roundtrip() {
        let ledger = InMemoryLedger::new();
        ledger.insert_order(Order::new(1, 7, BillingMode::Hourly, 100));

        ledger.set_order_suspended_balance(1, 200, Some(86_600)).await.unwrap();
        assert_eq!(ledger.order(1).unwrap().delete_at(), Some(86_600));

        ledger.clear_order_suspension(1).await.unwrap();
        assert_eq!(ledger.order(1).unwrap().status, OrderStatus::Active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_order_updates_keep_both_fields() {
        let ledger = std::sync::Arc::new(InMemoryLedger::new());
        ledger.insert_order(Order::new(1, 7, BillingMode::Hourly, 100).with_prices(0, 500));

        let mut tasks = Vec::new();
        for i in 0..20i64 {
            let ledger = std::sync::Arc::clone(&ledger);
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    ledger.update_order_checkpoint(1, Some(10_000 + i), None).await
                } else {
                    ledger.update_order_traffic(1, i as f64, 20_000 + i).await
                }
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let order = ledger.order(1).unwrap();
        assert!(order.last_hourly_charge_at.is_some());
        assert!(order.traffic_last_ts >= 20_000);
        assert_eq!(order.status, OrderStatus::Active);
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let ledger = InMemoryLedger::new();
        let err = ledger.update_order_traffic(9, 1.0, 10).await.unwrap_err();
        assert!(matches!(err, RentbillError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_settings() {
        let settings = InMemorySettings::new();
        settings.set("billing_enabled", "0");
        assert!(!settings.get_flag("billing_enabled", true).await.unwrap());

        settings.remove("billing_enabled");
        assert!(settings.get_flag("billing_enabled", true).await.unwrap());
    }
}

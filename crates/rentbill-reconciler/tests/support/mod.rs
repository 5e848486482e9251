//! Fakes shared by the reconciler integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rentbill_common::{
    gateway::{LedgerGateway, Notifier, ResourceGateway, ResourceStatus, SettingsStore},
    GatewayError, NewInvoice, Order, OrderStatus, RentbillError, Result, Timestamp,
};
use rentbill_reconciler::{config::SchedulerSettings, Reconciler};
use rentbill_store::{InMemoryLedger, InMemorySettings};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const NOW: Timestamp = 1_700_000_000;
pub const USER: i64 = 7;

/// Provider fake that records every call
#[derive(Default)]
pub struct FakeResources {
    calls: Mutex<Vec<(&'static str, i64)>>,
    egress: Mutex<HashMap<i64, u64>>,
    failures: Mutex<HashMap<i64, GatewayError>>,
    hang: AtomicBool,
}

impl FakeResources {
    pub fn set_egress(&self, resource_id: i64, bytes: u64) {
        self.egress.lock().insert(resource_id, bytes);
    }

    /// Make power and delete calls on `resource_id` fail
    pub fn fail(&self, resource_id: i64, err: GatewayError) {
        self.failures.lock().insert(resource_id, err);
    }

    /// Make power and delete calls never complete
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn count(&self, action: &str) -> usize {
        self.calls.lock().iter().filter(|(a, _)| *a == action).count()
    }

    async fn act(
        &self,
        action: &'static str,
        resource_id: i64,
    ) -> std::result::Result<(), GatewayError> {
        self.calls.lock().push((action, resource_id));
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match self.failures.lock().get(&resource_id) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ResourceGateway for FakeResources {
    async fn get_status(
        &self,
        _resource_id: i64,
    ) -> std::result::Result<ResourceStatus, GatewayError> {
        Ok(ResourceStatus::Running)
    }

    async fn power_on(&self, resource_id: i64) -> std::result::Result<(), GatewayError> {
        self.act("power_on", resource_id).await
    }

    async fn power_off(&self, resource_id: i64) -> std::result::Result<(), GatewayError> {
        self.act("power_off", resource_id).await
    }

    async fn delete(&self, resource_id: i64) -> std::result::Result<(), GatewayError> {
        self.act("delete", resource_id).await
    }

    async fn get_egress_bytes(
        &self,
        resource_id: i64,
        _start: Timestamp,
        _end: Timestamp,
    ) -> std::result::Result<Option<u64>, GatewayError> {
        self.calls.lock().push(("egress", resource_id));
        Ok(self.egress.lock().get(&resource_id).copied())
    }
}

/// Notifier fake keeping every message
#[derive(Default)]
pub struct RecordingNotifier {
    pub user: Mutex<Vec<(i64, String)>>,
    pub operators: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn user_messages(&self) -> Vec<String> {
        self.user.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn operator_messages(&self) -> Vec<String> {
        self.operators.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_user(
        &self,
        user_id: i64,
        message: &str,
    ) -> std::result::Result<(), GatewayError> {
        self.user.lock().push((user_id, message.to_string()));
        Ok(())
    }

    async fn notify_operators(&self, message: &str) -> std::result::Result<(), GatewayError> {
        self.operators.lock().push(message.to_string());
        Ok(())
    }
}

/// Settings store that cannot be read
pub struct UnreadableSettings;

#[async_trait]
impl SettingsStore for UnreadableSettings {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Err(RentbillError::Storage(format!("settings offline ({})", key)))
    }
}

/// Ledger that fails every read of one order and delegates the rest
pub struct BrokenOrderLedger {
    pub inner: Arc<InMemoryLedger>,
    pub broken_order: i64,
}

#[async_trait]
impl LedgerGateway for BrokenOrderLedger {
    async fn get_wallet_balance(&self, user_id: i64) -> Result<i64> {
        self.inner.get_wallet_balance(user_id).await
    }

    async fn adjust_wallet_balance(&self, user_id: i64, delta: i64) -> Result<i64> {
        self.inner.adjust_wallet_balance(user_id, delta).await
    }

    async fn record_invoice(&self, invoice: NewInvoice) -> Result<i64> {
        self.inner.record_invoice(invoice).await
    }

    async fn list_live_orders(&self) -> Result<Vec<Order>> {
        self.inner.list_live_orders().await
    }

    async fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>> {
        self.inner.list_orders_for_user(user_id).await
    }

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        if order_id == self.broken_order {
            return Err(RentbillError::Storage("row is locked".into()));
        }
        self.inner.get_order(order_id).await
    }

    async fn update_order_status(&self, order_id: i64, status: OrderStatus) -> Result<()> {
        self.inner.update_order_status(order_id, status).await
    }

    async fn update_order_checkpoint(
        &self,
        order_id: i64,
        last_hourly_charge_at: Option<Timestamp>,
        last_warn_at: Option<Timestamp>,
    ) -> Result<()> {
        self.inner
            .update_order_checkpoint(order_id, last_hourly_charge_at, last_warn_at)
            .await
    }

    async fn set_order_suspended_balance(
        &self,
        order_id: i64,
        suspended_at: Timestamp,
        delete_at: Option<Timestamp>,
    ) -> Result<()> {
        self.inner
            .set_order_suspended_balance(order_id, suspended_at, delete_at)
            .await
    }

    async fn clear_order_suspension(&self, order_id: i64) -> Result<()> {
        self.inner.clear_order_suspension(order_id).await
    }

    async fn update_order_traffic(&self, order_id: i64, used_gb: f64, ts: Timestamp) -> Result<()> {
        self.inner.update_order_traffic(order_id, used_gb, ts).await
    }
}

pub fn timing() -> SchedulerSettings {
    SchedulerSettings {
        interval_secs: 300,
        error_backoff_secs: 60,
        call_timeout_secs: 5,
    }
}

/// In-memory ledger, settings and recording fakes wired into a reconciler
pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub settings: Arc<InMemorySettings>,
    pub resources: Arc<FakeResources>,
    pub notifier: Arc<RecordingNotifier>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let settings = Arc::new(InMemorySettings::new());
        let resources = Arc::new(FakeResources::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let reconciler = Reconciler::new(
            ledger.clone(),
            resources.clone(),
            notifier.clone(),
            settings.clone(),
            timing(),
        );

        Self {
            ledger,
            settings,
            resources,
            notifier,
            reconciler,
        }
    }

    pub fn order(&self, order_id: i64) -> Order {
        self.ledger.order(order_id).expect("order exists")
    }
}

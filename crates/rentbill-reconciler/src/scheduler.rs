//! Reconciliation scheduler
//!
//! One pass walks every live order, asks the lifecycle state machine what
//! to do, and commits the decision in a fixed order:
//!
//! ```text
//! debit + invoice -> checkpoint -> traffic -> provider call -> status -> notices
//! ```
//!
//! The debit lands before the checkpoint moves, so a crash in between
//! re-bills the same window on the next pass rather than losing it.
//! Provider calls are bounded by a timeout and never block the ledger;
//! their failures are logged and reported to operators.

use crate::config::SchedulerSettings;
use crate::notify::messages;
use crate::telemetry::ReconcilerMetrics;
use rentbill_billing::{
    decide, decide_resume, settle_hourly_delete, BillingThresholds, ResourceAction, Settlement,
    TrafficReading, Transition,
};
use rentbill_common::{
    gateway::{LedgerGateway, Notifier, ResourceGateway, SettingsStore},
    now_ts, BillingMode, GatewayError, NewInvoice, Order, OrderStatus, RentbillError, Result,
    Timestamp,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

/// Global kill switch; an absent flag means billing is on
pub const KEY_BILLING_ENABLED: &str = "billing_enabled";

/// Summary of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub pass_id: Uuid,
    /// Billing disabled or the flag could not be read
    pub skipped: bool,
    /// Shutdown was requested before every order was visited
    pub interrupted: bool,
    pub seen: usize,
    pub charged: usize,
    pub charged_amount: i64,
    pub warned: usize,
    pub suspended: usize,
    pub deleted: usize,
    pub provider_failures: usize,
    pub failures: usize,
}

impl PassReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    fn absorb(&mut self, outcome: &OrderOutcome) {
        if let Some(amount) = outcome.charged {
            self.charged += 1;
            self.charged_amount += amount;
        }
        if outcome.warned {
            self.warned += 1;
        }
        match outcome.transition {
            Some(Transition::Suspend(_)) | Some(Transition::SuspendBalance { .. }) => {
                self.suspended += 1
            }
            Some(Transition::Delete) => self.deleted += 1,
            Some(Transition::Resume) | None => {}
        }
        self.provider_failures += outcome.provider_failures;
    }
}

/// What happened to a single order during a pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderOutcome {
    pub charged: Option<i64>,
    pub warned: bool,
    pub transition: Option<Transition>,
    pub provider_failures: usize,
}

/// Result of a manual deletion
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOutcome {
    pub order_id: i64,
    pub settlement: Settlement,
    /// Provider deletion failure; the order is marked deleted regardless
    pub provider_error: Option<GatewayError>,
}

/// Periodic billing and lifecycle driver
pub struct Reconciler {
    ledger: Arc<dyn LedgerGateway>,
    resources: Arc<dyn ResourceGateway>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<dyn SettingsStore>,
    timing: SchedulerSettings,
    metrics: Option<ReconcilerMetrics>,
}

impl Reconciler {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        resources: Arc<dyn ResourceGateway>,
        notifier: Arc<dyn Notifier>,
        settings: Arc<dyn SettingsStore>,
        timing: SchedulerSettings,
    ) -> Self {
        Self {
            ledger,
            resources,
            notifier,
            settings,
            timing,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ReconcilerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run passes until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// A failed pass is followed by the error backoff instead of the regular
    /// interval; the loop itself never returns an error.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.timing.interval_secs,
            backoff_secs = self.timing.error_backoff_secs,
            "Reconciler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.pass(now_ts(), Some(&shutdown)).await {
                Ok(report) => {
                    if report.interrupted {
                        break;
                    }
                    self.timing.interval()
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation pass failed");
                    if let Some(m) = &self.metrics {
                        m.pass_errors_total.inc();
                    }
                    self.timing.error_backoff()
                }
            };

            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        info!("Reconciler stopped");
    }

    /// Run a single pass at `now`
    pub async fn run_pass(&self, now: Timestamp) -> Result<PassReport> {
        self.pass(now, None).await
    }

    async fn pass(
        &self,
        now: Timestamp,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<PassReport> {
        let pass_id = Uuid::now_v7();
        let started = Instant::now();

        let result = self
            .pass_inner(pass_id, now, shutdown)
            .instrument(info_span!("reconcile_pass", %pass_id, now))
            .await;

        if let (Ok(report), Some(m)) = (&result, &self.metrics) {
            m.record_pass(report, started.elapsed().as_secs_f64());
        }
        result
    }

    async fn pass_inner(
        &self,
        pass_id: Uuid,
        now: Timestamp,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<PassReport> {
        match self.settings.get_flag(KEY_BILLING_ENABLED, true).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Billing disabled, skipping pass");
                return Ok(PassReport {
                    pass_id,
                    ..PassReport::skipped()
                });
            }
            Err(e) => {
                warn!(error = %e, "Billing flag unreadable, skipping pass");
                return Ok(PassReport {
                    pass_id,
                    ..PassReport::skipped()
                });
            }
        }

        let thresholds = BillingThresholds::load(self.settings.as_ref()).await;
        let orders = self.ledger.list_live_orders().await?;

        let mut report = PassReport {
            pass_id,
            ..Default::default()
        };

        for order in orders {
            if shutdown.map_or(false, |rx| *rx.borrow()) {
                info!(visited = report.seen, "Shutdown requested, ending pass early");
                report.interrupted = true;
                break;
            }

            report.seen += 1;
            match self.process_order(order.id, &thresholds, now).await {
                Ok(outcome) => report.absorb(&outcome),
                Err(e) => {
                    report.failures += 1;
                    error!(order_id = order.id, error = %e, "Order reconciliation failed");
                }
            }
        }

        info!(
            seen = report.seen,
            charged = report.charged,
            charged_amount = report.charged_amount,
            warned = report.warned,
            suspended = report.suspended,
            deleted = report.deleted,
            provider_failures = report.provider_failures,
            failures = report.failures,
            "Pass complete"
        );
        Ok(report)
    }

    /// Reconcile one order against a fresh snapshot of it and its wallet
    #[instrument(skip(self, thresholds))]
    pub async fn process_order(
        &self,
        order_id: i64,
        thresholds: &BillingThresholds,
        now: Timestamp,
    ) -> Result<OrderOutcome> {
        let mut outcome = OrderOutcome::default();

        let Some(order) = self.ledger.get_order(order_id).await? else {
            debug!("Order vanished before processing");
            return Ok(outcome);
        };
        if !order.is_live() {
            return Ok(outcome);
        }

        let mut balance = self.ledger.get_wallet_balance(order.user_id).await?;
        let traffic = self.read_traffic(&order, now, &mut outcome).await;
        let decision = decide(&order, balance, traffic, thresholds, now);
        if decision.is_noop() {
            return Ok(outcome);
        }

        if let Some(charge) = decision.charge {
            balance = self
                .ledger
                .adjust_wallet_balance(order.user_id, -charge.amount)
                .await?;
            let invoice = NewInvoice::wallet_debit(
                order.user_id,
                order.id,
                charge.amount,
                messages::charge_receipt(&order, &charge),
            );
            if let Err(e) = self.ledger.record_invoice(invoice).await {
                // The debit is committed; keep going so the checkpoint moves with it.
                error!(amount = charge.amount, error = %e, "Failed to record hourly invoice");
            }
            info!(hours = charge.hours, amount = charge.amount, balance, "Hourly charge");
            outcome.charged = Some(charge.amount);
        }

        if decision.touches_checkpoint() {
            self.ledger
                .update_order_checkpoint(order.id, decision.checkpoint, decision.warned_at)
                .await?;
        }

        if let Some(usage) = decision.traffic {
            self.ledger
                .update_order_traffic(order.id, usage.used_gb, usage.ts)
                .await?;
        }

        if let Some(transition) = decision.transition {
            if !self
                .apply_resource_action(&order, transition.resource_action())
                .await
            {
                outcome.provider_failures += 1;
            }
            self.commit_transition(order.id, &transition).await?;
            info!(
                from = order.status.as_str(),
                to = transition.target_status().as_str(),
                "Order transitioned"
            );

            if let Some(text) = messages::transition_for_user(&order, &transition, balance) {
                self.tell_user(order.user_id, &text).await;
            }
            self.tell_operators(&messages::transition_for_operators(&order, &transition, balance))
                .await;
            outcome.transition = Some(transition);
        }

        if decision.warned_at.is_some() {
            self.tell_user(order.user_id, &messages::low_balance_warning(&order, balance))
                .await;
            self.tell_operators(&messages::low_balance_for_operators(&order, balance))
                .await;
            outcome.warned = true;
        }

        Ok(outcome)
    }

    /// Top-up trigger: resume the user's balance-suspended hourly orders
    /// once the wallet is back at the warning level.
    ///
    /// The checkpoint restarts at `now` so the powered-off period is not
    /// billed. Returns the ids of resumed orders.
    #[instrument(skip(self))]
    pub async fn resume_for_user(&self, user_id: i64, now: Timestamp) -> Result<Vec<i64>> {
        let thresholds = BillingThresholds::load(self.settings.as_ref()).await;
        let balance = self.ledger.get_wallet_balance(user_id).await?;
        let mut resumed = Vec::new();

        for order in self.ledger.list_orders_for_user(user_id).await? {
            let Some(transition) = decide_resume(&order, balance, &thresholds, now) else {
                continue;
            };

            self.apply_resource_action(&order, transition.resource_action())
                .await;
            self.ledger.clear_order_suspension(order.id).await?;
            self.ledger
                .update_order_checkpoint(order.id, Some(now), None)
                .await?;
            info!(order_id = order.id, balance, "Order resumed after top-up");

            if let Some(text) = messages::transition_for_user(&order, &transition, balance) {
                self.tell_user(user_id, &text).await;
            }
            self.tell_operators(&messages::transition_for_operators(&order, &transition, balance))
                .await;
            if let Some(m) = &self.metrics {
                m.resumes_total.inc();
            }
            resumed.push(order.id);
        }

        Ok(resumed)
    }

    /// Manual deletion by an operator or the owner.
    ///
    /// Hourly orders first settle the unbilled tail; the deletion is refused
    /// when the wallet cannot cover it. The provider delete is best effort.
    #[instrument(skip(self))]
    pub async fn delete_order(
        &self,
        order_id: i64,
        actor: &str,
        now: Timestamp,
    ) -> Result<DeleteOutcome> {
        let order = self
            .ledger
            .get_order(order_id)
            .await?
            .ok_or_else(|| RentbillError::NotFound(format!("order {}", order_id)))?;
        if !order.is_live() {
            return Err(RentbillError::InvalidState(format!(
                "order {} is already deleted",
                order_id
            )));
        }

        let settlement = settle_hourly_delete(&order, now);
        if !settlement.is_free() {
            let balance = self.ledger.get_wallet_balance(order.user_id).await?;
            if balance < settlement.amount {
                return Err(RentbillError::InsufficientFunds {
                    required: settlement.amount,
                    available: balance,
                });
            }

            self.ledger
                .adjust_wallet_balance(order.user_id, -settlement.amount)
                .await?;
            let invoice = NewInvoice::wallet_debit(
                order.user_id,
                order.id,
                settlement.amount,
                messages::settlement_receipt(&order, &settlement),
            );
            if let Err(e) = self.ledger.record_invoice(invoice).await {
                error!(
                    amount = settlement.amount,
                    error = %e,
                    "Failed to record settlement invoice"
                );
            }
        }

        if order.billing_mode == BillingMode::Hourly {
            self.ledger
                .update_order_checkpoint(order.id, Some(settlement.billed_until), None)
                .await?;
        }

        let provider_error = match order.resource_id {
            Some(resource_id) => self
                .call_provider(self.resources.delete(resource_id))
                .await
                .err(),
            None => None,
        };
        if let Some(e) = &provider_error {
            self.report_provider_failure(&order, ResourceAction::Delete, e)
                .await;
        }

        self.ledger
            .update_order_status(order.id, OrderStatus::Deleted)
            .await?;
        info!(amount = settlement.amount, "Order deleted manually");

        self.tell_operators(&messages::manual_delete_report(&order, actor, &settlement))
            .await;

        Ok(DeleteOutcome {
            order_id,
            settlement,
            provider_error,
        })
    }

    async fn read_traffic(
        &self,
        order: &Order,
        now: Timestamp,
        outcome: &mut OrderOutcome,
    ) -> TrafficReading {
        let Some(resource_id) = order.resource_id else {
            return TrafficReading::Unknown;
        };
        match self
            .call_provider(
                self.resources
                    .get_egress_bytes(resource_id, order.purchased_at, now),
            )
            .await
        {
            Ok(bytes) => TrafficReading::from_option(bytes),
            Err(e) => {
                warn!(resource_id, error = %e, "Traffic reading failed");
                outcome.provider_failures += 1;
                TrafficReading::Unknown
            }
        }
    }

    /// Issue the provider call for a transition; `false` when it failed
    async fn apply_resource_action(&self, order: &Order, action: ResourceAction) -> bool {
        let Some(resource_id) = order.resource_id else {
            return true;
        };

        let result = match action {
            ResourceAction::PowerOn => {
                self.call_provider(self.resources.power_on(resource_id))
                    .await
            }
            ResourceAction::PowerOff => {
                self.call_provider(self.resources.power_off(resource_id))
                    .await
            }
            ResourceAction::Delete => self.call_provider(self.resources.delete(resource_id)).await,
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                self.report_provider_failure(order, action, &e).await;
                false
            }
        }
    }

    async fn report_provider_failure(
        &self,
        order: &Order,
        action: ResourceAction,
        err: &GatewayError,
    ) {
        let name = match action {
            ResourceAction::PowerOn => "power on",
            ResourceAction::PowerOff => "power off",
            ResourceAction::Delete => "delete",
        };
        if err.is_transient() {
            warn!(order_id = order.id, action = name, error = %err, "Provider call failed");
        } else {
            error!(
                order_id = order.id,
                action = name,
                error = %err,
                "Provider call failed permanently"
            );
        }
        self.tell_operators(&messages::provider_failure(order, name, err))
            .await;
    }

    async fn commit_transition(&self, order_id: i64, transition: &Transition) -> Result<()> {
        match *transition {
            Transition::SuspendBalance {
                suspended_at,
                delete_at,
            } => {
                self.ledger
                    .set_order_suspended_balance(order_id, suspended_at, Some(delete_at))
                    .await
            }
            Transition::Resume => self.ledger.clear_order_suspension(order_id).await,
            Transition::Suspend(_) | Transition::Delete => {
                self.ledger
                    .update_order_status(order_id, transition.target_status())
                    .await
            }
        }
    }

    async fn call_provider<T, F>(&self, call: F) -> std::result::Result<T, GatewayError>
    where
        F: Future<Output = std::result::Result<T, GatewayError>>,
    {
        let limit = self.timing.call_timeout();
        tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
            Err(GatewayError::Transient(format!(
                "provider call timed out after {}s",
                limit.as_secs()
            )))
        })
    }

    async fn tell_user(&self, user_id: i64, text: &str) {
        if let Err(e) = self.notifier.notify_user(user_id, text).await {
            warn!(user_id, error = %e, "User notification failed");
        }
    }

    async fn tell_operators(&self, text: &str) {
        if let Err(e) = self.notifier.notify_operators(text).await {
            warn!(error = %e, "Operator notification failed");
        }
    }
}

/// Sleep for `delay`; `true` when shutdown was requested meanwhile
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

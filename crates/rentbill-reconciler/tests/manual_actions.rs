//! Manual deletion and top-up resume

mod support;

use rentbill_common::{BillingMode, Grace, Order, OrderStatus, RentbillError};
use support::{Harness, NOW, USER};

fn balance_suspended(id: i64, rate: i64) -> Order {
    Order::new(id, USER, BillingMode::Hourly, NOW - 5 * 86_400)
        .with_prices(0, rate)
        .with_resource(900 + id)
        .with_checkpoint(NOW - 50_000)
        .with_status(OrderStatus::SuspendedBalance {
            suspended_at: NOW - 40_000,
            grace: Grace::Until(NOW + 46_400),
        })
}

#[tokio::test]
async fn test_ninety_minute_settlement_on_delete() {
    let h = Harness::new();
    h.ledger.set_balance(USER, 2_000);
    h.ledger.insert_order(
        Order::new(5, USER, BillingMode::Hourly, NOW - 86_400)
            .with_prices(0, 1_000)
            .with_resource(905)
            .with_checkpoint(NOW - 5_400),
    );

    let outcome = h.reconciler.delete_order(5, "admin:1", NOW).await.unwrap();

    assert_eq!(outcome.settlement.amount, 1_500);
    assert!(outcome.provider_error.is_none());
    assert_eq!(h.ledger.balance(USER), 500);

    let order = h.order(5);
    assert_eq!(order.status, OrderStatus::Deleted);
    assert_eq!(order.last_hourly_charge_at, Some(NOW));
    assert_eq!(h.ledger.invoices_for_order(5)[0].amount, -1_500);
    assert_eq!(h.resources.count("delete"), 1);
    assert!(h
        .notifier
        .operator_messages()
        .iter()
        .any(|m| m.contains("admin:1") && m.contains("1,500")));
}

#[tokio::test]
async fn test_delete_refused_when_wallet_is_short() {
    let h = Harness::new();
    h.ledger.set_balance(USER, 1_000);
    h.ledger.insert_order(
        Order::new(5, USER, BillingMode::Hourly, NOW - 86_400)
            .with_prices(0, 1_000)
            .with_resource(905)
            .with_checkpoint(NOW - 5_400),
    );

    let err = h
        .reconciler
        .delete_order(5, "user", NOW)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RentbillError::InsufficientFunds {
            required: 1_500,
            available: 1_000
        }
    ));
    assert_eq!(h.order(5).status, OrderStatus::Active);
    assert_eq!(h.ledger.balance(USER), 1_000);
    assert_eq!(h.resources.count("delete"), 0);
}

#[tokio::test]
async fn test_monthly_delete_is_free() {
    let h = Harness::new();
    h.ledger.insert_order(
        Order::new(6, USER, BillingMode::Monthly, NOW - 86_400)
            .with_prices(700_000, 0)
            .with_resource(906),
    );

    let outcome = h.reconciler.delete_order(6, "admin:1", NOW).await.unwrap();

    assert!(outcome.settlement.is_free());
    assert!(h.ledger.invoices().is_empty());
    assert_eq!(h.order(6).status, OrderStatus::Deleted);
}

#[tokio::test]
async fn test_delete_twice_is_invalid() {
    let h = Harness::new();
    h.ledger.insert_order(
        Order::new(6, USER, BillingMode::Monthly, NOW).with_status(OrderStatus::Deleted),
    );

    let err = h
        .reconciler
        .delete_order(6, "admin:1", NOW)
        .await
        .unwrap_err();
    assert!(matches!(err, RentbillError::InvalidState(_)));

    let err = h
        .reconciler
        .delete_order(99, "admin:1", NOW)
        .await
        .unwrap_err();
    assert!(matches!(err, RentbillError::NotFound(_)));
}

#[tokio::test]
async fn test_top_up_resumes_balance_suspended_orders() {
    let h = Harness::new();
    h.ledger.set_balance(USER, 25_000);
    h.ledger.insert_order(balance_suspended(1, 500));
    h.ledger.insert_order(
        Order::new(2, USER, BillingMode::Monthly, NOW)
            .with_status(OrderStatus::Suspended {
                reason: rentbill_common::SuspendReason::Expired,
            }),
    );

    let resumed = h.reconciler.resume_for_user(USER, NOW).await.unwrap();

    assert_eq!(resumed, vec![1]);
    let order = h.order(1);
    assert_eq!(order.status, OrderStatus::Active);
    // The powered-off period is not billed
    assert_eq!(order.last_hourly_charge_at, Some(NOW));
    assert_eq!(h.resources.count("power_on"), 1);
    assert_eq!(h.notifier.user_messages().len(), 1);
    assert_eq!(h.notifier.operator_messages().len(), 1);

    // Expired monthly orders are not resumed by a top-up
    assert!(matches!(h.order(2).status, OrderStatus::Suspended { .. }));
}

#[tokio::test]
async fn test_top_up_below_warn_level_keeps_suspension() {
    let h = Harness::new();
    h.ledger.set_balance(USER, 19_999);
    h.ledger.insert_order(balance_suspended(1, 500));

    let resumed = h.reconciler.resume_for_user(USER, NOW).await.unwrap();

    assert!(resumed.is_empty());
    assert!(matches!(h.order(1).status, OrderStatus::SuspendedBalance { .. }));
    assert_eq!(h.resources.count("power_on"), 0);
}

#[tokio::test]
async fn test_resumed_order_bills_from_resume_time() {
    let h = Harness::new();
    h.ledger.set_balance(USER, 25_000);
    h.ledger.insert_order(balance_suspended(1, 500));

    h.reconciler.resume_for_user(USER, NOW).await.unwrap();
    let report = h.reconciler.run_pass(NOW + 3_600).await.unwrap();

    assert_eq!(report.charged_amount, 500);
    assert_eq!(h.ledger.balance(USER), 24_500);
}

#[tokio::test]
async fn test_delete_of_balance_suspended_order_bills_until_suspension() {
    let h = Harness::new();
    h.ledger.set_balance(USER, 3_000);
    h.ledger.insert_order(balance_suspended(1, 500));

    let outcome = h.reconciler.delete_order(1, "user", NOW).await.unwrap();

    assert_eq!(outcome.settlement.amount, 1_392);
    assert_eq!(h.ledger.balance(USER), 1_608);
    assert_eq!(h.order(1).status, OrderStatus::Deleted);
    assert_eq!(h.order(1).last_hourly_charge_at, Some(NOW - 40_000));
}

#[tokio::test]
async fn test_top_up_after_grace_does_not_resume() {
    let h = Harness::new();
    h.ledger.set_balance(USER, 25_000);
    h.ledger.insert_order(balance_suspended(1, 500));

    let resumed = h
        .reconciler
        .resume_for_user(USER, NOW + 46_400)
        .await
        .unwrap();

    assert!(resumed.is_empty());
    assert_eq!(h.resources.count("power_on"), 0);
    assert!(matches!(h.order(1).status, OrderStatus::SuspendedBalance { .. }));
}

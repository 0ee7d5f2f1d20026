//! End-to-end reconciliation against the in-memory store.

mod common;

use chrono::{TimeZone, Utc};
use common::*;
use printshop_payments::database::order::{OrderPaymentStatus, OrderStatus, PaymentRecordStatus};
use printshop_payments::database::repository::OrderStore;
use printshop_payments::payments::types::CallbackChannel;
use printshop_payments::payments::{ReconcileError, ReconcileOutcome, Reconciler};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_successful_payment_confirms_once_and_notifies() {
    let store = seeded_store().await;
    let (notifier, mut sent) = RecordingNotifier::new();
    let reconciler = Reconciler::new(gateway(), Arc::new(store.clone()), Arc::new(notifier));

    let outcome = reconciler
        .process(CallbackChannel::Ipn, callback("ORDER42", ORDER_AMOUNT, "00"))
        .await;
    assert_eq!(outcome, Ok(ReconcileOutcome::Confirmed { order_id: ORDER_ID }));

    let order = store.find_order(ORDER_ID).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_status, OrderPaymentStatus::Paid);

    let confirmation = tokio::time::timeout(Duration::from_secs(1), sent.recv())
        .await
        .expect("confirmation not dispatched")
        .unwrap();
    assert_eq!(confirmation.order_id, ORDER_ID);
    assert_eq!(confirmation.customer_email, "buyer@example.com");
    assert_eq!(confirmation.items.len(), 2);
    assert_eq!(confirmation.items[0].subtotal, dec!(100000));
    assert_eq!(confirmation.total_amount, dec!(150000));

    // The return redirect arrives after the IPN: acknowledged, nothing re-applied
    let outcome = reconciler
        .process(CallbackChannel::Return, callback("ORDER42", ORDER_AMOUNT, "00"))
        .await;
    assert_eq!(
        outcome,
        Ok(ReconcileOutcome::AlreadyConfirmed { order_id: ORDER_ID })
    );

    assert_eq!(store.payments_for(ORDER_ID).await.len(), 1);
    assert!(tokio::time::timeout(Duration::from_millis(200), sent.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_failed_payment_cancels_order() {
    let store = seeded_store().await;
    let reconciler = reconciler(Arc::new(store.clone()));

    let outcome = reconciler
        .process(CallbackChannel::Ipn, callback("ORDER42", ORDER_AMOUNT, "24"))
        .await;

    assert_eq!(
        outcome,
        Ok(ReconcileOutcome::Cancelled {
            order_id: ORDER_ID,
            response_code: "24".to_string()
        })
    );
    let order = store.find_order(ORDER_ID).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, OrderPaymentStatus::Unpaid);

    let payments = store.payments_for(ORDER_ID).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentRecordStatus::Failed);
    assert_eq!(payments[0].response_code, "24");
    assert_eq!(
        payments[0].paid_at,
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 17, 35, 12).unwrap())
    );
}

#[tokio::test]
async fn test_retry_after_failure_can_still_confirm() {
    let store = seeded_store().await;
    let reconciler = reconciler(Arc::new(store.clone()));

    reconciler
        .process(CallbackChannel::Ipn, callback("ORDER42", ORDER_AMOUNT, "24"))
        .await
        .unwrap();
    let outcome = reconciler
        .process(CallbackChannel::Ipn, callback("ORDER42", ORDER_AMOUNT, "00"))
        .await;

    assert_eq!(outcome, Ok(ReconcileOutcome::Confirmed { order_id: ORDER_ID }));
    assert_eq!(store.payments_for(ORDER_ID).await.len(), 2);
}

#[tokio::test]
async fn test_tampered_amount_leaves_order_untouched() {
    let store = seeded_store().await;
    let reconciler = reconciler(Arc::new(store.clone()));

    let mut raw = callback("ORDER42", ORDER_AMOUNT, "00");
    raw.insert("vnp_Amount", "100");
    let outcome = reconciler.process(CallbackChannel::Ipn, raw).await;
    assert_eq!(outcome, Err(ReconcileError::AuthenticationFailure));

    // Correctly signed by someone holding the secret, but for the wrong amount
    let outcome = reconciler
        .process(CallbackChannel::Ipn, callback("ORDER42", "100", "00"))
        .await;
    assert!(matches!(
        outcome,
        Err(ReconcileError::AmountMismatch { order_id: ORDER_ID, .. })
    ));

    let order = store.find_order(ORDER_ID).await.unwrap().unwrap();
    assert_eq!(order.payment_status, OrderPaymentStatus::Unpaid);
    assert!(store.payments_for(ORDER_ID).await.is_empty());
}

#[tokio::test]
async fn test_unknown_and_malformed_references() {
    let store = seeded_store().await;
    let reconciler = reconciler(Arc::new(store.clone()));

    let outcome = reconciler
        .process(CallbackChannel::Ipn, callback("ORDER999", ORDER_AMOUNT, "00"))
        .await;
    assert_eq!(outcome, Err(ReconcileError::OrderNotFound(999)));

    let outcome = reconciler
        .process(CallbackChannel::Ipn, callback("INVOICE42", ORDER_AMOUNT, "00"))
        .await;
    assert!(matches!(outcome, Err(ReconcileError::MalformedReference(_))));
}

#[tokio::test]
async fn test_write_failure_is_reported_and_retry_succeeds() {
    let store = seeded_store().await;
    let failing = reconciler(Arc::new(ReadOnlyStore(store.clone())));

    let outcome = failing
        .process(CallbackChannel::Ipn, callback("ORDER42", ORDER_AMOUNT, "00"))
        .await;
    assert!(matches!(outcome, Err(ReconcileError::Persistence(_))));

    let healthy = reconciler(Arc::new(store.clone()));
    let outcome = healthy
        .process(CallbackChannel::Ipn, callback("ORDER42", ORDER_AMOUNT, "00"))
        .await;
    assert_eq!(outcome, Ok(ReconcileOutcome::Confirmed { order_id: ORDER_ID }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callbacks_apply_exactly_once() {
    let store = seeded_store().await;
    let (notifier, mut sent) = RecordingNotifier::new();
    let reconciler = Arc::new(Reconciler::new(
        gateway(),
        Arc::new(store.clone()),
        Arc::new(notifier),
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let reconciler = reconciler.clone();
            let channel = if i % 2 == 0 {
                CallbackChannel::Ipn
            } else {
                CallbackChannel::Return
            };
            tokio::spawn(async move {
                reconciler
                    .process(channel, callback("ORDER42", ORDER_AMOUNT, "00"))
                    .await
            })
        })
        .collect();

    let mut confirmed = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(ReconcileOutcome::Confirmed { .. }) => confirmed += 1,
            Ok(ReconcileOutcome::AlreadyConfirmed { .. }) => duplicates += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(confirmed, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(store.payments_for(ORDER_ID).await.len(), 1);

    assert!(tokio::time::timeout(Duration::from_secs(1), sent.recv())
        .await
        .unwrap()
        .is_some());
    assert!(tokio::time::timeout(Duration::from_millis(200), sent.recv())
        .await
        .is_err());
}

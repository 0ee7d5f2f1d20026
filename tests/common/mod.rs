//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use printshop_payments::database::error::{DatabaseError, DatabaseErrorKind};
use printshop_payments::database::in_memory::InMemoryOrderStore;
use printshop_payments::database::order::{
    Order, OrderLine, OrderPaymentStatus, OrderStatus, PaymentTransition, TransitionResult,
};
use printshop_payments::database::repository::OrderStore;
use printshop_payments::notifications::{
    LogNotifier, NotificationError, OrderConfirmation, OrderNotifier,
};
use printshop_payments::payments::providers::{VnpayConfig, VnpayGateway};
use printshop_payments::payments::signer::{sign_params, SECURE_HASH_FIELD};
use printshop_payments::payments::types::ParameterSet;
use printshop_payments::payments::Reconciler;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const SECRET: &str = "TESTSECRET";
pub const TMN_CODE: &str = "DEMO1234";

/// Order 42 totals 150,000 VND, reported by the gateway as 15000000
pub const ORDER_ID: i64 = 42;
pub const ORDER_AMOUNT: &str = "15000000";

pub fn gateway_config() -> VnpayConfig {
    VnpayConfig {
        tmn_code: TMN_CODE.to_string(),
        hash_secret: SECRET.to_string(),
        return_url: "https://shop.example/order/payment_return".to_string(),
        ..VnpayConfig::default()
    }
}

pub fn gateway() -> Arc<VnpayGateway> {
    Arc::new(VnpayGateway::new(gateway_config()).unwrap())
}

pub fn pending_order(id: i64, total: Decimal) -> Order {
    Order {
        id,
        user_id: 7,
        total_amount: total,
        status: OrderStatus::Pending,
        payment_status: OrderPaymentStatus::Unpaid,
        created_at: Utc::now(),
    }
}

pub async fn seeded_store() -> InMemoryOrderStore {
    let store = InMemoryOrderStore::new();
    store
        .insert_order(
            pending_order(ORDER_ID, dec!(150000)),
            "buyer@example.com",
            vec![
                OrderLine {
                    product_name: "A5 flyer x100".to_string(),
                    quantity: 2,
                    unit_price: dec!(50000),
                },
                OrderLine {
                    product_name: "Business cards".to_string(),
                    quantity: 1,
                    unit_price: dec!(50000),
                },
            ],
        )
        .await;
    store
}

/// Signed callback parameters as the gateway would send them
pub fn signed_callback(fields: &[(&str, &str)]) -> ParameterSet {
    let params: ParameterSet = fields.iter().copied().collect();
    let signed = sign_params(SECRET, params);
    let mut raw = signed.params;
    raw.insert(SECURE_HASH_FIELD, signed.signature);
    raw
}

pub fn callback(txn_ref: &str, amount: &str, response_code: &str) -> ParameterSet {
    signed_callback(&[
        ("vnp_TmnCode", TMN_CODE),
        ("vnp_TxnRef", txn_ref),
        ("vnp_Amount", amount),
        ("vnp_ResponseCode", response_code),
        ("vnp_TransactionNo", "14000001"),
        ("vnp_BankCode", "NCB"),
        ("vnp_OrderInfo", "Thanh toan don hang #42"),
        ("vnp_PayDate", "20240502003512"),
    ])
}

/// URL query string for a parameter set, encoded as the gateway does
pub fn query_string(params: &ParameterSet) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

pub fn reconciler(store: Arc<dyn OrderStore>) -> Reconciler {
    Reconciler::new(gateway(), store, Arc::new(LogNotifier))
}

/// Forwards every confirmation's order ID to a channel
pub struct RecordingNotifier {
    sent: mpsc::UnboundedSender<OrderConfirmation>,
}

impl RecordingNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OrderConfirmation>) {
        let (sent, received) = mpsc::unbounded_channel();
        (Self { sent }, received)
    }
}

#[async_trait]
impl OrderNotifier for RecordingNotifier {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        self.sent
            .send(confirmation.clone())
            .map_err(|e| NotificationError::Config(e.to_string()))
    }
}

/// Store whose every call fails as an unreachable database would
pub struct UnavailableStore;

fn unavailable() -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::ConnectionError {
        message: "connection refused".to_string(),
    })
}

#[async_trait]
impl OrderStore for UnavailableStore {
    async fn find_order(&self, _id: i64) -> Result<Option<Order>, DatabaseError> {
        Err(unavailable())
    }

    async fn apply_transition(
        &self,
        _id: i64,
        _transition: &PaymentTransition,
    ) -> Result<TransitionResult, DatabaseError> {
        Err(unavailable())
    }

    async fn load_confirmation(
        &self,
        _id: i64,
    ) -> Result<Option<OrderConfirmation>, DatabaseError> {
        Err(unavailable())
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Err(unavailable())
    }
}

/// Store that reads fine but cannot write
pub struct ReadOnlyStore(pub InMemoryOrderStore);

#[async_trait]
impl OrderStore for ReadOnlyStore {
    async fn find_order(&self, id: i64) -> Result<Option<Order>, DatabaseError> {
        self.0.find_order(id).await
    }

    async fn apply_transition(
        &self,
        _id: i64,
        _transition: &PaymentTransition,
    ) -> Result<TransitionResult, DatabaseError> {
        Err(unavailable())
    }

    async fn load_confirmation(
        &self,
        id: i64,
    ) -> Result<Option<OrderConfirmation>, DatabaseError> {
        self.0.load_confirmation(id).await
    }
}

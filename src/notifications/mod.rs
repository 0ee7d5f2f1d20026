//! Order confirmation notifications
//!
//! Rendering and delivery belong to an external notification service; this
//! module assembles the confirmation data and hands it over without ever
//! blocking or failing the payment callback that triggered it.

pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::database::order::{Order, OrderLine};
use crate::database::repository::OrderStore;

pub use webhook::{WebhookNotifier, WebhookNotifierConfig};

/// Everything a confirmation message needs about a paid order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: i64,
    pub order_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub customer_email: String,
    pub items: Vec<ConfirmationItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationItem {
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

impl OrderConfirmation {
    pub fn new(order: &Order, customer_email: String, lines: Vec<OrderLine>) -> Self {
        let items = lines
            .into_iter()
            .map(|line| ConfirmationItem {
                subtotal: line.subtotal(),
                name: line.product_name,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        Self {
            order_id: order.id,
            order_date: order.created_at,
            total_amount: order.total_amount,
            customer_email,
            items,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("notification service rejected the request: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("notification client misconfigured: {0}")]
    Config(String),
}

/// The "send order confirmation" capability
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError>;
}

/// Notifier that only records the confirmation in the log
///
/// Used when no notification service is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl OrderNotifier for LogNotifier {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        info!(
            order_id = confirmation.order_id,
            items = confirmation.items.len(),
            total = %confirmation.total_amount,
            "Order confirmation ready (no notification service configured)"
        );
        Ok(())
    }
}

/// Send the confirmation for `order_id` on a background task
///
/// Failures are logged and dropped; the returned handle is only useful to
/// callers that want to wait for delivery, such as tests.
pub fn dispatch_order_confirmation(
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn OrderNotifier>,
    order_id: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let confirmation = match store.load_confirmation(order_id).await {
            Ok(Some(confirmation)) => confirmation,
            Ok(None) => {
                warn!(order_id, "Paid order vanished before confirmation could be sent");
                return;
            }
            Err(e) => {
                warn!(order_id, error = %e, "Failed to load order confirmation data");
                return;
            }
        };

        match notifier.send_order_confirmation(&confirmation).await {
            Ok(()) => info!(order_id, "Order confirmation dispatched"),
            Err(e) => warn!(order_id, error = %e, "Order confirmation dispatch failed"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::in_memory::InMemoryOrderStore;
    use crate::database::order::{OrderPaymentStatus, OrderStatus};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingNotifier {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl OrderNotifier for FailingNotifier {
        async fn send_order_confirmation(
            &self,
            _confirmation: &OrderConfirmation,
        ) -> Result<(), NotificationError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NotificationError::Rejected {
                status: 503,
                body: "down".to_string(),
            })
        }
    }

    fn order() -> Order {
        Order {
            id: 11,
            user_id: 3,
            total_amount: dec!(95000),
            status: OrderStatus::Paid,
            payment_status: OrderPaymentStatus::Paid,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_confirmation_computes_subtotals() {
        let lines = vec![
            OrderLine {
                product_name: "Sticker pack".to_string(),
                quantity: 2,
                unit_price: dec!(25000),
            },
            OrderLine {
                product_name: "Postcard".to_string(),
                quantity: 3,
                unit_price: dec!(15000),
            },
        ];
        let confirmation = OrderConfirmation::new(&order(), "c@example.com".to_string(), lines);

        assert_eq!(confirmation.order_id, 11);
        assert_eq!(confirmation.items[0].subtotal, dec!(50000));
        assert_eq!(confirmation.items[1].subtotal, dec!(45000));
        assert_eq!(confirmation.total_amount, dec!(95000));
    }

    #[tokio::test]
    async fn test_dispatch_swallows_notifier_errors() {
        let store = InMemoryOrderStore::new();
        store.insert_order(order(), "c@example.com", vec![]).await;
        let notifier = Arc::new(FailingNotifier {
            attempts: AtomicUsize::new(0),
        });

        let handle = dispatch_order_confirmation(Arc::new(store), notifier.clone(), 11);

        assert!(handle.await.is_ok());
        assert_eq!(notifier.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_skips_missing_order() {
        let notifier = Arc::new(FailingNotifier {
            attempts: AtomicUsize::new(0),
        });

        let handle =
            dispatch_order_confirmation(Arc::new(InMemoryOrderStore::new()), notifier.clone(), 99);

        assert!(handle.await.is_ok());
        assert_eq!(notifier.attempts.load(Ordering::SeqCst), 0);
    }
}

use crate::database::error::DatabaseError;
use crate::database::order::{
    Order, OrderLine, PaymentRecord, PaymentTransition, TransitionResult,
};
use crate::database::repository::OrderStore;
use crate::notifications::OrderConfirmation;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredOrder {
    order: Order,
    customer_email: String,
    lines: Vec<OrderLine>,
}

#[derive(Default)]
struct Tables {
    orders: HashMap<i64, StoredOrder>,
    payments: Vec<PaymentRecord>,
}

/// A thread-safe in-memory order store.
///
/// Orders and the payment ledger sit behind one `RwLock`, so the
/// check-and-set in `apply_transition` is atomic across concurrent callbacks.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an order as checkout would have created it.
    pub async fn insert_order(
        &self,
        order: Order,
        customer_email: impl Into<String>,
        lines: Vec<OrderLine>,
    ) {
        let mut tables = self.tables.write().await;
        tables.orders.insert(
            order.id,
            StoredOrder {
                order,
                customer_email: customer_email.into(),
                lines,
            },
        );
    }

    /// Ledger rows written for an order, oldest first.
    pub async fn payments_for(&self, order_id: i64) -> Vec<PaymentRecord> {
        let tables = self.tables.read().await;
        tables
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_order(&self, id: i64) -> Result<Option<Order>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).map(|stored| stored.order.clone()))
    }

    async fn apply_transition(
        &self,
        id: i64,
        transition: &PaymentTransition,
    ) -> Result<TransitionResult, DatabaseError> {
        let mut tables = self.tables.write().await;

        let Some(stored) = tables.orders.get_mut(&id) else {
            return Ok(TransitionResult::NotFound);
        };
        if stored.order.is_paid() {
            return Ok(TransitionResult::AlreadyPaid(stored.order.clone()));
        }

        let (status, payment_status) = transition.target_statuses();
        stored.order.status = status;
        stored.order.payment_status = payment_status;
        let updated = stored.order.clone();

        tables.payments.push(transition.record.clone());
        Ok(TransitionResult::Applied(updated))
    }

    async fn load_confirmation(
        &self,
        id: i64,
    ) -> Result<Option<OrderConfirmation>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).map(|stored| {
            OrderConfirmation::new(
                &stored.order,
                stored.customer_email.clone(),
                stored.lines.clone(),
            )
        }))
    }
}

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::order::{Order, OrderLine, PaymentTransition, TransitionResult};
use crate::database::repository::OrderStore;
use crate::database::transaction::DatabaseTransaction;
use crate::notifications::OrderConfirmation;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

const ORDER_COLUMNS: &str =
    "id, user_id, total_amount, status, payment_status, created_at";

/// Postgres-backed order store
///
/// `apply_transition` locks the order row with `SELECT ... FOR UPDATE` so the
/// return and IPN callbacks serialize on the same order.
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OrderStore for PgOrderRepository {
    async fn find_order(&self, id: i64) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn apply_transition(
        &self,
        id: i64,
        transition: &PaymentTransition,
    ) -> Result<TransitionResult, DatabaseError> {
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;

        let locked = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(tx.conn()?)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e).with_context("lock order"))?;

        let current = match locked {
            Some(order) => order,
            None => {
                tx.rollback().await?;
                return Ok(TransitionResult::NotFound);
            }
        };

        if current.is_paid() {
            debug!(order_id = id, "Order already paid, releasing row lock");
            tx.rollback().await?;
            return Ok(TransitionResult::AlreadyPaid(current));
        }

        let (status, payment_status) = transition.target_statuses();
        let updated = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET status = $1, payment_status = $2, updated_at = NOW() \
             WHERE id = $3 RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(status)
        .bind(payment_status)
        .bind(id)
        .fetch_one(tx.conn()?)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e).with_context("update order status"))?;

        let record = &transition.record;
        sqlx::query(
            "INSERT INTO payments \
             (order_id, amount, status, method, response_code, transaction_no, bank_code, paid_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, NOW()))",
        )
        .bind(record.order_id)
        .bind(record.amount.value())
        .bind(record.status)
        .bind(&record.method)
        .bind(&record.response_code)
        .bind(&record.transaction_no)
        .bind(&record.bank_code)
        .bind(record.paid_at)
        .execute(tx.conn()?)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e).with_context("insert payment record"))?;

        tx.commit().await?;

        info!(
            order_id = id,
            status = ?updated.status,
            payment_status = ?updated.payment_status,
            "Order payment transition committed"
        );
        Ok(TransitionResult::Applied(updated))
    }

    async fn load_confirmation(
        &self,
        id: i64,
    ) -> Result<Option<OrderConfirmation>, DatabaseError> {
        let Some(order) = self.find_order(id).await? else {
            return Ok(None);
        };

        let customer_email = sqlx::query_scalar::<_, String>(
            "SELECT email FROM users WHERE id = $1",
        )
        .bind(order.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| {
            DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "User".to_string(),
                id: order.user_id.to_string(),
            })
            .with_context(format!("customer of order {}", id))
        })?;

        let lines = sqlx::query_as::<_, OrderLine>(
            "SELECT p.name AS product_name, oi.quantity, p.price AS unit_price \
             FROM order_items oi JOIN products p ON p.id = oi.product_id \
             WHERE oi.order_id = $1 ORDER BY oi.id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(Some(OrderConfirmation::new(&order, customer_email, lines)))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        crate::database::health_check(&self.pool).await
    }
}

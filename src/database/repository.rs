use crate::database::error::DatabaseError;
use crate::database::order::{Order, PaymentTransition, TransitionResult};
use crate::notifications::OrderConfirmation;
use async_trait::async_trait;

/// Persistence boundary used by the payment reconciler
///
/// Implementations must make [`OrderStore::apply_transition`] atomic per order:
/// two concurrent calls for the same unpaid order yield exactly one
/// `Applied`, and the other observes `AlreadyPaid`.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Find an order by its ID
    async fn find_order(&self, id: i64) -> Result<Option<Order>, DatabaseError>;

    /// Apply a payment outcome unless the order is already paid
    ///
    /// The check of `payment_status`, the status update and the ledger insert
    /// happen under one lock scoped to the order.
    async fn apply_transition(
        &self,
        id: i64,
        transition: &PaymentTransition,
    ) -> Result<TransitionResult, DatabaseError>;

    /// Load the customer and line items needed for a confirmation message
    async fn load_confirmation(&self, id: i64)
        -> Result<Option<OrderConfirmation>, DatabaseError>;

    /// Cheap liveness probe for the health endpoint
    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

//! Reconciles authenticated gateway callbacks with stored orders.
//!
//! The return redirect and the IPN both run [`Reconciler::process`]; they
//! differ only in how the API layer renders the result. Callbacks may race
//! for the same order, so the final status change goes through
//! [`OrderStore::apply_transition`], which re-checks `payment_status` under a
//! per-order lock.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::database::error::DatabaseError;
use crate::database::order::{
    PaymentRecord, PaymentRecordStatus, PaymentTransition, TransitionKind, TransitionResult,
};
use crate::database::repository::OrderStore;
use crate::notifications::{dispatch_order_confirmation, OrderNotifier};
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{
    AuthResult, CallbackChannel, GatewayCallback, InvalidPayload, MinorUnits, ParameterSet,
};

/// A callback that was accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Payment succeeded; the order is now paid
    Confirmed { order_id: i64 },
    /// Gateway reported a failed or abandoned payment; the order is cancelled
    Cancelled { order_id: i64, response_code: String },
    /// The order was already paid; nothing changed
    AlreadyConfirmed { order_id: i64 },
}

impl ReconcileOutcome {
    pub fn order_id(&self) -> i64 {
        match self {
            ReconcileOutcome::Confirmed { order_id }
            | ReconcileOutcome::Cancelled { order_id, .. }
            | ReconcileOutcome::AlreadyConfirmed { order_id } => *order_id,
        }
    }
}

/// A callback that was rejected, or could not be applied
#[derive(Debug, Error, PartialEq)]
pub enum ReconcileError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid signature")]
    AuthenticationFailure,
    #[error("malformed transaction reference '{0}'")]
    MalformedReference(String),
    #[error("order {0} not found")]
    OrderNotFound(i64),
    #[error("amount mismatch for order {order_id}: expected {expected}, received '{received}'")]
    AmountMismatch {
        order_id: i64,
        expected: MinorUnits,
        received: String,
    },
    #[error("persistence failure: {0}")]
    Persistence(#[from] DatabaseError),
}

/// Applies gateway outcomes to orders exactly once
pub struct Reconciler {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn OrderNotifier>,
}

impl Reconciler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn OrderStore>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self {
            gateway,
            store,
            notifier,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Authenticate and reconcile the raw query parameters of a callback
    pub async fn process(
        &self,
        channel: CallbackChannel,
        raw: ParameterSet,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let auth = self.gateway.authenticate_callback(raw);
        self.reconcile(channel, auth).await
    }

    /// Apply an authentication result to the referenced order
    pub async fn reconcile(
        &self,
        channel: CallbackChannel,
        auth: AuthResult,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let params = match auth {
            AuthResult::Authentic(params) => params,
            AuthResult::Inauthentic => {
                warn!(%channel, "Rejected callback with invalid signature");
                return Err(ReconcileError::AuthenticationFailure);
            }
            AuthResult::Invalid(InvalidPayload::MissingSignature) => {
                warn!(%channel, "Rejected callback without signature");
                return Err(ReconcileError::AuthenticationFailure);
            }
            AuthResult::Invalid(InvalidPayload::Empty) => {
                warn!(%channel, "Rejected empty callback");
                return Err(ReconcileError::InvalidRequest("empty payload".to_string()));
            }
        };

        let callback = GatewayCallback::from_params(&params).map_err(|field| {
            warn!(%channel, field, "Authentic callback is missing a required field");
            ReconcileError::InvalidRequest(format!("missing {}", field))
        })?;

        let order_id = self.gateway.order_id_for(&callback.txn_ref).ok_or_else(|| {
            warn!(%channel, txn_ref = %callback.txn_ref, "Malformed transaction reference");
            ReconcileError::MalformedReference(callback.txn_ref.clone())
        })?;

        let order = self
            .store
            .find_order(order_id)
            .await
            .map_err(|e| {
                error!(%channel, order_id, error = %e, "Failed to load order for callback");
                ReconcileError::Persistence(e)
            })?
            .ok_or_else(|| {
                warn!(
                    %channel,
                    order_id,
                    txn_ref = %callback.txn_ref,
                    "Suspicious callback: transaction reference points to no order"
                );
                ReconcileError::OrderNotFound(order_id)
            })?;

        let expected = order.expected_gateway_amount();
        let received = MinorUnits::parse(&callback.amount);
        let expected = match (expected, received) {
            (Some(expected), Some(received)) if expected == received => expected,
            (expected, _) => {
                warn!(
                    %channel,
                    order_id,
                    expected = ?expected.map(MinorUnits::value),
                    received = %callback.amount,
                    "Possible tampering: callback amount does not match order total"
                );
                return Err(ReconcileError::AmountMismatch {
                    order_id,
                    expected: expected.unwrap_or(MinorUnits::new(0)),
                    received: callback.amount,
                });
            }
        };

        if order.is_paid() {
            info!(%channel, order_id, "Duplicate callback for paid order ignored");
            return Ok(ReconcileOutcome::AlreadyConfirmed { order_id });
        }

        let transition = self.transition_for(order_id, expected, &callback);
        let result = self
            .store
            .apply_transition(order_id, &transition)
            .await
            .map_err(|e| {
                error!(%channel, order_id, error = %e, "Failed to persist payment outcome");
                ReconcileError::Persistence(e)
            })?;

        match result {
            TransitionResult::Applied(_) => {}
            TransitionResult::AlreadyPaid(_) => {
                info!(%channel, order_id, "Lost race to a concurrent callback; order already paid");
                return Ok(ReconcileOutcome::AlreadyConfirmed { order_id });
            }
            TransitionResult::NotFound => {
                warn!(%channel, order_id, "Order disappeared during reconciliation");
                return Err(ReconcileError::OrderNotFound(order_id));
            }
        }

        match transition.kind {
            TransitionKind::Confirm => {
                info!(
                    %channel,
                    order_id,
                    amount = expected.value(),
                    transaction_no = ?callback.transaction_no,
                    "Payment confirmed"
                );
                dispatch_order_confirmation(self.store.clone(), self.notifier.clone(), order_id);
                Ok(ReconcileOutcome::Confirmed { order_id })
            }
            TransitionKind::Cancel => {
                info!(
                    %channel,
                    order_id,
                    response_code = %callback.response_code,
                    "Gateway reported failed payment; order cancelled"
                );
                Ok(ReconcileOutcome::Cancelled {
                    order_id,
                    response_code: callback.response_code,
                })
            }
        }
    }

    fn transition_for(
        &self,
        order_id: i64,
        amount: MinorUnits,
        callback: &GatewayCallback,
    ) -> PaymentTransition {
        let (kind, status) = if callback.is_success() {
            (TransitionKind::Confirm, PaymentRecordStatus::Completed)
        } else {
            (TransitionKind::Cancel, PaymentRecordStatus::Failed)
        };

        PaymentTransition {
            kind,
            record: PaymentRecord {
                order_id,
                amount,
                status,
                method: self.gateway.provider().to_string(),
                response_code: callback.response_code.clone(),
                transaction_no: callback.transaction_no.clone(),
                bank_code: callback.bank_code.clone(),
                paid_at: callback.paid_at(),
            },
        }
    }
}

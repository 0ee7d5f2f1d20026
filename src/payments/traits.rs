//! Payment gateway trait definitions
//!
//! Defines what the API layer and the reconciler need from a redirect-based
//! gateway.

use url::Url;

use crate::payments::types::{AuthResult, ParameterSet, PaymentUrlRequest};
use crate::payments::GatewayError;

/// Trait for redirect-based payment gateways
///
/// Nothing here touches the network or the database. Building a URL is a pure
/// function of the request, the merchant configuration and the request time.
pub trait PaymentGateway: Send + Sync {
    /// Short provider name used in logs and the payment ledger
    fn provider(&self) -> &'static str;

    /// Build the signed URL the customer's browser is redirected to
    ///
    /// # Arguments
    /// * `request` - Order amount, reference inputs and display fields
    ///
    /// # Returns
    /// * `Url` - Absolute gateway URL carrying the signed query string
    fn build_payment_url(&self, request: &PaymentUrlRequest) -> Result<Url, GatewayError>;

    /// Verify the signature of a callback received on either channel
    ///
    /// # Arguments
    /// * `raw` - Every query parameter received, signature included
    fn authenticate_callback(&self, raw: ParameterSet) -> AuthResult;

    /// Map a transaction reference echoed by the gateway back to an order ID
    ///
    /// Returns `None` when the reference has neither accepted form.
    fn order_id_for(&self, txn_ref: &str) -> Option<i64>;

    /// Transaction reference sent for an order
    fn txn_ref_for(&self, order_id: i64) -> String;
}

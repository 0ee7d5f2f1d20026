//! Payment gateway integration
//!
//! Signs the redirect that hands a customer to the gateway, authenticates the
//! gateway's callbacks and reconciles their outcome with the stored order.

pub mod authenticator;
pub mod providers;
pub mod reconciler;
pub mod signer;
pub mod traits;
pub mod types;

use rust_decimal::Decimal;
use thiserror::Error;

pub use reconciler::{ReconcileError, ReconcileOutcome, Reconciler};
pub use traits::PaymentGateway;

/// Errors raised while configuring a gateway or building a payment URL
#[derive(Debug, Error, PartialEq)]
pub enum GatewayError {
    #[error("gateway configuration error: {0}")]
    Config(String),
    #[error("invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
    #[error("amount {0} cannot be charged")]
    InvalidAmount(Decimal),
}

//! Payment gateway implementations
//!
//! Concrete implementations of the PaymentGateway trait.

pub mod vnpay;

pub use vnpay::{VnpayConfig, VnpayGateway};

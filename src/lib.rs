//! Payment subsystem of the print-shop order service.
//!
//! Produces signed VNPay checkout redirects, authenticates the gateway's
//! return and IPN callbacks, and reconciles each callback against the stored
//! order exactly once.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod notifications;
pub mod payments;

//! Order entities as seen by the payment subsystem.
//!
//! Orders are created by checkout elsewhere; this crate only reads them and
//! applies the payment outcome.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::payments::types::MinorUnits;

/// Fulfilment lifecycle of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "order_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Printing,
    Shipped,
    Delivered,
    Cancelled,
}

/// Payment lifecycle of an order, independent of [`OrderStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "order_payment_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum OrderPaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

/// Order entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    /// Major currency units, exact to two decimal places
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Amount the gateway is expected to report for this order
    pub fn expected_gateway_amount(&self) -> Option<MinorUnits> {
        MinorUnits::from_major(self.total_amount)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == OrderPaymentStatus::Paid
    }
}

/// Line item joined with its product for confirmation messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct OrderLine {
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl OrderLine {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Status of a row in the payment ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(
    feature = "database",
    sqlx(type_name = "payment_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRecordStatus {
    Completed,
    Failed,
}

/// Ledger entry written alongside every applied transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub order_id: i64,
    pub amount: MinorUnits,
    pub status: PaymentRecordStatus,
    pub method: String,
    pub response_code: String,
    pub transaction_no: Option<String>,
    pub bank_code: Option<String>,
    /// Settlement time reported by the gateway; the store's clock when absent
    pub paid_at: Option<DateTime<Utc>>,
}

/// What the reconciler asks the store to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Gateway reported success: order and payment both become paid
    Confirm,
    /// Gateway reported failure: order is cancelled, payment stays unpaid
    Cancel,
}

/// A guarded status change plus the ledger row that records it
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTransition {
    pub kind: TransitionKind,
    pub record: PaymentRecord,
}

impl PaymentTransition {
    /// Status pair the order ends in once this transition is applied
    pub fn target_statuses(&self) -> (OrderStatus, OrderPaymentStatus) {
        match self.kind {
            TransitionKind::Confirm => (OrderStatus::Paid, OrderPaymentStatus::Paid),
            TransitionKind::Cancel => (OrderStatus::Cancelled, OrderPaymentStatus::Unpaid),
        }
    }
}

/// Result of a guarded transition
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// The row was still unpaid and has been updated
    Applied(Order),
    /// Another callback already marked the order paid; nothing was written
    AlreadyPaid(Order),
    /// The order disappeared between lookup and update
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(total: Decimal) -> Order {
        Order {
            id: 1,
            user_id: 7,
            total_amount: total,
            status: OrderStatus::Pending,
            payment_status: OrderPaymentStatus::Unpaid,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expected_gateway_amount_is_exact() {
        assert_eq!(
            order(dec!(150000.0)).expected_gateway_amount(),
            Some(MinorUnits::new(15_000_000))
        );
        // 0.29 * 100 is 28.999... in binary floating point
        assert_eq!(
            order(dec!(0.29)).expected_gateway_amount(),
            Some(MinorUnits::new(29))
        );
    }

    #[test]
    fn test_target_statuses() {
        let record = PaymentRecord {
            order_id: 1,
            amount: MinorUnits::new(100),
            status: PaymentRecordStatus::Failed,
            method: "vnpay".to_string(),
            response_code: "24".to_string(),
            transaction_no: None,
            bank_code: None,
            paid_at: None,
        };
        let cancel = PaymentTransition {
            kind: TransitionKind::Cancel,
            record,
        };
        assert_eq!(
            cancel.target_statuses(),
            (OrderStatus::Cancelled, OrderPaymentStatus::Unpaid)
        );
    }

    #[test]
    fn test_line_subtotal() {
        let line = OrderLine {
            product_name: "Poster A2".to_string(),
            quantity: 3,
            unit_price: dec!(45000),
        };
        assert_eq!(line.subtotal(), dec!(135000));
    }
}

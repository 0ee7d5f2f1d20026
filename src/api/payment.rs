//! Checkout redirect and gateway callback endpoints.
//!
//! Both callbacks go through the same [`Reconciler`](crate::payments::Reconciler);
//! only the rendering differs. The IPN answers with the acknowledgment JSON
//! the gateway keys its retries on, the return page with a short message for
//! the customer.

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::info;

use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::payments::types::{CallbackChannel, ParameterSet, PaymentUrlRequest};
use crate::payments::{ReconcileError, ReconcileOutcome};

const FALLBACK_IP: &str = "127.0.0.1";

#[derive(Debug, Deserialize)]
pub struct CreatePaymentUrlBody {
    pub order_id: i64,
    pub order_info: Option<String>,
    pub bank_code: Option<String>,
    pub locale: Option<String>,
    pub ip_addr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseFormat {
    pub format: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentUrlResponse {
    pub payment_url: String,
    pub txn_ref: String,
}

/// `POST /order/payment_url`: redirect the customer to the gateway
pub async fn create_payment_url(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(format): Query<ResponseFormat>,
    Json(body): Json<CreatePaymentUrlBody>,
) -> AppResult<Response> {
    let reconciler = &state.reconciler;
    let order = reconciler
        .store()
        .find_order(body.order_id)
        .await?
        .ok_or(AppError::OrderNotFound(body.order_id))?;

    if order.is_paid() {
        return Err(AppError::OrderAlreadyPaid(order.id));
    }

    let ip_addr = body
        .ip_addr
        .or_else(|| forwarded_for(&headers))
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| FALLBACK_IP.to_string());

    let request = PaymentUrlRequest {
        order_id: order.id,
        amount: order.total_amount,
        order_info: body
            .order_info
            .unwrap_or_else(|| format!("Thanh toan don hang #{}", order.id)),
        ip_addr,
        locale: body.locale,
        bank_code: body.bank_code,
        created_at: Utc::now(),
    };

    let gateway = reconciler.gateway();
    let url = gateway.build_payment_url(&request)?;
    let txn_ref = gateway.txn_ref_for(order.id);
    info!(order_id = order.id, txn_ref = %txn_ref, "Redirecting customer to payment gateway");

    if format.format.as_deref() == Some("json") {
        return Ok(Json(PaymentUrlResponse {
            payment_url: url.to_string(),
            txn_ref,
        })
        .into_response());
    }
    Ok(Redirect::to(url.as_str()).into_response())
}

/// `GET /order/payment_return`: customer's browser back from the gateway
pub async fn payment_return(
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let result = state
        .reconciler
        .process(CallbackChannel::Return, ParameterSet::from(raw))
        .await;
    return_page(&result)
}

/// `GET /order/vnpay_ipn`: authoritative server-to-server notification
pub async fn payment_ipn(
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> Json<IpnAck> {
    let result = state
        .reconciler
        .process(CallbackChannel::Ipn, ParameterSet::from(raw))
        .await;
    Json(IpnAck::from_result(&result))
}

/// Acknowledgment body the gateway expects from the IPN endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpnAck {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl IpnAck {
    fn new(rsp_code: &str, message: &str) -> Self {
        Self {
            rsp_code: rsp_code.to_string(),
            message: message.to_string(),
        }
    }

    /// `00` and `02` stop gateway retries; every other code invites one.
    pub fn from_result(result: &Result<ReconcileOutcome, ReconcileError>) -> Self {
        match result {
            Ok(ReconcileOutcome::Confirmed { .. }) | Ok(ReconcileOutcome::Cancelled { .. }) => {
                Self::new("00", "Confirm Success")
            }
            Ok(ReconcileOutcome::AlreadyConfirmed { .. }) => {
                Self::new("02", "Order already updated")
            }
            Err(ReconcileError::AuthenticationFailure) => Self::new("97", "Invalid Signature"),
            Err(ReconcileError::MalformedReference(_)) | Err(ReconcileError::OrderNotFound(_)) => {
                Self::new("01", "Order not found")
            }
            Err(ReconcileError::AmountMismatch { .. }) => Self::new("04", "Invalid amount"),
            Err(ReconcileError::InvalidRequest(_)) => Self::new("99", "Invalid request"),
            Err(ReconcileError::Persistence(_)) => Self::new("99", "Unknown error"),
        }
    }
}

fn return_page(result: &Result<ReconcileOutcome, ReconcileError>) -> (StatusCode, String) {
    match result {
        Ok(ReconcileOutcome::Confirmed { order_id })
        | Ok(ReconcileOutcome::AlreadyConfirmed { order_id }) => (
            StatusCode::OK,
            format!("Thanh toán thành công cho đơn hàng #{}", order_id),
        ),
        Ok(ReconcileOutcome::Cancelled { order_id, .. }) => (
            StatusCode::OK,
            format!("Thanh toán thất bại cho đơn hàng #{}", order_id),
        ),
        Err(ReconcileError::Persistence(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Không thể xác nhận thanh toán, vui lòng thử lại sau".to_string(),
        ),
        Err(_) => (
            StatusCode::BAD_REQUEST,
            "Thanh toán thất bại: dữ liệu không hợp lệ".to_string(),
        ),
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::{DatabaseError, DatabaseErrorKind};
    use crate::payments::types::MinorUnits;
    use axum::http::HeaderValue;

    #[test]
    fn test_ack_codes() {
        let cases = vec![
            (Ok(ReconcileOutcome::Confirmed { order_id: 1 }), "00"),
            (
                Ok(ReconcileOutcome::Cancelled {
                    order_id: 1,
                    response_code: "24".to_string(),
                }),
                "00",
            ),
            (Ok(ReconcileOutcome::AlreadyConfirmed { order_id: 1 }), "02"),
            (Err(ReconcileError::AuthenticationFailure), "97"),
            (Err(ReconcileError::OrderNotFound(1)), "01"),
            (Err(ReconcileError::MalformedReference("x".to_string())), "01"),
            (
                Err(ReconcileError::AmountMismatch {
                    order_id: 1,
                    expected: MinorUnits::new(100),
                    received: "1".to_string(),
                }),
                "04",
            ),
            (Err(ReconcileError::InvalidRequest("empty".to_string())), "99"),
            (
                Err(ReconcileError::Persistence(DatabaseError::new(
                    DatabaseErrorKind::PoolExhausted,
                ))),
                "99",
            ),
        ];

        for (result, code) in cases {
            assert_eq!(IpnAck::from_result(&result).rsp_code, code, "{:?}", result);
        }
    }

    #[test]
    fn test_ack_serializes_with_gateway_field_names() {
        let ack = IpnAck::from_result(&Ok(ReconcileOutcome::Confirmed { order_id: 1 }));
        assert_eq!(
            serde_json::to_string(&ack).unwrap(),
            r#"{"RspCode":"00","Message":"Confirm Success"}"#
        );
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(forwarded_for(&headers), None);

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(forwarded_for(&headers), Some("203.0.113.9".to_string()));
    }
}

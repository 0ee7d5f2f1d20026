//! Errors surfaced by the JSON endpoints.
//!
//! Callback endpoints do not use this type: the IPN always answers with a
//! gateway acknowledgment and the return page with a plain message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::database::error::DatabaseError;
use crate::payments::GatewayError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("order {0} not found")]
    OrderNotFound(i64),
    #[error("order {0} is already paid")]
    OrderAlreadyPaid(i64),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            AppError::OrderAlreadyPaid(_) => StatusCode::CONFLICT,
            AppError::Gateway(GatewayError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Gateway(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

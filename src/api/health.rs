use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub gateway: String,
    pub database: String,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let (status, database) = match state.reconciler.store().ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!(error = %e, "Order store unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    let response = HealthResponse {
        status: if status.is_success() { "healthy" } else { "degraded" }.to_string(),
        version,
        environment: state.environment.clone(),
        gateway: state.reconciler.gateway().provider().to_string(),
        database: database.to_string(),
    };

    (status, Json(response))
}

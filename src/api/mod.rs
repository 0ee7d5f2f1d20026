pub mod health;
pub mod payment;

use axum::routing::{get, post};
use axum::Router;
use http::HeaderName;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::payments::Reconciler;

/// Shared handler state, built once in `main`
#[derive(Clone)]
pub struct AppState {
    pub environment: String,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(environment: impl Into<String>, reconciler: Reconciler) -> Self {
        Self {
            environment: environment.into(),
            reconciler: Arc::new(reconciler),
        }
    }
}

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the HTTP router with tracing and request IDs
pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/order/payment_url", post(payment::create_payment_url))
        .route("/order/payment_return", get(payment::payment_return))
        .route("/order/vnpay_ipn", get(payment::payment_ipn))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .with_state(state)
}

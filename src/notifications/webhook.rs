//! HTTP delivery of order confirmations to the notification service.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{info, warn};

use super::{NotificationError, OrderConfirmation, OrderNotifier};

/// Notification service endpoint configuration
#[derive(Debug, Clone)]
pub struct WebhookNotifierConfig {
    /// Endpoint receiving `POST` confirmation payloads
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum number of retries for failed requests
    pub max_retries: u32,
}

impl Default for WebhookNotifierConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 10,
            max_retries: 2,
        }
    }
}

/// Posts confirmations as JSON to an external notification service
///
/// Each request carries an `Idempotency-Key` derived from the order, so the
/// service can drop repeats caused by our own retries.
pub struct WebhookNotifier {
    config: WebhookNotifierConfig,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(config: WebhookNotifierConfig) -> Result<Self, NotificationError> {
        if config.url.trim().is_empty() {
            return Err(NotificationError::Config(
                "notification webhook URL is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotificationError::Config(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn idempotency_key(order_id: i64) -> String {
        format!("order-confirmation-{}", order_id)
    }

    fn is_retryable(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }
}

#[async_trait]
impl OrderNotifier for WebhookNotifier {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        let key = Self::idempotency_key(confirmation.order_id);
        let mut attempt = 0;

        loop {
            let outcome = self
                .client
                .post(&self.config.url)
                .header("Idempotency-Key", &key)
                .json(confirmation)
                .send()
                .await;

            let error = match outcome {
                Ok(response) if response.status().is_success() => {
                    info!(
                        order_id = confirmation.order_id,
                        status = response.status().as_u16(),
                        "Notification service accepted order confirmation"
                    );
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let error = NotificationError::Rejected {
                        status: status.as_u16(),
                        body,
                    };
                    if !Self::is_retryable(status) {
                        return Err(error);
                    }
                    error
                }
                Err(e) => NotificationError::Transport(e),
            };

            if attempt >= self.config.max_retries {
                return Err(error);
            }

            let backoff = 2_u64.pow(attempt);
            warn!(
                order_id = confirmation.order_id,
                error = %error,
                "Notification failed, retrying after {} seconds (attempt {})",
                backoff,
                attempt + 1
            );
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            attempt += 1;
        }
    }
}

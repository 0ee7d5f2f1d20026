use printshop_payments::api::{self, AppState};
use printshop_payments::config::Config;
use printshop_payments::database::order_repository::PgOrderRepository;
use printshop_payments::database::{init_pool, PoolConfig};
use printshop_payments::notifications::{LogNotifier, OrderNotifier, WebhookNotifier};
use printshop_payments::payments::providers::VnpayGateway;
use printshop_payments::payments::Reconciler;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting print-shop payment service");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("Gateway terminal: {}", config.vnpay.tmn_code);

    let pool = init_pool(
        &config.database.url,
        Some(PoolConfig::with_max_connections(config.database.max_connections)),
    )
    .await?;
    let store = Arc::new(PgOrderRepository::new(pool));

    let notifier: Arc<dyn OrderNotifier> = match config.notifications.clone() {
        Some(webhook) => {
            tracing::info!("Order confirmations delivered to {}", webhook.url);
            Arc::new(WebhookNotifier::new(webhook)?)
        }
        None => {
            tracing::warn!("NOTIFICATION_WEBHOOK_URL not set, confirmations will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let gateway = Arc::new(VnpayGateway::new(config.vnpay.clone())?);
    let reconciler = Reconciler::new(gateway, store, notifier);
    let app = api::router(AppState::new(config.server.environment.clone(), reconciler));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// `RUST_LOG` filters, `LOG_FORMAT=json` switches to structured output
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

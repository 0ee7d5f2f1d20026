//! Order persistence for the payment subsystem.
//!
//! The Postgres pool and repository need the `database` feature; the
//! entities, the [`OrderStore`](repository::OrderStore) trait and the
//! in-memory store are always available.

pub mod error;
pub mod in_memory;
pub mod order;
pub mod repository;

#[cfg(feature = "database")]
pub mod order_repository;
#[cfg(feature = "database")]
pub mod transaction;

#[cfg(feature = "database")]
pub use pool::*;

#[cfg(feature = "database")]
mod pool {
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use std::time::Duration;
    use tracing::{error as log_error, info, warn};

    use super::error::DatabaseError;

    /// Database pool configuration
    #[derive(Debug, Clone)]
    pub struct PoolConfig {
        pub max_connections: u32,
        pub min_connections: u32,
        pub connection_timeout: Duration,
        pub idle_timeout: Duration,
        pub max_lifetime: Duration,
    }

    impl Default for PoolConfig {
        fn default() -> Self {
            Self {
                max_connections: 20,
                min_connections: 2,
                connection_timeout: Duration::from_secs(30),
                idle_timeout: Duration::from_secs(600),
                max_lifetime: Duration::from_secs(1800),
            }
        }
    }

    impl PoolConfig {
        pub fn with_max_connections(max_connections: u32) -> Self {
            Self {
                max_connections,
                min_connections: max_connections.min(2),
                ..Self::default()
            }
        }
    }

    /// Initialize the database connection pool
    pub async fn init_pool(
        database_url: &str,
        config: Option<PoolConfig>,
    ) -> Result<PgPool, DatabaseError> {
        let config = config.unwrap_or_default();

        info!(
            "Initializing database pool: max_connections={}, min_connections={}, connection_timeout={:?}",
            config.max_connections, config.min_connections, config.connection_timeout
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connection_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| {
                log_error!("Failed to initialize database pool: {}", e);
                DatabaseError::from_sqlx(e)
            })?;

        info!("Database pool initialized successfully");
        Ok(pool)
    }

    /// Connection pool health check
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map_err(|e| {
                warn!("Health check failed: {}", e);
                DatabaseError::from_sqlx(e)
            })?;

        Ok(())
    }

}

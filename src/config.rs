use anyhow::{anyhow, Context, Result};
use std::env;

use crate::notifications::webhook::WebhookNotifierConfig;
use crate::payments::providers::vnpay::MAX_EXPIRE_MINUTES;
use crate::payments::providers::VnpayConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub vnpay: VnpayConfig,
    /// `None` logs confirmations instead of delivering them
    pub notifications: Option<WebhookNotifierConfig>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{} not set", key));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let server = ServerConfig {
            host: or_default("HOST", "0.0.0.0"),
            port: required("PORT")?
                .parse()
                .context("PORT must be a valid number")?,
            environment: or_default("ENVIRONMENT", "development"),
        };

        let database = DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: or_default("DATABASE_MAX_CONNECTIONS", "20")
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
        };

        let defaults = VnpayConfig::default();
        let vnpay = VnpayConfig {
            tmn_code: required("VNP_TMNCODE")?,
            hash_secret: required("VNP_HASHSECRET")?,
            payment_url: or_default("VNP_URL", &defaults.payment_url),
            return_url: required("VNP_RETURNURL")?,
            version: or_default("VNP_VERSION", &defaults.version),
            command: or_default("VNP_COMMAND", &defaults.command),
            currency: or_default("VNP_CURRCODE", &defaults.currency),
            locale: or_default("VNP_LOCALE", &defaults.locale),
            order_type: or_default("VNP_ORDERTYPE", &defaults.order_type),
            expire_minutes: or_default("VNP_EXPIRED", &defaults.expire_minutes.to_string())
                .parse()
                .context("VNP_EXPIRED must be a number of minutes")?,
            txn_ref_prefix: or_default("VNP_TXNREF_PREFIX", &defaults.txn_ref_prefix),
        };

        let notifications = match lookup("NOTIFICATION_WEBHOOK_URL") {
            Some(url) if !url.trim().is_empty() => {
                let defaults = WebhookNotifierConfig::default();
                Some(WebhookNotifierConfig {
                    url,
                    timeout_secs: or_default(
                        "NOTIFICATION_TIMEOUT_SECS",
                        &defaults.timeout_secs.to_string(),
                    )
                    .parse()
                    .context("NOTIFICATION_TIMEOUT_SECS must be a valid number")?,
                    ..defaults
                })
            }
            _ => None,
        };

        let config = Config {
            server,
            database,
            vnpay,
            notifications,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.vnpay.tmn_code.trim().is_empty() {
            return Err(anyhow!("VNP_TMNCODE cannot be empty"));
        }

        if self.vnpay.hash_secret.is_empty() {
            return Err(anyhow!("VNP_HASHSECRET cannot be empty"));
        }

        if self.vnpay.expire_minutes <= 0 || self.vnpay.expire_minutes > MAX_EXPIRE_MINUTES {
            return Err(anyhow!(
                "VNP_EXPIRED must be between 1 and {} minutes, got {}",
                MAX_EXPIRE_MINUTES,
                self.vnpay.expire_minutes
            ));
        }

        if let Some(notifications) = &self.notifications {
            if notifications.timeout_secs == 0 {
                return Err(anyhow!("NOTIFICATION_TIMEOUT_SECS must be greater than 0"));
            }
        }

        Ok(())
    }
}

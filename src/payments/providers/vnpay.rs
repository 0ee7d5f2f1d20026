//! VNPay gateway implementation
//!
//! Builds the signed `vpcpay.html` redirect and authenticates the return and
//! IPN callbacks VNPay sends back.

use chrono::Duration;
use std::fmt;
use tracing::{debug, warn};
use url::Url;

use crate::payments::authenticator;
use crate::payments::signer::{self, SECURE_HASH_FIELD};
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{
    format_gateway_time, AuthResult, MinorUnits, ParameterSet, PaymentUrlRequest, TxnRefFormat,
};
use crate::payments::GatewayError;

/// Longest payment window the merchant may configure (one week)
pub const MAX_EXPIRE_MINUTES: i64 = 7 * 24 * 60;

/// VNPay merchant configuration
#[derive(Clone)]
pub struct VnpayConfig {
    /// Merchant terminal code (`vnp_TmnCode`)
    pub tmn_code: String,
    /// Shared HMAC secret
    pub hash_secret: String,
    /// Gateway payment page
    pub payment_url: String,
    /// Where the customer's browser returns after paying
    pub return_url: String,
    pub version: String,
    pub command: String,
    pub currency: String,
    pub locale: String,
    pub order_type: String,
    /// Minutes until the payment page expires
    pub expire_minutes: i64,
    pub txn_ref_prefix: String,
}

impl Default for VnpayConfig {
    fn default() -> Self {
        Self {
            tmn_code: String::new(),
            hash_secret: String::new(),
            payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            return_url: String::new(),
            version: "2.1.0".to_string(),
            command: "pay".to_string(),
            currency: "VND".to_string(),
            locale: "vn".to_string(),
            order_type: "other".to_string(),
            expire_minutes: 15,
            txn_ref_prefix: "ORDER".to_string(),
        }
    }
}

impl fmt::Debug for VnpayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VnpayConfig")
            .field("tmn_code", &self.tmn_code)
            .field("hash_secret", &"<redacted>")
            .field("payment_url", &self.payment_url)
            .field("return_url", &self.return_url)
            .field("version", &self.version)
            .field("command", &self.command)
            .field("currency", &self.currency)
            .field("locale", &self.locale)
            .field("order_type", &self.order_type)
            .field("expire_minutes", &self.expire_minutes)
            .field("txn_ref_prefix", &self.txn_ref_prefix)
            .finish()
    }
}

/// VNPay gateway
pub struct VnpayGateway {
    config: VnpayConfig,
    payment_url: Url,
    txn_ref: TxnRefFormat,
}

impl VnpayGateway {
    /// Create a gateway, validating the merchant configuration
    pub fn new(mut config: VnpayConfig) -> Result<Self, GatewayError> {
        config.tmn_code = config.tmn_code.trim().to_string();
        if config.tmn_code.is_empty() {
            return Err(GatewayError::Config("merchant code is empty".to_string()));
        }
        if config.hash_secret.is_empty() {
            return Err(GatewayError::Config("hash secret is empty".to_string()));
        }
        if config.expire_minutes <= 0 || config.expire_minutes > MAX_EXPIRE_MINUTES {
            return Err(GatewayError::Config(format!(
                "expiry must be between 1 and {} minutes, got {}",
                MAX_EXPIRE_MINUTES, config.expire_minutes
            )));
        }

        let payment_url = parse_absolute("payment URL", &config.payment_url)?;
        if payment_url.query().is_some() {
            return Err(GatewayError::Config(
                "payment URL must not carry a query string".to_string(),
            ));
        }
        parse_absolute("return URL", &config.return_url)?;

        let txn_ref = TxnRefFormat::new(&config.txn_ref_prefix)?;

        Ok(Self {
            config,
            payment_url,
            txn_ref,
        })
    }

    /// Full outbound parameter set, before signing
    pub fn payment_params(&self, request: &PaymentUrlRequest) -> Result<ParameterSet, GatewayError> {
        let amount = MinorUnits::from_major(request.amount)
            .filter(|amount| amount.value() > 0)
            .ok_or(GatewayError::InvalidAmount(request.amount))?;

        let locale = request.locale.as_deref().unwrap_or(&self.config.locale);
        check_length("vnp_OrderInfo", &request.order_info, 1, 255)?;
        check_length("vnp_IpAddr", &request.ip_addr, 7, 45)?;
        check_length("vnp_Locale", locale, 2, 5)?;

        let expires_at = Duration::try_minutes(self.config.expire_minutes)
            .and_then(|window| request.created_at.checked_add_signed(window))
            .ok_or_else(|| {
                GatewayError::Config(format!(
                    "payment window of {} minutes is out of range",
                    self.config.expire_minutes
                ))
            })?;

        let mut params = ParameterSet::new();
        params.insert("vnp_Version", &self.config.version);
        params.insert("vnp_Command", &self.config.command);
        params.insert("vnp_TmnCode", &self.config.tmn_code);
        params.insert("vnp_Amount", amount.to_string());
        params.insert("vnp_CurrCode", &self.config.currency);
        params.insert("vnp_IpAddr", &request.ip_addr);
        params.insert("vnp_Locale", locale);
        params.insert("vnp_OrderInfo", &request.order_info);
        params.insert("vnp_OrderType", &self.config.order_type);
        params.insert("vnp_ReturnUrl", &self.config.return_url);
        params.insert("vnp_TxnRef", self.txn_ref.format(request.order_id));
        params.insert("vnp_CreateDate", format_gateway_time(request.created_at));
        params.insert("vnp_ExpireDate", format_gateway_time(expires_at));

        if let Some(bank_code) = request.bank_code.as_deref().filter(|c| !c.is_empty()) {
            check_length("vnp_BankCode", bank_code, 3, 20)?;
            params.insert("vnp_BankCode", bank_code);
        }

        Ok(params)
    }
}

impl PaymentGateway for VnpayGateway {
    fn provider(&self) -> &'static str {
        "vnpay"
    }

    fn build_payment_url(&self, request: &PaymentUrlRequest) -> Result<Url, GatewayError> {
        let params = self.payment_params(request)?;
        let signed = signer::sign_params(&self.config.hash_secret, params);

        let query = format!(
            "{}&{}={}",
            signer::canonicalize(&signed.params),
            SECURE_HASH_FIELD,
            signed.signature
        );
        let mut url = self.payment_url.clone();
        url.set_query(Some(&query));

        debug!(
            order_id = request.order_id,
            txn_ref = signed.params.get("vnp_TxnRef").unwrap_or_default(),
            "Built VNPay payment URL"
        );
        Ok(url)
    }

    fn authenticate_callback(&self, raw: ParameterSet) -> AuthResult {
        let result = authenticator::authenticate(raw, &self.config.hash_secret);
        if let AuthResult::Authentic(params) = &result {
            if let Some(tmn_code) = params.get("vnp_TmnCode") {
                if tmn_code != self.config.tmn_code {
                    warn!(
                        received = tmn_code,
                        "Authentic callback names a different merchant code"
                    );
                }
            }
        }
        result
    }

    fn order_id_for(&self, txn_ref: &str) -> Option<i64> {
        self.txn_ref.parse(txn_ref)
    }

    fn txn_ref_for(&self, order_id: i64) -> String {
        self.txn_ref.format(order_id)
    }
}

fn parse_absolute(what: &str, raw: &str) -> Result<Url, GatewayError> {
    let url = Url::parse(raw)
        .map_err(|e| GatewayError::Config(format!("{} '{}' is invalid: {}", what, raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(GatewayError::Config(format!(
            "{} must be http(s), got scheme '{}'",
            what, other
        ))),
    }
}

fn check_length(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), GatewayError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(GatewayError::InvalidField {
            field,
            message: format!("length must be between {} and {}, got {}", min, max, len),
        });
    }
    Ok(())
}

//! Payment gateway types and data structures
//!
//! Shared by the redirect builder, the callback authenticator and the
//! reconciler.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use crate::payments::GatewayError;

/// Gateway parameters ordered by key byte value
///
/// Used for outbound redirect requests and inbound callback payloads alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, String>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Subset whose keys start with `prefix`
    pub fn with_prefix(&self, prefix: &str) -> ParameterSet {
        self.0
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for ParameterSet {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<std::collections::HashMap<String, String>> for ParameterSet {
    fn from(map: std::collections::HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

/// Parameters plus the signature computed over their canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub params: ParameterSet,
    pub signature: String,
}

/// Outcome of checking an inbound callback's signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    /// Signature matched; carries the gateway fields that were signed
    Authentic(ParameterSet),
    /// Signature present but wrong
    Inauthentic,
    /// Nothing to verify
    Invalid(InvalidPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPayload {
    Empty,
    MissingSignature,
}

/// Integer amount in the gateway's minor-unit convention (major × 100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinorUnits(i64);

impl MinorUnits {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    /// Convert an exact major-unit amount, rounding half away from zero.
    /// Returns `None` if the result does not fit in an `i64`.
    pub fn from_major(amount: Decimal) -> Option<Self> {
        amount
            .checked_mul(Decimal::ONE_HUNDRED)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Self)
    }

    /// Parse the gateway's decimal-digit amount field
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        raw.parse().ok().map(Self)
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encodes order IDs as transaction references and parses them back
///
/// Accepted forms are a bare integer (`42`) or the configured prefix followed
/// by digits (`ORDER42`).
#[derive(Debug, Clone)]
pub struct TxnRefFormat {
    prefix: String,
    pattern: Regex,
}

impl TxnRefFormat {
    pub fn new(prefix: &str) -> Result<Self, GatewayError> {
        if !prefix.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(GatewayError::Config(format!(
                "transaction reference prefix must be ASCII letters, got '{}'",
                prefix
            )));
        }
        let pattern = Regex::new(&format!(r"^(?:{})?([0-9]+)$", regex::escape(prefix)))
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        Ok(Self {
            prefix: prefix.to_string(),
            pattern,
        })
    }

    pub fn format(&self, order_id: i64) -> String {
        format!("{}{}", self.prefix, order_id)
    }

    /// Order ID referenced by `raw`, or `None` if it is malformed
    pub fn parse(&self, raw: &str) -> Option<i64> {
        let captures = self.pattern.captures(raw)?;
        captures.get(1)?.as_str().parse().ok()
    }
}

/// Input to the redirect URL builder for one checkout attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentUrlRequest {
    pub order_id: i64,
    /// Order total in major units
    pub amount: Decimal,
    pub order_info: String,
    pub ip_addr: String,
    /// Overrides the configured locale
    pub locale: Option<String>,
    /// Preselects a bank on the gateway page
    pub bank_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Which inbound channel delivered a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackChannel {
    /// Customer's browser coming back from the gateway
    Return,
    /// Gateway server-to-server notification
    Ipn,
}

impl fmt::Display for CallbackChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackChannel::Return => write!(f, "return"),
            CallbackChannel::Ipn => write!(f, "ipn"),
        }
    }
}

/// Response code the gateway uses for a successful payment
pub const SUCCESS_RESPONSE_CODE: &str = "00";

/// Offset of the gateway's local time (GMT+7) used for date fields
const GATEWAY_UTC_OFFSET_HOURS: i64 = 7;
const GATEWAY_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// `yyyyMMddHHmmss` in the gateway's GMT+7 wall-clock time
pub fn format_gateway_time(at: DateTime<Utc>) -> String {
    (at.naive_utc() + Duration::hours(GATEWAY_UTC_OFFSET_HOURS))
        .format(GATEWAY_DATE_FORMAT)
        .to_string()
}

/// Inverse of [`format_gateway_time`]; `None` for anything unparseable
pub fn parse_gateway_time(raw: &str) -> Option<DateTime<Utc>> {
    let local = NaiveDateTime::parse_from_str(raw, GATEWAY_DATE_FORMAT).ok()?;
    let utc = local.checked_sub_signed(Duration::hours(GATEWAY_UTC_OFFSET_HOURS))?;
    Some(utc.and_utc())
}

/// Fields the reconciler reads from an authenticated callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCallback {
    pub txn_ref: String,
    /// Raw `vnp_Amount`; parsed during amount validation
    pub amount: String,
    pub response_code: String,
    pub transaction_no: Option<String>,
    pub bank_code: Option<String>,
    pub pay_date: Option<String>,
}

impl GatewayCallback {
    /// Extract the callback fields, naming the first required one missing
    pub fn from_params(params: &ParameterSet) -> Result<Self, &'static str> {
        let required = |key: &'static str| {
            params
                .get(key)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(key)
        };
        let optional = |key: &str| params.get(key).filter(|v| !v.is_empty()).map(str::to_string);

        Ok(Self {
            txn_ref: required("vnp_TxnRef")?,
            amount: required("vnp_Amount")?,
            response_code: required("vnp_ResponseCode")?,
            transaction_no: optional("vnp_TransactionNo"),
            bank_code: optional("vnp_BankCode"),
            pay_date: optional("vnp_PayDate"),
        })
    }

    pub fn is_success(&self) -> bool {
        self.response_code == SUCCESS_RESPONSE_CODE
    }

    /// Settlement time reported in `vnp_PayDate`
    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.pay_date.as_deref().and_then(parse_gateway_time)
    }
}

//! Canonical form and HMAC-SHA512 signature of gateway parameter sets
//!
//! The same canonicalization is used to sign the outbound redirect and to
//! verify both inbound callbacks, so a value encodes identically in every
//! direction: form-urlencoding, space as `+`, applied exactly once.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;
use url::form_urlencoded;

use crate::payments::types::{ParameterSet, SignedRequest};

type HmacSha512 = Hmac<Sha512>;

/// Field carrying the signature on the redirect URL and on callbacks
pub const SECURE_HASH_FIELD: &str = "vnp_SecureHash";

/// Optional field naming the hash algorithm; never part of the signed data
pub const SECURE_HASH_TYPE_FIELD: &str = "vnp_SecureHashType";

pub fn is_signature_field(key: &str) -> bool {
    key == SECURE_HASH_FIELD || key == SECURE_HASH_TYPE_FIELD
}

/// Form-urlencode a single value
pub fn encode_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// `k1=enc(v1)&k2=enc(v2)...` with keys in ascending byte order
pub fn canonicalize(params: &ParameterSet) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, encode_value(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercase hex HMAC-SHA512 of `canonical` keyed with `secret_key`
pub fn sign(secret_key: &str, canonical: &str) -> String {
    let mut mac = HmacSha512::new_from_slice(secret_key.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Sign a parameter set, dropping any signature fields it carries
pub fn sign_params(secret_key: &str, params: ParameterSet) -> SignedRequest {
    let params: ParameterSet = params
        .into_iter()
        .filter(|(key, _)| !is_signature_field(key))
        .collect();
    let signature = sign(secret_key, &canonicalize(&params));
    SignedRequest { params, signature }
}

/// Check `claimed` against the signature of `params`
///
/// Signature fields in `params` are ignored. The comparison runs in constant
/// time over the hex digest; hex case is not significant.
pub fn verify(secret_key: &str, params: &ParameterSet, claimed: &str) -> bool {
    let expected = sign_params(secret_key, params.clone()).signature;
    let claimed = claimed.trim().to_ascii_lowercase();

    expected.as_bytes().ct_eq(claimed.as_bytes()).into()
}

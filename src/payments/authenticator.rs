//! Signature check shared by the return and IPN callbacks.

use tracing::debug;

use crate::payments::signer::{self, SECURE_HASH_FIELD, SECURE_HASH_TYPE_FIELD};
use crate::payments::types::{AuthResult, InvalidPayload, ParameterSet};

/// Prefix of every field the gateway signs
pub const GATEWAY_FIELD_PREFIX: &str = "vnp_";

/// Authenticate everything received on a callback
///
/// Only `vnp_`-prefixed fields take part in the signature, so extra query
/// parameters appended along the way cannot break or forge a match.
pub fn authenticate(mut raw: ParameterSet, secret_key: &str) -> AuthResult {
    if raw.is_empty() {
        return AuthResult::Invalid(InvalidPayload::Empty);
    }

    let claimed = raw.remove(SECURE_HASH_FIELD);
    raw.remove(SECURE_HASH_TYPE_FIELD);

    let claimed = match claimed {
        Some(signature) if !signature.trim().is_empty() => signature,
        _ => return AuthResult::Invalid(InvalidPayload::MissingSignature),
    };

    let signed = raw.with_prefix(GATEWAY_FIELD_PREFIX);
    if signed.len() != raw.len() {
        debug!(
            ignored = raw.len() - signed.len(),
            "Ignoring non-gateway callback fields"
        );
    }

    if signer::verify(secret_key, &signed, &claimed) {
        AuthResult::Authentic(signed)
    } else {
        AuthResult::Inauthentic
    }
}

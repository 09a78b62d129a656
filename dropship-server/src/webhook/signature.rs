//! HMAC-SHA256 webhook signatures
//!
//! Inbound events are signed over the compact JSON of the envelope with the
//! `signature` member removed. `serde_json::Map` keeps keys sorted, so the
//! canonical form does not depend on the sender's key order.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_FIELD: &str = "signature";

/// Hex HMAC of `message`
pub fn sign(secret: &str, message: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature
pub fn verify(secret: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// Bytes covered by an envelope signature
pub fn canonical_payload(envelope: &Value) -> Vec<u8> {
    let mut unsigned = envelope.clone();
    if let Value::Object(map) = &mut unsigned {
        map.remove(SIGNATURE_FIELD);
    }
    serde_json::to_vec(&unsigned).unwrap_or_default()
}

/// Sign an envelope in place (used for outbound tests and tooling)
pub fn sign_envelope(secret: &str, envelope: &mut Value) {
    let signature = sign(secret, &canonical_payload(envelope));
    if let Value::Object(map) = envelope {
        map.insert(SIGNATURE_FIELD.into(), Value::String(signature));
    }
}

/// Verify the `signature` member of an envelope
pub fn verify_envelope(secret: &str, envelope: &Value) -> bool {
    match envelope.get(SIGNATURE_FIELD).and_then(Value::as_str) {
        Some(signature) => verify(secret, &canonical_payload(envelope), signature),
        None => false,
    }
}

//! Read-only view of the bearer token's claims. The signature is not verified;
//! this is only used to report when the token expires.

use super::Error;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

pub fn decode_claims(token: &str) -> Result<Value, Error> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::MalformedToken(format!(
            "expected 3 segments, got {}",
            parts.len()
        )));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| Error::MalformedToken(e.to_string()))?;

    serde_json::from_slice(&payload).map_err(|e| Error::MalformedToken(e.to_string()))
}

/// `exp` claim in seconds since the epoch
pub fn expires_at(claims: &Value) -> Option<i64> {
    claims.get("exp").and_then(Value::as_i64)
}

//! Local inspection of access-token claims.
//!
//! Tokens are JWTs; only the payload segment is decoded. The signature is
//! never checked here, the server verifies it on every request. Anything
//! that cannot be decoded counts as expired.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use super::AuthError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedClaims {
    /// `exp` claim, seconds since the epoch
    pub expires_at: Option<i64>,
    /// `sub`, or the `user_id` claim the credential server issues
    pub subject: Option<String>,
}

#[derive(Deserialize)]
struct RawClaims {
    #[serde(default)]
    exp: Option<Value>,
    #[serde(default)]
    sub: Option<Value>,
    #[serde(default)]
    user_id: Option<Value>,
}

fn value_to_epoch(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|secs| secs.floor() as i64))
}

fn value_to_subject(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl DecodedClaims {
    pub fn is_expired_at(&self, now: i64, skew_secs: i64) -> bool {
        match self.expires_at {
            Some(exp) => now.saturating_add(skew_secs) >= exp,
            None => true,
        }
    }

    /// Seconds until `exp`, negative once passed.
    pub fn seconds_until_expiry(&self, now: i64) -> Option<i64> {
        self.expires_at.map(|exp| exp - now)
    }
}

pub fn decode_claims(token: &str) -> Result<DecodedClaims, AuthError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(AuthError::DecodeFailure("expected three dot-separated segments".into()));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::DecodeFailure(format!("payload is not base64url: {}", e)))?;

    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::DecodeFailure(format!("payload is not JSON: {}", e)))?;
    if !value.is_object() {
        return Err(AuthError::DecodeFailure("payload is not a claims object".into()));
    }
    let raw: RawClaims = serde_json::from_value(value)
        .map_err(|e| AuthError::DecodeFailure(format!("malformed claims: {}", e)))?;

    Ok(DecodedClaims {
        expires_at: raw.exp.as_ref().and_then(value_to_epoch),
        subject: raw
            .sub
            .as_ref()
            .or(raw.user_id.as_ref())
            .and_then(value_to_subject),
    })
}

/// True if `token` is undecodable, has no `exp`, or expires within
/// `skew_secs` seconds from now.
pub fn is_expired(token: &str, skew_secs: i64) -> bool {
    is_expired_at(token, skew_secs, Utc::now().timestamp())
}

pub fn is_expired_at(token: &str, skew_secs: i64, now: i64) -> bool {
    decode_claims(token)
        .map(|claims| claims.is_expired_at(now, skew_secs))
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{mint_token, mint_token_with_payload};

    const NOW: i64 = 1_760_000_000;

    #[test]
    fn test_decode_server_claims() {
        let token = mint_token_with_payload(r#"{"token_type":"access","exp":1760000600,"user_id":42}"#);
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.expires_at, Some(1_760_000_600));
        assert_eq!(claims.subject.as_deref(), Some("42"));
        assert_eq!(claims.seconds_until_expiry(NOW), Some(600));
    }

    #[test]
    fn test_sub_preferred_over_user_id() {
        let token = mint_token_with_payload(r#"{"exp":1,"sub":"alice","user_id":7}"#);
        assert_eq!(decode_claims(&token).unwrap().subject.as_deref(), Some("alice"));
    }

    #[test]
    fn test_expiry_boundaries() {
        let token = mint_token(NOW + 100);
        assert!(!is_expired_at(&token, 0, NOW));
        assert!(!is_expired_at(&token, 99, NOW));
        assert!(is_expired_at(&token, 100, NOW));
        assert!(is_expired_at(&token, 0, NOW + 100));
        assert!(is_expired_at(&mint_token(NOW - 1), 0, NOW));
    }

    #[test]
    fn test_malformed_tokens_fail_closed() {
        let far_future = mint_token(i64::MAX / 2);
        assert!(!is_expired_at(&far_future, 0, NOW));

        for token in [
            "",
            "opaque-token",
            "a.b",
            "a.b.c.d",
            "header.%%%.sig",
            "header.bm90IGpzb24.sig", // "not json"
            "header.WzEsMiwzXQ.sig",  // [1,2,3]
        ] {
            assert!(is_expired_at(token, 0, NOW), "{:?} should count as expired", token);
            assert!(is_expired(token, 0));
        }
    }

    #[test]
    fn test_missing_exp_is_expired() {
        let token = mint_token_with_payload(r#"{"user_id":1}"#);
        assert!(decode_claims(&token).is_ok());
        assert!(is_expired_at(&token, 0, NOW));
    }

    #[test]
    fn test_padded_payload_accepted() {
        let token = mint_token(NOW + 10);
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        parts[1].push_str("==");
        assert!(!is_expired_at(&parts.join("."), 0, NOW));
    }
}

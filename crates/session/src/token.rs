// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access-token expiry decoding.
//!
//! Tokens are three dot-separated segments; the middle one is base64url JSON
//! carrying an `exp` claim in Unix seconds. Only that segment is read. The
//! header and signature are never checked: the auth endpoint that issued the
//! token is trusted, and signature verification is out of scope here.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::SessionError;

/// Decode the `exp` claim (Unix seconds) from an access token.
pub fn decode_expiry(token: &str) -> Result<u64, SessionError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(SessionError::MalformedToken("expected three dot-separated segments".into()));
    };

    // Some issuers keep the `=` padding even in base64url.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| SessionError::MalformedToken(format!("payload is not base64url: {e}")))?;

    let claims: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| SessionError::MalformedToken(format!("payload is not JSON: {e}")))?;

    let exp = claims
        .get("exp")
        .ok_or_else(|| SessionError::MalformedToken("payload has no exp claim".into()))?;

    exp.as_u64()
        .or_else(|| exp.as_f64().filter(|secs| secs.is_finite() && *secs >= 0.0).map(|secs| secs as u64))
        .ok_or_else(|| SessionError::MalformedToken(format!("exp is not a timestamp: {exp}")))
}

/// Seconds until the token expires; negative once it has. Saturates for
/// timestamps beyond `i64`.
pub fn seconds_left(token: &str, now_secs: u64) -> Result<i64, SessionError> {
    let exp = i64::try_from(decode_expiry(token)?).unwrap_or(i64::MAX);
    let now = i64::try_from(now_secs).unwrap_or(i64::MAX);
    Ok(exp.saturating_sub(now))
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;

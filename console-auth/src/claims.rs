//! Unverified reading of session-token claims.
//!
//! The console never verifies token signatures itself; the backend does. It
//! only peeks at the `exp` claim so an obviously expired token can be dropped
//! without a round trip.

use crate::error::{AuthError, AuthResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Claims carried by a session token.
///
/// Only `exp` is required; the rest is informational.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,

    /// Subject (user ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Any other claims
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl SessionClaims {
    /// Check if the token is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }

    /// Check if the token is expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expiration as a timestamp, if representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Check if a credential has the three-segment `header.claims.signature` shape.
pub fn is_structured(token: &str) -> bool {
    let mut parts = token.split('.');
    let shaped = parts.by_ref().take(3).filter(|part| !part.is_empty()).count() == 3;
    shaped && parts.next().is_none()
}

/// Decode the claims segment of a structured token without verifying it.
///
/// # Errors
///
/// `InvalidToken` when the token is not three segments, the middle segment
/// is not base64url, or it does not hold a JSON object with a numeric `exp`.
pub fn decode_unverified(token: &str) -> AuthResult<SessionClaims> {
    if !is_structured(token) {
        return Err(AuthError::InvalidToken("Expected three segments".to_string()));
    }

    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::InvalidToken("Missing claims segment".to_string()))?;

    // Some issuers pad their segments; base64url in JWTs should not.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(format!("Claims are not base64url: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidToken(format!("Claims are not valid JSON: {}", e)))
}

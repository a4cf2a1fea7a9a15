//! Error types for the client-side authentication flow
//!
//! This module defines the errors raised by the PKCE login flow, session
//! validation and credential handling. Redirect rejection is not
//! an error: the validator returns `None` and callers fall back to the default
//! route.

use thiserror::Error;

/// Authentication error types.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The `state` echoed by the identity provider does not match the stored one
    #[error("OAuth state mismatch")]
    CsrfMismatch,

    /// No PKCE verifier/state is stored for this tab
    #[error("No login attempt in progress")]
    MissingPkceParams,

    /// The session credential is definitively expired or was rejected
    #[error("Session has expired")]
    SessionExpired,

    /// Session validity could not be determined (network or backend failure)
    #[error("Session validation failed: {0}")]
    SessionIndeterminate(String),

    /// The credential is not a decodable structured token
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The identity provider rejected or failed the authorization request
    #[error("OAuth error: {0}")]
    OAuthError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Check if this error should be logged at error level.
    ///
    /// Expired sessions and CSRF mismatches are expected outcomes and are
    /// not server errors.
    pub fn is_server_error(&self) -> bool {
        matches!(self, AuthError::Internal(_) | AuthError::ConfigError(_))
    }

    /// Check if the caller should retry later instead of logging the user out.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::SessionIndeterminate(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::SessionExpired | AuthError::InvalidToken(_) => 401,

            AuthError::CsrfMismatch | AuthError::MissingPkceParams => 400,

            AuthError::SessionIndeterminate(_) => 503,

            AuthError::OAuthError(_) | AuthError::ConfigError(_) | AuthError::Internal(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::CsrfMismatch => "CSRF_MISMATCH",
            AuthError::MissingPkceParams => "MISSING_PKCE_PARAMS",
            AuthError::SessionExpired => "SESSION_EXPIRED",
            AuthError::SessionIndeterminate(_) => "SESSION_INDETERMINATE",
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::OAuthError(_) => "OAUTH_ERROR",
            AuthError::ConfigError(_) => "CONFIG_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(AuthError::Internal("boom".into()).is_server_error());
        assert!(!AuthError::CsrfMismatch.is_server_error());
        assert!(AuthError::SessionIndeterminate("timeout".into()).is_retryable());
        assert!(!AuthError::SessionExpired.is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::SessionExpired.status_code(), 401);
        assert_eq!(AuthError::CsrfMismatch.status_code(), 400);
        assert_eq!(AuthError::SessionIndeterminate("x".into()).status_code(), 503);
        assert_eq!(AuthError::CsrfMismatch.error_code(), "CSRF_MISMATCH");
    }
}

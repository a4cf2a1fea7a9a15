//! Error types for identity-provider configuration and lifecycle
//!
//! Configuration problems are reported as [`ConfigValidationError`] and always
//! fail closed: nothing is applied. Everything the manager can return is an
//! [`IdpError`].

use thiserror::Error;

/// Provider configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    /// Two providers share an ID
    #[error("Duplicate provider id: {0}")]
    DuplicateProviderId(String),

    /// A required field is absent or empty
    #[error("Provider '{provider}' is missing required field '{field}'")]
    MissingField {
        /// Provider ID, or its position when the ID itself is missing
        provider: String,
        /// Field name as it appears in the configuration
        field: &'static str,
    },

    /// The provider type is not one of github, google, gitlab, microsoft, oidc
    #[error("Unsupported provider type: {0}")]
    UnsupportedProviderType(String),

    /// An oidc provider has no issuer URL
    #[error("Provider '{0}' is of type oidc and requires issuer_url")]
    MissingIssuerUrl(String),

    /// The configuration is not shaped like a provider list
    #[error("Malformed provider configuration: {0}")]
    Malformed(String),
}

/// Identity-provider manager errors.
#[derive(Debug, Error)]
pub enum IdpError {
    /// The provider configuration was rejected
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(#[from] ConfigValidationError),

    /// `init` has not completed successfully
    #[error("Identity provider is not initialized")]
    NotInitialized,

    /// The operation is not allowed in the current process state
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        /// Attempted operation
        operation: &'static str,
        /// Current process state
        state: String,
    },

    /// Launching, reloading or stopping the identity provider failed
    #[error("Identity provider process error: {0}")]
    Process(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for identity-provider operations.
pub type IdpResult<T> = Result<T, IdpError>;

impl IdpError {
    /// Check if this error should be logged at error level.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            IdpError::Process(_) | IdpError::Io(_) | IdpError::Serialization(_)
        )
    }

    /// Get error code for host responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            IdpError::ConfigInvalid(_) => "CONFIG_INVALID",
            IdpError::NotInitialized => "NOT_INITIALIZED",
            IdpError::InvalidTransition { .. } => "INVALID_TRANSITION",
            IdpError::Process(_) => "PROCESS_ERROR",
            IdpError::Io(_) => "IO_ERROR",
            IdpError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_converts() {
        let err: IdpError = ConfigValidationError::DuplicateProviderId("github-main".into()).into();
        assert_eq!(err.error_code(), "CONFIG_INVALID");
        assert!(!err.is_server_error());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Duplicate provider id: github-main"
        );
    }

    #[test]
    fn test_server_errors() {
        assert!(IdpError::Process("exited".into()).is_server_error());
        assert!(!IdpError::NotInitialized.is_server_error());
    }

    #[test]
    fn test_missing_field_message() {
        let err = ConfigValidationError::MissingField {
            provider: "google".into(),
            field: "client_secret",
        };
        assert_eq!(
            err.to_string(),
            "Provider 'google' is missing required field 'client_secret'"
        );
    }
}

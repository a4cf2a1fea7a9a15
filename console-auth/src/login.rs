//! Authorization-code login against the embedded identity provider.
//!
//! [`LoginFlow::begin`] creates a fresh PKCE verifier and state, stores them
//! for this tab and returns the URL to send the browser to.
//! [`LoginFlow::complete`] checks the callback's `state` and hands back what
//! the backend needs to redeem the code. Either way the stored parameters are
//! cleared: a verifier is used at most once.

use crate::error::{AuthError, AuthResult};
use crate::pkce::{self, PkceStore};
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Where and how to start a login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    /// Identity provider authorization endpoint
    pub authorize_url: String,

    /// OAuth client ID registered with the identity provider
    pub client_id: String,

    /// Callback URL the identity provider redirects back to
    pub redirect_uri: String,

    /// Scopes to request
    pub scopes: Vec<String>,
}

impl LoginConfig {
    /// Create a configuration for an issuer with the console's default scopes.
    ///
    /// The authorization endpoint is `{issuer}/auth`.
    pub fn for_issuer(
        issuer_url: &str,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            authorize_url: format!("{}/auth", issuer_url.trim_end_matches('/')),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scopes: ["openid", "email", "profile", "groups"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// A started login attempt.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// URL to redirect the browser to
    pub authorization_url: String,
}

/// Query parameters of the identity provider's callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
    /// Echoed CSRF state
    pub state: Option<String>,
    /// Error code, if the provider refused
    pub error: Option<String>,
    /// Human-readable error
    pub error_description: Option<String>,
}

/// What the backend needs to redeem the authorization code.
#[derive(Clone)]
pub struct CodeExchange {
    /// Authorization code from the callback
    pub code: String,
    /// The PKCE verifier of this attempt
    pub code_verifier: String,
    /// Callback URL used for the attempt
    pub redirect_uri: String,
}

impl std::fmt::Debug for CodeExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeExchange")
            .field("code", &"[REDACTED]")
            .field("code_verifier", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// PKCE login flow for one browser tab.
pub struct LoginFlow {
    client: BasicClient,
    config: LoginConfig,
    pkce: PkceStore,
}

impl std::fmt::Debug for LoginFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginFlow")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LoginFlow {
    /// Create a login flow.
    ///
    /// # Errors
    ///
    /// `ConfigError` when the authorization or redirect URL does not parse.
    pub fn new(config: LoginConfig, pkce: PkceStore) -> AuthResult<Self> {
        let auth_url = AuthUrl::new(config.authorize_url.clone())
            .map_err(|e| AuthError::ConfigError(format!("Invalid authorization URL: {}", e)))?;
        let redirect_url = RedirectUrl::new(config.redirect_uri.clone())
            .map_err(|e| AuthError::ConfigError(format!("Invalid redirect URL: {}", e)))?;

        let client = BasicClient::new(ClientId::new(config.client_id.clone()), None, auth_url, None)
            .set_redirect_uri(redirect_url);

        Ok(Self {
            client,
            config,
            pkce,
        })
    }

    /// Start a login attempt.
    ///
    /// Overwrites any attempt already in flight in this tab.
    #[instrument(skip(self))]
    pub fn begin(&self) -> LoginRequest {
        let verifier = pkce::generate_code_verifier();
        let state = pkce::generate_state();
        let challenge =
            PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(verifier.clone()));

        let url_state = state.clone();
        let mut request = self
            .client
            .authorize_url(move || CsrfToken::new(url_state))
            .set_pkce_challenge(challenge);
        for scope in &self.config.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let (url, _) = request.url();

        self.pkce.store_params(&verifier, &state);
        info!("Login attempt started");

        LoginRequest {
            authorization_url: url.to_string(),
        }
    }

    /// Finish a login attempt from the callback parameters.
    ///
    /// The stored parameters are cleared whatever the outcome.
    ///
    /// # Errors
    ///
    /// - `OAuthError` when the provider reported an error or sent no code
    /// - `MissingPkceParams` when no attempt is in flight in this tab
    /// - `CsrfMismatch` when the echoed state differs from the stored one
    #[instrument(skip(self, callback))]
    pub fn complete(&self, callback: &CallbackParams) -> AuthResult<CodeExchange> {
        let result = self.check_callback(callback);
        self.pkce.clear_params();

        if let Err(ref e) = result {
            warn!(error_code = e.error_code(), "Login attempt discarded");
        }
        result
    }

    fn check_callback(&self, callback: &CallbackParams) -> AuthResult<CodeExchange> {
        if let Some(ref error) = callback.error {
            let detail = callback.error_description.as_deref().unwrap_or_default();
            return Err(AuthError::OAuthError(format!("{} {}", error, detail).trim().to_string()));
        }

        let verifier = self
            .pkce
            .params()
            .verifier
            .ok_or(AuthError::MissingPkceParams)?;

        let received = callback.state.as_deref().unwrap_or_default();
        if !self.pkce.validate_state(received) {
            return Err(AuthError::CsrfMismatch);
        }

        let code = callback
            .code
            .clone()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::OAuthError("Callback carried no code".to_string()))?;

        Ok(CodeExchange {
            code,
            code_verifier: verifier,
            redirect_uri: self.config.redirect_uri.clone(),
        })
    }

    /// Abandon the attempt in flight, if any.
    pub fn abort(&self) {
        self.pkce.clear_params();
    }
}

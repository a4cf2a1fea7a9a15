//! Deployment settings for the embedded identity provider.
//!
//! Settings are read once when the manager is constructed. Providers are not
//! part of the settings; they arrive through `init` and `update_config`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File name of the generated configuration inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Default log ring-buffer capacity.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Identity-provider deployment settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdpSettings {
    /// Directory for generated configuration and runtime state, kept
    /// owner-only since it holds upstream secrets
    pub data_dir: PathBuf,

    /// Public issuer URL of the identity provider
    pub issuer_url: String,

    /// Address the identity provider listens on
    pub listen_addr: String,

    /// OAuth client ID of the console itself
    pub client_id: String,

    /// OAuth client secret of the console; none registers a public client
    pub client_secret: Option<String>,

    /// Console callback URL
    pub redirect_uri: String,

    /// Identity-provider executable
    pub binary: PathBuf,

    /// Number of log entries kept
    pub log_capacity: usize,
}

impl std::fmt::Debug for IdpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdpSettings")
            .field("data_dir", &self.data_dir)
            .field("issuer_url", &self.issuer_url)
            .field("listen_addr", &self.listen_addr)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .field("binary", &self.binary)
            .field("log_capacity", &self.log_capacity)
            .finish()
    }
}

impl Default for IdpSettings {
    /// Returns defaults suitable for local development.
    fn default() -> Self {
        Self {
            data_dir: std::env::temp_dir().join("console-idp"),
            issuer_url: "http://127.0.0.1:5556/dex".to_string(),
            listen_addr: "127.0.0.1:5556".to_string(),
            client_id: "console".to_string(),
            client_secret: None,
            redirect_uri: "http://localhost:8080/auth/callback".to_string(),
            binary: PathBuf::from("dex"),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl IdpSettings {
    /// Load settings from environment variables.
    ///
    /// Environment variables:
    /// - `CONSOLE_IDP_DATA_DIR`: data directory (default: `$TMPDIR/console-idp`)
    /// - `CONSOLE_IDP_ISSUER_URL`: issuer URL (default: http://127.0.0.1:5556/dex)
    /// - `CONSOLE_IDP_LISTEN_ADDR`: listen address (default: 127.0.0.1:5556)
    /// - `CONSOLE_IDP_CLIENT_ID`: console client ID (default: console)
    /// - `CONSOLE_IDP_CLIENT_SECRET`: console client secret (default: public client)
    /// - `CONSOLE_IDP_REDIRECT_URI`: console callback URL
    ///   (default: http://localhost:8080/auth/callback)
    /// - `CONSOLE_IDP_BINARY`: identity-provider executable (default: dex)
    /// - `CONSOLE_IDP_LOG_CAPACITY`: log entries kept (default: 500)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            data_dir: std::env::var("CONSOLE_IDP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.data_dir),
            issuer_url: std::env::var("CONSOLE_IDP_ISSUER_URL").unwrap_or(default.issuer_url),
            listen_addr: std::env::var("CONSOLE_IDP_LISTEN_ADDR").unwrap_or(default.listen_addr),
            client_id: std::env::var("CONSOLE_IDP_CLIENT_ID").unwrap_or(default.client_id),
            client_secret: std::env::var("CONSOLE_IDP_CLIENT_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            redirect_uri: std::env::var("CONSOLE_IDP_REDIRECT_URI")
                .unwrap_or(default.redirect_uri),
            binary: std::env::var("CONSOLE_IDP_BINARY")
                .map(PathBuf::from)
                .unwrap_or(default.binary),
            log_capacity: std::env::var("CONSOLE_IDP_LOG_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(default.log_capacity),
        }
    }

    /// Create settings rooted at a data directory, with defaults otherwise.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Path of the generated configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }

    /// URL the identity provider redirects upstream logins back to.
    pub fn callback_url(&self) -> String {
        format!("{}/callback", self.issuer_url.trim_end_matches('/'))
    }
}

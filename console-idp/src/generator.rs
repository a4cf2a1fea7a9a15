//! Generation of the embedded identity provider's configuration.
//!
//! The output is a Dex-style document: issuer, storage, listen address, the
//! console's static OAuth client and one upstream connector per provider.
//! Generation is a pure function of the settings and the provider list.

use crate::error::IdpResult;
use crate::files;
use crate::providers::{ProviderConfig, ProviderKind};
use crate::settings::IdpSettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{debug, instrument, warn};

/// Display name of the console's static client.
pub const CONSOLE_CLIENT_NAME: &str = "Cluster Console";

/// Storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: String,
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebConfig {
    pub http: String,
}

/// OAuth 2.0 behaviour of the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2Config {
    pub skip_approval_screen: bool,
    pub response_types: Vec<String>,
}

/// An OAuth client registered with the identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticClient {
    pub id: String,
    pub name: String,
    #[serde(rename = "redirectURIs")]
    pub redirect_uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default)]
    pub public: bool,
}

impl std::fmt::Debug for StaticClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticClient")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("redirect_uris", &self.redirect_uris)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("public", &self.public)
            .finish()
    }
}

/// An upstream identity provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub name: String,
    /// Connector-specific settings, including upstream credentials
    pub config: Value,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Complete identity-provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpConfig {
    pub issuer: String,
    pub storage: StorageConfig,
    pub web: WebConfig,
    pub oauth2: OAuth2Config,
    pub static_clients: Vec<StaticClient>,
    pub connectors: Vec<Connector>,
    #[serde(rename = "enablePasswordDB")]
    pub enable_password_db: bool,
}

impl IdpConfig {
    /// Serialize to the on-disk representation.
    pub fn to_json(&self) -> IdpResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Address the identity provider will listen on.
    pub fn listen_addr(&self) -> &str {
        &self.web.http
    }
}

fn single(value: Option<&str>) -> Option<Value> {
    value.map(|v| Value::Array(vec![Value::from(v)]))
}

/// Host name of a URL, without scheme or path.
fn host_name(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
}

/// Builds [`IdpConfig`] documents from provider lists.
#[derive(Debug, Clone)]
pub struct ConfigGenerator {
    settings: IdpSettings,
}

impl ConfigGenerator {
    /// Create a generator.
    pub fn new(settings: IdpSettings) -> Self {
        Self { settings }
    }

    /// Where [`write_config`](Self::write_config) puts the document.
    pub fn config_path(&self) -> PathBuf {
        self.settings.config_path()
    }

    /// Generate the configuration for `providers`.
    ///
    /// Connectors follow provider order. No randomness is involved: the same
    /// input always gives the same document.
    pub fn generate(&self, providers: &[ProviderConfig]) -> IdpConfig {
        let settings = &self.settings;

        IdpConfig {
            issuer: settings.issuer_url.clone(),
            storage: StorageConfig {
                kind: "memory".to_string(),
            },
            web: WebConfig {
                http: settings.listen_addr.clone(),
            },
            oauth2: OAuth2Config {
                skip_approval_screen: true,
                response_types: vec!["code".to_string()],
            },
            static_clients: vec![StaticClient {
                id: settings.client_id.clone(),
                name: CONSOLE_CLIENT_NAME.to_string(),
                redirect_uris: vec![settings.redirect_uri.clone()],
                secret: settings.client_secret.clone(),
                public: settings.client_secret.is_none(),
            }],
            connectors: providers.iter().map(|p| self.connector(p)).collect(),
            enable_password_db: false,
        }
    }

    fn connector(&self, provider: &ProviderConfig) -> Connector {
        let mut config = Map::new();
        config.insert("clientID".into(), Value::from(provider.client_id.as_str()));
        config.insert("clientSecret".into(), Value::from(provider.client_secret.as_str()));
        config.insert("redirectURI".into(), Value::from(self.settings.callback_url()));

        let mut set = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                config.insert(key.to_string(), value);
            }
        };

        match &provider.kind {
            ProviderKind::Github {
                allowed_org,
                base_url,
            } => {
                set(
                    "orgs",
                    allowed_org
                        .as_deref()
                        .map(|org| serde_json::json!([{ "name": org }])),
                );
                set("hostName", base_url.as_deref().map(|url| Value::from(host_name(url))));
            }
            ProviderKind::Google { allowed_domain } => {
                set("hostedDomains", single(allowed_domain.as_deref()));
            }
            ProviderKind::Gitlab {
                base_url,
                allowed_org,
            } => {
                set("baseURL", base_url.as_deref().map(Value::from));
                set("groups", single(allowed_org.as_deref()));
            }
            ProviderKind::Microsoft {
                tenant,
                allowed_domain,
            } => {
                set("tenant", tenant.as_deref().map(Value::from));
                set("domainHint", allowed_domain.as_deref().map(Value::from));
            }
            ProviderKind::Oidc {
                issuer_url,
                allowed_domain,
            } => {
                set("issuer", Some(Value::from(issuer_url.as_str())));
                set("hostedDomains", single(allowed_domain.as_deref()));
                set("scopes", Some(serde_json::json!(["openid", "profile", "email"])));
            }
        }

        Connector {
            kind: provider.provider_type().as_str().to_string(),
            id: provider.id.clone(),
            name: provider.display_name.clone(),
            config: Value::Object(config),
        }
    }

    /// Persist `config` to the data directory for inspection.
    ///
    /// Failures are logged and otherwise ignored; returns the path written.
    #[instrument(skip(self, config))]
    pub async fn write_config(&self, config: &IdpConfig) -> Option<PathBuf> {
        let path = self.config_path();

        let result = async {
            files::write_private(&path, &config.to_json()?).await?;
            IdpResult::Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                debug!(path = %path.display(), "Wrote identity provider configuration");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), "Failed to write identity provider configuration: {}", e);
                None
            }
        }
    }
}

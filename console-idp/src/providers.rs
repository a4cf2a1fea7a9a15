//! Identity-provider definitions and the provider registry format.
//!
//! Providers arrive from the host as a loosely typed configuration map. They
//! are parsed into [`ProviderConfig`] at this boundary and validated before
//! anything downstream sees them; a rejected list is never partially applied.
//!
//! Two input shapes are accepted:
//!
//! - `providers`: an array of provider entries (or a string holding that
//!   array as JSON, which is how [`serialize`] output is usually persisted)
//! - the legacy single-provider keys `connector_type`, `connector_name`,
//!   `provider_client_id`, `provider_client_secret`, `allowed_domain` and
//!   `allowed_org`
//!
//! When both are present the `providers` array wins.

use crate::error::ConfigValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, info};

/// Host configuration map.
pub type ConfigMap = Map<String, Value>;

/// Legacy single-provider keys.
pub const LEGACY_KEYS: [&str; 6] = [
    "connector_type",
    "connector_name",
    "provider_client_id",
    "provider_client_secret",
    "allowed_domain",
    "allowed_org",
];

/// Supported upstream identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// GitHub or GitHub Enterprise
    Github,
    /// Google Workspace
    Google,
    /// GitLab or self-hosted GitLab
    Gitlab,
    /// Microsoft Entra ID
    Microsoft,
    /// Any OpenID Connect issuer
    Oidc,
}

impl ProviderType {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Github => "github",
            ProviderType::Google => "google",
            ProviderType::Gitlab => "gitlab",
            ProviderType::Microsoft => "microsoft",
            ProviderType::Oidc => "oidc",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "github" => Some(ProviderType::Github),
            "google" => Some(ProviderType::Google),
            "gitlab" => Some(ProviderType::Gitlab),
            "microsoft" => Some(ProviderType::Microsoft),
            "oidc" => Some(ProviderType::Oidc),
            _ => None,
        }
    }

    /// Button label used when a provider has no display name.
    pub fn default_display_name(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => format!("Login with {}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => "Login".to_string(),
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-type provider settings.
///
/// Each variant carries only what that provider understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// GitHub; `base_url` selects a GitHub Enterprise host
    Github {
        allowed_org: Option<String>,
        base_url: Option<String>,
    },
    /// Google; `allowed_domain` restricts to one hosted domain
    Google { allowed_domain: Option<String> },
    /// GitLab; `allowed_org` restricts to one group
    Gitlab {
        base_url: Option<String>,
        allowed_org: Option<String>,
    },
    /// Microsoft; `tenant` defaults to the multi-tenant endpoint
    Microsoft {
        tenant: Option<String>,
        allowed_domain: Option<String>,
    },
    /// Generic OpenID Connect
    Oidc {
        issuer_url: String,
        allowed_domain: Option<String>,
    },
}

impl ProviderKind {
    /// The provider type of this variant.
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderKind::Github { .. } => ProviderType::Github,
            ProviderKind::Google { .. } => ProviderType::Google,
            ProviderKind::Gitlab { .. } => ProviderType::Gitlab,
            ProviderKind::Microsoft { .. } => ProviderType::Microsoft,
            ProviderKind::Oidc { .. } => ProviderType::Oidc,
        }
    }

    /// Allowed email domain, if restricted.
    pub fn allowed_domain(&self) -> Option<&str> {
        match self {
            ProviderKind::Google { allowed_domain }
            | ProviderKind::Microsoft { allowed_domain, .. }
            | ProviderKind::Oidc { allowed_domain, .. } => allowed_domain.as_deref(),
            _ => None,
        }
    }

    /// Allowed organization or group, if restricted.
    pub fn allowed_org(&self) -> Option<&str> {
        match self {
            ProviderKind::Github { allowed_org, .. } | ProviderKind::Gitlab { allowed_org, .. } => {
                allowed_org.as_deref()
            }
            _ => None,
        }
    }

    /// Optional fields that are set, as `(wire key, value)` pairs.
    fn options(&self) -> Vec<(&'static str, &str)> {
        let fields: [(&'static str, Option<&str>); 5] = match self {
            ProviderKind::Github {
                allowed_org,
                base_url,
            }
            | ProviderKind::Gitlab {
                base_url,
                allowed_org,
            } => [
                ("allowed_org", allowed_org.as_deref()),
                ("base_url", base_url.as_deref()),
                ("allowed_domain", None),
                ("tenant", None),
                ("issuer_url", None),
            ],
            ProviderKind::Google { allowed_domain } => [
                ("allowed_domain", allowed_domain.as_deref()),
                ("allowed_org", None),
                ("base_url", None),
                ("tenant", None),
                ("issuer_url", None),
            ],
            ProviderKind::Microsoft {
                tenant,
                allowed_domain,
            } => [
                ("tenant", tenant.as_deref()),
                ("allowed_domain", allowed_domain.as_deref()),
                ("allowed_org", None),
                ("base_url", None),
                ("issuer_url", None),
            ],
            ProviderKind::Oidc {
                issuer_url,
                allowed_domain,
            } => [
                ("issuer_url", Some(issuer_url.as_str())),
                ("allowed_domain", allowed_domain.as_deref()),
                ("allowed_org", None),
                ("base_url", None),
                ("tenant", None),
            ],
        };

        fields
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect()
    }
}

/// One configured identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Unique provider ID, used as the connector ID
    pub id: String,

    /// Label for the login button
    pub display_name: String,

    /// OAuth client ID registered with the upstream provider
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Type-specific settings
    pub kind: ProviderKind,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("kind", &self.kind)
            .finish()
    }
}

impl ProviderConfig {
    /// The provider type.
    pub fn provider_type(&self) -> ProviderType {
        self.kind.provider_type()
    }

    /// Secret-free view for rendering login buttons.
    pub fn summary(&self) -> ProviderSummary {
        ProviderSummary {
            id: self.id.clone(),
            provider_type: self.provider_type(),
            display_name: self.display_name.clone(),
        }
    }

    fn to_entry(&self) -> Value {
        let mut entry = Map::new();
        entry.insert("id".to_string(), Value::from(self.id.as_str()));
        entry.insert("type".to_string(), Value::from(self.provider_type().as_str()));
        entry.insert("name".to_string(), Value::from(self.display_name.as_str()));
        entry.insert("client_id".to_string(), Value::from(self.client_id.as_str()));
        entry.insert("client_secret".to_string(), Value::from(self.client_secret.as_str()));
        for (key, value) in self.kind.options() {
            entry.insert(key.to_string(), Value::from(value));
        }
        Value::Object(entry)
    }
}

/// Provider as shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSummary {
    /// Provider ID
    pub id: String,

    /// Provider type
    #[serde(rename = "type")]
    pub provider_type: ProviderType,

    /// Login button label
    pub display_name: String,
}

/// A provider entry as written in configuration.
#[derive(Debug, Default, Deserialize)]
struct ProviderEntry {
    id: Option<String>,
    #[serde(rename = "type")]
    provider_type: Option<String>,
    #[serde(alias = "display_name")]
    name: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    allowed_domain: Option<String>,
    allowed_org: Option<String>,
    base_url: Option<String>,
    tenant: Option<String>,
    issuer_url: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Secrets are kept verbatim; only a blank value counts as missing.
fn secret(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ProviderEntry {
    fn into_config(self, position: usize) -> Result<ProviderConfig, ConfigValidationError> {
        let missing = |provider: &str, field: &'static str| ConfigValidationError::MissingField {
            provider: provider.to_string(),
            field,
        };

        let id = non_empty(self.id).ok_or_else(|| missing(&format!("#{}", position), "id"))?;
        let raw_type = non_empty(self.provider_type).ok_or_else(|| missing(&id, "type"))?;
        let provider_type = ProviderType::parse(&raw_type)
            .ok_or(ConfigValidationError::UnsupportedProviderType(raw_type))?;
        let client_id = non_empty(self.client_id).ok_or_else(|| missing(&id, "client_id"))?;
        let client_secret =
            secret(self.client_secret).ok_or_else(|| missing(&id, "client_secret"))?;

        let allowed_domain = non_empty(self.allowed_domain);
        let allowed_org = non_empty(self.allowed_org);
        let base_url = non_empty(self.base_url);

        let kind = match provider_type {
            ProviderType::Github => ProviderKind::Github {
                allowed_org,
                base_url,
            },
            ProviderType::Google => ProviderKind::Google { allowed_domain },
            ProviderType::Gitlab => ProviderKind::Gitlab {
                base_url,
                allowed_org,
            },
            ProviderType::Microsoft => ProviderKind::Microsoft {
                tenant: non_empty(self.tenant),
                allowed_domain,
            },
            ProviderType::Oidc => ProviderKind::Oidc {
                issuer_url: non_empty(self.issuer_url)
                    .ok_or_else(|| ConfigValidationError::MissingIssuerUrl(id.clone()))?,
                allowed_domain,
            },
        };

        Ok(ProviderConfig {
            display_name: non_empty(self.name)
                .unwrap_or_else(|| provider_type.default_display_name()),
            id,
            client_id,
            client_secret,
            kind,
        })
    }
}

fn legacy_string(raw: &ConfigMap, key: &str) -> Result<Option<String>, ConfigValidationError> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ConfigValidationError::Malformed(format!(
            "'{}' must be a string, got {}",
            key, other
        ))),
    }
}

fn legacy_entry(raw: &ConfigMap) -> Result<ProviderEntry, ConfigValidationError> {
    let connector_type = legacy_string(raw, "connector_type")?;

    Ok(ProviderEntry {
        // The single legacy provider is identified by its type.
        id: connector_type.clone(),
        provider_type: connector_type,
        name: legacy_string(raw, "connector_name")?,
        client_id: legacy_string(raw, "provider_client_id")?,
        client_secret: legacy_string(raw, "provider_client_secret")?,
        allowed_domain: legacy_string(raw, "allowed_domain")?,
        allowed_org: legacy_string(raw, "allowed_org")?,
        ..Default::default()
    })
}

fn has_legacy_keys(raw: &ConfigMap) -> bool {
    LEGACY_KEYS
        .iter()
        .any(|key| raw.get(*key).is_some_and(|v| !v.is_null()))
}

/// Parse the provider list out of a host configuration map.
///
/// Returns an empty list when neither `providers` nor legacy keys are
/// present. The result has already been [`validate`]d.
pub fn parse(raw: &ConfigMap) -> Result<Vec<ProviderConfig>, ConfigValidationError> {
    let entries: Vec<ProviderEntry> = match raw.get("providers") {
        Some(value) if !value.is_null() => {
            if has_legacy_keys(raw) {
                info!("Both 'providers' and legacy provider keys are set; using 'providers'");
            }
            match value {
                Value::Array(_) => serde_json::from_value(value.clone()),
                Value::String(s) => serde_json::from_str(s),
                other => {
                    return Err(ConfigValidationError::Malformed(format!(
                        "'providers' must be an array, got {}",
                        other
                    )))
                }
            }
            .map_err(|e| ConfigValidationError::Malformed(e.to_string()))?
        }
        _ if has_legacy_keys(raw) => {
            debug!("Using legacy single-provider configuration");
            vec![legacy_entry(raw)?]
        }
        _ => return Ok(Vec::new()),
    };

    let providers = entries
        .into_iter()
        .enumerate()
        .map(|(position, entry)| entry.into_config(position))
        .collect::<Result<Vec<_>, _>>()?;

    validate(&providers)?;
    Ok(providers)
}

/// Parse a document produced by [`serialize`].
pub fn parse_document(document: &str) -> Result<Vec<ProviderConfig>, ConfigValidationError> {
    match serde_json::from_str::<Value>(document) {
        Ok(Value::Object(raw)) => parse(&raw),
        Ok(_) => Err(ConfigValidationError::Malformed(
            "expected a JSON object".to_string(),
        )),
        Err(e) => Err(ConfigValidationError::Malformed(e.to_string())),
    }
}

/// Validate a provider list.
///
/// Checks required fields, the oidc issuer and ID uniqueness. Values that
/// [`parse`] would normalize are rejected too: a blank display name or
/// optional field, and surrounding whitespace on anything but the client
/// secret. Every accepted list therefore survives [`serialize`] followed by
/// [`parse`] unchanged. The first problem found is returned.
pub fn validate(providers: &[ProviderConfig]) -> Result<(), ConfigValidationError> {
    let mut seen = HashSet::new();

    for (position, provider) in providers.iter().enumerate() {
        let missing = |field: &'static str| ConfigValidationError::MissingField {
            provider: if provider.id.trim().is_empty() {
                format!("#{}", position)
            } else {
                provider.id.clone()
            },
            field,
        };

        if provider.id.trim().is_empty() {
            return Err(missing("id"));
        }
        if provider.client_id.trim().is_empty() {
            return Err(missing("client_id"));
        }
        if provider.client_secret.trim().is_empty() {
            return Err(missing("client_secret"));
        }
        if let ProviderKind::Oidc { issuer_url, .. } = &provider.kind {
            if issuer_url.trim().is_empty() {
                return Err(ConfigValidationError::MissingIssuerUrl(provider.id.clone()));
            }
        }
        if provider.display_name.trim().is_empty() {
            return Err(missing("name"));
        }

        let fields = [
            ("id", provider.id.as_str()),
            ("name", provider.display_name.as_str()),
            ("client_id", provider.client_id.as_str()),
        ];
        for (field, value) in fields.into_iter().chain(provider.kind.options()) {
            if value.trim().is_empty() {
                return Err(missing(field));
            }
            if value.trim() != value {
                return Err(ConfigValidationError::Malformed(format!(
                    "provider '{}': '{}' has leading or trailing whitespace",
                    provider.id.trim(),
                    field
                )));
            }
        }

        if !seen.insert(provider.id.as_str()) {
            return Err(ConfigValidationError::DuplicateProviderId(provider.id.clone()));
        }
    }

    Ok(())
}

/// Serialize a provider list as `{"providers":[...]}`.
///
/// Output is deterministic: entry keys are sorted and providers keep their
/// order.
pub fn serialize(providers: &[ProviderConfig]) -> String {
    let entries: Vec<Value> = providers.iter().map(ProviderConfig::to_entry).collect();
    serde_json::json!({ "providers": entries }).to_string()
}

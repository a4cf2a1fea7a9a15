//! Post-login redirect sanitizing.
//!
//! The login entry point accepts `?redirect=<path>` so users land back where
//! they were. That parameter is attacker-controlled, so a target is accepted
//! only if it is a plain relative path matching one of the console's known
//! route shapes. Anything else is dropped silently and the caller falls back
//! to the default route.
//!
//! The whitelist is maintained here by hand and is not derived from the
//! router: adding a route to the console does not make it a redirect target
//! until it is added below.

use regex::{Regex, RegexSet};
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

/// Route used when no acceptable redirect target is available.
pub const DEFAULT_ROUTE: &str = "/dashboard";

/// Query parameter carrying the redirect target.
pub const REDIRECT_PARAM: &str = "redirect";

/// Routes that are never redirect targets (redirecting back to them loops).
const BLOCKED_ROUTES: &[&str] = &["/", "/login", "/logout"];

// Path segment: cluster ids, namespaces, resource plurals and object names.
macro_rules! seg {
    () => {
        r"[A-Za-z0-9][A-Za-z0-9._-]*"
    };
}

// Optional trailing query string. `:` never reaches here (rejected earlier).
macro_rules! query {
    () => {
        r"(?:\?[A-Za-z0-9._~=&%+-]*)?"
    };
}

/// Route shapes a user may be sent back to after login.
const ALLOWED_ROUTES: &[&str] = &[
    // Static top-level pages
    concat!(r"^/(?:dashboard|clusters|settings|profile|users|roles|audit|search)", query!(), "$"),
    // /clusters/{id}
    concat!(r"^/clusters/", seg!(), query!(), "$"),
    // /clusters/{id}/{overview|events|crds}
    concat!(r"^/clusters/", seg!(), r"/(?:overview|events|crds)", query!(), "$"),
    // /clusters/{id}/namespaces/{ns}
    concat!(r"^/clusters/", seg!(), r"/namespaces/", seg!(), query!(), "$"),
    // /clusters/{id}/namespaces/{ns}/{resource}[/{name}]
    concat!(r"^/clusters/", seg!(), r"/namespaces/", seg!(), "/", seg!(), r"(?:/", seg!(), ")?", query!(), "$"),
    // /clusters/{id}/nodes/{name}
    concat!(r"^/clusters/", seg!(), r"/nodes/", seg!(), query!(), "$"),
    // /clusters/{id}/{cluster-scoped resource}[/{name}]
    concat!(r"^/clusters/", seg!(), r"/(?:nodes|namespaces|persistentvolumes|storageclasses|clusterroles|clusterrolebindings)(?:/", seg!(), ")?", query!(), "$"),
    // /crds/{group}/{version}/{resource}[/{name}]
    concat!(r"^/crds/", seg!(), "/", seg!(), "/", seg!(), r"(?:/", seg!(), ")?", query!(), "$"),
    // /clusters/{id}/crds/{group}/{version}/{resource}[/{name}]
    concat!(r"^/clusters/", seg!(), r"/crds/", seg!(), "/", seg!(), "/", seg!(), r"(?:/", seg!(), ")?", query!(), "$"),
    // /clusters/{id}/namespaces/{ns}/crds/{group}/{version}/{resource}[/{name}]
    concat!(r"^/clusters/", seg!(), r"/namespaces/", seg!(), r"/crds/", seg!(), "/", seg!(), "/", seg!(), r"(?:/", seg!(), ")?", query!(), "$"),
];

// A pattern that fails to compile leaves the set empty: every target is rejected.
static ALLOWED: LazyLock<Option<RegexSet>> = LazyLock::new(|| RegexSet::new(ALLOWED_ROUTES).ok());

static ENCODED_DOUBLE_SLASH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)%2f%2f").ok());

// A `%` not followed by two hex digits.
static MALFORMED_ESCAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"%(?:[^0-9A-Fa-f]|[0-9A-Fa-f](?:[^0-9A-Fa-f]|$)|$)").ok());

/// A redirect target that passed validation.
///
/// Always a relative path starting with a single `/`, free of `:` and `\`,
/// and matching a whitelisted route shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RedirectTarget(String);

impl RedirectTarget {
    /// The validated path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the validated path.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RedirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RedirectTarget {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Why a candidate was rejected. Only used for debug logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Empty,
    Undecodable,
    NotRelative,
    SchemeDelimiter,
    ProtocolRelative,
    Backslash,
    EncodedDoubleSlash,
    Blocked,
    NotWhitelisted,
}

/// Validate a redirect candidate.
///
/// Returns the URL-decoded path when it is safe to navigate to, `None`
/// otherwise. Never fails loudly: malformed input is rejected.
///
/// # Example
///
/// ```
/// use console_auth::redirect::validate;
///
/// let target = validate(Some("/clusters/prod-1/namespaces/default/pods")).unwrap();
/// assert_eq!(target.as_str(), "/clusters/prod-1/namespaces/default/pods");
///
/// assert!(validate(Some("javascript:alert(1)")).is_none());
/// assert!(validate(Some("//evil.example.com")).is_none());
/// assert!(validate(None).is_none());
/// ```
pub fn validate(candidate: Option<&str>) -> Option<RedirectTarget> {
    match check(candidate) {
        Ok(path) => Some(RedirectTarget(path)),
        Err(reason) => {
            debug!(?reason, "Rejected redirect target");
            None
        }
    }
}

fn check(candidate: Option<&str>) -> Result<String, Rejection> {
    let raw = candidate.ok_or(Rejection::Empty)?;
    if raw.is_empty() {
        return Err(Rejection::Empty);
    }

    let malformed = MALFORMED_ESCAPE
        .as_ref()
        .map_or(true, |re| re.is_match(raw));
    if malformed {
        return Err(Rejection::Undecodable);
    }
    let decoded = urlencoding::decode(raw).map_err(|_| Rejection::Undecodable)?;

    if !decoded.starts_with('/') {
        return Err(Rejection::NotRelative);
    }
    if decoded.contains(':') {
        return Err(Rejection::SchemeDelimiter);
    }
    if decoded.starts_with("//") {
        return Err(Rejection::ProtocolRelative);
    }
    if decoded.contains('\\') {
        return Err(Rejection::Backslash);
    }

    let encoded_double_slash = ENCODED_DOUBLE_SLASH
        .as_ref()
        .map_or(true, |re| re.is_match(raw));
    if encoded_double_slash {
        return Err(Rejection::EncodedDoubleSlash);
    }

    if BLOCKED_ROUTES.iter().any(|blocked| *blocked == decoded) {
        return Err(Rejection::Blocked);
    }

    let whitelisted = ALLOWED
        .as_ref()
        .map_or(false, |set| set.is_match(&decoded));
    if !whitelisted {
        return Err(Rejection::NotWhitelisted);
    }

    Ok(decoded.into_owned())
}

/// Resolve where to send the user after login.
///
/// The validated candidate, or [`DEFAULT_ROUTE`].
pub fn resolve_target(candidate: Option<&str>) -> String {
    validate(candidate)
        .map(RedirectTarget::into_string)
        .unwrap_or_else(|| DEFAULT_ROUTE.to_string())
}

/// Append `?redirect=<target>` to `base` when worthwhile.
///
/// `base` is returned unchanged when the target fails validation or is the
/// default route (redirecting there is what happens anyway).
///
/// # Example
///
/// ```
/// use console_auth::redirect::create_redirect_url;
///
/// assert_eq!(
///     create_redirect_url("/login", "/clusters/prod-1"),
///     "/login?redirect=%2Fclusters%2Fprod-1",
/// );
/// assert_eq!(create_redirect_url("/login", "/dashboard"), "/login");
/// assert_eq!(create_redirect_url("/login", "https://evil.example"), "/login");
/// ```
pub fn create_redirect_url(base: &str, target: &str) -> String {
    match validate(Some(target)) {
        Some(target) if target.as_str() != DEFAULT_ROUTE => {
            format!(
                "{}?{}={}",
                base,
                REDIRECT_PARAM,
                urlencoding::encode(target.as_str())
            )
        }
        _ => base.to_string(),
    }
}

//! PKCE (RFC 7636) parameters and CSRF state for the authorization-code flow.
//!
//! A login attempt produces a code verifier, its S256 challenge and a random
//! `state`. The verifier and state live in tab-scoped storage until the
//! authorization code is redeemed or the attempt is abandoned.

use crate::storage::{Storage, PKCE_STATE_KEY, PKCE_VERIFIER_KEY};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Random bytes behind a code verifier (43 base64url characters).
pub const VERIFIER_BYTES: usize = 32;

/// Random bytes behind a CSRF state token.
pub const STATE_BYTES: usize = 16;

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a code verifier.
///
/// 32 bytes from the OS CSPRNG, base64url-encoded without padding. The
/// alphabet (`A-Z a-z 0-9 - _`) is a subset of the RFC 7636 unreserved set.
pub fn generate_code_verifier() -> String {
    random_token(VERIFIER_BYTES)
}

/// Derive the S256 code challenge for a verifier.
///
/// Same verifier, same challenge.
///
/// # Example
///
/// ```
/// use console_auth::pkce::generate_code_challenge;
///
/// // RFC 7636 appendix B
/// assert_eq!(
///     generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
///     "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
/// );
/// ```
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a CSRF state token.
///
/// Drawn separately from the verifier so one cannot be derived from the other.
pub fn generate_state() -> String {
    random_token(STATE_BYTES)
}

/// Verifier and state of the login attempt in flight.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PkceParams {
    /// Code verifier, if stored
    pub verifier: Option<String>,
    /// CSRF state, if stored
    pub state: Option<String>,
}

impl std::fmt::Debug for PkceParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceParams")
            .field("verifier", &self.verifier.as_ref().map(|_| "[REDACTED]"))
            .field("state", &self.state.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Tab-scoped store for one login attempt's PKCE parameters.
///
/// Only one attempt is in flight per tab: storing new parameters replaces the
/// previous ones.
#[derive(Clone)]
pub struct PkceStore {
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for PkceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceStore").finish_non_exhaustive()
    }
}

impl PkceStore {
    /// Create a store over tab-scoped storage.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Store the verifier and state of a new login attempt.
    pub fn store_params(&self, verifier: &str, state: &str) {
        self.storage.set(PKCE_VERIFIER_KEY, verifier);
        self.storage.set(PKCE_STATE_KEY, state);
        debug!("Stored PKCE parameters for new login attempt");
    }

    /// Read the stored parameters.
    pub fn params(&self) -> PkceParams {
        PkceParams {
            verifier: self.storage.get(PKCE_VERIFIER_KEY),
            state: self.storage.get(PKCE_STATE_KEY),
        }
    }

    /// Clear both slots.
    ///
    /// Call once the code has been redeemed or the attempt abandoned, so the
    /// verifier cannot be replayed.
    pub fn clear_params(&self) {
        self.storage.remove(PKCE_VERIFIER_KEY);
        self.storage.remove(PKCE_STATE_KEY);
        debug!("Cleared PKCE parameters");
    }

    /// Check the `state` echoed back by the identity provider.
    ///
    /// True only when a state is stored and equals `received` exactly. The
    /// authorization response must be discarded otherwise.
    pub fn validate_state(&self, received: &str) -> bool {
        match self.storage.get(PKCE_STATE_KEY) {
            Some(stored) => constant_time_eq(stored.as_bytes(), received.as_bytes()),
            None => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

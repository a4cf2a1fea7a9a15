//! Named storage slots for credentials and login-flow parameters.
//!
//! The console keeps two kinds of client state: tab-scoped slots that vanish
//! when the tab closes (PKCE verifier and state) and persistent slots that
//! survive reloads (session token and cached user). Both are accessed through
//! the [`Storage`] trait so the flow can be driven against in-memory storage.

use std::collections::HashMap;
use std::sync::RwLock;

/// Tab-scoped slot holding the PKCE code verifier.
pub const PKCE_VERIFIER_KEY: &str = "pkce_code_verifier";

/// Tab-scoped slot holding the CSRF state.
pub const PKCE_STATE_KEY: &str = "pkce_state";

/// Persistent slot holding the bearer credential.
pub const TOKEN_KEY: &str = "auth_token";

/// Persistent slot holding the cached user as JSON.
pub const USER_KEY: &str = "auth_user";

/// String key/value storage.
///
/// Writes replace the previous value of a slot; they never append.
pub trait Storage: Send + Sync {
    /// Read a slot.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a slot.
    fn set(&self, key: &str, value: &str);

    /// Clear a slot. Clearing an empty slot is a no-op.
    fn remove(&self, key: &str);
}

/// In-memory [`Storage`], scoped to the value's lifetime.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.read().map(|slots| slots.len()).unwrap_or_default()
    }

    /// Check if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots.insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots.remove(key);
    }
}

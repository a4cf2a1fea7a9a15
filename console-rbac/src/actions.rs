//! # Actions
//!
//! Well-known actions that can be granted on cluster resources.
//!
//! Permission entries carry their actions as plain strings so that backends
//! can grant verbs this crate does not know about. The variants here are the
//! ones the console's helper checks (`can_read`, `can_write`, ...) ask for.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Actions the console checks for.
///
/// - **Read**: view a resource's details
/// - **Create**: create new instances
/// - **Update**: edit existing instances
/// - **Delete**: remove instances
/// - **Manage**: administer the resource (RBAC bindings, settings)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read/view resource.
    Read,

    /// Create new resource.
    Create,

    /// Update existing resource.
    Update,

    /// Delete resource.
    Delete,

    /// Manage resource.
    ///
    /// Checked on its own; it does not imply the other actions.
    Manage,
}

impl Action {
    /// Get the string representation of the action.
    ///
    /// # Returns
    ///
    /// The action name as it appears in permission entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Manage => "manage",
        }
    }

    /// Parse an action from its permission-entry name.
    ///
    /// Matching is exact; `"READ"` is not `read`.
    ///
    /// # Example
    ///
    /// ```
    /// use console_rbac::actions::Action;
    ///
    /// assert_eq!(Action::parse("read"), Some(Action::Read));
    /// assert_eq!(Action::parse("watch"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|action| action.as_str() == s)
    }

    /// Get all well-known actions.
    pub fn all() -> Vec<Self> {
        vec![
            Action::Read,
            Action::Create,
            Action::Update,
            Action::Delete,
            Action::Manage,
        ]
    }

    /// Actions that count as a write for `can_write`.
    pub fn writes() -> [Self; 3] {
        [Action::Create, Action::Update, Action::Delete]
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for Action {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

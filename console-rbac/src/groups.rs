//! Group-derived permissions.
//!
//! The backend assigns permissions to groups; a session's permission set is
//! the union of the permissions of every group the user belongs to.

use crate::permissions::{Permission, PermissionSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Permissions granted to each group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupPermissions {
    groups: BTreeMap<String, Vec<Permission>>,
}

impl GroupPermissions {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a permission to a group.
    pub fn grant(&mut self, group: impl Into<String>, permission: Permission) {
        self.groups.entry(group.into()).or_default().push(permission);
    }

    /// Builder-style [`grant`](Self::grant).
    pub fn with_grant(mut self, group: impl Into<String>, permission: Permission) -> Self {
        self.grant(group, permission);
        self
    }

    /// Permissions of a single group.
    pub fn group(&self, group: &str) -> &[Permission] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolve the permission set for a user's group memberships.
    ///
    /// Unknown groups contribute nothing. Call again whenever memberships
    /// change; the result is never updated in place.
    pub fn resolve<I, S>(&self, memberships: I) -> PermissionSet
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = PermissionSet::new();
        for group in memberships {
            set.add_all(self.group(group.as_ref()).iter().cloned());
        }
        set
    }
}

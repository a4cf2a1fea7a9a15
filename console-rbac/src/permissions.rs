//! # Permissions
//!
//! Permission entries and the per-session permission set.
//! A permission grants a set of actions on a resource, optionally limited to
//! some clusters and namespaces.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Resource name that matches every resource.
pub const WILDCARD_RESOURCE: &str = "*";

/// A permission grants actions on a resource.
///
/// Permissions can be:
/// - **Global**: `clusters` and `namespaces` are absent, the grant applies everywhere
/// - **Scoped**: limited to the listed clusters and/or namespaces
///
/// The resource `"*"` matches every resource.
///
/// # Example
///
/// ```
/// use console_rbac::permissions::Permission;
///
/// let perm = Permission::new("pods", ["read", "delete"]);
/// assert!(perm.applies_to("pods"));
/// assert!(perm.allows("read"));
/// assert!(!perm.allows("create"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    /// The resource this permission applies to, or `"*"`.
    pub resource: String,

    /// The actions allowed on the resource.
    #[serde(default)]
    pub actions: BTreeSet<String>,

    /// Clusters the grant is limited to. `None` means all clusters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusters: Option<BTreeSet<String>>,

    /// Namespaces the grant is limited to. `None` means all namespaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<BTreeSet<String>>,
}

impl Permission {
    /// Create a new global permission.
    ///
    /// # Arguments
    ///
    /// * `resource` - The resource name, or `"*"`
    /// * `actions` - The actions allowed
    pub fn new<I, S>(resource: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource: resource.into(),
            actions: actions.into_iter().map(Into::into).collect(),
            clusters: None,
            namespaces: None,
        }
    }

    /// Limit the permission to the given clusters.
    pub fn with_clusters<I, S>(mut self, clusters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clusters = Some(clusters.into_iter().map(Into::into).collect());
        self
    }

    /// Limit the permission to the given namespaces.
    pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = Some(namespaces.into_iter().map(Into::into).collect());
        self
    }

    /// Check if this permission covers `resource` (exact or wildcard match).
    pub fn applies_to(&self, resource: &str) -> bool {
        self.resource == WILDCARD_RESOURCE || self.resource == resource
    }

    /// Check if this permission grants `action`.
    pub fn allows(&self, action: &str) -> bool {
        self.actions.contains(action)
    }

    /// Check if the permission's scope includes the cluster and namespace.
    ///
    /// An absent scope list matches everything. A present list matches only
    /// the names it contains; a `None` argument (cluster-scoped object, no
    /// namespace) only matches an absent list.
    pub fn in_scope(&self, cluster: Option<&str>, namespace: Option<&str>) -> bool {
        scope_matches(self.clusters.as_ref(), cluster)
            && scope_matches(self.namespaces.as_ref(), namespace)
    }

    /// Check if this is a wildcard-resource permission.
    pub fn is_wildcard(&self) -> bool {
        self.resource == WILDCARD_RESOURCE
    }

    /// Check if this is a global (unscoped) permission.
    pub fn is_global(&self) -> bool {
        self.clusters.is_none() && self.namespaces.is_none()
    }
}

fn scope_matches(scope: Option<&BTreeSet<String>>, value: Option<&str>) -> bool {
    match (scope, value) {
        (None, _) => true,
        (Some(names), Some(value)) => names.contains(value) || names.contains(WILDCARD_RESOURCE),
        (Some(_), None) => false,
    }
}

/// The permissions loaded for one session.
///
/// Read-only once fetched; rebuilt when the user's groups change.
///
/// # Example
///
/// ```
/// use console_rbac::permissions::{Permission, PermissionSet};
///
/// let mut set = PermissionSet::new();
/// set.add(Permission::new("pods", ["read"]));
/// set.add(Permission::new("deployments", ["read", "update"]));
///
/// assert_eq!(set.len(), 2);
/// assert_eq!(set.for_resource("pods").count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet {
    permissions: Vec<Permission>,
}

impl PermissionSet {
    /// Create a new empty permission set.
    pub fn new() -> Self {
        Self {
            permissions: Vec::new(),
        }
    }

    /// Add a permission to the set.
    pub fn add(&mut self, permission: Permission) {
        self.permissions.push(permission);
    }

    /// Add multiple permissions to the set.
    pub fn add_all<I>(&mut self, permissions: I)
    where
        I: IntoIterator<Item = Permission>,
    {
        self.permissions.extend(permissions);
    }

    /// Merge another permission set into this one.
    pub fn merge(&mut self, other: &PermissionSet) {
        self.permissions.extend(other.permissions.iter().cloned());
    }

    /// Iterate over the permissions covering `resource`, including wildcards.
    pub fn for_resource<'a>(&'a self, resource: &'a str) -> impl Iterator<Item = &'a Permission> {
        self.permissions
            .iter()
            .filter(move |perm| perm.applies_to(resource))
    }

    /// Iterate over all permissions.
    pub fn iter(&self) -> std::slice::Iter<'_, Permission> {
        self.permissions.iter()
    }

    /// Get the count of permissions.
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self {
            permissions: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PermissionSet {
    type Item = &'a Permission;
    type IntoIter = std::slice::Iter<'a, Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.permissions.iter()
    }
}

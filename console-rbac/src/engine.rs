//! # Permission Engine
//!
//! Answers "may this user do X to resource Y" for the console's routes and
//! buttons. Checks are pure functions of the user's admin flag, the loaded
//! permission set, the resource and the action.

use crate::actions::Action;
use crate::permissions::PermissionSet;

/// Evaluate a single resource/action check.
///
/// Administrators are always allowed. Everyone else needs a permission whose
/// resource is `resource` or `"*"` and whose actions include `action`.
///
/// # Example
///
/// ```
/// use console_rbac::engine::can;
/// use console_rbac::permissions::{Permission, PermissionSet};
///
/// let set: PermissionSet = vec![Permission::new("pods", ["read"])].into_iter().collect();
///
/// assert!(can(false, &set, "pods", "read"));
/// assert!(!can(false, &set, "pods", "delete"));
/// assert!(can(true, &PermissionSet::new(), "secrets", "delete"));
/// ```
pub fn can(is_admin: bool, permissions: &PermissionSet, resource: &str, action: &str) -> bool {
    if is_admin {
        return true;
    }

    permissions
        .for_resource(resource)
        .any(|perm| perm.allows(action))
}

/// Permission checks for one session.
///
/// Holds the admin flag and the permission set already loaded for the
/// session. Nothing is cached beyond that set.
#[derive(Debug, Clone, Default)]
pub struct PermissionEngine {
    is_admin: bool,
    permissions: PermissionSet,
}

impl PermissionEngine {
    /// Create an engine for a user.
    pub fn new(is_admin: bool, permissions: PermissionSet) -> Self {
        Self {
            is_admin,
            permissions,
        }
    }

    /// Create an engine for an administrator.
    pub fn admin() -> Self {
        Self::new(true, PermissionSet::new())
    }

    /// Whether the admin bypass is active.
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// The permission set backing the checks.
    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    /// Check a resource/action pair.
    pub fn can(&self, resource: &str, action: impl AsRef<str>) -> bool {
        can(self.is_admin, &self.permissions, resource, action.as_ref())
    }

    /// Check a resource/action pair against a cluster and namespace.
    ///
    /// Like [`can`](Self::can), but a permission only counts when its
    /// `clusters`/`namespaces` scope includes the target.
    pub fn can_in(
        &self,
        resource: &str,
        action: impl AsRef<str>,
        cluster: Option<&str>,
        namespace: Option<&str>,
    ) -> bool {
        if self.is_admin {
            return true;
        }

        let action = action.as_ref();
        self.permissions
            .for_resource(resource)
            .any(|perm| perm.allows(action) && perm.in_scope(cluster, namespace))
    }

    /// True when the user holds any action at all on the resource.
    pub fn can_view(&self, resource: &str) -> bool {
        if self.is_admin {
            return true;
        }

        self.permissions
            .for_resource(resource)
            .any(|perm| !perm.actions.is_empty())
    }

    /// Check the `read` action.
    pub fn can_read(&self, resource: &str) -> bool {
        self.can(resource, Action::Read)
    }

    /// Check the `create` action.
    pub fn can_create(&self, resource: &str) -> bool {
        self.can(resource, Action::Create)
    }

    /// Check the `update` action.
    pub fn can_update(&self, resource: &str) -> bool {
        self.can(resource, Action::Update)
    }

    /// Check the `delete` action.
    pub fn can_delete(&self, resource: &str) -> bool {
        self.can(resource, Action::Delete)
    }

    /// True when any of create, update or delete is allowed.
    pub fn can_write(&self, resource: &str) -> bool {
        Action::writes()
            .iter()
            .any(|action| self.can(resource, action))
    }

    /// Check the `manage` action.
    pub fn can_manage(&self, resource: &str) -> bool {
        self.can(resource, Action::Manage)
    }
}

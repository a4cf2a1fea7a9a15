//! # Console RBAC
//!
//! Permission checks for the cluster console's routes and actions.
//!
//! ## Overview
//!
//! The console-rbac crate handles:
//! - **Permissions**: a resource (or `"*"`) plus the actions granted on it,
//!   optionally scoped to clusters and namespaces
//! - **Permission Sets**: everything loaded for one session
//! - **Groups**: resolving a user's group memberships into a permission set
//! - **Engine**: `can(resource, action)` with an unconditional admin bypass
//!
//! ## Usage
//!
//! ```rust
//! use console_rbac::{GroupPermissions, Permission, PermissionEngine};
//!
//! let groups = GroupPermissions::new()
//!     .with_grant("devs", Permission::new("pods", ["read"]));
//!
//! let engine = PermissionEngine::new(false, groups.resolve(["devs"]));
//! assert!(engine.can("pods", "read"));
//! assert!(!engine.can("pods", "delete"));
//!
//! // Administrators bypass the permission set entirely.
//! assert!(PermissionEngine::admin().can_delete("pods"));
//! ```
//!
//! ## Derived checks
//!
//! - `can_view`: any action on the resource
//! - `can_read` / `can_create` / `can_update` / `can_delete`: single actions
//! - `can_write`: create, update or delete
//! - `can_manage`: the `manage` action only; it implies nothing else

pub mod actions;
pub mod engine;
pub mod groups;
pub mod permissions;

// Re-export main types for convenience
pub use actions::Action;
pub use engine::{can, PermissionEngine};
pub use groups::GroupPermissions;
pub use permissions::{Permission, PermissionSet, WILDCARD_RESOURCE};

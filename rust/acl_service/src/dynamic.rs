//! Dynamic authorities: authorities a user holds only relative to a node.

use std::sync::Arc;

use acl_core::reference::PermissionReference;
use acl_core::types::{NodeRef, LOCK_OWNER_AUTHORITY, OWNER_AUTHORITY};
use acl_core::PermissionModel;
use ahash::AHashSet;

use crate::error::Result;
use crate::store::{LockService, OwnableService};

/// Permission groups the lock owner is considered for.
const LOCK_OWNER_PERMISSIONS: &[&str] = &["Unlock", "CheckIn", "CancelCheckOut"];

pub trait DynamicAuthority: Send + Sync {
    /// The authority name granted, e.g. `ROLE_OWNER`.
    fn authority(&self) -> &str;

    /// Whether `user` holds the authority on `node`.
    fn has_authority(&self, node: &NodeRef, user: &str) -> Result<bool>;

    /// Permissions this authority is evaluated for; `None` means all.
    fn required_for(&self) -> Option<&AHashSet<PermissionReference>>;
}

/// The node's owner holds `ROLE_OWNER`.
pub struct OwnerDynamicAuthority {
    ownable: Arc<dyn OwnableService>,
}

impl OwnerDynamicAuthority {
    pub fn new(ownable: Arc<dyn OwnableService>) -> Self {
        Self { ownable }
    }
}

impl DynamicAuthority for OwnerDynamicAuthority {
    fn authority(&self) -> &str {
        OWNER_AUTHORITY
    }

    fn has_authority(&self, node: &NodeRef, user: &str) -> Result<bool> {
        Ok(self.ownable.owner(node)?.as_deref() == Some(user))
    }

    fn required_for(&self) -> Option<&AHashSet<PermissionReference>> {
        None
    }
}

/// The user holding the lock on a node holds `ROLE_LOCK_OWNER`, considered
/// only for unlock and check-in style permissions.
pub struct LockOwnerDynamicAuthority {
    locks: Arc<dyn LockService>,
    required_for: AHashSet<PermissionReference>,
}

impl LockOwnerDynamicAuthority {
    pub fn new(locks: Arc<dyn LockService>, model: &PermissionModel) -> Self {
        let required_for = LOCK_OWNER_PERMISSIONS
            .iter()
            .filter_map(|name| model.permission_reference(None, name))
            .flat_map(|p| model.grantee_permissions(p).iter().copied())
            .collect();
        Self {
            locks,
            required_for,
        }
    }
}

impl DynamicAuthority for LockOwnerDynamicAuthority {
    fn authority(&self) -> &str {
        LOCK_OWNER_AUTHORITY
    }

    fn has_authority(&self, node: &NodeRef, user: &str) -> Result<bool> {
        Ok(self.locks.lock_owner(node)?.as_deref() == Some(user))
    }

    fn required_for(&self) -> Option<&AHashSet<PermissionReference>> {
        Some(&self.required_for)
    }
}

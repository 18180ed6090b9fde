//! Collaborator traits consumed by the permission service.
//!
//! Node storage, permission storage and directory lookups live outside this
//! crate. Every method returns [`Result`] and failures propagate unmodified
//! through evaluation. [`crate::memory::MemoryRepository`] implements all of
//! them for tests and the CLI.

use acl_core::reference::PermissionReference;
use acl_core::types::{
    AccessControlList, AccessControlListProperties, AclId, NodePermissionEntry, NodeRef, StoreRef,
};
use ahash::AHashSet;

use crate::error::Result;

/// Read access to the node tree.
pub trait NodeService: Send + Sync {
    fn exists(&self, node: &NodeRef) -> Result<bool>;

    /// Type QName of the node.
    fn node_type(&self, node: &NodeRef) -> Result<String>;

    /// Aspect QNames applied to the node.
    fn aspects(&self, node: &NodeRef) -> Result<AHashSet<String>>;

    /// `None` for a store root.
    fn primary_parent(&self, node: &NodeRef) -> Result<Option<NodeRef>>;

    fn children(&self, node: &NodeRef) -> Result<Vec<NodeRef>>;

    /// Id of the transaction that last changed the node, `None` when unknown.
    fn node_status(&self, node: &NodeRef) -> Result<Option<u64>>;

    /// ACL attached to the node, `None` for nodes on per-node storage.
    fn node_acl_id(&self, node: &NodeRef) -> Result<Option<AclId>>;

    /// The live node a version-store node was frozen from; `None` when it
    /// cannot be determined.
    fn frozen_node_ref(&self, node: &NodeRef) -> Result<Option<NodeRef>>;
}

/// Storage of permission entries, per node and per store.
pub trait PermissionsDao: Send + Sync {
    /// Entries set directly on `node`; `None` when nothing was ever set.
    fn get_permissions(&self, node: &NodeRef) -> Result<Option<NodePermissionEntry>>;

    fn get_store_permissions(&self, store: &StoreRef) -> Result<Option<NodePermissionEntry>>;

    /// Properties of the ACL governing `node`; `None` for per-node storage.
    fn acl_properties(&self, node: &NodeRef) -> Result<Option<AccessControlListProperties>>;

    fn set_permission(
        &self,
        node: &NodeRef,
        authority: &str,
        permission: PermissionReference,
        allow: bool,
    ) -> Result<()>;

    fn set_store_permission(
        &self,
        store: &StoreRef,
        authority: &str,
        permission: PermissionReference,
        allow: bool,
    ) -> Result<()>;

    fn delete_permission(
        &self,
        node: &NodeRef,
        authority: &str,
        permission: PermissionReference,
    ) -> Result<()>;

    fn delete_store_permission(
        &self,
        store: &StoreRef,
        authority: &str,
        permission: PermissionReference,
    ) -> Result<()>;

    /// Remove every entry set on `node`.
    fn delete_permissions(&self, node: &NodeRef) -> Result<()>;

    fn delete_store_permissions(&self, store: &StoreRef) -> Result<()>;

    /// Remove every entry for `authority` on `node`.
    fn delete_permissions_for_authority(&self, node: &NodeRef, authority: &str) -> Result<()>;

    fn delete_store_permissions_for_authority(&self, store: &StoreRef, authority: &str)
        -> Result<()>;

    /// Remove every entry for `authority` across the repository.
    fn delete_all_for_authority(&self, authority: &str) -> Result<()>;

    fn set_inherit_parent_permissions(&self, node: &NodeRef, inherit: bool) -> Result<()>;

    fn get_inherit_parent_permissions(&self, node: &NodeRef) -> Result<bool>;
}

/// Lookup of ACLs by id.
pub trait AclDao: Send + Sync {
    fn access_control_list(&self, acl_id: AclId) -> Result<Option<AccessControlList>>;
}

/// Directory of users and groups.
pub trait AuthorityService: Send + Sync {
    /// Every authority `user` belongs to, transitively (groups, roles).
    fn authorities_for_user(&self, user: &str) -> Result<AHashSet<String>>;
}

pub trait OwnableService: Send + Sync {
    fn owner(&self, node: &NodeRef) -> Result<Option<String>>;
}

pub trait LockService: Send + Sync {
    /// User holding the lock on `node`, if any.
    fn lock_owner(&self, node: &NodeRef) -> Result<Option<String>>;
}

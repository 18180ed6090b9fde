//! Change notification for permission mutations.
//!
//! Listeners are bound to a class QName and fire for nodes of that class or
//! any sub-class. Dispatch is synchronous, in binding order, after the write
//! has reached the DAO and the access cache has been cleared.

use std::sync::Arc;

use acl_core::types::NodeRef;
use acl_core::PermissionModel;
use ahash::AHashMap;
use parking_lot::RwLock;

/// Callbacks for permission changes. Every method defaults to a no-op.
pub trait PermissionPolicy: Send + Sync {
    /// An entry was set on `node`. `permission` is the local name.
    fn on_grant_local_permission(&self, _node: &NodeRef, _authority: &str, _permission: &str) {}

    /// One entry was removed from `node`, or all of them when both
    /// `authority` and `permission` are `None`.
    fn on_revoke_local_permission(
        &self,
        _node: &NodeRef,
        _authority: Option<&str>,
        _permission: Option<&str>,
    ) {
    }

    fn on_inherit_permissions_enabled(&self, _node: &NodeRef) {}

    /// `async_call` is set when the caller asked for the change to be
    /// propagated in the background.
    fn on_inherit_permissions_disabled(&self, _node: &NodeRef, _async_call: bool) {}
}

#[derive(Default)]
pub struct PolicyRegistry {
    bindings: RwLock<AHashMap<String, Vec<Arc<dyn PermissionPolicy>>>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `policy` to `class` and its sub-classes.
    pub fn bind(&self, class: impl Into<String>, policy: Arc<dyn PermissionPolicy>) {
        let class = class.into();
        tracing::debug!(class = %class, "binding permission policy");
        self.bindings.write().entry(class).or_default().push(policy);
    }

    /// Listeners for a node of `class`, most specific binding first.
    pub fn listeners(
        &self,
        model: &PermissionModel,
        class: &str,
    ) -> Vec<Arc<dyn PermissionPolicy>> {
        let bindings = self.bindings.read();
        model
            .class_chain(class)
            .into_iter()
            .filter_map(|c| bindings.get(c))
            .flatten()
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

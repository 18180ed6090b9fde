//! Permission evaluation strategies.
//!
//! - [`NodeTest`] walks legacy per-node entries up the primary-parent chain,
//!   composing node, parent and children requirements.
//! - [`AclTest`] evaluates the flat entry list of one ACL; it cannot express
//!   parent or children requirements.
//! - [`UnconditionalAclTest`] / [`UnconditionalDeniedAclTest`] evaluate a
//!   single authority against an ACL ignoring type and aspects, to build
//!   reader sets.
//!
//! All strategies share the deny/grant algebra of [`acl_core::rules`].

mod acl_test;
mod unconditional;

pub use acl_test::AclTest;
pub use node_test::NodeTest;
pub use unconditional::{UnconditionalAclTest, UnconditionalDeniedAclTest};

use acl_core::reference::PermissionReference;
use acl_core::rules::{AuthorityPermissionSet, GrantRule};
use acl_core::types::{AccessControlEntry, AccessStatus, NodeRef};
use acl_core::PermissionModel;
use ahash::AHashSet;

use crate::cache::AccessCache;
use crate::error::{PermissionError, Result};
use crate::store::{AclDao, NodeService, PermissionsDao};
use crate::tenant::TenantService;

/// Full permission check on a child node, as required by a children
/// requirement. Implemented by the service, which owns authority resolution.
pub trait ChildAccess {
    fn child_permission(
        &self,
        child: &NodeRef,
        permission: PermissionReference,
        depth: usize,
    ) -> Result<bool>;
}

/// Result of one node-test evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub granted: bool,
    /// The required permission was found on this node or an ancestor.
    pub resolved: bool,
}

impl Outcome {
    pub const DENIED: Outcome = Outcome {
        granted: false,
        resolved: false,
    };
}

/// Everything an evaluation reads from. Cheap to build per check.
pub struct Engine<'a> {
    pub model: &'a PermissionModel,
    pub nodes: &'a dyn NodeService,
    pub permissions: &'a dyn PermissionsDao,
    pub acls: &'a dyn AclDao,
    pub tenant: &'a dyn TenantService,
    pub cache: &'a AccessCache,
    pub children: &'a dyn ChildAccess,
    pub any_deny_denies: bool,
    pub max_depth: usize,
}

impl Engine<'_> {
    /// Every permission applicable to `node`.
    pub fn node_permissions(&self, node: &NodeRef) -> Result<AHashSet<PermissionReference>> {
        let type_qname = self.nodes.node_type(node)?;
        let aspects = self.nodes.aspects(node)?;
        Ok(self.model.all_permissions(&type_qname, &aspects))
    }

    /// Node requirements use FullControl's when ALL_PERMISSIONS is required.
    fn node_requirement_basis(&self, required: PermissionReference) -> PermissionReference {
        if required == self.model.all_permission_reference() {
            self.model.full_control_reference()
        } else {
            required
        }
    }

    fn depth_exceeded(&self, depth: usize, permission: PermissionReference) -> bool {
        if depth <= self.max_depth {
            return false;
        }
        tracing::warn!(
            permission = %self.model.permission_name(permission),
            depth,
            max_depth = self.max_depth,
            "evaluation depth limit reached, denying"
        );
        true
    }
}

/// First-match scan of ACL entries for an entry of `target` access.
///
/// Entries of the opposite access are expanded into a veto set as they are
/// met, so only entries earlier in the list veto. A `target` entry matches
/// when `holds` accepts its authority, its permission is one of the rule's
/// granters, and its authority was not vetoed for the required permission.
fn first_match<H, F>(
    model: &PermissionModel,
    rule: &GrantRule,
    entries: &[AccessControlEntry],
    target: AccessStatus,
    holds: H,
    mut all_scope: F,
) -> bool
where
    H: Fn(&str) -> bool,
    F: FnMut() -> AHashSet<PermissionReference>,
{
    let mut vetoed = AuthorityPermissionSet::new();
    for ace in entries {
        if ace.access != target {
            vetoed.insert_expanded(model, &ace.authority, ace.permission, &mut all_scope);
            continue;
        }
        if vetoed.contains(&ace.authority, rule.required()) {
            continue;
        }
        if holds(&ace.authority) && rule.is_granter(ace.permission) {
            return true;
        }
    }
    false
}

/// Parent and children requirements cannot be expressed against one ACL.
fn reject_structural_requirements(
    parent: &AHashSet<PermissionReference>,
    children: &AHashSet<PermissionReference>,
) -> Result<()> {
    if !parent.is_empty() {
        return Err(PermissionError::IllegalState(
            "parent permissions can not be checked for an acl".to_string(),
        ));
    }
    if !children.is_empty() {
        return Err(PermissionError::IllegalState(
            "child permissions can not be checked for an acl".to_string(),
        ));
    }
    Ok(())
}

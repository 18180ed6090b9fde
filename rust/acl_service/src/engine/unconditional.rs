use acl_core::reference::PermissionReference;
use acl_core::rules::GrantRule;
use acl_core::types::{AccessStatus, AclId, RequiredOn};
use ahash::AHashSet;

use super::{first_match, reject_structural_requirements, Engine};
use crate::error::Result;

/// Shared shape of the two single-authority tests: they differ only in which
/// access an entry must carry to match.
struct Unconditional<'a> {
    engine: &'a Engine<'a>,
    rule: GrantRule,
    node_requirements: AHashSet<PermissionReference>,
    target: AccessStatus,
}

impl<'a> Unconditional<'a> {
    fn new(
        engine: &'a Engine<'a>,
        required: PermissionReference,
        target: AccessStatus,
    ) -> Result<Self> {
        let model = engine.model;
        reject_structural_requirements(
            &model.unconditional_required_permissions(required, RequiredOn::Parent),
            &model.unconditional_required_permissions(required, RequiredOn::Children),
        )?;
        let basis = engine.node_requirement_basis(required);
        Ok(Self {
            engine,
            rule: GrantRule::new(model, required, false),
            node_requirements: model.unconditional_required_permissions(basis, RequiredOn::Node),
            target,
        })
    }

    fn evaluate(&self, authority: &str, acl_id: Option<AclId>, depth: usize) -> Result<bool> {
        let engine = self.engine;
        if engine.depth_exceeded(depth, self.rule.required()) {
            return Ok(false);
        }
        if !self.matches_globally(authority) && !self.matches_acl(authority, acl_id)? {
            return Ok(false);
        }
        for requirement in &self.node_requirements {
            let nested = Unconditional::new(engine, *requirement, self.target)?;
            if !nested.evaluate(authority, acl_id, depth + 1)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matches_globally(&self, authority: &str) -> bool {
        self.engine
            .model
            .global_permission_entries()
            .iter()
            .any(|entry| {
                entry.access == self.target
                    && entry.authority == authority
                    && self.rule.is_granter(entry.permission)
            })
    }

    fn matches_acl(&self, authority: &str, acl_id: Option<AclId>) -> Result<bool> {
        let Some(acl_id) = acl_id else {
            return Ok(false);
        };
        let Some(acl) = self.engine.acls.access_control_list(acl_id)? else {
            return Ok(false);
        };
        let model = self.engine.model;
        Ok(first_match(
            model,
            &self.rule,
            &acl.entries,
            self.target,
            |entry_authority| entry_authority == authority,
            || model.all_permissions_everywhere(),
        ))
    }
}

/// Whether one authority is granted a permission by an ACL, independent of
/// any node type or aspects. Used to materialise reader sets.
pub struct UnconditionalAclTest<'a>(Unconditional<'a>);

impl<'a> UnconditionalAclTest<'a> {
    pub fn new(engine: &'a Engine<'a>, required: PermissionReference) -> Result<Self> {
        Unconditional::new(engine, required, AccessStatus::Allowed).map(Self)
    }

    pub fn evaluate(&self, authority: &str, acl_id: Option<AclId>) -> Result<bool> {
        self.0.evaluate(authority, acl_id, 0)
    }
}

/// Mirror of [`UnconditionalAclTest`]: whether one authority is denied a
/// permission by an ACL, with earlier grants shadowing later denials.
pub struct UnconditionalDeniedAclTest<'a>(Unconditional<'a>);

impl<'a> UnconditionalDeniedAclTest<'a> {
    pub fn new(engine: &'a Engine<'a>, required: PermissionReference) -> Result<Self> {
        Unconditional::new(engine, required, AccessStatus::Denied).map(Self)
    }

    pub fn evaluate(&self, authority: &str, acl_id: Option<AclId>) -> Result<bool> {
        self.0.evaluate(authority, acl_id, 0)
    }
}

use acl_core::reference::PermissionReference;
use acl_core::rules::{Authorities, GrantRule};
use acl_core::types::{AccessStatus, AclId, PermissionContext, RequiredOn};
use ahash::AHashSet;

use super::{first_match, reject_structural_requirements, Engine};
use crate::error::Result;

/// Test of one permission against a single ACL.
///
/// Type and aspects come from the [`PermissionContext`]; ALL_PERMISSIONS
/// denials and grants cover the permissions applicable to them.
pub struct AclTest<'a> {
    engine: &'a Engine<'a>,
    rule: GrantRule,
    context: &'a PermissionContext,
    node_requirements: AHashSet<PermissionReference>,
}

impl<'a> AclTest<'a> {
    /// Fails with `IllegalState` when `required` has parent or children
    /// requirements for the context's type and aspects.
    pub fn new(
        engine: &'a Engine<'a>,
        required: PermissionReference,
        context: &'a PermissionContext,
    ) -> Result<Self> {
        let model = engine.model;
        let (type_qname, aspects) = (context.type_qname(), context.aspects());
        reject_structural_requirements(
            &model.required_permissions(required, type_qname, aspects, RequiredOn::Parent),
            &model.required_permissions(required, type_qname, aspects, RequiredOn::Children),
        )?;
        let basis = engine.node_requirement_basis(required);
        Ok(Self {
            engine,
            // Any-deny vetoes are applied by a separate pass over the entries.
            rule: GrantRule::new(model, required, false),
            context,
            node_requirements: model.required_permissions(
                basis,
                type_qname,
                aspects,
                RequiredOn::Node,
            ),
        })
    }

    pub fn evaluate(
        &self,
        authorities: &Authorities,
        acl_id: AclId,
        depth: usize,
    ) -> Result<bool> {
        let engine = self.engine;
        let required = self.rule.required();
        if engine.depth_exceeded(depth, required) {
            return Ok(false);
        }

        if engine.model.check_permission(required)
            && !self.rule.is_globally_granted(engine.model, authorities)
            && !self.check_required(authorities, acl_id)?
        {
            return Ok(false);
        }

        for requirement in &self.node_requirements {
            let nested = AclTest::new(engine, *requirement, self.context)?;
            if !nested.evaluate(authorities, acl_id, depth + 1)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn check_required(&self, authorities: &Authorities, acl_id: AclId) -> Result<bool> {
        let engine = self.engine;
        let Some(acl) = engine.acls.access_control_list(acl_id)? else {
            return Ok(false);
        };
        let model = engine.model;
        let scope = || model.all_permissions(self.context.type_qname(), self.context.aspects());
        let held = |authority: &str| authorities.contains(authority);

        // An unvetoed deny for any acting authority wins over every grant.
        if engine.any_deny_denies
            && first_match(model, &self.rule, &acl.entries, AccessStatus::Denied, held, scope)
        {
            return Ok(false);
        }
        Ok(first_match(model, &self.rule, &acl.entries, AccessStatus::Allowed, held, scope))
    }
}

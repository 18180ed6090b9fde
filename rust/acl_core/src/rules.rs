//! Deny/grant algebra shared by every evaluation strategy.
//!
//! A deny entry for `(authority, p)` vetoes `authority` for every permission
//! that grants `p` and every permission `p` grants. A deny of ALL_PERMISSIONS
//! additionally vetoes every permission in the evaluation scope (the node's
//! permissions, the context type's, or the whole model's).

use ahash::{AHashMap, AHashSet};

use crate::model::PermissionModel;
use crate::reference::PermissionReference;
use crate::types::{AccessStatus, PermissionEntry};

/// Authorities acting in one evaluation.
pub type Authorities = AHashSet<String>;

/// A set of `(authority, permission)` pairs, indexed by permission.
#[derive(Debug, Clone, Default)]
pub struct AuthorityPermissionSet {
    pairs: AHashMap<PermissionReference, AHashSet<String>>,
}

impl AuthorityPermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, authority: &str, permission: PermissionReference) {
        let holders = self.pairs.entry(permission).or_default();
        if !holders.contains(authority) {
            holders.insert(authority.to_string());
        }
    }

    pub fn contains(&self, authority: &str, permission: PermissionReference) -> bool {
        self.pairs
            .get(&permission)
            .is_some_and(|holders| holders.contains(authority))
    }

    /// Whether any of `authorities` is paired with `permission`.
    pub fn contains_any(&self, authorities: &Authorities, permission: PermissionReference) -> bool {
        self.pairs
            .get(&permission)
            .is_some_and(|holders| holders.iter().any(|a| authorities.contains(a)))
    }

    pub fn extend(&mut self, other: &AuthorityPermissionSet) {
        for (permission, holders) in &other.pairs {
            self.pairs
                .entry(*permission)
                .or_default()
                .extend(holders.iter().cloned());
        }
    }

    /// Record `(authority, permission)` expanded through the model.
    ///
    /// `all_scope` supplies the permissions a grant or deny of ALL_PERMISSIONS
    /// covers; it is only called for that case.
    pub fn insert_expanded<F>(
        &mut self,
        model: &PermissionModel,
        authority: &str,
        permission: PermissionReference,
        all_scope: F,
    ) where
        F: FnOnce() -> AHashSet<PermissionReference>,
    {
        self.insert(authority, permission);
        for granter in model.granting_permissions(permission) {
            self.insert(authority, *granter);
        }
        for grantee in model.grantee_permissions(permission) {
            self.insert(authority, *grantee);
        }
        if permission == model.all_permission_reference() {
            for covered in all_scope() {
                self.insert(authority, covered);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of distinct pairs.
    pub fn len(&self) -> usize {
        self.pairs.values().map(|permissions| permissions.len()).sum()
    }
}

/// Deny expansion of a list of entries: every DENY entry, expanded.
pub fn denied_by<'a, I, F>(
    model: &PermissionModel,
    entries: I,
    mut all_scope: F,
) -> AuthorityPermissionSet
where
    I: IntoIterator<Item = &'a PermissionEntry>,
    F: FnMut() -> AHashSet<PermissionReference>,
{
    let mut denied = AuthorityPermissionSet::new();
    for entry in entries {
        if entry.is_denied() {
            denied.insert_expanded(model, &entry.authority, entry.permission, &mut all_scope);
        }
    }
    denied
}

/// Grant test for one required permission.
///
/// Holds the granters of `required`: every permission whose grant implies it,
/// plus ALL_PERMISSIONS.
#[derive(Debug, Clone)]
pub struct GrantRule {
    required: PermissionReference,
    granters: AHashSet<PermissionReference>,
    any_deny_denies: bool,
}

impl GrantRule {
    pub fn new(
        model: &PermissionModel,
        required: PermissionReference,
        any_deny_denies: bool,
    ) -> Self {
        let mut granters = model.granting_permissions(required).clone();
        granters.insert(required);
        granters.insert(model.all_permission_reference());
        Self {
            required,
            granters,
            any_deny_denies,
        }
    }

    pub fn required(&self) -> PermissionReference {
        self.required
    }

    pub fn granters(&self) -> &AHashSet<PermissionReference> {
        &self.granters
    }

    pub fn is_granter(&self, permission: PermissionReference) -> bool {
        self.granters.contains(&permission)
    }

    /// An ALLOW entry grants when it names one of `authorities` and one of the
    /// granters, unless `denied` vetoes it.
    ///
    /// The veto is specific to the entry's authority; with any-deny-denies a
    /// deny recorded for any acting authority vetoes as well.
    pub fn is_granted(
        &self,
        authority: &str,
        permission: PermissionReference,
        access: AccessStatus,
        authorities: &Authorities,
        denied: Option<&AuthorityPermissionSet>,
    ) -> bool {
        if access == AccessStatus::Denied {
            return false;
        }
        if let Some(denied) = denied {
            if denied.contains(authority, self.required) {
                return false;
            }
            if self.any_deny_denies && self.vetoed(authorities, denied) {
                return false;
            }
        }
        authorities.contains(authority) && self.granters.contains(&permission)
    }

    /// Single-authority form used when materialising reader sets.
    pub fn is_granted_to(
        &self,
        authority: &str,
        permission: PermissionReference,
        access: AccessStatus,
        entry_authority: &str,
        denied: Option<&AuthorityPermissionSet>,
    ) -> bool {
        if access == AccessStatus::Denied {
            return false;
        }
        if denied.is_some_and(|d| d.contains(entry_authority, self.required)) {
            return false;
        }
        authority == entry_authority && self.granters.contains(&permission)
    }

    /// Model-wide entries grant without any deny veto.
    pub fn is_globally_granted(&self, model: &PermissionModel, authorities: &Authorities) -> bool {
        model.global_permission_entries().iter().any(|entry| {
            entry.is_allowed()
                && self.granters.contains(&entry.permission)
                && authorities.contains(&entry.authority)
        })
    }

    /// Single-authority form of [`is_globally_granted`](Self::is_globally_granted).
    pub fn is_globally_granted_to(&self, model: &PermissionModel, authority: &str) -> bool {
        model.global_permission_entries().iter().any(|entry| {
            entry.is_allowed()
                && self.granters.contains(&entry.permission)
                && entry.authority == authority
        })
    }

    fn vetoed(&self, authorities: &Authorities, denied: &AuthorityPermissionSet) -> bool {
        denied.contains_any(authorities, self.required)
            || self
                .granters
                .iter()
                .any(|granter| denied.contains_any(authorities, *granter))
    }
}

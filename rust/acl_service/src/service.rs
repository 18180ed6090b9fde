//! The permission service: entry points, authority resolution, caching and
//! mutation with change notification.

use std::collections::BTreeSet;
use std::sync::Arc;

use acl_core::reference::PermissionReference;
use acl_core::rules::Authorities;
use acl_core::types::{
    AccessPermission, AccessStatus, AclId, AclType, NodePermissionEntry, NodeRef,
    PermissionContext, PermissionScope, StoreRef, ADMINISTRATOR_AUTHORITY, FULL_CONTROL,
    LOCK_OWNER_AUTHORITY, OWNER_AUTHORITY, READ,
};
use acl_core::PermissionModel;
use ahash::AHashSet;

use crate::auth::{self, Authentication};
use crate::cache::{AccessCache, AccessKey, CacheStats, CacheType, ReadersCache};
use crate::config::ServiceConfig;
use crate::dynamic::{DynamicAuthority, LockOwnerDynamicAuthority, OwnerDynamicAuthority};
use crate::engine::{
    AclTest, ChildAccess, Engine, NodeTest, UnconditionalAclTest, UnconditionalDeniedAclTest,
};
use crate::error::{PermissionError, Result};
use crate::memory::MemoryRepository;
use crate::policy::{PermissionPolicy, PolicyRegistry};
use crate::store::{
    AclDao, AuthorityService, NodeService, OwnableService, PermissionsDao,
};
use crate::tenant::{SingleTenant, TenantService};

// ============================================================================
// Builder
// ============================================================================

/// Collects collaborators for a [`PermissionService`].
pub struct PermissionServiceBuilder {
    model: Arc<PermissionModel>,
    config: ServiceConfig,
    nodes: Option<Arc<dyn NodeService>>,
    permissions: Option<Arc<dyn PermissionsDao>>,
    acls: Option<Arc<dyn AclDao>>,
    authorities: Option<Arc<dyn AuthorityService>>,
    ownable: Option<Arc<dyn OwnableService>>,
    tenant: Arc<dyn TenantService>,
    dynamic_authorities: Vec<Arc<dyn DynamicAuthority>>,
}

impl PermissionServiceBuilder {
    pub fn node_service(mut self, nodes: Arc<dyn NodeService>) -> Self {
        self.nodes = Some(nodes);
        self
    }

    pub fn permissions_dao(mut self, permissions: Arc<dyn PermissionsDao>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn acl_dao(mut self, acls: Arc<dyn AclDao>) -> Self {
        self.acls = Some(acls);
        self
    }

    pub fn authority_service(mut self, authorities: Arc<dyn AuthorityService>) -> Self {
        self.authorities = Some(authorities);
        self
    }

    pub fn ownable_service(mut self, ownable: Arc<dyn OwnableService>) -> Self {
        self.ownable = Some(ownable);
        self
    }

    /// Defaults to [`SingleTenant`].
    pub fn tenant_service(mut self, tenant: Arc<dyn TenantService>) -> Self {
        self.tenant = tenant;
        self
    }

    pub fn dynamic_authority(mut self, authority: Arc<dyn DynamicAuthority>) -> Self {
        self.dynamic_authorities.push(authority);
        self
    }

    pub fn build(self) -> Result<PermissionService> {
        let missing = |what: &str| PermissionError::IllegalState(format!("no {} configured", what));
        let read = self
            .model
            .permission_reference(None, READ)
            .ok_or_else(|| PermissionError::UnknownPermission(READ.to_string()))?;
        let force_has_permission = forces_full_read_check(&self.model, &self.dynamic_authorities);

        let service = PermissionService {
            nodes: self.nodes.ok_or_else(|| missing("node service"))?,
            permissions: self.permissions.ok_or_else(|| missing("permissions dao"))?,
            acls: self.acls.ok_or_else(|| missing("acl dao"))?,
            authorities: self.authorities.ok_or_else(|| missing("authority service"))?,
            ownable: self.ownable.ok_or_else(|| missing("ownable service"))?,
            tenant: self.tenant,
            dynamic_authorities: self.dynamic_authorities,
            policies: PolicyRegistry::new(),
            access_cache: AccessCache::new(self.config.access_cache_max_entries),
            readers_cache: ReadersCache::new(self.config.readers_cache_capacity),
            readers_denied_cache: ReadersCache::new(self.config.readers_cache_capacity),
            read,
            force_has_permission,
            model: self.model,
            config: self.config,
        };
        tracing::info!(
            permissions = service.model.len(),
            dynamic_authorities = service.dynamic_authorities.len(),
            any_deny_denies = service.config.any_deny_denies,
            force_has_permission,
            "permission service ready"
        );
        Ok(service)
    }
}

/// A dynamic authority other than the built-in ones that applies to Read or
/// FullControl makes the reader-set shortcut unsound.
fn forces_full_read_check(
    model: &PermissionModel,
    dynamic_authorities: &[Arc<dyn DynamicAuthority>],
) -> bool {
    let wide: Vec<PermissionReference> = [FULL_CONTROL, READ]
        .iter()
        .filter_map(|name| model.permission_reference(None, name))
        .collect();
    dynamic_authorities.iter().any(|da| {
        let builtin = [OWNER_AUTHORITY, ADMINISTRATOR_AUTHORITY, LOCK_OWNER_AUTHORITY]
            .contains(&da.authority());
        !builtin
            && da
                .required_for()
                .map_or(true, |required| wide.iter().any(|p| required.contains(p)))
    })
}

// ============================================================================
// Service
// ============================================================================

pub struct PermissionService {
    model: Arc<PermissionModel>,
    config: ServiceConfig,
    nodes: Arc<dyn NodeService>,
    permissions: Arc<dyn PermissionsDao>,
    acls: Arc<dyn AclDao>,
    authorities: Arc<dyn AuthorityService>,
    ownable: Arc<dyn OwnableService>,
    tenant: Arc<dyn TenantService>,
    dynamic_authorities: Vec<Arc<dyn DynamicAuthority>>,
    policies: PolicyRegistry,
    access_cache: AccessCache,
    readers_cache: ReadersCache,
    readers_denied_cache: ReadersCache,
    read: PermissionReference,
    force_has_permission: bool,
}

impl PermissionService {
    pub fn builder(model: Arc<PermissionModel>, config: ServiceConfig) -> PermissionServiceBuilder {
        PermissionServiceBuilder {
            model,
            config,
            nodes: None,
            permissions: None,
            acls: None,
            authorities: None,
            ownable: None,
            tenant: Arc::new(SingleTenant),
            dynamic_authorities: Vec::new(),
        }
    }

    /// A service over `repo` with the owner and lock-owner dynamic
    /// authorities registered.
    pub fn in_memory(
        model: Arc<PermissionModel>,
        config: ServiceConfig,
        repo: Arc<MemoryRepository>,
    ) -> Result<Self> {
        let lock_owner = LockOwnerDynamicAuthority::new(repo.clone(), &model);
        Self::builder(model, config)
            .node_service(repo.clone())
            .permissions_dao(repo.clone())
            .acl_dao(repo.clone())
            .authority_service(repo.clone())
            .ownable_service(repo.clone())
            .dynamic_authority(Arc::new(OwnerDynamicAuthority::new(repo)))
            .dynamic_authority(Arc::new(lock_owner))
            .build()
    }

    pub fn model(&self) -> &PermissionModel {
        &self.model
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Listeners notified of permission changes.
    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    pub fn bind_policy(&self, class: &str, policy: Arc<dyn PermissionPolicy>) {
        self.policies.bind(class, policy);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.access_cache.stats()
    }

    /// Logical primary parent of `node`.
    pub(crate) fn primary_parent(&self, node: &NodeRef) -> Result<Option<NodeRef>> {
        let parent = self.nodes.primary_parent(&self.tenant.name(node))?;
        Ok(parent.map(|p| self.tenant.base_name(&p)))
    }

    fn engine(&self) -> Engine<'_> {
        Engine {
            model: self.model.as_ref(),
            nodes: self.nodes.as_ref(),
            permissions: self.permissions.as_ref(),
            acls: self.acls.as_ref(),
            tenant: self.tenant.as_ref(),
            cache: &self.access_cache,
            children: self,
            any_deny_denies: self.config.any_deny_denies,
            max_depth: self.config.max_evaluation_depth,
        }
    }

    fn is_system_user(&self, username: &str) -> bool {
        username == self.config.system_user_name
    }

    // ========================================================================
    // Permission names
    // ========================================================================

    /// Resolve a bare or `qname.name` permission name.
    pub fn permission_reference(&self, name: &str) -> Option<PermissionReference> {
        self.model.permission_reference(None, name)
    }

    pub fn permission_reference_in(&self, qname: &str, name: &str) -> Option<PermissionReference> {
        self.model.permission_reference(Some(qname), name)
    }

    pub fn all_permission_reference(&self) -> PermissionReference {
        self.model.all_permission_reference()
    }

    /// Bare name when unique in the model, `qname.name` otherwise.
    pub fn permission_name(&self, permission: PermissionReference) -> String {
        self.model.permission_name(permission)
    }

    fn require_permission(&self, name: &str) -> Result<PermissionReference> {
        self.permission_reference(name)
            .ok_or_else(|| PermissionError::UnknownPermission(name.to_string()))
    }

    // ========================================================================
    // Authorities
    // ========================================================================

    /// Authorities of the current authentication, without dynamic ones.
    pub fn get_authorisations(&self) -> Result<Authorities> {
        match auth::current() {
            Some(authentication) => self.core_authorisations(&authentication),
            None => Ok(Authorities::new()),
        }
    }

    /// The user, its groups and roles, and the authorities granted at login.
    fn core_authorisations(&self, authentication: &Authentication) -> Result<Authorities> {
        let mut authorities = self
            .authorities
            .authorities_for_user(&authentication.username)?;
        authorities.insert(authentication.username.clone());
        authorities.extend(authentication.granted_authorities.iter().cloned());
        Ok(authorities)
    }

    /// Dynamic authorities `username` holds on `node` for `permission`.
    fn dynamic_authorities_for(
        &self,
        username: &str,
        node: &NodeRef,
        permission: PermissionReference,
    ) -> Result<Vec<String>> {
        let node = self.tenant.name(node);
        let mut held = Vec::new();
        for da in &self.dynamic_authorities {
            let applies = da
                .required_for()
                .map_or(true, |required| required.contains(&permission));
            if applies && da.has_authority(&node, username)? {
                held.push(da.authority().to_string());
            }
        }
        Ok(held)
    }

    fn node_authorisations(
        &self,
        authentication: &Authentication,
        node: &NodeRef,
        permission: PermissionReference,
    ) -> Result<Authorities> {
        let mut authorities = self.core_authorisations(authentication)?;
        authorities.extend(self.dynamic_authorities_for(
            &authentication.username,
            node,
            permission,
        )?);
        Ok(authorities)
    }

    /// Core authorities plus the context's assignments for any of them.
    fn context_authorisations(
        &self,
        authentication: &Authentication,
        context: &PermissionContext,
    ) -> Result<Authorities> {
        let mut authorities = self.core_authorisations(authentication)?;
        let assigned: Vec<String> = context
            .dynamic_authority_assignments()
            .iter()
            .filter(|(holder, _)| authorities.contains(holder.as_str()))
            .flat_map(|(_, dynamic)| dynamic.iter().cloned())
            .collect();
        authorities.extend(assigned);
        Ok(authorities)
    }

    // ========================================================================
    // Node checks
    // ========================================================================

    /// Whether the current user has `permission` on `node`.
    ///
    /// No node is ALLOWED; an unknown permission name is DENIED.
    pub fn has_permission(&self, node: Option<&NodeRef>, permission: &str) -> Result<AccessStatus> {
        let Some(node) = node else {
            return Ok(AccessStatus::Allowed);
        };
        match self.permission_reference(permission) {
            Some(reference) => self.check_node(node, reference, 0),
            None => Ok(AccessStatus::Denied),
        }
    }

    pub fn has_permission_ref(
        &self,
        node: Option<&NodeRef>,
        permission: PermissionReference,
    ) -> Result<AccessStatus> {
        match node {
            Some(node) => self.check_node(node, permission, 0),
            None => Ok(AccessStatus::Allowed),
        }
    }

    fn check_node(
        &self,
        node: &NodeRef,
        permission: PermissionReference,
        depth: usize,
    ) -> Result<AccessStatus> {
        let live = if node.store.is_version_store() {
            match self.nodes.frozen_node_ref(node)? {
                Some(live) => live,
                None => return Ok(AccessStatus::Allowed),
            }
        } else {
            node.clone()
        };
        let node = self.tenant.name(&live);
        if !self.nodes.exists(&node)? {
            return Ok(AccessStatus::Allowed);
        }

        let Some(authentication) = auth::current() else {
            return Ok(AccessStatus::Denied);
        };
        if self.is_system_user(&authentication.username) {
            return Ok(AccessStatus::Allowed);
        }

        if let Some(properties) = self.permissions.acl_properties(&node)? {
            if properties.acl_type != AclType::Old {
                let mut context = PermissionContext::new(self.nodes.node_type(&node)?)
                    .with_aspects(self.nodes.aspects(&node)?);
                let username = &authentication.username;
                for dynamic in self.dynamic_authorities_for(username, &node, permission)? {
                    context.add_dynamic_authority_assignment(username.as_str(), dynamic);
                }
                return self.check_acl(Some(properties.id), &context, Some(permission));
            }
        }

        let authorities = self.node_authorisations(&authentication, &node, permission)?;
        let type_qname = self.nodes.node_type(&node)?;
        let aspects = self.nodes.aspects(&node)?;
        let key = AccessKey::new(
            permission,
            &authorities,
            &node,
            self.nodes.node_status(&node)?,
            CacheType::HasPermission,
        );

        let mut available = self.model.all_permissions(&type_qname, &aspects);
        available.insert(self.model.all_permission_reference());
        if !available.contains(&permission) {
            self.access_cache.put(key, AccessStatus::Denied);
            return Ok(AccessStatus::Denied);
        }

        if let Some(status) = self.access_cache.get(&key) {
            tracing::trace!(node = %node, "permission cache hit");
            return Ok(status);
        }

        let engine = self.engine();
        let test = NodeTest::new(&engine, permission, &type_qname, &aspects);
        let status = AccessStatus::from_allowed(test.evaluate(&authorities, &node, depth)?);
        tracing::debug!(
            permission = %self.model.permission_name(permission),
            user = %authentication.username,
            node = %node,
            status = %status,
            "permission evaluated"
        );
        self.access_cache.put(key, status);
        Ok(status)
    }

    // ========================================================================
    // ACL checks
    // ========================================================================

    /// Whether the current user has `permission` under ACL `acl_id`, for a
    /// node described by `context`.
    pub fn has_acl_permission(
        &self,
        acl_id: Option<AclId>,
        context: &PermissionContext,
        permission: &str,
    ) -> Result<AccessStatus> {
        self.check_acl(acl_id, context, self.permission_reference(permission))
    }

    fn check_acl(
        &self,
        acl_id: Option<AclId>,
        context: &PermissionContext,
        permission: Option<PermissionReference>,
    ) -> Result<AccessStatus> {
        let Some(acl_id) = acl_id else {
            return self.check_store_acl_only(context, permission);
        };
        let Some(permission) = permission else {
            return Ok(AccessStatus::Denied);
        };
        let Some(authentication) = auth::current() else {
            return Ok(AccessStatus::Denied);
        };
        if self.is_system_user(&authentication.username) {
            return Ok(AccessStatus::Allowed);
        }

        let authorities = self.context_authorisations(&authentication, context)?;
        let mut available = self.model.all_permissions(context.type_qname(), context.aspects());
        available.insert(self.model.all_permission_reference());
        if !available.contains(&permission) {
            return Ok(self.admin_fallback(&authorities, context, permission));
        }

        let engine = self.engine();
        let test = AclTest::new(&engine, permission, context)?;
        let mut granted = test.evaluate(&authorities, acl_id, 0)?;
        if granted {
            if let Some(store_acl) = context.store_acl() {
                let store_authorities = self.core_authorisations(&authentication)?;
                granted = test.evaluate(&store_authorities, store_acl, 0)?;
            }
        }
        let status = AccessStatus::from_allowed(granted);
        tracing::debug!(
            permission = %self.model.permission_name(permission),
            user = %authentication.username,
            acl_id,
            status = %status,
            "acl permission evaluated"
        );
        Ok(status)
    }

    /// No node ACL: only a store ACL, if any, can restrict.
    fn check_store_acl_only(
        &self,
        context: &PermissionContext,
        permission: Option<PermissionReference>,
    ) -> Result<AccessStatus> {
        let Some(store_acl) = context.store_acl() else {
            return Ok(AccessStatus::Allowed);
        };
        let Some(permission) = permission else {
            return Ok(AccessStatus::Denied);
        };
        let authentication = auth::current().ok_or(PermissionError::Unauthenticated)?;
        if self.is_system_user(&authentication.username) {
            return Ok(AccessStatus::Allowed);
        }
        let store_authorities = self.core_authorisations(&authentication)?;
        let engine = self.engine();
        let test = AclTest::new(&engine, permission, context)?;
        Ok(AccessStatus::from_allowed(test.evaluate(
            &store_authorities,
            store_acl,
            0,
        )?))
    }

    /// A permission not applicable to the node's type is still ALLOWED to
    /// administrators when the base type declares it.
    fn admin_fallback(
        &self,
        authorities: &Authorities,
        context: &PermissionContext,
        permission: PermissionReference,
    ) -> AccessStatus {
        let on_base = self
            .model
            .all_permissions(self.model.base_type(), context.aspects());
        AccessStatus::from_allowed(
            on_base.contains(&permission) && authorities.contains(&self.config.admin_role_name),
        )
    }

    // ========================================================================
    // Read fast path
    // ========================================================================

    /// Read check through the ACL's materialised reader set.
    ///
    /// Falls back to a full Read check for nodes without an ACL, or when a
    /// registered dynamic authority could grant Read.
    pub fn has_read_permission(&self, node: Option<&NodeRef>) -> Result<AccessStatus> {
        let Some(node) = node else {
            return Ok(AccessStatus::Allowed);
        };
        let actual = self.tenant.name(node);
        if !self.nodes.exists(&actual)? {
            return Ok(AccessStatus::Allowed);
        }
        let Some(authentication) = auth::current() else {
            return Ok(AccessStatus::Denied);
        };
        if self.is_system_user(&authentication.username) {
            return Ok(AccessStatus::Allowed);
        }
        if self.force_has_permission {
            return self.check_node(node, self.read, 0);
        }
        let Some(acl_id) = self.nodes.node_acl_id(&actual)? else {
            return self.check_node(node, self.read, 0);
        };

        let authorities = self.core_authorisations(&authentication)?;
        let allowed = self.can_read(acl_id, &authorities)?
            || authorities.contains(&self.config.admin_role_name)
            || self.ownable.owner(&actual)?.as_deref() == Some(authentication.username.as_str());
        Ok(AccessStatus::from_allowed(allowed))
    }

    fn can_read(&self, acl_id: AclId, authorities: &Authorities) -> Result<bool> {
        if self.config.any_deny_denies
            && self
                .get_readers_denied(acl_id)?
                .iter()
                .any(|a| authorities.contains(a))
        {
            return Ok(false);
        }
        Ok(self
            .get_readers(acl_id)?
            .iter()
            .any(|a| authorities.contains(a)))
    }

    /// Authorities granted Read by ACL `acl_id`. Empty for an unknown ACL.
    pub fn get_readers(&self, acl_id: AclId) -> Result<Arc<AHashSet<String>>> {
        let engine = self.engine();
        let test = UnconditionalAclTest::new(&engine, self.read)?;
        self.reader_set(acl_id, &self.readers_cache, |authority| {
            test.evaluate(authority, Some(acl_id))
        })
    }

    /// Authorities denied Read by ACL `acl_id`. Empty for an unknown ACL.
    pub fn get_readers_denied(&self, acl_id: AclId) -> Result<Arc<AHashSet<String>>> {
        let engine = self.engine();
        let test = UnconditionalDeniedAclTest::new(&engine, self.read)?;
        self.reader_set(acl_id, &self.readers_denied_cache, |authority| {
            test.evaluate(authority, Some(acl_id))
        })
    }

    fn reader_set(
        &self,
        acl_id: AclId,
        cache: &ReadersCache,
        mut qualifies: impl FnMut(&str) -> Result<bool>,
    ) -> Result<Arc<AHashSet<String>>> {
        let Some(acl) = self.acls.access_control_list(acl_id)? else {
            return Ok(Arc::new(AHashSet::new()));
        };
        if let Some(cached) = cache.get(&acl.properties) {
            return Ok(cached);
        }
        let assigned: AHashSet<&str> = acl.entries.iter().map(|e| e.authority.as_str()).collect();
        let mut matched = AHashSet::new();
        for authority in assigned {
            if qualifies(authority)? {
                matched.insert(authority.to_string());
            }
        }
        let matched = Arc::new(matched);
        cache.put(acl.properties, matched.clone());
        Ok(matched)
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// The current user's status for every settable permission on `node`.
    pub fn get_permissions(&self, node: &NodeRef) -> Result<Vec<AccessPermission>> {
        let username = auth::current_user().unwrap_or_default();
        let mut out = Vec::new();
        for permission in self.settable_references(node)? {
            out.push(AccessPermission {
                permission: self.permission_name(permission),
                access: self.check_node(node, permission, 0)?,
                authority: username.clone(),
                position: -1,
            });
        }
        out.sort_by(|a, b| a.permission.cmp(&b.permission));
        Ok(out)
    }

    /// Entries set directly on `node`, rendered.
    pub fn get_all_set_permissions(&self, node: &NodeRef) -> Result<Vec<AccessPermission>> {
        Ok(self.render_entries(&self.get_set_permissions(node)?))
    }

    pub fn get_all_set_store_permissions(&self, store: &StoreRef) -> Result<Vec<AccessPermission>> {
        Ok(self.render_entries(&self.get_set_store_permissions(store)?))
    }

    /// Entries set directly on `node`; empty when none were ever set.
    pub fn get_set_permissions(&self, node: &NodeRef) -> Result<NodePermissionEntry> {
        let node = self.tenant.name(node);
        Ok(self
            .permissions
            .get_permissions(&node)?
            .unwrap_or_else(|| NodePermissionEntry::empty(PermissionScope::Node(node))))
    }

    pub fn get_set_store_permissions(&self, store: &StoreRef) -> Result<NodePermissionEntry> {
        Ok(self
            .permissions
            .get_store_permissions(store)?
            .unwrap_or_else(|| NodePermissionEntry::empty(PermissionScope::Store(store.clone()))))
    }

    fn render_entries(&self, set: &NodePermissionEntry) -> Vec<AccessPermission> {
        set.entries
            .iter()
            .map(|entry| AccessPermission {
                permission: self.permission_name(entry.permission),
                access: entry.access,
                authority: entry.authority.clone(),
                position: entry.position,
            })
            .collect()
    }

    /// Names of the permissions users may set on `node`.
    pub fn get_settable_permissions(&self, node: &NodeRef) -> Result<BTreeSet<String>> {
        Ok(self
            .settable_references(node)?
            .into_iter()
            .map(|p| self.permission_name(p))
            .collect())
    }

    /// Names of the permissions users may set on nodes of `type_qname`.
    pub fn get_settable_permissions_for_type(&self, type_qname: &str) -> BTreeSet<String> {
        self.model
            .exposed_permissions(type_qname, &AHashSet::new())
            .into_iter()
            .map(|p| self.permission_name(p))
            .collect()
    }

    fn settable_references(&self, node: &NodeRef) -> Result<AHashSet<PermissionReference>> {
        let node = self.tenant.name(node);
        let type_qname = self.nodes.node_type(&node)?;
        let aspects = self.nodes.aspects(&node)?;
        Ok(self.model.exposed_permissions(&type_qname, &aspects))
    }

    // ========================================================================
    // Node mutations
    // ========================================================================

    pub fn set_permission(
        &self,
        node: &NodeRef,
        authority: &str,
        permission: &str,
        allow: bool,
    ) -> Result<()> {
        let reference = self.require_permission(permission)?;
        self.set_permission_ref(node, authority, reference, allow)
    }

    pub fn set_permission_ref(
        &self,
        node: &NodeRef,
        authority: &str,
        permission: PermissionReference,
        allow: bool,
    ) -> Result<()> {
        let actual = self.tenant.name(node);
        self.permissions
            .set_permission(&actual, authority, permission, allow)?;
        self.access_cache.clear();
        tracing::info!(
            node = %actual,
            authority,
            permission = %self.permission_name(permission),
            allow,
            "permission set"
        );
        let name = self.model.registry().name(permission);
        // A deny revokes as far as listeners are concerned.
        for listener in self.listeners_for(&actual)? {
            if allow {
                listener.on_grant_local_permission(node, authority, name);
            } else {
                listener.on_revoke_local_permission(node, Some(authority), Some(name));
            }
        }
        Ok(())
    }

    pub fn delete_permission(
        &self,
        node: &NodeRef,
        authority: &str,
        permission: &str,
    ) -> Result<()> {
        let reference = self.require_permission(permission)?;
        let actual = self.tenant.name(node);
        self.permissions
            .delete_permission(&actual, authority, reference)?;
        self.access_cache.clear();
        tracing::info!(node = %actual, authority, permission, "permission deleted");
        let name = self.model.registry().name(reference);
        for listener in self.listeners_for(&actual)? {
            listener.on_revoke_local_permission(node, Some(authority), Some(name));
        }
        Ok(())
    }

    /// Remove every entry set on `node`.
    pub fn delete_permissions(&self, node: &NodeRef) -> Result<()> {
        let actual = self.tenant.name(node);
        self.permissions.delete_permissions(&actual)?;
        self.access_cache.clear();
        tracing::info!(node = %actual, "permissions deleted");
        for listener in self.listeners_for(&actual)? {
            listener.on_revoke_local_permission(node, None, None);
        }
        Ok(())
    }

    /// Remove every entry for `authority` on `node`.
    pub fn clear_permission(&self, node: &NodeRef, authority: &str) -> Result<()> {
        let actual = self.tenant.name(node);
        self.permissions
            .delete_permissions_for_authority(&actual, authority)?;
        self.access_cache.clear();
        tracing::info!(node = %actual, authority, "permissions cleared for authority");
        Ok(())
    }

    /// Remove every entry for `authority` across the repository.
    pub fn delete_permissions_for_authority(&self, authority: &str) -> Result<()> {
        self.permissions.delete_all_for_authority(authority)?;
        self.access_cache.clear();
        tracing::info!(authority, "permissions deleted for authority");
        Ok(())
    }

    pub fn set_inherit_parent_permissions(&self, node: &NodeRef, inherit: bool) -> Result<()> {
        self.set_inherit_parent_permissions_with(node, inherit, false)
    }

    /// As [`set_inherit_parent_permissions`](Self::set_inherit_parent_permissions);
    /// `async_call` is forwarded to inherit-disabled listeners.
    pub fn set_inherit_parent_permissions_with(
        &self,
        node: &NodeRef,
        inherit: bool,
        async_call: bool,
    ) -> Result<()> {
        let actual = self.tenant.name(node);
        self.permissions
            .set_inherit_parent_permissions(&actual, inherit)?;
        self.access_cache.clear();
        tracing::info!(node = %actual, inherit, async_call, "inheritance changed");
        for listener in self.policies.listeners(&self.model, self.model.base_type()) {
            if inherit {
                listener.on_inherit_permissions_enabled(node);
            } else {
                listener.on_inherit_permissions_disabled(node, async_call);
            }
        }
        Ok(())
    }

    pub fn get_inherit_parent_permissions(&self, node: &NodeRef) -> Result<bool> {
        self.permissions
            .get_inherit_parent_permissions(&self.tenant.name(node))
    }

    fn listeners_for(&self, node: &NodeRef) -> Result<Vec<Arc<dyn PermissionPolicy>>> {
        if self.policies.is_empty() {
            return Ok(Vec::new());
        }
        let type_qname = self.nodes.node_type(node)?;
        Ok(self.policies.listeners(&self.model, &type_qname))
    }

    // ========================================================================
    // Store mutations
    // ========================================================================

    pub fn set_store_permission(
        &self,
        store: &StoreRef,
        authority: &str,
        permission: &str,
        allow: bool,
    ) -> Result<()> {
        let reference = self.require_permission(permission)?;
        self.permissions
            .set_store_permission(store, authority, reference, allow)?;
        self.access_cache.clear();
        tracing::info!(store = %store, authority, permission, allow, "store permission set");
        Ok(())
    }

    pub fn delete_store_permission(
        &self,
        store: &StoreRef,
        authority: &str,
        permission: &str,
    ) -> Result<()> {
        let reference = self.require_permission(permission)?;
        self.permissions
            .delete_store_permission(store, authority, reference)?;
        self.access_cache.clear();
        tracing::info!(store = %store, authority, permission, "store permission deleted");
        Ok(())
    }

    pub fn delete_store_permissions(&self, store: &StoreRef) -> Result<()> {
        self.permissions.delete_store_permissions(store)?;
        self.access_cache.clear();
        tracing::info!(store = %store, "store permissions deleted");
        Ok(())
    }

    pub fn clear_store_permission(&self, store: &StoreRef, authority: &str) -> Result<()> {
        self.permissions
            .delete_store_permissions_for_authority(store, authority)?;
        self.access_cache.clear();
        tracing::info!(store = %store, authority, "store permissions cleared for authority");
        Ok(())
    }

    // ========================================================================
    // Node-structure hooks
    // ========================================================================

    /// A node moved: inherited verdicts below it may have changed.
    pub fn on_move_node(&self, node: &NodeRef) {
        tracing::debug!(node = %node, "node moved, clearing access cache");
        self.access_cache.clear();
    }

    /// A member was added to an authority container.
    pub fn on_create_child_association(&self, container: &NodeRef) {
        tracing::debug!(container = %container, "membership added, clearing access cache");
        self.access_cache.clear();
    }

    /// A member is about to be removed from an authority container.
    pub fn before_delete_child_association(&self, container: &NodeRef) {
        tracing::debug!(container = %container, "membership removed, clearing access cache");
        self.access_cache.clear();
    }
}

impl ChildAccess for PermissionService {
    fn child_permission(
        &self,
        child: &NodeRef,
        permission: PermissionReference,
        depth: usize,
    ) -> Result<bool> {
        Ok(self.check_node(child, permission, depth)?.is_allowed())
    }
}

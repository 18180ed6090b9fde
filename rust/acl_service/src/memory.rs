// =============================================================================
// In-memory repository: every collaborator trait over one locked state
// =============================================================================
//
// Backs the test suites and the `acl-eval` binary. Nodes either carry
// per-node entries or point at an ACL; writes to a node bump its change
// transaction, writes to an ACL bump the ACL's version. ACLs are flat: no
// entries are ever copied from a parent's ACL into a child's.

use acl_core::reference::PermissionReference;
use acl_core::types::{
    AccessControlEntry, AccessControlList, AccessControlListProperties, AccessStatus, AclId,
    AclType, NodePermissionEntry, NodeRef, PermissionEntry, PermissionScope, StoreRef,
    ALL_AUTHORITIES,
};
use acl_core::PermissionModel;
use ahash::{AHashMap, AHashSet};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Deserialize;

use crate::error::{PermissionError, Result};
use crate::store::{
    AclDao, AuthorityService, LockService, NodeService, OwnableService, PermissionsDao,
};

/// Store new nodes land in unless told otherwise.
pub const DEFAULT_STORE: &str = "workspace://SpacesStore";

pub fn default_store() -> StoreRef {
    StoreRef::new("workspace", "SpacesStore")
}

// =============================================================================
// Node specification
// =============================================================================

/// Builder for [`MemoryRepository::add_node`].
#[derive(Debug, Clone)]
pub struct NodeSpec {
    id: Option<String>,
    store: Option<StoreRef>,
    node_type: String,
    parent: Option<NodeRef>,
    aspects: AHashSet<String>,
    owner: Option<String>,
    lock_owner: Option<String>,
    acl: Option<AclId>,
    frozen_from: Option<NodeRef>,
}

impl NodeSpec {
    /// A store root of `node_type`.
    pub fn root(node_type: impl Into<String>) -> Self {
        Self {
            id: None,
            store: None,
            node_type: node_type.into(),
            parent: None,
            aspects: AHashSet::new(),
            owner: None,
            lock_owner: None,
            acl: None,
            frozen_from: None,
        }
    }

    /// A child of `parent`, in the parent's store.
    pub fn child_of(parent: &NodeRef, node_type: impl Into<String>) -> Self {
        Self {
            store: Some(parent.store.clone()),
            parent: Some(parent.clone()),
            ..Self::root(node_type)
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn in_store(mut self, store: StoreRef) -> Self {
        self.store = Some(store);
        self
    }

    pub fn aspect(mut self, aspect: impl Into<String>) -> Self {
        self.aspects.insert(aspect.into());
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn lock_owner(mut self, user: impl Into<String>) -> Self {
        self.lock_owner = Some(user.into());
        self
    }

    /// Govern the node by `acl` instead of per-node entries.
    pub fn acl(mut self, acl: AclId) -> Self {
        self.acl = Some(acl);
        self
    }

    /// Mark the node as a frozen copy of `live`.
    pub fn frozen_from(mut self, live: &NodeRef) -> Self {
        self.frozen_from = Some(live.clone());
        self
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone)]
struct NodeRecord {
    node_type: String,
    aspects: AHashSet<String>,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
    change_txn: u64,
    acl: Option<AclId>,
    owner: Option<String>,
    lock_owner: Option<String>,
    frozen_from: Option<NodeRef>,
    entries: Option<NodePermissionEntry>,
}

#[derive(Debug, Default)]
struct State {
    nodes: AHashMap<NodeRef, NodeRecord>,
    acls: AHashMap<AclId, AccessControlList>,
    stores: AHashMap<StoreRef, NodePermissionEntry>,
    memberships: AHashMap<String, AHashSet<String>>,
    txn: u64,
    next_node: u64,
    next_acl: AclId,
    unavailable: bool,
}

impl State {
    fn next_txn(&mut self) -> u64 {
        self.txn += 1;
        self.txn
    }

    fn node(&self, node: &NodeRef) -> Result<&NodeRecord> {
        self.nodes
            .get(node)
            .ok_or_else(|| PermissionError::NodeNotFound(node.clone()))
    }

    fn node_mut(&mut self, node: &NodeRef) -> Result<&mut NodeRecord> {
        let txn = self.next_txn();
        let record = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| PermissionError::NodeNotFound(node.clone()))?;
        record.change_txn = txn;
        Ok(record)
    }

    fn acl_mut(&mut self, acl_id: AclId) -> Result<&mut AccessControlList> {
        let acl = self
            .acls
            .get_mut(&acl_id)
            .ok_or_else(|| PermissionError::Store(format!("no acl with id {}", acl_id)))?;
        acl.properties.version += 1;
        Ok(acl)
    }
}

/// Where a node's entries live.
enum Target {
    Acl(AclId),
    Entries,
}

fn retain_entries(
    entries: &mut Vec<PermissionEntry>,
    keep: impl Fn(&str, PermissionReference) -> bool,
) {
    entries.retain(|e| keep(&e.authority, e.permission));
}

fn retain_aces(
    entries: &mut Vec<AccessControlEntry>,
    keep: impl Fn(&str, PermissionReference) -> bool,
) {
    entries.retain(|e| keep(&e.authority, e.permission));
}

fn upsert_entry(
    set: &mut NodePermissionEntry,
    authority: &str,
    permission: PermissionReference,
    allow: bool,
) {
    retain_entries(&mut set.entries, |a, p| !(a == authority && p == permission));
    set.entries.push(PermissionEntry {
        scope: set.scope.clone(),
        authority: authority.to_string(),
        permission,
        access: AccessStatus::from_allowed(allow),
        position: 0,
    });
}

// =============================================================================
// Repository
// =============================================================================

/// Every collaborator trait over one locked state.
///
/// An ACL holds only the entries written to it. Parent entries are never
/// copied into a child's ACL, so on an ACL node the inherit flag is stored
/// and reported but evaluation sees the node's own list alone. Legacy nodes
/// without an ACL inherit through the parent walk as usual.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        let state = self.state.read();
        if state.unavailable {
            return Err(PermissionError::Store("repository unavailable".to_string()));
        }
        Ok(state)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        let state = self.state.write();
        if state.unavailable {
            return Err(PermissionError::Store("repository unavailable".to_string()));
        }
        Ok(state)
    }

    /// Make every collaborator call fail with a store error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }

    /// Insert a node. An unknown parent is recorded but not linked.
    pub fn add_node(&self, spec: NodeSpec) -> NodeRef {
        let mut state = self.state.write();
        let txn = state.next_txn();
        state.next_node += 1;
        let id = spec
            .id
            .unwrap_or_else(|| format!("node-{}", state.next_node));
        let store = spec.store.unwrap_or_else(default_store);
        let node = NodeRef::new(store, id);
        if let Some(parent) = spec.parent.as_ref().and_then(|p| state.nodes.get_mut(p)) {
            parent.children.push(node.clone());
        }
        state.nodes.insert(
            node.clone(),
            NodeRecord {
                node_type: spec.node_type,
                aspects: spec.aspects,
                parent: spec.parent,
                children: Vec::new(),
                change_txn: txn,
                acl: spec.acl,
                owner: spec.owner,
                lock_owner: spec.lock_owner,
                frozen_from: spec.frozen_from,
                entries: None,
            },
        );
        node
    }

    /// A new, empty defining ACL.
    pub fn create_acl(&self) -> AclId {
        let mut state = self.state.write();
        state.next_acl += 1;
        let id = state.next_acl;
        state.acls.insert(
            id,
            AccessControlList {
                properties: AccessControlListProperties {
                    id,
                    acl_id: format!("acl-{}", id),
                    version: 1,
                    acl_type: AclType::Defining,
                    inherits: true,
                    latest: true,
                    versioned: false,
                    change_set: None,
                },
                entries: Vec::new(),
            },
        );
        id
    }

    /// Append an entry to `acl_id`, replacing one for the same pair.
    pub fn add_acl_entry(
        &self,
        acl_id: AclId,
        authority: &str,
        permission: PermissionReference,
        allow: bool,
    ) -> Result<()> {
        let mut state = self.write()?;
        let acl = state.acl_mut(acl_id)?;
        retain_aces(&mut acl.entries, |a, p| !(a == authority && p == permission));
        acl.entries.push(AccessControlEntry {
            authority: authority.to_string(),
            permission,
            access: AccessStatus::from_allowed(allow),
            position: 0,
        });
        Ok(())
    }

    /// Attach `acl_id` to `node`.
    pub fn set_acl(&self, node: &NodeRef, acl_id: AclId) -> Result<()> {
        self.write()?.node_mut(node)?.acl = Some(acl_id);
        Ok(())
    }

    /// Record `user` as a member of `authority` (a group or role).
    pub fn add_membership(&self, user: &str, authority: &str) {
        self.state
            .write()
            .memberships
            .entry(user.to_string())
            .or_default()
            .insert(authority.to_string());
    }

    pub fn remove_membership(&self, user: &str, authority: &str) {
        if let Some(authorities) = self.state.write().memberships.get_mut(user) {
            authorities.remove(authority);
        }
    }

    /// Re-parent `node` under `new_parent`.
    pub fn move_node(&self, node: &NodeRef, new_parent: &NodeRef) -> Result<()> {
        let mut state = self.write()?;
        state.node(new_parent)?;
        let old_parent = state.node_mut(node)?.parent.replace(new_parent.clone());
        if let Some(old) = old_parent.and_then(|p| state.nodes.get_mut(&p)) {
            old.children.retain(|c| c != node);
        }
        state.node_mut(new_parent)?.children.push(node.clone());
        Ok(())
    }

    pub fn add_aspect(&self, node: &NodeRef, aspect: &str) -> Result<()> {
        self.write()?.node_mut(node)?.aspects.insert(aspect.to_string());
        Ok(())
    }

    pub fn set_owner(&self, node: &NodeRef, owner: Option<&str>) -> Result<()> {
        self.write()?.node_mut(node)?.owner = owner.map(str::to_string);
        Ok(())
    }

    pub fn set_lock_owner(&self, node: &NodeRef, user: Option<&str>) -> Result<()> {
        self.write()?.node_mut(node)?.lock_owner = user.map(str::to_string);
        Ok(())
    }

    fn target(state: &State, node: &NodeRef) -> Result<Target> {
        Ok(match state.node(node)?.acl {
            Some(acl_id) => Target::Acl(acl_id),
            None => Target::Entries,
        })
    }

    /// Apply `edit` to the node's entries, or to its ACL's when it has one.
    fn edit_node(
        &self,
        node: &NodeRef,
        edit_entries: impl FnOnce(&mut NodePermissionEntry),
        edit_acl: impl FnOnce(&mut AccessControlList),
    ) -> Result<()> {
        let mut state = self.write()?;
        match Self::target(&state, node)? {
            Target::Acl(acl_id) => {
                edit_acl(state.acl_mut(acl_id)?);
                state.node_mut(node)?;
            }
            Target::Entries => {
                let record = state.node_mut(node)?;
                let set = record.entries.get_or_insert_with(|| {
                    NodePermissionEntry::empty(PermissionScope::Node(node.clone()))
                });
                edit_entries(set);
            }
        }
        Ok(())
    }

    fn edit_store(
        &self,
        store: &StoreRef,
        edit: impl FnOnce(&mut NodePermissionEntry),
    ) -> Result<()> {
        let mut state = self.write()?;
        let set = state
            .stores
            .entry(store.clone())
            .or_insert_with(|| NodePermissionEntry::empty(PermissionScope::Store(store.clone())));
        edit(set);
        Ok(())
    }
}

// =============================================================================
// Collaborator traits
// =============================================================================

impl NodeService for MemoryRepository {
    fn exists(&self, node: &NodeRef) -> Result<bool> {
        Ok(self.read()?.nodes.contains_key(node))
    }

    fn node_type(&self, node: &NodeRef) -> Result<String> {
        Ok(self.read()?.node(node)?.node_type.clone())
    }

    fn aspects(&self, node: &NodeRef) -> Result<AHashSet<String>> {
        Ok(self.read()?.node(node)?.aspects.clone())
    }

    fn primary_parent(&self, node: &NodeRef) -> Result<Option<NodeRef>> {
        Ok(self.read()?.node(node)?.parent.clone())
    }

    fn children(&self, node: &NodeRef) -> Result<Vec<NodeRef>> {
        Ok(self.read()?.node(node)?.children.clone())
    }

    fn node_status(&self, node: &NodeRef) -> Result<Option<u64>> {
        Ok(self.read()?.nodes.get(node).map(|record| record.change_txn))
    }

    fn node_acl_id(&self, node: &NodeRef) -> Result<Option<AclId>> {
        Ok(self.read()?.node(node)?.acl)
    }

    fn frozen_node_ref(&self, node: &NodeRef) -> Result<Option<NodeRef>> {
        Ok(self
            .read()?
            .nodes
            .get(node)
            .and_then(|record| record.frozen_from.clone()))
    }
}

impl PermissionsDao for MemoryRepository {
    fn get_permissions(&self, node: &NodeRef) -> Result<Option<NodePermissionEntry>> {
        let state = self.read()?;
        let Some(record) = state.nodes.get(node) else {
            return Ok(None);
        };
        let Some(acl) = record.acl.and_then(|id| state.acls.get(&id)) else {
            return Ok(record.entries.clone());
        };
        let scope = PermissionScope::Node(node.clone());
        Ok(Some(NodePermissionEntry {
            entries: acl
                .entries
                .iter()
                .map(|ace| PermissionEntry {
                    scope: scope.clone(),
                    authority: ace.authority.clone(),
                    permission: ace.permission,
                    access: ace.access,
                    position: ace.position,
                })
                .collect(),
            inherit_permissions: acl.properties.inherits,
            scope,
        }))
    }

    fn get_store_permissions(&self, store: &StoreRef) -> Result<Option<NodePermissionEntry>> {
        Ok(self.read()?.stores.get(store).cloned())
    }

    fn acl_properties(&self, node: &NodeRef) -> Result<Option<AccessControlListProperties>> {
        let state = self.read()?;
        Ok(state
            .nodes
            .get(node)
            .and_then(|record| record.acl)
            .and_then(|id| state.acls.get(&id))
            .map(|acl| acl.properties.clone()))
    }

    fn set_permission(
        &self,
        node: &NodeRef,
        authority: &str,
        permission: PermissionReference,
        allow: bool,
    ) -> Result<()> {
        self.edit_node(
            node,
            |set| upsert_entry(set, authority, permission, allow),
            |acl| {
                retain_aces(&mut acl.entries, |a, p| !(a == authority && p == permission));
                acl.entries.push(AccessControlEntry {
                    authority: authority.to_string(),
                    permission,
                    access: AccessStatus::from_allowed(allow),
                    position: 0,
                });
            },
        )
    }

    fn set_store_permission(
        &self,
        store: &StoreRef,
        authority: &str,
        permission: PermissionReference,
        allow: bool,
    ) -> Result<()> {
        self.edit_store(store, |set| upsert_entry(set, authority, permission, allow))
    }

    fn delete_permission(
        &self,
        node: &NodeRef,
        authority: &str,
        permission: PermissionReference,
    ) -> Result<()> {
        let keep = |a: &str, p: PermissionReference| !(a == authority && p == permission);
        self.edit_node(
            node,
            |set| retain_entries(&mut set.entries, keep),
            |acl| retain_aces(&mut acl.entries, keep),
        )
    }

    fn delete_store_permission(
        &self,
        store: &StoreRef,
        authority: &str,
        permission: PermissionReference,
    ) -> Result<()> {
        self.edit_store(store, |set| {
            retain_entries(&mut set.entries, |a, p| !(a == authority && p == permission))
        })
    }

    fn delete_permissions(&self, node: &NodeRef) -> Result<()> {
        self.edit_node(node, |set| set.entries.clear(), |acl| acl.entries.clear())
    }

    fn delete_store_permissions(&self, store: &StoreRef) -> Result<()> {
        self.write()?.stores.remove(store);
        Ok(())
    }

    fn delete_permissions_for_authority(&self, node: &NodeRef, authority: &str) -> Result<()> {
        self.edit_node(
            node,
            |set| retain_entries(&mut set.entries, |a, _| a != authority),
            |acl| retain_aces(&mut acl.entries, |a, _| a != authority),
        )
    }

    fn delete_store_permissions_for_authority(
        &self,
        store: &StoreRef,
        authority: &str,
    ) -> Result<()> {
        self.edit_store(store, |set| {
            retain_entries(&mut set.entries, |a, _| a != authority)
        })
    }

    fn delete_all_for_authority(&self, authority: &str) -> Result<()> {
        let mut state = self.write()?;
        let txn = state.next_txn();
        for record in state.nodes.values_mut() {
            if let Some(set) = record.entries.as_mut() {
                let before = set.entries.len();
                retain_entries(&mut set.entries, |a, _| a != authority);
                if set.entries.len() != before {
                    record.change_txn = txn;
                }
            }
        }
        for acl in state.acls.values_mut() {
            let before = acl.entries.len();
            retain_aces(&mut acl.entries, |a, _| a != authority);
            if acl.entries.len() != before {
                acl.properties.version += 1;
            }
        }
        for set in state.stores.values_mut() {
            retain_entries(&mut set.entries, |a, _| a != authority);
        }
        Ok(())
    }

    fn set_inherit_parent_permissions(&self, node: &NodeRef, inherit: bool) -> Result<()> {
        self.edit_node(
            node,
            |set| set.inherit_permissions = inherit,
            |acl| acl.properties.inherits = inherit,
        )
    }

    fn get_inherit_parent_permissions(&self, node: &NodeRef) -> Result<bool> {
        let state = self.read()?;
        let record = state.node(node)?;
        if let Some(acl) = record.acl.and_then(|id| state.acls.get(&id)) {
            return Ok(acl.properties.inherits);
        }
        Ok(record
            .entries
            .as_ref()
            .map_or(true, |set| set.inherit_permissions))
    }
}

impl AclDao for MemoryRepository {
    fn access_control_list(&self, acl_id: AclId) -> Result<Option<AccessControlList>> {
        Ok(self.read()?.acls.get(&acl_id).cloned())
    }
}

impl AuthorityService for MemoryRepository {
    /// Recorded memberships plus `GROUP_EVERYONE`.
    fn authorities_for_user(&self, user: &str) -> Result<AHashSet<String>> {
        let state = self.read()?;
        let mut authorities = state.memberships.get(user).cloned().unwrap_or_default();
        authorities.insert(ALL_AUTHORITIES.to_string());
        Ok(authorities)
    }
}

impl OwnableService for MemoryRepository {
    fn owner(&self, node: &NodeRef) -> Result<Option<String>> {
        Ok(self.read()?.node(node)?.owner.clone())
    }
}

impl LockService for MemoryRepository {
    fn lock_owner(&self, node: &NodeRef) -> Result<Option<String>> {
        Ok(self.read()?.node(node)?.lock_owner.clone())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fixture {
    #[serde(default)]
    users: AHashMap<String, Vec<String>>,
    #[serde(default)]
    acls: Vec<AclFixture>,
    #[serde(default)]
    stores: Vec<StoreFixture>,
    #[serde(default)]
    nodes: Vec<NodeFixture>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryFixture {
    authority: String,
    permission: String,
    #[serde(default = "allowed")]
    allowed: bool,
}

fn allowed() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AclFixture {
    /// Name nodes refer to the ACL by.
    name: String,
    #[serde(default)]
    entries: Vec<EntryFixture>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFixture {
    store: StoreRef,
    #[serde(default)]
    entries: Vec<EntryFixture>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeFixture {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    store: Option<StoreRef>,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    aspects: Vec<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    lock_owner: Option<String>,
    #[serde(default)]
    acl: Option<String>,
    #[serde(default = "allowed")]
    inherit: bool,
    #[serde(default)]
    entries: Vec<EntryFixture>,
}

fn resolve_permission(model: &PermissionModel, name: &str) -> Result<PermissionReference> {
    model
        .permission_reference(None, name)
        .ok_or_else(|| PermissionError::UnknownPermission(name.to_string()))
}

impl MemoryRepository {
    /// Build a repository from a JSON fixture.
    ///
    /// Nodes are created in order, so a parent must precede its children.
    /// Parents are referred to by id within the child's store.
    pub fn from_fixture(json: &str, model: &PermissionModel) -> Result<Self> {
        let fixture: Fixture = serde_json::from_str(json)?;
        let repo = Self::new();

        for (user, authorities) in &fixture.users {
            for authority in authorities {
                repo.add_membership(user, authority);
            }
        }

        let mut acls = AHashMap::new();
        for acl in &fixture.acls {
            let id = repo.create_acl();
            for entry in &acl.entries {
                let permission = resolve_permission(model, &entry.permission)?;
                repo.add_acl_entry(id, &entry.authority, permission, entry.allowed)?;
            }
            acls.insert(acl.name.as_str(), id);
        }

        for store in &fixture.stores {
            for entry in &store.entries {
                let permission = resolve_permission(model, &entry.permission)?;
                let (authority, allow) = (&entry.authority, entry.allowed);
                repo.set_store_permission(&store.store, authority, permission, allow)?;
            }
        }

        for spec in &fixture.nodes {
            let store = spec.store.clone().unwrap_or_else(default_store);
            let mut node_spec = match &spec.parent {
                Some(parent) => {
                    let parent = NodeRef::new(store.clone(), parent.clone());
                    if !repo.exists(&parent)? {
                        return Err(PermissionError::NodeNotFound(parent));
                    }
                    NodeSpec::child_of(&parent, spec.node_type.clone())
                }
                None => NodeSpec::root(spec.node_type.clone()).in_store(store),
            }
            .id(spec.id.clone());
            for aspect in &spec.aspects {
                node_spec = node_spec.aspect(aspect.clone());
            }
            if let Some(owner) = &spec.owner {
                node_spec = node_spec.owner(owner.clone());
            }
            if let Some(user) = &spec.lock_owner {
                node_spec = node_spec.lock_owner(user.clone());
            }
            if let Some(name) = &spec.acl {
                let id = acls
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| PermissionError::Store(format!("unknown acl {}", name)))?;
                node_spec = node_spec.acl(id);
            }
            let node = repo.add_node(node_spec);
            for entry in &spec.entries {
                let permission = resolve_permission(model, &entry.permission)?;
                repo.set_permission(&node, &entry.authority, permission, entry.allowed)?;
            }
            if !spec.inherit {
                repo.set_inherit_parent_permissions(&node, false)?;
            }
        }

        tracing::info!(
            nodes = fixture.nodes.len(),
            acls = fixture.acls.len(),
            users = fixture.users.len(),
            "loaded repository fixture"
        );
        Ok(repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> PermissionModel {
        PermissionModel::default_model().unwrap()
    }

    #[test]
    fn children_are_linked_to_parents() {
        let repo = MemoryRepository::new();
        let root = repo.add_node(NodeSpec::root("cm:folder").id("root"));
        let child = repo.add_node(NodeSpec::child_of(&root, "cm:content"));
        assert_eq!(repo.children(&root).unwrap(), vec![child.clone()]);
        assert_eq!(repo.primary_parent(&child).unwrap(), Some(root));
        assert_eq!(child.store.to_string(), DEFAULT_STORE);
    }

    #[test]
    fn writes_bump_change_txn() {
        let model = model();
        let repo = MemoryRepository::new();
        let node = repo.add_node(NodeSpec::root("cm:folder"));
        let before = repo.node_status(&node).unwrap();
        let read = model.permission_reference(None, "Read").unwrap();
        repo.set_permission(&node, "andy", read, true).unwrap();
        assert!(repo.node_status(&node).unwrap() > before);
    }

    #[test]
    fn set_permission_replaces_same_pair() {
        let model = model();
        let repo = MemoryRepository::new();
        let node = repo.add_node(NodeSpec::root("cm:folder"));
        let read = model.permission_reference(None, "Read").unwrap();
        repo.set_permission(&node, "andy", read, true).unwrap();
        repo.set_permission(&node, "andy", read, false).unwrap();
        let entries = repo.get_permissions(&node).unwrap().unwrap().entries;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_denied());
    }

    #[test]
    fn acl_nodes_write_through_to_the_acl() {
        let model = model();
        let repo = MemoryRepository::new();
        let acl = repo.create_acl();
        let node = repo.add_node(NodeSpec::root("cm:folder").acl(acl));
        let version = repo.acl_properties(&node).unwrap().unwrap().version;
        let read = model.permission_reference(None, "Read").unwrap();
        repo.set_permission(&node, "andy", read, true).unwrap();

        let list = repo.access_control_list(acl).unwrap().unwrap();
        assert_eq!(list.entries.len(), 1);
        assert_eq!(list.properties.version, version + 1);
        assert_eq!(repo.get_permissions(&node).unwrap().unwrap().entries.len(), 1);
    }

    #[test]
    fn acl_inherit_flag_copies_nothing() {
        let model = model();
        let repo = MemoryRepository::new();
        let read = model.permission_reference(None, "Read").unwrap();
        let parent_acl = repo.create_acl();
        repo.add_acl_entry(parent_acl, "andy", read, true).unwrap();
        let child_acl = repo.create_acl();
        let root = repo.add_node(NodeSpec::root("cm:folder").acl(parent_acl));
        let doc = repo.add_node(NodeSpec::child_of(&root, "cm:content").acl(child_acl));

        repo.set_inherit_parent_permissions(&doc, false).unwrap();
        assert!(!repo.get_inherit_parent_permissions(&doc).unwrap());
        repo.set_inherit_parent_permissions(&doc, true).unwrap();
        assert!(repo.get_inherit_parent_permissions(&doc).unwrap());
        assert!(repo.access_control_list(child_acl).unwrap().unwrap().entries.is_empty());
    }

    #[test]
    fn delete_all_for_authority_spans_nodes_acls_and_stores() {
        let model = model();
        let repo = MemoryRepository::new();
        let read = model.permission_reference(None, "Read").unwrap();
        let acl = repo.create_acl();
        repo.add_acl_entry(acl, "andy", read, true).unwrap();
        let node = repo.add_node(NodeSpec::root("cm:folder"));
        repo.set_permission(&node, "andy", read, true).unwrap();
        repo.set_permission(&node, "bob", read, true).unwrap();
        repo.set_store_permission(&default_store(), "andy", read, true)
            .unwrap();

        repo.delete_all_for_authority("andy").unwrap();
        assert_eq!(repo.get_permissions(&node).unwrap().unwrap().entries.len(), 1);
        assert!(repo.access_control_list(acl).unwrap().unwrap().entries.is_empty());
        assert!(repo
            .get_store_permissions(&default_store())
            .unwrap()
            .unwrap()
            .entries
            .is_empty());
    }

    #[test]
    fn move_node_relinks_children() {
        let repo = MemoryRepository::new();
        let a = repo.add_node(NodeSpec::root("cm:folder"));
        let b = repo.add_node(NodeSpec::root("cm:folder"));
        let child = repo.add_node(NodeSpec::child_of(&a, "cm:content"));
        repo.move_node(&child, &b).unwrap();
        assert!(repo.children(&a).unwrap().is_empty());
        assert_eq!(repo.children(&b).unwrap(), vec![child.clone()]);
        assert_eq!(repo.primary_parent(&child).unwrap(), Some(b));
    }

    #[test]
    fn everyone_is_always_an_authority() {
        let repo = MemoryRepository::new();
        repo.add_membership("andy", "GROUP_editors");
        let authorities = repo.authorities_for_user("andy").unwrap();
        assert!(authorities.contains("GROUP_editors"));
        assert!(authorities.contains(ALL_AUTHORITIES));
    }

    #[test]
    fn unavailable_repository_fails_every_call() {
        let repo = MemoryRepository::new();
        let node = repo.add_node(NodeSpec::root("cm:folder"));
        repo.set_unavailable(true);
        assert!(matches!(repo.exists(&node), Err(PermissionError::Store(_))));
        assert!(matches!(repo.get_permissions(&node), Err(PermissionError::Store(_))));
        repo.set_unavailable(false);
        assert!(repo.exists(&node).unwrap());
    }

    #[test]
    fn fixture_builds_tree() {
        let model = model();
        let json = r#"{
            "users": {"andy": ["GROUP_editors"]},
            "acls": [{"name": "shared", "entries": [
                {"authority": "GROUP_EVERYONE", "permission": "Read"}
            ]}],
            "nodes": [
                {"id": "root", "type": "cm:folder", "entries": [
                    {"authority": "GROUP_editors", "permission": "Editor"}
                ]},
                {"id": "doc", "type": "cm:content", "parent": "root", "owner": "andy",
                 "inherit": false, "entries": [
                    {"authority": "bob", "permission": "Write", "allowed": false}
                 ]},
                {"id": "published", "type": "cm:content", "parent": "root", "acl": "shared"}
            ]
        }"#;
        let repo = MemoryRepository::from_fixture(json, &model).unwrap();
        let doc: NodeRef = "workspace://SpacesStore/doc".parse().unwrap();
        assert_eq!(repo.owner(&doc).unwrap().as_deref(), Some("andy"));
        assert!(!repo.get_inherit_parent_permissions(&doc).unwrap());
        let published: NodeRef = "workspace://SpacesStore/published".parse().unwrap();
        assert!(repo.node_acl_id(&published).unwrap().is_some());
        assert!(repo.authorities_for_user("andy").unwrap().contains("GROUP_editors"));
    }

    #[test]
    fn fixture_rejects_unknown_permission_and_parent() {
        let model = model();
        let unknown = r#"{"nodes": [{"id": "a", "type": "cm:folder",
            "entries": [{"authority": "andy", "permission": "Teleport"}]}]}"#;
        assert!(matches!(
            MemoryRepository::from_fixture(unknown, &model),
            Err(PermissionError::UnknownPermission(_))
        ));
        let orphan = r#"{"nodes": [{"id": "a", "type": "cm:folder", "parent": "nowhere"}]}"#;
        assert!(matches!(
            MemoryRepository::from_fixture(orphan, &model),
            Err(PermissionError::NodeNotFound(_))
        ));
    }
}

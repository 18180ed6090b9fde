//! Domain types shared across acl_core and the service crate.

use std::fmt;
use std::str::FromStr;

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::reference::PermissionReference;

// ============================================================================
// Well-known names
// ============================================================================

/// Meta-permission: granting or denying it covers every applicable permission.
pub const ALL_PERMISSIONS: &str = "All";
pub const FULL_CONTROL: &str = "FullControl";
pub const READ: &str = "Read";

/// Dynamic authority held by the owner of a node.
pub const OWNER_AUTHORITY: &str = "ROLE_OWNER";
/// Group every authenticated user belongs to.
pub const ALL_AUTHORITIES: &str = "GROUP_EVERYONE";
pub const ADMINISTRATOR_AUTHORITY: &str = "ROLE_ADMINISTRATOR";
/// Dynamic authority held by the user holding the lock on a node.
pub const LOCK_OWNER_AUTHORITY: &str = "ROLE_LOCK_OWNER";
pub const GUEST_AUTHORITY: &str = "ROLE_GUEST";

/// Store protocol of the legacy version store.
pub const VERSION_STORE_PROTOCOL: &str = "versionStore";
/// Store identifier of the current version store.
pub const VERSION2_STORE_ID: &str = "version2Store";

pub type AclId = u64;

// ============================================================================
// Node and store references
// ============================================================================

/// A store, e.g. `workspace://SpacesStore`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreRef {
    pub protocol: String,
    pub identifier: String,
}

impl StoreRef {
    pub fn new(protocol: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            identifier: identifier.into(),
        }
    }

    /// Whether this store holds frozen version nodes.
    pub fn is_version_store(&self) -> bool {
        self.protocol == VERSION_STORE_PROTOCOL || self.identifier == VERSION2_STORE_ID
    }
}

impl fmt::Display for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.identifier)
    }
}

impl FromStr for StoreRef {
    type Err = RefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (protocol, identifier) = s
            .split_once("://")
            .ok_or_else(|| RefParseError(s.to_string()))?;
        if protocol.is_empty() || identifier.is_empty() || identifier.contains('/') {
            return Err(RefParseError(s.to_string()));
        }
        Ok(StoreRef::new(protocol, identifier))
    }
}

impl TryFrom<String> for StoreRef {
    type Error = RefParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StoreRef> for String {
    fn from(value: StoreRef) -> Self {
        value.to_string()
    }
}

/// A node, e.g. `workspace://SpacesStore/0f1c…`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeRef {
    pub store: StoreRef,
    pub id: String,
}

impl NodeRef {
    pub fn new(store: StoreRef, id: impl Into<String>) -> Self {
        Self {
            store,
            id: id.into(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store, self.id)
    }
}

impl FromStr for NodeRef {
    type Err = RefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (store, id) = s.rsplit_once('/').ok_or_else(|| RefParseError(s.to_string()))?;
        if id.is_empty() {
            return Err(RefParseError(s.to_string()));
        }
        let store = store.parse().map_err(|_| RefParseError(s.to_string()))?;
        Ok(NodeRef::new(store, id))
    }
}

impl TryFrom<String> for NodeRef {
    type Error = RefParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeRef> for String {
    fn from(value: NodeRef) -> Self {
        value.to_string()
    }
}

/// A node or store reference that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefParseError(pub String);

impl fmt::Display for RefParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Malformed reference: {}", self.0)
    }
}

impl std::error::Error for RefParseError {}

// ============================================================================
// Entries
// ============================================================================

/// Two-valued result of an access check.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessStatus {
    Allowed,
    Denied,
}

impl AccessStatus {
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            AccessStatus::Allowed
        } else {
            AccessStatus::Denied
        }
    }

    pub fn is_allowed(self) -> bool {
        self == AccessStatus::Allowed
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessStatus::Allowed => f.write_str("ALLOWED"),
            AccessStatus::Denied => f.write_str("DENIED"),
        }
    }
}

/// Scope at which an additional permission is required.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredOn {
    Node,
    Parent,
    Children,
}

/// What a [`PermissionEntry`] is attached to.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum PermissionScope {
    Node(NodeRef),
    Store(StoreRef),
    /// Model-wide entry, not attached to any node.
    Global,
}

/// One grant/deny rule.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct PermissionEntry {
    pub scope: PermissionScope,
    pub authority: String,
    pub permission: PermissionReference,
    pub access: AccessStatus,
    pub position: i32,
}

impl PermissionEntry {
    pub fn is_denied(&self) -> bool {
        self.access == AccessStatus::Denied
    }

    pub fn is_allowed(&self) -> bool {
        self.access == AccessStatus::Allowed
    }
}

/// The entries set directly on a node (or store) plus its inheritance flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePermissionEntry {
    pub scope: PermissionScope,
    pub entries: Vec<PermissionEntry>,
    pub inherit_permissions: bool,
}

impl NodePermissionEntry {
    pub fn empty(scope: PermissionScope) -> Self {
        Self {
            scope,
            entries: Vec::new(),
            inherit_permissions: true,
        }
    }
}

// ============================================================================
// ACL-id based storage
// ============================================================================

/// Storage model of an ACL. `Old` marks nodes still on per-node entries.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclType {
    Old,
    Defining,
    Shared,
    Fixed,
    Global,
    Layered,
}

/// Immutable description of one ACL version.
///
/// Used as a cache key for reader sets: any change to an ACL produces a new
/// version, hence a new properties value.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlListProperties {
    pub id: AclId,
    pub acl_id: String,
    pub version: u64,
    pub acl_type: AclType,
    #[serde(default = "default_true")]
    pub inherits: bool,
    #[serde(default = "default_true")]
    pub latest: bool,
    #[serde(default)]
    pub versioned: bool,
    #[serde(default)]
    pub change_set: Option<u64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct AccessControlEntry {
    pub authority: String,
    pub permission: PermissionReference,
    pub access: AccessStatus,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlList {
    pub properties: AccessControlListProperties,
    pub entries: Vec<AccessControlEntry>,
}

// ============================================================================
// Evaluation context
// ============================================================================

/// Per-check parameters for ACL-id evaluation.
#[derive(Debug, Clone, Default)]
pub struct PermissionContext {
    type_qname: String,
    aspects: AHashSet<String>,
    store_acl: Option<AclId>,
    dynamic_authority_assignments: AHashMap<String, AHashSet<String>>,
}

impl PermissionContext {
    pub fn new(type_qname: impl Into<String>) -> Self {
        Self {
            type_qname: type_qname.into(),
            ..Self::default()
        }
    }

    pub fn with_aspects<I, S>(mut self, aspects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aspects.extend(aspects.into_iter().map(Into::into));
        self
    }

    pub fn with_store_acl(mut self, store_acl: AclId) -> Self {
        self.store_acl = Some(store_acl);
        self
    }

    /// Holders of `authority` additionally hold `dynamic_authority` for this check.
    pub fn add_dynamic_authority_assignment(
        &mut self,
        authority: impl Into<String>,
        dynamic_authority: impl Into<String>,
    ) {
        self.dynamic_authority_assignments
            .entry(authority.into())
            .or_default()
            .insert(dynamic_authority.into());
    }

    pub fn type_qname(&self) -> &str {
        &self.type_qname
    }

    pub fn aspects(&self) -> &AHashSet<String> {
        &self.aspects
    }

    pub fn store_acl(&self) -> Option<AclId> {
        self.store_acl
    }

    pub fn dynamic_authority_assignments(&self) -> &AHashMap<String, AHashSet<String>> {
        &self.dynamic_authority_assignments
    }
}

/// Rendered view of a permission for callers outside the engine.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize)]
pub struct AccessPermission {
    pub permission: String,
    pub access: AccessStatus,
    pub authority: String,
    pub position: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ref_round_trips_through_display() {
        let node: NodeRef = "workspace://SpacesStore/abc-123".parse().unwrap();
        assert_eq!(node.store, StoreRef::new("workspace", "SpacesStore"));
        assert_eq!(node.id, "abc-123");
        assert_eq!(node.to_string(), "workspace://SpacesStore/abc-123");
    }

    #[test]
    fn malformed_refs_are_rejected() {
        assert!("SpacesStore/abc".parse::<NodeRef>().is_err());
        assert!("workspace://SpacesStore/".parse::<NodeRef>().is_err());
        assert!("workspace://".parse::<StoreRef>().is_err());
    }

    #[test]
    fn version_stores_are_recognised() {
        assert!(StoreRef::new("versionStore", "lightWeightVersionStore").is_version_store());
        assert!(StoreRef::new("workspace", "version2Store").is_version_store());
        assert!(!StoreRef::new("workspace", "SpacesStore").is_version_store());
    }

    #[test]
    fn node_ref_deserializes_from_string() {
        let node: NodeRef = serde_json::from_str(r#""workspace://SpacesStore/n1""#).unwrap();
        assert_eq!(node.id, "n1");
    }

    #[test]
    fn context_collects_dynamic_assignments() {
        let mut context = PermissionContext::new("cm:content").with_aspects(["cm:titled"]);
        context.add_dynamic_authority_assignment("andy", "ROLE_OWNER");
        context.add_dynamic_authority_assignment("andy", "ROLE_LOCK_OWNER");
        assert_eq!(context.type_qname(), "cm:content");
        assert!(context.aspects().contains("cm:titled"));
        assert_eq!(context.dynamic_authority_assignments()["andy"].len(), 2);
        assert_eq!(context.store_acl(), None);
    }
}

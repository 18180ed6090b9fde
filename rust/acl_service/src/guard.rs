//! Declarative method guards.
//!
//! A table maps `(interface, method)` to the checks a caller must pass before
//! the method runs. Methods missing from the table are refused.
//!
//! Tables can be built in code or parsed from JSON:
//!
//! ```json
//! {"PermissionService": {
//!     "set_permission": [{"kind": "node", "arg": 0, "permission": "ChangePermissions"}],
//!     "has_permission": [{"kind": "public"}]
//! }}
//! ```

use acl_core::types::{AccessStatus, NodeRef, ADMINISTRATOR_AUTHORITY};
use ahash::AHashMap;
use serde::Deserialize;

use crate::auth;
use crate::error::{PermissionError, Result};
use crate::service::PermissionService;

pub const PERMISSION_SERVICE: &str = "PermissionService";

/// One check on a method invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Guard {
    /// The caller needs `permission` on the node passed as argument `arg`.
    Node { arg: usize, permission: String },
    /// As `Node`, on that node's primary parent.
    Parent { arg: usize, permission: String },
    /// The caller must hold this authority.
    Role { authority: String },
    /// Anyone may call.
    Public,
    /// Nobody may call.
    Deny,
}

#[derive(Debug, Clone, Default)]
pub struct MethodGuardTable {
    guards: AHashMap<(String, String), Vec<Guard>>,
}

impl MethodGuardTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guards for the permission service's own operations.
    pub fn permission_service_defaults() -> Self {
        let node = |permission: &str| {
            vec![Guard::Node {
                arg: 0,
                permission: permission.to_string(),
            }]
        };
        let admin = || {
            vec![Guard::Role {
                authority: ADMINISTRATOR_AUTHORITY.to_string(),
            }]
        };
        let mut table = Self::new();
        for method in ["has_permission", "has_read_permission", "get_authorisations"] {
            table.insert(PERMISSION_SERVICE, method, vec![Guard::Public]);
        }
        for method in [
            "get_permissions",
            "get_all_set_permissions",
            "get_set_permissions",
            "get_inherit_parent_permissions",
        ] {
            table.insert(PERMISSION_SERVICE, method, node("ReadPermissions"));
        }
        for method in [
            "set_permission",
            "delete_permission",
            "delete_permissions",
            "clear_permission",
            "set_inherit_parent_permissions",
        ] {
            table.insert(PERMISSION_SERVICE, method, node("ChangePermissions"));
        }
        for method in [
            "delete_permissions_for_authority",
            "set_store_permission",
            "delete_store_permission",
            "delete_store_permissions",
            "clear_store_permission",
        ] {
            table.insert(PERMISSION_SERVICE, method, admin());
        }
        table
    }

    /// Parse `{"Interface": {"method": [guard, ..]}}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: AHashMap<String, AHashMap<String, Vec<Guard>>> = serde_json::from_str(json)?;
        let mut table = Self::new();
        for (interface, methods) in parsed {
            for (method, guards) in methods {
                table.insert(&interface, &method, guards);
            }
        }
        Ok(table)
    }

    /// Replace the guards of one method.
    pub fn insert(&mut self, interface: &str, method: &str, guards: Vec<Guard>) {
        self.guards
            .insert((interface.to_string(), method.to_string()), guards);
    }

    pub fn guards(&self, interface: &str, method: &str) -> Option<&[Guard]> {
        self.guards
            .get(&(interface.to_string(), method.to_string()))
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Check the current caller against the guards of `interface.method`.
    ///
    /// `args` holds the invocation's node arguments by position; `None` for
    /// an absent node, which passes any node guard on it.
    pub fn check(
        &self,
        service: &PermissionService,
        interface: &str,
        method: &str,
        args: &[Option<&NodeRef>],
    ) -> Result<()> {
        let target = format!("{}.{}", interface, method);
        let Some(guards) = self.guards(interface, method) else {
            tracing::warn!(method = %target, "no guard configured, refusing");
            return Err(denied("unlisted", &target));
        };
        if guards.contains(&Guard::Deny) {
            return Err(denied("none", &target));
        }
        if guards.contains(&Guard::Public) {
            return Ok(());
        }
        if auth::current_user().as_deref() == Some(service.config().system_user_name.as_str()) {
            return Ok(());
        }

        for guard in guards {
            match guard {
                Guard::Node { arg, permission } => {
                    if let Some(node) = argument(args, *arg, &target)? {
                        require(service, node, permission)?;
                    }
                }
                Guard::Parent { arg, permission } => {
                    if let Some(node) = argument(args, *arg, &target)? {
                        if let Some(parent) = service.primary_parent(node)? {
                            require(service, &parent, permission)?;
                        }
                    }
                }
                Guard::Role { authority } => {
                    if !service.get_authorisations()?.contains(authority) {
                        return Err(denied(authority, &target));
                    }
                }
                Guard::Public | Guard::Deny => {}
            }
        }
        tracing::trace!(method = %target, "guards passed");
        Ok(())
    }
}

fn argument<'a>(
    args: &[Option<&'a NodeRef>],
    index: usize,
    target: &str,
) -> Result<Option<&'a NodeRef>> {
    match args.get(index) {
        Some(node) => Ok(*node),
        None => Err(PermissionError::IllegalState(format!(
            "guard on {} references argument {} of {}",
            target,
            index,
            args.len()
        ))),
    }
}

fn require(service: &PermissionService, node: &NodeRef, permission: &str) -> Result<()> {
    if service.has_permission(Some(node), permission)? == AccessStatus::Allowed {
        return Ok(());
    }
    Err(denied(permission, &node.to_string()))
}

fn denied(permission: &str, target: &str) -> PermissionError {
    PermissionError::AccessDenied {
        permission: permission.to_string(),
        target: target.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_mutations() {
        let table = MethodGuardTable::permission_service_defaults();
        assert_eq!(
            table.guards(PERMISSION_SERVICE, "has_permission"),
            Some(&[Guard::Public][..])
        );
        assert!(matches!(
            table.guards(PERMISSION_SERVICE, "set_permission"),
            Some([Guard::Node { arg: 0, permission }]) if permission == "ChangePermissions"
        ));
        assert!(table.guards(PERMISSION_SERVICE, "no_such_method").is_none());
    }

    #[test]
    fn parse_guard_table() {
        let json = r#"{
            "NodeService": {
                "delete_node": [{"kind": "parent", "arg": 0, "permission": "DeleteChildren"}],
                "get_root": [{"kind": "public"}],
                "purge": [{"kind": "deny"}],
                "reindex": [{"kind": "role", "authority": "ROLE_ADMINISTRATOR"}]
            }
        }"#;
        let table = MethodGuardTable::from_json(json).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.guards("NodeService", "purge"), Some(&[Guard::Deny][..]));
        assert!(matches!(
            table.guards("NodeService", "delete_node"),
            Some([Guard::Parent { arg: 0, .. }])
        ));
    }

    #[test]
    fn unknown_kind_is_config_error() {
        let json = r#"{"X": {"y": [{"kind": "sometimes"}]}}"#;
        assert!(matches!(
            MethodGuardTable::from_json(json),
            Err(PermissionError::Config(_))
        ));
    }
}

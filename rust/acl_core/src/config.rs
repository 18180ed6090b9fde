//! Declarative permission definitions.
//!
//! The permission model is described in JSON: the class hierarchy (types and
//! aspects), one permission set per class declaring permission groups and
//! atomic permissions, and the model-wide global permissions. Names inside a
//! definition (`includes`, `grantedTo`, `requires`, global `permission`) may be
//! a bare permission name when it is unique, or the qualified `qname.name`
//! form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{AccessStatus, RequiredOn};

/// Root of a permission definitions document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    /// Root of the type hierarchy; unknown types are treated as descending from it.
    pub base_type: String,
    /// Type name → parent type (`null` for a root).
    #[serde(default)]
    pub types: BTreeMap<String, Option<String>>,
    /// Aspect name → parent aspect (`null` for a root).
    #[serde(default)]
    pub aspects: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub permission_sets: Vec<PermissionSetDefinition>,
    #[serde(default)]
    pub global_permissions: Vec<GlobalPermissionDefinition>,
}

/// Permissions declared by one class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSetDefinition {
    pub class: String,
    #[serde(default)]
    pub groups: Vec<PermissionGroupDefinition>,
    #[serde(default)]
    pub permissions: Vec<PermissionDefinition>,
}

/// A named bundle of permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGroupDefinition {
    pub name: String,
    #[serde(default = "default_true")]
    pub expose: bool,
    /// The group implies every permission in the model (FullControl-like).
    #[serde(default)]
    pub grants_all: bool,
    /// Other groups this group implies.
    #[serde(default)]
    pub includes: Vec<String>,
}

/// An atomic permission, the unit actually tested against entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDefinition {
    pub name: String,
    #[serde(default)]
    pub expose: bool,
    /// Groups whose grant implies this permission.
    #[serde(default)]
    pub granted_to: Vec<String>,
    #[serde(default)]
    pub requires: Vec<RequirementDefinition>,
}

/// A permission that must also hold at `on` for the declaring permission to hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementDefinition {
    pub on: RequiredOn,
    pub name: String,
}

/// A model-wide entry, applying to every node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalPermissionDefinition {
    pub authority: String,
    pub permission: String,
    #[serde(default = "default_allowed")]
    pub access: AccessStatus,
}

fn default_true() -> bool {
    true
}

fn default_allowed() -> AccessStatus {
    AccessStatus::Allowed
}

/// Parse permission definitions from a JSON string.
pub fn parse_model_definition(json: &str) -> Result<ModelDefinition, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_class_hierarchy() {
        let json = r#"{
            "baseType":"sys:base",
            "types":{"sys:base":null,"cm:content":"sys:base"},
            "aspects":{"cm:ownable":null}
        }"#;
        let def = parse_model_definition(json).unwrap();
        assert_eq!(def.base_type, "sys:base");
        assert_eq!(def.types.get("cm:content").unwrap().as_deref(), Some("sys:base"));
        assert_eq!(def.types.get("sys:base").unwrap(), &None);
        assert!(def.aspects.contains_key("cm:ownable"));
        assert!(def.permission_sets.is_empty());
    }

    #[test]
    fn group_and_permission_defaults() {
        let json = r#"{
            "baseType":"sys:base",
            "permissionSets":[{
                "class":"sys:base",
                "groups":[{"name":"Read"}],
                "permissions":[{"name":"_ReadProperties","grantedTo":["Read"]}]
            }]
        }"#;
        let def = parse_model_definition(json).unwrap();
        let set = &def.permission_sets[0];
        assert!(set.groups[0].expose);
        assert!(!set.groups[0].grants_all);
        assert!(!set.permissions[0].expose);
        assert_eq!(set.permissions[0].granted_to, vec!["Read"]);
    }

    #[test]
    fn parse_requirements() {
        let json = r#"{
            "baseType":"sys:base",
            "permissionSets":[{
                "class":"sys:base",
                "permissions":[{
                    "name":"_DeleteNode",
                    "requires":[
                        {"on":"parent","name":"_DeleteChildren"},
                        {"on":"children","name":"_DeleteNode"}
                    ]
                }]
            }]
        }"#;
        let def = parse_model_definition(json).unwrap();
        let requires = &def.permission_sets[0].permissions[0].requires;
        assert_eq!(requires[0].on, RequiredOn::Parent);
        assert_eq!(requires[1].on, RequiredOn::Children);
    }

    #[test]
    fn global_access_defaults_to_allowed() {
        let json = r#"{
            "baseType":"sys:base",
            "globalPermissions":[
                {"authority":"ROLE_ADMINISTRATOR","permission":"FullControl"},
                {"authority":"GROUP_BANNED","permission":"Read","access":"DENIED"}
            ]
        }"#;
        let def = parse_model_definition(json).unwrap();
        assert_eq!(def.global_permissions[0].access, AccessStatus::Allowed);
        assert_eq!(def.global_permissions[1].access, AccessStatus::Denied);
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let json = r#"{
            "baseType":"sys:base",
            "permissionSets":[{"class":"sys:base","permissions":[
                {"name":"_X","requires":[{"on":"sibling","name":"_Y"}]}
            ]}]
        }"#;
        assert!(parse_model_definition(json).is_err());
    }
}

//! Tests for the permission model.

use ahash::AHashSet;
use proptest::prelude::*;

use crate::error::ModelError;
use crate::model::{PermissionModel, DEFAULT_DEFINITIONS};
use crate::reference::PermissionReference;
use crate::types::RequiredOn;

// ============================================================================
// Helper builders
// ============================================================================

fn default_model() -> PermissionModel {
    PermissionModel::default_model().unwrap()
}

/// The default model with deletes cascading: `_DeleteNode` needs
/// `_DeleteChildren` on the parent and `_DeleteNode` on every child.
fn cascading_delete_model() -> PermissionModel {
    let mut definitions: serde_json::Value = serde_json::from_str(DEFAULT_DEFINITIONS).unwrap();
    let permissions = definitions["permissionSets"][0]["permissions"]
        .as_array_mut()
        .unwrap();
    let delete_node = permissions
        .iter_mut()
        .find(|p| p["name"] == "_DeleteNode")
        .unwrap();
    delete_node["requires"] = serde_json::json!([
        {"on": "parent", "name": "_DeleteChildren"},
        {"on": "children", "name": "_DeleteNode"}
    ]);
    PermissionModel::from_json(&definitions.to_string()).unwrap()
}

fn aspects(names: &[&str]) -> AHashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn perm(model: &PermissionModel, name: &str) -> PermissionReference {
    model
        .permission_reference(None, name)
        .unwrap_or_else(|| panic!("unknown permission {}", name))
}

fn names(model: &PermissionModel, refs: &AHashSet<PermissionReference>) -> Vec<String> {
    let mut out: Vec<String> = refs
        .iter()
        .map(|r| model.registry().name(*r).to_string())
        .collect();
    out.sort();
    out
}

/// Two classes declaring the same local name.
const SHADOWED: &str = r#"{
    "baseType":"sys:base",
    "types":{"sys:base":null,"app:doc":"sys:base"},
    "permissionSets":[
        {"class":"sys:base","groups":[{"name":"Read"}],
         "permissions":[{"name":"_Read","grantedTo":["sys:base.Read"]}]},
        {"class":"app:doc","groups":[{"name":"Read","includes":["sys:base.Read"]}]}
    ]
}"#;

// ============================================================================
// Loading
// ============================================================================

#[test]
fn default_model_loads() {
    let model = default_model();
    assert!(!model.is_empty());
    assert_eq!(model.base_type(), "sys:base");
    assert_eq!(model.registry().name(model.full_control_reference()), "FullControl");
    assert_eq!(model.global_permission_entries().len(), 5);
}

#[test]
fn from_file_reads_definitions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("perms.json");
    std::fs::write(&path, SHADOWED).unwrap();
    let model = PermissionModel::from_file(&path).unwrap();
    assert_eq!(model.len(), 3);
}

#[test]
fn from_file_missing_definitions() {
    let dir = tempfile::tempdir().unwrap();
    let err = PermissionModel::from_file(dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, ModelError::DefinitionsNotFound(_)));
}

#[test]
fn invalid_json_is_a_parse_error() {
    let err = PermissionModel::from_json("{not json").unwrap_err();
    assert!(matches!(err, ModelError::Parse(_)));
}

#[test]
fn unknown_parent_class_is_rejected() {
    let json = r#"{"baseType":"sys:base","types":{"sys:base":null,"cm:content":"cm:missing"}}"#;
    let err = PermissionModel::from_json(json).unwrap_err();
    assert!(matches!(err, ModelError::UnknownClass(c) if c == "cm:missing"));
}

#[test]
fn missing_base_type_is_rejected() {
    let json = r#"{"baseType":"sys:base","types":{"cm:content":null}}"#;
    let err = PermissionModel::from_json(json).unwrap_err();
    assert!(matches!(err, ModelError::UnknownClass(c) if c == "sys:base"));
}

#[test]
fn class_cycle_is_rejected() {
    let json = r#"{"baseType":"sys:base","types":{"sys:base":null,"a":"b","b":"a"}}"#;
    let err = PermissionModel::from_json(json).unwrap_err();
    assert!(matches!(err, ModelError::ClassCycle(_)));
}

#[test]
fn duplicate_permission_is_rejected() {
    let json = r#"{"baseType":"sys:base","types":{"sys:base":null},
        "permissionSets":[{"class":"sys:base","groups":[{"name":"Read"}],
        "permissions":[{"name":"Read"}]}]}"#;
    let err = PermissionModel::from_json(json).unwrap_err();
    assert!(matches!(err, ModelError::DuplicateDefinition(d) if d == "sys:base.Read"));
}

#[test]
fn ambiguous_bare_name_is_rejected() {
    let json = r#"{"baseType":"sys:base","types":{"sys:base":null,"app:doc":"sys:base"},
        "permissionSets":[
            {"class":"sys:base","groups":[{"name":"Read"}]},
            {"class":"app:doc","groups":[{"name":"Read"}],
             "permissions":[{"name":"_Read","grantedTo":["Read"]}]}
        ]}"#;
    let err = PermissionModel::from_json(json).unwrap_err();
    assert!(matches!(err, ModelError::AmbiguousPermission(n) if n == "Read"));
}

#[test]
fn unknown_reference_is_rejected() {
    let json = r#"{"baseType":"sys:base","types":{"sys:base":null},
        "permissionSets":[{"class":"sys:base",
        "permissions":[{"name":"_X","grantedTo":["Nope"]}]}]}"#;
    let err = PermissionModel::from_json(json).unwrap_err();
    assert!(matches!(err, ModelError::UnknownPermission { .. }));
}

// ============================================================================
// Applicability
// ============================================================================

#[test]
fn content_permissions_do_not_apply_to_folders() {
    let model = default_model();
    let read_content = perm(&model, "_ReadContent");
    let none = aspects(&[]);
    assert!(model.all_permissions("cm:content", &none).contains(&read_content));
    assert!(!model.all_permissions("cm:folder", &none).contains(&read_content));
    // inherited from sys:base
    assert!(model
        .all_permissions("cm:folder", &none)
        .contains(&perm(&model, "Read")));
}

#[test]
fn aspects_add_permissions() {
    let model = default_model();
    let set_owner = perm(&model, "_SetOwner");
    assert!(!model.all_permissions("cm:content", &aspects(&[])).contains(&set_owner));
    assert!(model
        .all_permissions("cm:content", &aspects(&["cm:ownable"]))
        .contains(&set_owner));
}

#[test]
fn unknown_type_descends_from_base() {
    let model = default_model();
    let none = aspects(&[]);
    assert_eq!(
        model.all_permissions("app:unknown", &none),
        model.all_permissions("sys:base", &none)
    );
}

#[test]
fn exposed_permissions_are_groups_only_by_default() {
    let model = default_model();
    let exposed = model.exposed_permissions("cm:content", &aspects(&[]));
    assert!(exposed.contains(&perm(&model, "Read")));
    assert!(exposed.contains(&perm(&model, "Coordinator")));
    assert!(!exposed.contains(&perm(&model, "_ReadProperties")));
}

#[test]
fn everywhere_is_a_superset() {
    let model = default_model();
    let everywhere = model.all_permissions_everywhere();
    let on_content = model.all_permissions("cm:content", &aspects(&["cm:lockable"]));
    assert!(on_content.is_subset(&everywhere));
    assert!(!everywhere.contains(&model.all_permission_reference()));
}

#[test]
fn class_chain_walks_to_base() {
    let model = default_model();
    assert_eq!(
        model.class_chain("cm:content"),
        vec!["cm:content", "cm:cmobject", "sys:base"]
    );
    assert_eq!(model.class_chain("app:unknown"), vec!["app:unknown"]);
}

// ============================================================================
// Granting / grantee relations
// ============================================================================

#[test]
fn granting_is_transitive() {
    let model = default_model();
    let granting = model.granting_permissions(perm(&model, "_ReadProperties"));
    for name in [
        "_ReadProperties",
        "ReadProperties",
        "Read",
        "Consumer",
        "Editor",
        "Contributor",
        "Collaborator",
        "Coordinator",
        "FullControl",
    ] {
        assert!(granting.contains(&perm(&model, name)), "{} missing", name);
    }
    assert!(!granting.contains(&perm(&model, "Write")));
}

#[test]
fn grantee_of_read() {
    let model = default_model();
    let grantee = model.grantee_permissions(perm(&model, "Read"));
    assert_eq!(
        names(&model, grantee),
        vec![
            "Read",
            "ReadChildren",
            "ReadContent",
            "ReadProperties",
            "_ReadChildren",
            "_ReadContent",
            "_ReadProperties"
        ]
    );
}

#[test]
fn full_control_grants_everything() {
    let model = default_model();
    let everything = model.all_permissions_everywhere();
    let grantee = model.grantee_permissions(model.full_control_reference());
    assert!(everything.is_subset(grantee));
}

// ============================================================================
// Requirements
// ============================================================================

#[test]
fn group_requires_applicable_atomics() {
    let model = default_model();
    let read = perm(&model, "Read");
    let none = aspects(&[]);
    let on_content = model.required_permissions(read, "cm:content", &none, RequiredOn::Node);
    assert_eq!(
        names(&model, &on_content),
        vec!["_ReadChildren", "_ReadContent", "_ReadProperties"]
    );
    let on_folder = model.required_permissions(read, "cm:folder", &none, RequiredOn::Node);
    assert_eq!(names(&model, &on_folder), vec!["_ReadChildren", "_ReadProperties"]);
    assert!(model
        .required_permissions(read, "cm:folder", &none, RequiredOn::Parent)
        .is_empty());
}

#[test]
fn atomic_requires_declared_scopes() {
    let model = cascading_delete_model();
    let delete_node = perm(&model, "_DeleteNode");
    let none = aspects(&[]);
    let parent = model.required_permissions(delete_node, "cm:folder", &none, RequiredOn::Parent);
    let children =
        model.required_permissions(delete_node, "cm:folder", &none, RequiredOn::Children);
    assert_eq!(names(&model, &parent), vec!["_DeleteChildren"]);
    assert_eq!(names(&model, &children), vec!["_DeleteNode"]);
    assert!(model
        .required_permissions(delete_node, "cm:folder", &none, RequiredOn::Node)
        .is_empty());
}

#[test]
fn default_model_is_usable_on_acls() {
    let model = default_model();
    let none = aspects(&[]);
    for permission in model.all_permissions_everywhere() {
        for on in [RequiredOn::Parent, RequiredOn::Children] {
            for class in ["cm:content", "cm:folder"] {
                let required = model.required_permissions(permission, class, &none, on);
                assert!(
                    required.is_empty(),
                    "{} has {:?} requirements on {}",
                    model.permission_name(permission),
                    on,
                    class
                );
            }
        }
    }
}

#[test]
fn all_permissions_requires_every_applicable_atomic() {
    let model = default_model();
    let none = aspects(&[]);
    let all = model.required_permissions(
        model.all_permission_reference(),
        "cm:folder",
        &none,
        RequiredOn::Node,
    );
    let full_control = model.required_permissions(
        model.full_control_reference(),
        "cm:folder",
        &none,
        RequiredOn::Node,
    );
    assert_eq!(all, full_control);
    assert!(!all.contains(&perm(&model, "_ReadContent")));
}

#[test]
fn unconditional_requirements_ignore_type() {
    let model = default_model();
    let read = perm(&model, "Read");
    let unconditional = model.unconditional_required_permissions(read, RequiredOn::Node);
    assert!(unconditional.contains(&perm(&model, "_ReadContent")));
}

#[test]
fn check_permission_only_for_atomics() {
    let model = default_model();
    assert!(model.check_permission(perm(&model, "_ReadProperties")));
    assert!(!model.check_permission(perm(&model, "Read")));
    assert!(!model.check_permission(model.all_permission_reference()));
}

// ============================================================================
// Names
// ============================================================================

#[test]
fn reference_lookup_forms() {
    let model = PermissionModel::from_json(SHADOWED).unwrap();
    let base_read = model.permission_reference(Some("sys:base"), "Read").unwrap();
    let doc_read = model.permission_reference(Some("app:doc"), "Read").unwrap();
    assert_ne!(base_read, doc_read);
    assert_eq!(model.permission_reference(None, "Read"), None);
    assert_eq!(model.permission_reference(None, "app:doc.Read"), Some(doc_read));
    assert_eq!(
        model.permission_reference(None, "All"),
        Some(model.all_permission_reference())
    );
    assert!(model.permission_reference(Some("sys:base"), "Write").is_none());
}

#[test]
fn permission_name_qualifies_only_when_needed() {
    let model = PermissionModel::from_json(SHADOWED).unwrap();
    let doc_read = model.permission_reference(Some("app:doc"), "Read").unwrap();
    let atomic = model.permission_reference(None, "_Read").unwrap();
    assert!(!model.is_unique(doc_read));
    assert_eq!(model.permission_name(doc_read), "app:doc.Read");
    assert!(model.is_unique(atomic));
    assert_eq!(model.permission_name(atomic), "_Read");
}

#[test]
fn shadowing_group_grants_through_include() {
    let model = PermissionModel::from_json(SHADOWED).unwrap();
    let doc_read = model.permission_reference(Some("app:doc"), "Read").unwrap();
    let atomic = model.permission_reference(None, "_Read").unwrap();
    assert!(model.granting_permissions(atomic).contains(&doc_read));
}

// ============================================================================
// Properties
// ============================================================================

const TYPES: &[&str] = &["sys:base", "cm:cmobject", "cm:content", "cm:folder", "x:other"];
const ASPECTS: &[&str] = &["cm:ownable", "cm:lockable", "cm:workingcopy", "x:aspect"];

proptest! {
    #[test]
    fn prop_aspects_are_monotonic(
        type_index in 0..TYPES.len(),
        mask in 0u8..16,
        extra in 0..ASPECTS.len(),
    ) {
        let model = default_model();
        let base: AHashSet<String> = ASPECTS
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, a)| a.to_string())
            .collect();
        let mut more = base.clone();
        more.insert(ASPECTS[extra].to_string());
        let before = model.all_permissions(TYPES[type_index], &base);
        let after = model.all_permissions(TYPES[type_index], &more);
        prop_assert!(before.is_subset(&after));
    }

    #[test]
    fn prop_granting_and_grantee_are_dual(a in 0usize..64, b in 0usize..64) {
        let model = default_model();
        let mut refs: Vec<PermissionReference> =
            model.all_permissions_everywhere().into_iter().collect();
        refs.sort_by_key(|r| model.registry().render(*r));
        let x = refs[a % refs.len()];
        let y = refs[b % refs.len()];
        prop_assert!(model.granting_permissions(x).contains(&x));
        prop_assert!(model.grantee_permissions(x).contains(&x));
        prop_assert_eq!(
            model.granting_permissions(y).contains(&x),
            model.grantee_permissions(x).contains(&y)
        );
    }
}

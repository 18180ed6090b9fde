//! The permission model: static lookups over declared permissions.
//!
//! Built once from a [`ModelDefinition`] and then shared immutably. All
//! queries are pure in-memory lookups and never fail; the granting and grantee
//! relations are precomputed as reflexive, transitive closures at build time.

use std::path::Path;

use ahash::{AHashMap, AHashSet};

use crate::config::{parse_model_definition, ModelDefinition};
use crate::error::ModelError;
use crate::reference::{PermissionReference, PermissionRegistry};
use crate::types::{PermissionEntry, PermissionScope, RequiredOn, ALL_PERMISSIONS, FULL_CONTROL};

/// Built-in definitions covering the standard content types and roles.
pub const DEFAULT_DEFINITIONS: &str = include_str!("../../models/default_permissions.json");

/// Facts about one declared permission.
#[derive(Debug, Clone)]
struct PermissionInfo {
    atomic: bool,
    exposed: bool,
    requires: Vec<(RequiredOn, PermissionReference)>,
}

/// The static permission model.
#[derive(Debug, Clone)]
pub struct PermissionModel {
    registry: PermissionRegistry,
    base_type: String,
    /// Class → parent class, for types and aspects alike.
    parents: AHashMap<String, Option<String>>,
    aspects: AHashSet<String>,
    info: AHashMap<PermissionReference, PermissionInfo>,
    /// Class → permissions it declares.
    declared: AHashMap<String, Vec<PermissionReference>>,
    granting: AHashMap<PermissionReference, AHashSet<PermissionReference>>,
    grantee: AHashMap<PermissionReference, AHashSet<PermissionReference>>,
    globals: Vec<PermissionEntry>,
    all: PermissionReference,
    full_control: PermissionReference,
    empty: AHashSet<PermissionReference>,
}

impl PermissionModel {
    // ========================================================================
    // Construction
    // ========================================================================

    /// The model embedded in the crate.
    pub fn default_model() -> Result<Self, ModelError> {
        Self::from_json(DEFAULT_DEFINITIONS)
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let definition = parse_model_definition(json)?;
        Self::from_definition(&definition)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelError::DefinitionsNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Validate `definition` and precompute every relation.
    pub fn from_definition(definition: &ModelDefinition) -> Result<Self, ModelError> {
        let mut registry = PermissionRegistry::new();
        let all = registry.intern("", ALL_PERMISSIONS);

        // Class hierarchy
        let mut parents: AHashMap<String, Option<String>> = definition
            .types
            .iter()
            .map(|(class, parent)| (class.clone(), parent.clone()))
            .collect();
        let mut aspects = AHashSet::new();
        for (class, parent) in &definition.aspects {
            if parents.insert(class.clone(), parent.clone()).is_some() {
                return Err(ModelError::DuplicateDefinition(class.clone()));
            }
            aspects.insert(class.clone());
        }
        if !definition.types.contains_key(&definition.base_type) {
            return Err(ModelError::UnknownClass(definition.base_type.clone()));
        }
        check_hierarchy(&parents)?;

        // Declarations
        let mut info = AHashMap::new();
        let mut declared: AHashMap<String, Vec<PermissionReference>> = AHashMap::new();
        let mut groups = Vec::new();
        let mut atomics = Vec::new();
        for set in &definition.permission_sets {
            if !parents.contains_key(&set.class) {
                return Err(ModelError::UnknownClass(set.class.clone()));
            }
            let names = set
                .groups
                .iter()
                .map(|g| (g.name.as_str(), false, g.expose))
                .chain(set.permissions.iter().map(|p| (p.name.as_str(), true, p.expose)));
            for (name, atomic, exposed) in names {
                if name == ALL_PERMISSIONS || registry.lookup(&set.class, name).is_some() {
                    return Err(ModelError::DuplicateDefinition(format!(
                        "{}.{}",
                        set.class, name
                    )));
                }
                let reference = registry.intern(&set.class, name);
                info.insert(
                    reference,
                    PermissionInfo {
                        atomic,
                        exposed,
                        requires: Vec::new(),
                    },
                );
                declared.entry(set.class.clone()).or_default().push(reference);
            }
            for group in &set.groups {
                groups.push((registry.intern(&set.class, &group.name), group));
            }
            for permission in &set.permissions {
                atomics.push((registry.intern(&set.class, &permission.name), permission));
            }
        }

        // Direct "x grants y" edges and requirements
        let mut grants: AHashMap<PermissionReference, AHashSet<PermissionReference>> =
            AHashMap::new();
        let mut grants_all = Vec::new();
        for (reference, group) in &groups {
            if group.grants_all {
                grants_all.push(*reference);
            }
            for include in &group.includes {
                let target = resolve(&registry, include)?;
                grants.entry(*reference).or_default().insert(target);
            }
        }
        for (reference, permission) in &atomics {
            for group in &permission.granted_to {
                let source = resolve(&registry, group)?;
                grants.entry(source).or_default().insert(*reference);
            }
            let mut requires = Vec::with_capacity(permission.requires.len());
            for requirement in &permission.requires {
                requires.push((requirement.on, resolve(&registry, &requirement.name)?));
            }
            if let Some(entry) = info.get_mut(reference) {
                entry.requires = requires;
            }
        }
        let everything: Vec<PermissionReference> = info.keys().copied().collect();
        for group in &grants_all {
            grants
                .entry(*group)
                .or_default()
                .extend(everything.iter().copied());
        }

        // Closures
        let mut granting: AHashMap<PermissionReference, AHashSet<PermissionReference>> =
            AHashMap::new();
        let mut grantee = AHashMap::new();
        for &start in everything.iter().chain(std::iter::once(&all)) {
            let reached = reachable(&grants, start);
            for &target in &reached {
                granting.entry(target).or_default().insert(start);
            }
            grantee.insert(start, reached);
        }

        let full_control = match registry.with_name(FULL_CONTROL) {
            [only] => *only,
            _ => grants_all.first().copied().unwrap_or(all),
        };

        let mut globals = Vec::with_capacity(definition.global_permissions.len());
        for global in &definition.global_permissions {
            globals.push(PermissionEntry {
                scope: PermissionScope::Global,
                authority: global.authority.clone(),
                permission: resolve(&registry, &global.permission)?,
                access: global.access,
                position: 0,
            });
        }

        Ok(Self {
            registry,
            base_type: definition.base_type.clone(),
            parents,
            aspects,
            info,
            declared,
            granting,
            grantee,
            globals,
            all,
            full_control,
            empty: AHashSet::new(),
        })
    }

    // ========================================================================
    // Applicability
    // ========================================================================

    /// Every permission applicable to a node of `type_qname` with `aspects`.
    pub fn all_permissions(
        &self,
        type_qname: &str,
        aspects: &AHashSet<String>,
    ) -> AHashSet<PermissionReference> {
        self.classes_for(type_qname, aspects)
            .into_iter()
            .filter_map(|class| self.declared.get(class))
            .flatten()
            .copied()
            .collect()
    }

    /// Every permission declared anywhere in the model.
    pub fn all_permissions_everywhere(&self) -> AHashSet<PermissionReference> {
        self.info.keys().copied().collect()
    }

    /// The user-settable subset of [`all_permissions`](Self::all_permissions).
    pub fn exposed_permissions(
        &self,
        type_qname: &str,
        aspects: &AHashSet<String>,
    ) -> AHashSet<PermissionReference> {
        self.all_permissions(type_qname, aspects)
            .into_iter()
            .filter(|p| self.info.get(p).is_some_and(|i| i.exposed))
            .collect()
    }

    fn classes_for<'a>(
        &'a self,
        type_qname: &'a str,
        aspects: &'a AHashSet<String>,
    ) -> AHashSet<&'a str> {
        let mut classes = AHashSet::new();
        let start = if self.parents.contains_key(type_qname) && !self.aspects.contains(type_qname)
        {
            type_qname
        } else {
            self.base_type.as_str()
        };
        self.push_chain(start, &mut classes);
        for aspect in aspects {
            if self.aspects.contains(aspect) {
                self.push_chain(aspect, &mut classes);
            }
        }
        classes
    }

    /// `class` followed by its super-classes, nearest first. Unknown classes
    /// yield only themselves.
    pub fn class_chain<'a>(&'a self, class: &'a str) -> Vec<&'a str> {
        let mut chain = vec![class];
        let mut current = self.parents.get(class).and_then(|p| p.as_deref());
        while let Some(parent) = current {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = self.parents.get(parent).and_then(|p| p.as_deref());
        }
        chain
    }

    fn push_chain<'a>(&'a self, class: &'a str, out: &mut AHashSet<&'a str>) {
        let mut current = Some(class);
        while let Some(c) = current {
            if !out.insert(c) {
                break;
            }
            current = self.parents.get(c).and_then(|p| p.as_deref());
        }
    }

    // ========================================================================
    // Relations
    // ========================================================================

    /// Permissions whose grant implies `permission`, including itself.
    pub fn granting_permissions(
        &self,
        permission: PermissionReference,
    ) -> &AHashSet<PermissionReference> {
        self.granting.get(&permission).unwrap_or(&self.empty)
    }

    /// Permissions implied by a grant of `permission`, including itself.
    pub fn grantee_permissions(
        &self,
        permission: PermissionReference,
    ) -> &AHashSet<PermissionReference> {
        self.grantee.get(&permission).unwrap_or(&self.empty)
    }

    /// Permissions that must also hold at `on` for `permission` to hold on a
    /// node of the given type and aspects.
    ///
    /// A group at node scope requires the applicable atomic permissions it
    /// grants. An atomic permission requires what it declares.
    pub fn required_permissions(
        &self,
        permission: PermissionReference,
        type_qname: &str,
        aspects: &AHashSet<String>,
        on: RequiredOn,
    ) -> AHashSet<PermissionReference> {
        if on == RequiredOn::Node && !self.check_permission(permission) {
            let applicable = self.all_permissions(type_qname, aspects);
            return self.requirements(permission, on, Some(&applicable));
        }
        self.requirements(permission, on, None)
    }

    /// [`required_permissions`](Self::required_permissions) ignoring type and aspects.
    pub fn unconditional_required_permissions(
        &self,
        permission: PermissionReference,
        on: RequiredOn,
    ) -> AHashSet<PermissionReference> {
        self.requirements(permission, on, None)
    }

    fn requirements(
        &self,
        permission: PermissionReference,
        on: RequiredOn,
        applicable: Option<&AHashSet<PermissionReference>>,
    ) -> AHashSet<PermissionReference> {
        let is_applicable = |p: &PermissionReference| applicable.map_or(true, |a| a.contains(p));
        if permission == self.all {
            if on != RequiredOn::Node {
                return AHashSet::new();
            }
            return self
                .info
                .iter()
                .filter(|(p, i)| i.atomic && is_applicable(p))
                .map(|(p, _)| *p)
                .collect();
        }
        match self.info.get(&permission) {
            None => AHashSet::new(),
            Some(info) if info.atomic => info
                .requires
                .iter()
                .filter(|(scope, _)| *scope == on)
                .map(|(_, p)| *p)
                .collect(),
            Some(_) if on == RequiredOn::Node => self
                .grantee_permissions(permission)
                .iter()
                .filter(|p| self.check_permission(**p) && is_applicable(p))
                .copied()
                .collect(),
            Some(_) => AHashSet::new(),
        }
    }

    /// Whether `permission` is atomic, i.e. tested directly against entries.
    pub fn check_permission(&self, permission: PermissionReference) -> bool {
        self.info.get(&permission).is_some_and(|i| i.atomic)
    }

    pub fn is_exposed(&self, permission: PermissionReference) -> bool {
        self.info.get(&permission).is_some_and(|i| i.exposed)
    }

    // ========================================================================
    // Names
    // ========================================================================

    /// Whether the local name alone identifies `permission`.
    pub fn is_unique(&self, permission: PermissionReference) -> bool {
        self.registry
            .with_name(self.registry.name(permission))
            .len()
            == 1
    }

    /// Resolve a permission by class and name, or by a bare or `qname.name` string.
    pub fn permission_reference(
        &self,
        qname: Option<&str>,
        name: &str,
    ) -> Option<PermissionReference> {
        match qname {
            Some(qname) => self.registry.lookup(qname, name),
            None => resolve(&self.registry, name).ok(),
        }
    }

    /// Bare name when unique, `qname.name` otherwise.
    pub fn permission_name(&self, permission: PermissionReference) -> String {
        if self.is_unique(permission) {
            self.registry.name(permission).to_string()
        } else {
            self.registry.render(permission)
        }
    }

    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }

    // ========================================================================
    // Well-known references and globals
    // ========================================================================

    pub fn all_permission_reference(&self) -> PermissionReference {
        self.all
    }

    /// The group standing in for ALL_PERMISSIONS when collecting node requirements.
    pub fn full_control_reference(&self) -> PermissionReference {
        self.full_control
    }

    pub fn global_permission_entries(&self) -> &[PermissionEntry] {
        &self.globals
    }

    pub fn base_type(&self) -> &str {
        &self.base_type
    }

    /// Number of declared permissions, excluding ALL_PERMISSIONS.
    pub fn len(&self) -> usize {
        self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }
}

fn resolve(registry: &PermissionRegistry, name: &str) -> Result<PermissionReference, ModelError> {
    match registry.with_name(name) {
        [only] => return Ok(*only),
        [] => {}
        _ => return Err(ModelError::AmbiguousPermission(name.to_string())),
    }
    if let Some((qname, local)) = name.rsplit_once('.') {
        if let Some(reference) = registry.lookup(qname, local) {
            return Ok(reference);
        }
    }
    Err(ModelError::UnknownPermission {
        qname: String::new(),
        name: name.to_string(),
    })
}

fn check_hierarchy(parents: &AHashMap<String, Option<String>>) -> Result<(), ModelError> {
    for class in parents.keys() {
        let mut seen = AHashSet::new();
        let mut current = class.as_str();
        while let Some(parent) = parents.get(current).and_then(|p| p.as_deref()) {
            if !parents.contains_key(parent) {
                return Err(ModelError::UnknownClass(parent.to_string()));
            }
            if !seen.insert(parent) {
                return Err(ModelError::ClassCycle(class.clone()));
            }
            current = parent;
        }
    }
    Ok(())
}

fn reachable(
    edges: &AHashMap<PermissionReference, AHashSet<PermissionReference>>,
    start: PermissionReference,
) -> AHashSet<PermissionReference> {
    let mut reached = AHashSet::new();
    let mut stack = vec![start];
    while let Some(current) = stack.pop() {
        if !reached.insert(current) {
            continue;
        }
        if let Some(next) = edges.get(&current) {
            stack.extend(next.iter().copied().filter(|n| !reached.contains(n)));
        }
    }
    reached
}

#[cfg(test)]
mod tests;

//! Tenant name-mangling.
//!
//! In a multi-tenant repository each tenant's stores carry the tenant domain
//! in their identifier (`@acme@SpacesStore`). Node refs are mangled before any
//! lookup so evaluation and cache keys always see the physical reference.

use acl_core::types::{NodeRef, StoreRef};

pub trait TenantService: Send + Sync {
    /// Physical (mangled) form of `node`.
    fn name(&self, node: &NodeRef) -> NodeRef;

    /// Logical (unmangled) form of `node`.
    fn base_name(&self, node: &NodeRef) -> NodeRef;

    fn store_name(&self, store: &StoreRef) -> StoreRef;
}

/// No tenancy: references pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleTenant;

impl TenantService for SingleTenant {
    fn name(&self, node: &NodeRef) -> NodeRef {
        node.clone()
    }

    fn base_name(&self, node: &NodeRef) -> NodeRef {
        node.clone()
    }

    fn store_name(&self, store: &StoreRef) -> StoreRef {
        store.clone()
    }
}

const SEPARATOR: char = '@';

/// All references belong to one tenant domain.
#[derive(Debug, Clone)]
pub struct TenantDomain {
    domain: String,
}

impl TenantDomain {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn prefix(&self) -> String {
        format!("{}{}{}", SEPARATOR, self.domain, SEPARATOR)
    }
}

impl TenantService for TenantDomain {
    fn name(&self, node: &NodeRef) -> NodeRef {
        NodeRef::new(self.store_name(&node.store), node.id.clone())
    }

    fn base_name(&self, node: &NodeRef) -> NodeRef {
        let prefix = self.prefix();
        match node.store.identifier.strip_prefix(&prefix) {
            Some(identifier) => NodeRef::new(
                StoreRef::new(node.store.protocol.clone(), identifier),
                node.id.clone(),
            ),
            None => node.clone(),
        }
    }

    fn store_name(&self, store: &StoreRef) -> StoreRef {
        if store.identifier.starts_with(SEPARATOR) {
            return store.clone();
        }
        StoreRef::new(
            store.protocol.clone(),
            format!("{}{}", self.prefix(), store.identifier),
        )
    }
}

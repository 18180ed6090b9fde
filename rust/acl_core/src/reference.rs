//! Interned permission references.
//!
//! A [`PermissionReference`] is a pair of interned symbols: the qualified name of
//! the class (type or aspect) that declares the permission and the permission's
//! local name. Equal `(qname, name)` pairs always intern to the same symbols, so
//! references compare and hash in O(1) and are `Copy`.
//!
//! The symbols are only meaningful inside the [`PermissionRegistry`] that created
//! them, which is owned by the permission model.

use ahash::AHashMap;
use string_interner::{DefaultStringInterner, DefaultSymbol};

/// Interned string symbol: 4 bytes, `Copy`, O(1) equality.
pub type Sym = DefaultSymbol;

/// Identifies one permission (atomic permission or permission group).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct PermissionReference {
    qname: Sym,
    name: Sym,
}

impl PermissionReference {
    /// Symbol of the declaring class.
    pub fn qname_sym(&self) -> Sym {
        self.qname
    }

    /// Symbol of the local name.
    pub fn name_sym(&self) -> Sym {
        self.name
    }
}

/// Interner for permission references plus a by-name index.
#[derive(Debug, Clone, Default)]
pub struct PermissionRegistry {
    interner: DefaultStringInterner,
    by_name: AHashMap<Sym, Vec<PermissionReference>>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `(qname, name)`, returning the existing reference if already known.
    pub fn intern(&mut self, qname: &str, name: &str) -> PermissionReference {
        let reference = PermissionReference {
            qname: self.interner.get_or_intern(qname),
            name: self.interner.get_or_intern(name),
        };
        let same_name = self.by_name.entry(reference.name).or_default();
        if !same_name.contains(&reference) {
            same_name.push(reference);
        }
        reference
    }

    /// Look up an already interned reference without allocating.
    pub fn lookup(&self, qname: &str, name: &str) -> Option<PermissionReference> {
        let reference = PermissionReference {
            qname: self.interner.get(qname)?,
            name: self.interner.get(name)?,
        };
        self.by_name
            .get(&reference.name)
            .filter(|refs| refs.contains(&reference))
            .map(|_| reference)
    }

    /// All references sharing the local name `name`, in interning order.
    pub fn with_name(&self, name: &str) -> &[PermissionReference] {
        self.interner
            .get(name)
            .and_then(|sym| self.by_name.get(&sym))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Qualified class name of `reference`.
    pub fn qname(&self, reference: PermissionReference) -> &str {
        self.interner.resolve(reference.qname).unwrap_or_default()
    }

    /// Local name of `reference`.
    pub fn name(&self, reference: PermissionReference) -> &str {
        self.interner.resolve(reference.name).unwrap_or_default()
    }

    /// Fully qualified rendering: `qname.name`.
    pub fn render(&self, reference: PermissionReference) -> String {
        let qname = self.qname(reference);
        if qname.is_empty() {
            self.name(reference).to_string()
        } else {
            format!("{}.{}", qname, self.name(reference))
        }
    }

    /// Number of distinct references.
    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

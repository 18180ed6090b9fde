//! Error types for building the permission model.

use std::fmt;
use std::path::PathBuf;

/// Errors raised while loading or validating permission definitions.
///
/// Queries against a built model never fail; every variant here is a
/// bootstrap-time configuration problem.
#[derive(Debug)]
pub enum ModelError {
    /// I/O error reading a definitions file.
    Io(std::io::Error),
    /// Definitions are not valid JSON for the expected shape.
    Parse(serde_json::Error),
    /// Definitions file not found.
    DefinitionsNotFound(PathBuf),
    /// A class (type or aspect) referenced but never declared.
    UnknownClass(String),
    /// A permission name that resolves to nothing.
    UnknownPermission { qname: String, name: String },
    /// A bare permission name declared by more than one class.
    AmbiguousPermission(String),
    /// The same permission or class declared twice.
    DuplicateDefinition(String),
    /// The class hierarchy loops back on itself.
    ClassCycle(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Io(e) => write!(f, "I/O error: {}", e),
            ModelError::Parse(e) => write!(f, "Invalid permission definitions: {}", e),
            ModelError::DefinitionsNotFound(p) => {
                write!(f, "Permission definitions not found: {}", p.display())
            }
            ModelError::UnknownClass(c) => write!(f, "Unknown class: {}", c),
            ModelError::UnknownPermission { qname, name } => {
                if qname.is_empty() {
                    write!(f, "Unknown permission: {}", name)
                } else {
                    write!(f, "Unknown permission: {}.{}", qname, name)
                }
            }
            ModelError::AmbiguousPermission(name) => {
                write!(f, "Ambiguous permission name: {}", name)
            }
            ModelError::DuplicateDefinition(what) => write!(f, "Duplicate definition: {}", what),
            ModelError::ClassCycle(c) => write!(f, "Class hierarchy cycle at {}", c),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Io(e) => Some(e),
            ModelError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ModelError {
    fn from(e: std::io::Error) -> Self {
        ModelError::Io(e)
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::Parse(e)
    }
}

//! `acl_core`: portable permission model for node access control.
//!
//! This crate holds the pure parts of permission evaluation: the declarative
//! permission model and the deny/grant algebra. It has no I/O beyond loading
//! definitions and no logging; the service crate builds evaluation on top.
//!
//! Modules:
//! - `reference`: interned permission references
//! - `types`: node/store refs, entries, ACLs, evaluation context
//! - `config`: JSON permission definitions
//! - `model`: the built permission model (applicability, closures, requirements)
//! - `rules`: deny expansion and grant tests
//! - `error`: model build errors

pub mod config;
pub mod error;
pub mod model;
pub mod reference;
pub mod rules;
pub mod types;

pub use error::ModelError;
pub use model::PermissionModel;
pub use reference::PermissionReference;

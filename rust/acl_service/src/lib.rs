//! `acl_service`: permission evaluation service over a node repository.
//!
//! Builds on the model and rules of `acl_core`: resolves the caller's
//! authorities, picks an evaluation strategy per node, caches verdicts and
//! notifies listeners of permission changes. Node and permission storage are
//! collaborator traits; an in-memory implementation backs tests and the CLI.
//!
//! Modules:
//! - `service`: entry points, authority resolution, mutations
//! - `engine`: node-walk, ACL and unconditional evaluation strategies
//! - `cache`: access verdict and reader-set caches
//! - `store`: collaborator traits (nodes, permissions, ACLs, directory)
//! - `memory`: in-memory collaborators and JSON fixtures
//! - `dynamic`: context-dependent authorities (owner, lock owner)
//! - `auth`: per-thread current authentication
//! - `tenant`: tenant name mangling
//! - `policy`: permission change listeners
//! - `guard`: declarative method guards
//! - `config`: service settings
//! - `error`: service errors

pub mod auth;
pub mod cache;
pub mod config;
pub mod dynamic;
pub mod engine;
pub mod error;
pub mod guard;
pub mod memory;
pub mod policy;
pub mod service;
pub mod store;
pub mod tenant;

pub use acl_core::types::AccessStatus;
pub use acl_core::PermissionModel;
pub use config::ServiceConfig;
pub use error::{PermissionError, Result};
pub use guard::{Guard, MethodGuardTable};
pub use service::PermissionService;

use acl_core::types::NodeRef;
use acl_core::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PermissionError {
    #[error("storage error: {0}")]
    Store(String),

    #[error("node not found: {0}")]
    NodeNotFound(NodeRef),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("unknown permission: {0}")]
    UnknownPermission(String),

    #[error("access denied: {permission} on {target}")]
    AccessDenied { permission: String, target: String },

    #[error("permission model error: {0}")]
    Model(#[from] ModelError),

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PermissionError>;

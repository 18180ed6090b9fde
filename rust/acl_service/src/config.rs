//! Service configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration for a [`PermissionService`](crate::service::PermissionService).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Any deny for any acting authority vetoes a grant, not only a deny for
    /// the granting entry's own authority.
    pub any_deny_denies: bool,

    /// Maximum number of cached verdicts before eviction kicks in.
    pub access_cache_max_entries: usize,

    /// Number of ACL versions whose reader sets are kept.
    pub readers_cache_capacity: usize,

    /// Nesting limit for requirement evaluation (parent and children scopes).
    /// Exceeding it fails closed.
    pub max_evaluation_depth: usize,

    /// The run-as user that bypasses every check.
    pub system_user_name: String,

    /// Role that may use base-type permissions on any node type.
    pub admin_role_name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            any_deny_denies: false,
            access_cache_max_entries: 50_000,
            readers_cache_capacity: 1024,
            max_evaluation_depth: 64,
            system_user_name: "System".to_string(),
            admin_role_name: acl_core::types::ADMINISTRATOR_AUTHORITY.to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServiceConfig::default();
        assert!(!config.any_deny_denies);
        assert_eq!(config.system_user_name, "System");
        assert_eq!(config.admin_role_name, "ROLE_ADMINISTRATOR");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ServiceConfig::from_json(r#"{"anyDenyDenies":true,"maxEvaluationDepth":8}"#)
            .unwrap();
        assert!(config.any_deny_denies);
        assert_eq!(config.max_evaluation_depth, 8);
        assert_eq!(config.access_cache_max_entries, 50_000);
    }

    #[test]
    fn from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.json");
        std::fs::write(&path, r#"{"systemUserName":"sys"}"#).unwrap();
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.system_user_name, "sys");
    }

    #[test]
    fn invalid_json_is_config_error() {
        let err = ServiceConfig::from_json("[").unwrap_err();
        assert!(matches!(err, crate::error::PermissionError::Config(_)));
    }
}

//! acl-eval: evaluate permissions against a repository fixture.
//!
//! # Usage
//!
//! ```bash
//! acl-eval --fixture repo.json check --user andy --node docs --permission Read
//! ACL_FIXTURE=repo.json acl-eval list --user andy --node workspace://SpacesStore/docs
//! ```
//!
//! A bare node id refers to a node in `workspace://SpacesStore`.

use std::path::PathBuf;
use std::sync::Arc;

use acl_core::types::NodeRef;
use acl_service::auth;
use acl_service::memory::{default_store, MemoryRepository};
use acl_service::store::NodeService;
use acl_service::{PermissionModel, PermissionService, ServiceConfig};
use anyhow::Context;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "acl-eval")]
#[command(about = "Evaluate node permissions against a repository fixture")]
#[command(version)]
struct Cli {
    /// Repository fixture (JSON)
    #[arg(long, env = "ACL_FIXTURE")]
    fixture: PathBuf,

    /// Permission model definitions (JSON); the built-in model when absent
    #[arg(long, env = "ACL_MODEL")]
    model: Option<PathBuf>,

    /// Service configuration (JSON); defaults when absent
    #[arg(long, env = "ACL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check one permission for a user on a node
    Check {
        #[arg(long)]
        user: String,
        #[arg(long)]
        node: String,
        #[arg(long)]
        permission: String,
    },
    /// Check read access through the reader-set fast path
    Read {
        #[arg(long)]
        user: String,
        #[arg(long)]
        node: String,
    },
    /// List the user's status for every settable permission on a node
    List {
        #[arg(long)]
        user: String,
        #[arg(long)]
        node: String,
    },
    /// Show the authorities allowed and denied Read by a node's ACL
    Readers {
        #[arg(long)]
        node: String,
    },
}

fn parse_node(raw: &str) -> anyhow::Result<NodeRef> {
    if raw.contains("://") {
        return Ok(raw.parse()?);
    }
    Ok(NodeRef::new(default_store(), raw))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let model = match &cli.model {
        Some(path) => PermissionModel::from_file(path)
            .with_context(|| format!("loading model {}", path.display()))?,
        None => PermissionModel::default_model()?,
    };
    let config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ServiceConfig::default(),
    };
    let fixture = std::fs::read_to_string(&cli.fixture)
        .with_context(|| format!("reading fixture {}", cli.fixture.display()))?;
    let repo = Arc::new(MemoryRepository::from_fixture(&fixture, &model)?);
    let service = PermissionService::in_memory(Arc::new(model), config, repo.clone())?;

    match cli.command {
        Commands::Check {
            user,
            node,
            permission,
        } => {
            let node = parse_node(&node)?;
            let status =
                auth::run_as_user(&user, || service.has_permission(Some(&node), &permission))?;
            println!("{}", status);
        }
        Commands::Read { user, node } => {
            let node = parse_node(&node)?;
            let status = auth::run_as_user(&user, || service.has_read_permission(Some(&node)))?;
            println!("{}", status);
        }
        Commands::List { user, node } => {
            let node = parse_node(&node)?;
            let permissions = auth::run_as_user(&user, || service.get_permissions(&node))?;
            for permission in permissions {
                println!("{}\t{}", permission.permission, permission.access);
            }
        }
        Commands::Readers { node } => {
            let node = parse_node(&node)?;
            let acl = repo
                .node_acl_id(&node)?
                .with_context(|| format!("{} has no ACL", node))?;
            let mut allowed: Vec<String> = service.get_readers(acl)?.iter().cloned().collect();
            let mut denied: Vec<String> =
                service.get_readers_denied(acl)?.iter().cloned().collect();
            allowed.sort();
            denied.sort();
            println!("allowed\t{}", allowed.join(","));
            println!("denied\t{}", denied.join(","));
        }
    }

    tracing::debug!(stats = ?service.cache_stats(), "done");
    Ok(())
}

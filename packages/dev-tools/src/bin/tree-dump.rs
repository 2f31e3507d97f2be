//! Tree dump - prints the save & restore node tree of a store
//!
//! Usage:
//!   SAVERESTORE_DB_PATH=./saverestore.db cargo run -p saverestore-dev-tools --bin tree-dump [PATH]
//!
//! With PATH (e.g. `/Machine/Injector`) only that subtree is printed.

use anyhow::{anyhow, Result};
use saverestore_core::db::DatabaseService;
use saverestore_core::models::{Node, NodeType};
use saverestore_core::services::{ConfigurationService, NodeService, SnapshotService};
use saverestore_core::StoreConfig;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = StoreConfig::from_env();
    tracing::info!("Opening store at {}", config.database_path.display());
    let db = Arc::new(DatabaseService::with_config(&config).await?);

    let nodes = NodeService::new(db.clone());
    let configs = ConfigurationService::new(db.clone());
    let snapshots = SnapshotService::new(db);

    let start = match std::env::args().nth(1) {
        Some(path) if path != "/" => nodes
            .resolve_path(&path)
            .await?
            .and_then(|chain| chain.into_iter().last())
            .ok_or_else(|| anyhow!("No node at path '{}'", path))?,
        _ => nodes.get_root_node().await?,
    };
    let start_path = nodes
        .full_path(&start.unique_id)
        .await?
        .unwrap_or_else(|| "/".to_string());

    let mut stack: Vec<(Node, String, usize)> = vec![(start, start_path, 0)];
    let mut count = 0usize;
    while let Some((node, path, depth)) = stack.pop() {
        count += 1;
        let detail = match node.node_type {
            NodeType::Configuration => {
                format!("{} pvs", configs.get_config_pvs(&node.unique_id).await?.len())
            }
            NodeType::Snapshot => {
                let items = snapshots.get_snapshot_items(&node.unique_id).await?.len();
                let tags: Vec<&str> = node.tags.iter().map(|t| t.name.as_str()).collect();
                if tags.is_empty() {
                    format!("{} items", items)
                } else {
                    format!("{} items, tags: {}", items, tags.join(", "))
                }
            }
            NodeType::Folder => String::new(),
        };
        println!(
            "{}{} [{}] {} {}",
            "  ".repeat(depth),
            path,
            node.node_type,
            node.user_name.as_deref().unwrap_or("-"),
            detail
        );

        if node.node_type == NodeType::Snapshot {
            continue;
        }
        let children = nodes.get_child_nodes(&node.unique_id).await?;
        for child in children.into_iter().rev() {
            let child_path = if path == "/" {
                format!("/{}", child.name)
            } else {
                format!("{}/{}", path, child.name)
            };
            stack.push((child, child_path, depth + 1));
        }
    }

    tracing::info!("Printed {} nodes", count);
    Ok(())
}

//! Snapshot Service - Captured values
//!
//! A snapshot is a SNAPSHOT node under a configuration plus one stored item
//! per captured PV. The comment lives in the node's `comment` property and
//! the author in its user name.

use crate::db::DatabaseService;
use crate::models::{ConfigPv, Node, NodeType, SnapshotItem, COMMENT_PROPERTY_KEY};
use crate::services::error::NodeServiceError;
use crate::services::node_service::insert_child;
use std::sync::Arc;

/// Pick the active-list entry an item refers to: by id when set, else by name
fn resolve_config_pv<'a>(active: &'a [ConfigPv], requested: &ConfigPv) -> Option<&'a ConfigPv> {
    match requested.id {
        Some(id) => active.iter().find(|pv| pv.id == Some(id)),
        None => active.iter().find(|pv| pv.pv_name == requested.pv_name),
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotService {
    db: Arc<DatabaseService>,
}

impl SnapshotService {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Store a new snapshot of a configuration
    ///
    /// Items with neither a value nor a readback value are skipped.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if the configuration does not exist
    /// - `InvalidArgument` if the id is not a configuration, the name clashes
    ///   with an existing snapshot, or an item names a PV that is not in the
    ///   configuration
    pub async fn save_snapshot(
        &self,
        config_unique_id: &str,
        items: Vec<SnapshotItem>,
        name: &str,
        comment: &str,
        user_name: &str,
    ) -> Result<Node, NodeServiceError> {
        let tx = self.db.begin().await?;
        let result: Result<(Node, usize), NodeServiceError> = async {
            let config = tx
                .node_by_unique_id(config_unique_id)
                .await?
                .ok_or_else(|| NodeServiceError::node_not_found(config_unique_id))?;

            let active = tx.config_pvs(config.id).await?;
            let mut resolved = Vec::with_capacity(items.len());
            for item in items.iter().filter(|i| i.has_data()) {
                let pv = resolve_config_pv(&active, &item.config_pv).ok_or_else(|| {
                    NodeServiceError::invalid_argument(format!(
                        "PV '{}' is not part of configuration {}",
                        item.config_pv.pv_name, config.unique_id
                    ))
                })?;
                let pv_id = pv.id.ok_or_else(|| {
                    NodeServiceError::serialization_error("Stored PV without id")
                })?;
                resolved.push((pv_id, item));
            }

            let proposal = Node::new(name, NodeType::Snapshot)
                .with_user_name(user_name)
                .with_property(COMMENT_PROPERTY_KEY, comment);
            let snapshot = insert_child(&tx, &config, &proposal).await?;

            for (position, (pv_id, item)) in resolved.iter().enumerate() {
                tx.insert_snapshot_item(snapshot.id, position, *pv_id, item)
                    .await?;
            }

            Ok((snapshot, resolved.len()))
        }
        .await;
        let (snapshot, stored_items) = tx.finish(result).await?;

        tracing::info!(
            "Saved snapshot '{}' ({}) of {} with {} item(s)",
            snapshot.name,
            snapshot.unique_id,
            config_unique_id,
            stored_items
        );
        Ok(snapshot)
    }

    /// Get a snapshot node
    ///
    /// # Errors
    ///
    /// `SnapshotNotFound` if the id does not name a snapshot.
    pub async fn get_snapshot(&self, unique_id: &str) -> Result<Node, NodeServiceError> {
        let conn = self.db.open().await?;
        conn.node_by_unique_id(unique_id)
            .await?
            .filter(|n| n.node_type == NodeType::Snapshot)
            .ok_or_else(|| NodeServiceError::snapshot_not_found(unique_id))
    }

    /// Stored items of a snapshot in capture order; empty for other ids
    pub async fn get_snapshot_items(
        &self,
        unique_id: &str,
    ) -> Result<Vec<SnapshotItem>, NodeServiceError> {
        let conn = self.db.open().await?;
        match conn.node_by_unique_id(unique_id).await? {
            Some(node) if node.node_type == NodeType::Snapshot => {
                Ok(conn.snapshot_items(node.id, &node.unique_id).await?)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Snapshots of a configuration in creation order; empty for other ids
    pub async fn get_snapshots(
        &self,
        config_unique_id: &str,
    ) -> Result<Vec<Node>, NodeServiceError> {
        let conn = self.db.open().await?;
        match conn.node_by_unique_id(config_unique_id).await? {
            Some(node) if node.node_type == NodeType::Configuration => Ok(conn
                .children(node.id)
                .await?
                .into_iter()
                .filter(|n| n.node_type == NodeType::Snapshot)
                .collect()),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
#[path = "snapshot_service_test.rs"]
mod snapshot_service_test;

//! Configuration Service - Active PV lists
//!
//! A configuration owns an ordered list of [`ConfigPv`] references. The rows
//! in `config_pv` are shared: two configurations naming the same PV (with the
//! same readback and read-only flag) point at the same row, and snapshot items
//! reference those rows directly. Replacing a configuration's list therefore
//! only rewrites its relation rows; a PV row survives as long as any
//! configuration or snapshot still references it.

use crate::db::DatabaseService;
use crate::models::{ConfigPv, Node, NodeType};
use crate::services::error::NodeServiceError;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ConfigurationService {
    db: Arc<DatabaseService>,
}

impl ConfigurationService {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Replace the full PV list of a configuration
    ///
    /// `pvs` becomes the complete list, in the given order. If the
    /// configuration carries a user name it is recorded as the last actor.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `config` is not a stored configuration, a PV name
    /// is blank, or the same PV name appears twice.
    pub async fn update_configuration(
        &self,
        config: &Node,
        pvs: Vec<ConfigPv>,
    ) -> Result<Node, NodeServiceError> {
        let mut names = HashSet::new();
        for pv in &pvs {
            pv.validate()?;
            if !names.insert(pv.pv_name.as_str()) {
                return Err(NodeServiceError::invalid_argument(format!(
                    "PV '{}' listed more than once",
                    pv.pv_name
                )));
            }
        }

        let tx = self.db.begin().await?;
        let result: Result<Node, NodeServiceError> = async {
            let stored = tx
                .node_by_unique_id(&config.unique_id)
                .await?
                .filter(|n| n.node_type == NodeType::Configuration)
                .ok_or_else(|| {
                    NodeServiceError::invalid_argument(format!(
                        "{} is not a configuration",
                        config.unique_id
                    ))
                })?;

            let mut pv_ids = Vec::with_capacity(pvs.len());
            for pv in &pvs {
                pv_ids.push(tx.find_or_insert_config_pv(pv).await?);
            }

            tx.replace_config_pv_relations(stored.id, &pv_ids).await?;
            tx.delete_orphan_config_pvs().await?;
            tx.touch(stored.id, config.user_name.as_deref()).await?;

            tx.node_by_id(stored.id)
                .await?
                .ok_or_else(|| NodeServiceError::node_not_found(&stored.unique_id))
        }
        .await;
        let updated = tx.finish(result).await?;

        tracing::info!(
            "Updated configuration '{}' ({}) with {} PV(s)",
            updated.name,
            updated.unique_id,
            pvs.len()
        );
        Ok(updated)
    }

    /// Active PV list of a configuration in stored order
    ///
    /// Empty for configurations without PVs and for ids that are not
    /// configurations.
    pub async fn get_config_pvs(
        &self,
        config_unique_id: &str,
    ) -> Result<Vec<ConfigPv>, NodeServiceError> {
        let conn = self.db.open().await?;
        match conn.node_by_unique_id(config_unique_id).await? {
            Some(node) if node.node_type == NodeType::Configuration => {
                Ok(conn.config_pvs(node.id).await?)
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
#[path = "configuration_service_test.rs"]
mod configuration_service_test;

//! Save & Restore Workflow Tests
//!
//! End-to-end scenario across all services: build a folder hierarchy, define a
//! configuration, take snapshots, tag one, then reorganize the tree with copy
//! and move and check that history stays intact.

#[cfg(test)]
mod workflow_tests {
    use anyhow::Result;
    use saverestore_core::db::DatabaseService;
    use saverestore_core::models::{ConfigPv, Display, Node, PvValue, SnapshotItem, Tag};
    use saverestore_core::services::{ConfigurationService, NodeService, SnapshotService};
    use saverestore_core::StoreConfig;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_full_workflow() -> Result<()> {
        let temp = TempDir::new()?;
        let config = StoreConfig::default().with_database_path(temp.path().join("workflow.db"));
        let db = Arc::new(DatabaseService::with_config(&config).await?);

        let nodes = NodeService::new(db.clone());
        let configs = ConfigurationService::new(db.clone());
        let snapshots = SnapshotService::new(db.clone());

        // Hierarchy on demand
        let injector = nodes.create_path("/Machine/Injector", "operator").await?;
        let archive = nodes.create_path("/Archive/2024", "operator").await?;

        let orbit = nodes
            .create_node(
                &injector.unique_id,
                Node::configuration("Orbit")
                    .with_user_name("operator")
                    .with_property("description", "Corrector settings"),
            )
            .await?;
        configs
            .update_configuration(
                &orbit,
                vec![
                    ConfigPv::new("INJ:HCOR1:SET").with_readback("INJ:HCOR1:RBV"),
                    ConfigPv::new("INJ:VCOR1:SET").with_readback("INJ:VCOR1:RBV"),
                    ConfigPv::new("INJ:MODE").read_only(),
                ],
            )
            .await?;
        let pvs = configs.get_config_pvs(&orbit.unique_id).await?;
        assert_eq!(pvs.len(), 3);

        let amps = Display {
            units: "A".to_string(),
            lower_ctrl: Some(-5.0),
            upper_ctrl: Some(5.0),
            ..Display::default()
        };
        let items: Vec<SnapshotItem> = pvs
            .iter()
            .take(2)
            .enumerate()
            .map(|(i, pv)| {
                SnapshotItem::new(pv.clone())
                    .with_value(PvValue::double(i as f64 + 0.5).with_display(amps.clone()))
                    .with_readback_value(PvValue::double(i as f64 + 0.49))
            })
            .collect();

        let morning = snapshots
            .save_snapshot(&orbit.unique_id, items.clone(), "morning", "before tuning", "alice")
            .await?;
        snapshots
            .save_snapshot(&orbit.unique_id, items, "evening", "after tuning", "bob")
            .await?;
        assert_eq!(snapshots.get_snapshots(&orbit.unique_id).await?.len(), 2);

        let mut morning = snapshots.get_snapshot(&morning.unique_id).await?;
        morning.add_tag(Tag::new("golden").with_comment("reference orbit").with_user_name("carol"));
        nodes.update_node(morning.clone(), false).await?;

        assert_eq!(
            nodes.full_path(&morning.unique_id).await?.as_deref(),
            Some("/Machine/Injector/Orbit/morning")
        );

        // Copy the configuration to the archive, then move the original
        nodes
            .copy_nodes(&[orbit.unique_id.clone()], &archive.unique_id, "archiver")
            .await?;
        let linac = nodes.create_path("/Machine/Linac", "operator").await?;
        nodes
            .move_nodes(&[orbit.unique_id.clone()], &linac.unique_id, "operator")
            .await?;

        let archived = nodes
            .resolve_path("/Archive/2024/Orbit/morning")
            .await?
            .expect("archived snapshot");
        let archived_morning = archived.last().expect("snapshot");
        assert_ne!(archived_morning.unique_id, morning.unique_id);
        assert_eq!(archived_morning.user_name.as_deref(), Some("alice"));
        assert_eq!(archived_morning.tags.len(), 1);
        assert_eq!(archived_morning.tags[0].user_name.as_deref(), Some("carol"));

        let archived_items = snapshots.get_snapshot_items(&archived_morning.unique_id).await?;
        assert_eq!(archived_items.len(), 2);
        assert_eq!(
            archived_items[0].value.as_ref().and_then(|v| v.display.clone()),
            Some(amps)
        );

        let moved = nodes
            .resolve_path("/Machine/Linac/Orbit")
            .await?
            .expect("moved configuration");
        assert_eq!(moved.last().expect("config").unique_id, orbit.unique_id);
        assert!(nodes.resolve_path("/Machine/Injector/Orbit").await?.is_none());

        // Deleting the original keeps the archived copy and its shared PVs
        nodes.delete_node(&orbit.unique_id).await?;
        let archived_config = &archived[archived.len() - 2];
        assert_eq!(configs.get_config_pvs(&archived_config.unique_id).await?, pvs);
        assert_eq!(
            snapshots.get_snapshot_items(&archived_morning.unique_id).await?,
            archived_items
        );
        Ok(())
    }
}

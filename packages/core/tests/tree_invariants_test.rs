//! Tree Invariant Tests
//!
//! Integration tests for the structural guarantees of the node tree:
//!
//! - Sibling uniqueness per (parent, name, type), also under concurrent writers
//! - Cascading subtree deletion with no orphaned dependent rows
//! - Strictly increasing `last_modified` on structural changes
//! - Path resolution as all-or-nothing
//! - Property removal through empty values

#[cfg(test)]
mod tree_invariant_tests {
    use anyhow::Result;
    use saverestore_core::db::{DatabaseService, SCHEMA_TABLES};
    use saverestore_core::models::{
        ConfigPv, Node, NodeType, PvValue, SnapshotItem, Tag, ROOT_NODE_UNIQUE_ID,
    };
    use saverestore_core::services::{ConfigurationService, NodeService, SnapshotService};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Store {
        db: Arc<DatabaseService>,
        nodes: NodeService,
        configs: ConfigurationService,
        snapshots: SnapshotService,
        _temp: TempDir,
    }

    async fn create_store() -> Result<Store> {
        let temp = TempDir::new()?;
        let db = Arc::new(DatabaseService::new(temp.path().join("tree.db")).await?);
        Ok(Store {
            nodes: NodeService::new(db.clone()),
            configs: ConfigurationService::new(db.clone()),
            snapshots: SnapshotService::new(db.clone()),
            db,
            _temp: temp,
        })
    }

    async fn count_rows(db: &DatabaseService, table: &str) -> Result<i64> {
        let conn = db.connect_with_timeout().await?;
        let mut rows = conn
            .query(&format!("SELECT COUNT(*) FROM {}", table), ())
            .await?;
        let row = rows.next().await?.expect("count row");
        Ok(row.get::<i64>(0)?)
    }

    #[tokio::test]
    async fn test_sibling_uniqueness_for_many_names() -> Result<()> {
        let store = create_store().await?;
        let parent = store
            .nodes
            .create_node(ROOT_NODE_UNIQUE_ID, Node::folder("parent"))
            .await?;

        for name in ["a", "B", "with space", "ünïcödé", "x/y"] {
            store
                .nodes
                .create_node(&parent.unique_id, Node::folder(name))
                .await?;
            let err = store
                .nodes
                .create_node(&parent.unique_id, Node::folder(name))
                .await
                .unwrap_err();
            assert!(err.is_invalid_argument(), "second folder {:?}", name);

            store
                .nodes
                .create_node(&parent.unique_id, Node::configuration(name))
                .await?;
        }

        assert_eq!(store.nodes.get_child_nodes(&parent.unique_id).await?.len(), 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_creates_under_same_parent() -> Result<()> {
        let store = create_store().await?;
        let nodes = Arc::new(store.nodes.clone());

        let mut handles = Vec::new();
        for i in 0..8 {
            let nodes = nodes.clone();
            handles.push(tokio::spawn(async move {
                nodes
                    .create_node(
                        ROOT_NODE_UNIQUE_ID,
                        Node::folder("contended").with_user_name(format!("writer-{}", i)),
                    )
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await? {
                Ok(_) => successes += 1,
                Err(err) => assert!(err.is_invalid_argument(), "unexpected error: {}", err),
            }
        }

        assert_eq!(successes, 1);
        let children = nodes.get_child_nodes(ROOT_NODE_UNIQUE_ID).await?;
        assert_eq!(children.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_leaves_no_orphans() -> Result<()> {
        let store = create_store().await?;
        let top = store
            .nodes
            .create_node(ROOT_NODE_UNIQUE_ID, Node::folder("top").with_property("k", "v"))
            .await?;
        let config = store
            .nodes
            .create_node(&top.unique_id, Node::configuration("cfg"))
            .await?;
        store
            .configs
            .update_configuration(&config, vec![ConfigPv::new("pv:a"), ConfigPv::new("pv:b")])
            .await?;
        let mut snapshot = store
            .snapshots
            .save_snapshot(
                &config.unique_id,
                vec![
                    SnapshotItem::new(ConfigPv::new("pv:a")).with_value(PvValue::double(1.0)),
                    SnapshotItem::new(ConfigPv::new("pv:b")).with_readback_value(PvValue::int(2)),
                ],
                "snap",
                "comment",
                "user",
            )
            .await?;
        snapshot.add_tag(Tag::new("golden"));
        store.nodes.update_node(snapshot.clone(), false).await?;

        store.nodes.delete_node(&top.unique_id).await?;

        for gone in [&top, &config, &snapshot] {
            assert!(store.nodes.get_node(&gone.unique_id).await?.is_none());
        }

        // Only the root and its marker property remain
        assert_eq!(count_rows(&store.db, "node").await?, 1);
        assert_eq!(count_rows(&store.db, "node_property").await?, 1);
        for table in SCHEMA_TABLES.iter().skip(2) {
            assert_eq!(count_rows(&store.db, table).await?, 0, "table {}", table);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_move_advances_every_touched_timestamp() -> Result<()> {
        let store = create_store().await?;
        let from = store
            .nodes
            .create_node(ROOT_NODE_UNIQUE_ID, Node::folder("from"))
            .await?;
        let to = store
            .nodes
            .create_node(ROOT_NODE_UNIQUE_ID, Node::folder("to"))
            .await?;
        let moving = store
            .nodes
            .create_node(&from.unique_id, Node::configuration("moving"))
            .await?;

        let from_before = store.nodes.get_node(&from.unique_id).await?.expect("from");
        let to_before = store.nodes.get_node(&to.unique_id).await?.expect("to");

        let target = store
            .nodes
            .move_nodes(&[moving.unique_id.clone()], &to.unique_id, "mover")
            .await?;

        let from_after = store.nodes.get_node(&from.unique_id).await?.expect("from");
        assert!(target.last_modified > to_before.last_modified);
        assert!(from_after.last_modified > from_before.last_modified);
        assert_eq!(
            store.nodes.full_path(&moving.unique_id).await?.as_deref(),
            Some("/to/moving")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_path_is_all_or_nothing() -> Result<()> {
        let store = create_store().await?;
        store.nodes.create_path("/a/b/c", "builder").await?;

        let chain = store.nodes.resolve_path("/a/b/c").await?.expect("chain");
        let names: Vec<&str> = chain.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        assert!(store.nodes.resolve_path("/a/b/d").await?.is_none());
        assert!(store.nodes.resolve_path("/a/x/c").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_path_prefers_complete_chain() -> Result<()> {
        let store = create_store().await?;
        // Folder "x" has no child "leaf", configuration "x" holds snapshot "leaf"
        store
            .nodes
            .create_node(ROOT_NODE_UNIQUE_ID, Node::folder("x"))
            .await?;
        let config = store
            .nodes
            .create_node(ROOT_NODE_UNIQUE_ID, Node::configuration("x"))
            .await?;
        store
            .snapshots
            .save_snapshot(&config.unique_id, vec![], "leaf", "", "user")
            .await?;

        let chain = store.nodes.resolve_path("/x/leaf").await?.expect("chain");
        assert_eq!(chain[0].node_type, NodeType::Configuration);
        assert_eq!(chain[1].node_type, NodeType::Snapshot);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_property_removes_key() -> Result<()> {
        let store = create_store().await?;
        let mut node = store
            .nodes
            .create_node(
                ROOT_NODE_UNIQUE_ID,
                Node::folder("props").with_property("description", "text"),
            )
            .await?;

        node.put_property("description", "");
        let updated = store.nodes.update_node(node, false).await?;
        assert_eq!(updated.get_property("description"), None);

        let fetched = store.nodes.get_node(&updated.unique_id).await?.expect("node");
        assert_eq!(fetched.get_property("description"), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_reopens_with_existing_data() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("persist.db");

        let created = {
            let db = Arc::new(DatabaseService::new(path.clone()).await?);
            NodeService::new(db)
                .create_node(ROOT_NODE_UNIQUE_ID, Node::folder("kept"))
                .await?
        };

        let db = Arc::new(DatabaseService::new(path).await?);
        let nodes = NodeService::new(db);
        assert_eq!(nodes.get_node(&created.unique_id).await?, Some(created));
        assert_eq!(nodes.get_child_nodes(ROOT_NODE_UNIQUE_ID).await?.len(), 1);
        Ok(())
    }
}

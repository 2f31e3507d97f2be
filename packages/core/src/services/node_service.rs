//! Node Service - Tree Repository
//!
//! This module provides the main business logic layer for the node tree:
//!
//! - CRUD operations (create, read, update, delete)
//! - Hierarchy navigation (children, parent, paths)
//! - Structural operations (move, deep copy)
//!
//! # Root Node
//!
//! The root folder is seeded by [`DatabaseService`] with the fixed unique id
//! [`ROOT_NODE_UNIQUE_ID`](crate::models::ROOT_NODE_UNIQUE_ID). It cannot be
//! renamed, retyped, moved, copied or deleted, and it is its own parent.
//!
//! # Transactions
//!
//! Every mutating operation opens one `BEGIN IMMEDIATE` transaction, performs
//! all checks inside it and either commits every row change or none.

use crate::db::{next_timestamp, DatabaseService, TreeConnection};
use crate::models::{Node, NodeType, Tag, ROOT_PROPERTY_KEY};
use crate::services::error::NodeServiceError;
use crate::services::path_resolver;
use crate::services::validation::{can_contain, move_or_copy_allowed};
use chrono::{SubsecRound, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// Properties as they may be stored for a non-root node
fn storable_properties(node: &Node) -> std::collections::BTreeMap<String, String> {
    let mut properties = node.properties.clone();
    properties.remove(ROOT_PROPERTY_KEY);
    properties
}

/// Insert `proposal` as a new child of `parent` inside the caller's transaction.
///
/// A fresh unique id is always generated. User name, properties and (for
/// snapshots) tags are taken from the proposal. The parent's `last_modified`
/// is advanced.
pub(crate) async fn insert_child(
    conn: &TreeConnection,
    parent: &Node,
    proposal: &Node,
) -> Result<Node, NodeServiceError> {
    proposal.validate()?;

    if !can_contain(parent.node_type, proposal.node_type) {
        return Err(NodeServiceError::invalid_argument(format!(
            "A {} cannot contain a {}",
            parent.node_type, proposal.node_type
        )));
    }

    if conn
        .sibling_exists(parent.id, &proposal.name, proposal.node_type)
        .await?
    {
        return Err(NodeServiceError::invalid_argument(format!(
            "Node of type {} named '{}' already exists in parent {}",
            proposal.node_type, proposal.name, parent.unique_id
        )));
    }

    let unique_id = Uuid::new_v4().to_string();
    let id = conn
        .insert_node(
            parent.id,
            &unique_id,
            &proposal.name,
            proposal.node_type,
            proposal.user_name.as_deref(),
            Utc::now().trunc_subsecs(6),
        )
        .await?;

    conn.replace_properties(id, &storable_properties(proposal))
        .await?;

    if proposal.node_type == NodeType::Snapshot && !proposal.tags.is_empty() {
        conn.replace_tags(id, &proposal.tags).await?;
    }

    conn.touch(parent.id, None).await?;

    conn.node_by_id(id)
        .await?
        .ok_or_else(|| NodeServiceError::node_not_found(unique_id))
}

/// Delete `node` and its whole subtree, deepest rows first
pub(crate) async fn delete_subtree(
    conn: &TreeConnection,
    node: &Node,
) -> Result<usize, NodeServiceError> {
    let ids = conn.subtree_ids_bottom_up(node.id).await?;
    for id in &ids {
        conn.delete_node_row(*id).await?;
    }
    Ok(ids.len())
}

/// Look up every id of a move/copy/delete request.
///
/// Blank and unknown ids reject the whole request. Duplicates are collapsed.
async fn load_selection(
    conn: &TreeConnection,
    unique_ids: &[String],
) -> Result<Vec<Node>, NodeServiceError> {
    if unique_ids.is_empty() {
        return Err(NodeServiceError::invalid_argument("No node ids given"));
    }

    let mut seen = HashSet::new();
    let mut nodes = Vec::with_capacity(unique_ids.len());
    for unique_id in unique_ids {
        if unique_id.trim().is_empty() {
            return Err(NodeServiceError::invalid_argument("Blank node id"));
        }
        if !seen.insert(unique_id.as_str()) {
            continue;
        }
        let node = conn.node_by_unique_id(unique_id).await?.ok_or_else(|| {
            NodeServiceError::invalid_argument(format!("Node {} does not exist", unique_id))
        })?;
        nodes.push(node);
    }
    Ok(nodes)
}

/// Core service for node CRUD and hierarchy operations
///
/// # Examples
///
/// ```no_run
/// use saverestore_core::db::DatabaseService;
/// use saverestore_core::models::Node;
/// use saverestore_core::services::NodeService;
/// use std::path::PathBuf;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/test.db")).await?);
///     let service = NodeService::new(db);
///
///     let root = service.get_root_node().await?;
///     let folder = service
///         .create_node(&root.unique_id, Node::folder("Beamline").with_user_name("operator"))
///         .await?;
///     println!("Created {}", folder.unique_id);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct NodeService {
    db: Arc<DatabaseService>,
}

impl NodeService {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// The pre-seeded root folder
    pub async fn get_root_node(&self) -> Result<Node, NodeServiceError> {
        let conn = self.db.open().await?;
        Ok(path_resolver::root(&conn).await?)
    }

    /// Get a node by unique id
    ///
    /// Returns `Ok(None)` if no such node exists.
    pub async fn get_node(&self, unique_id: &str) -> Result<Option<Node>, NodeServiceError> {
        let conn = self.db.open().await?;
        let node = conn.node_by_unique_id(unique_id).await?;
        tracing::debug!("get_node {} -> found={}", unique_id, node.is_some());
        Ok(node)
    }

    /// Create a node under an existing parent
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if the parent does not exist
    /// - `InvalidArgument` for a blank name, a type the parent cannot
    ///   contain, or a sibling with the same name and type
    pub async fn create_node(
        &self,
        parent_unique_id: &str,
        proposal: Node,
    ) -> Result<Node, NodeServiceError> {
        let tx = self.db.begin().await?;
        let result: Result<Node, NodeServiceError> = async {
            let parent = tx
                .node_by_unique_id(parent_unique_id)
                .await?
                .ok_or_else(|| NodeServiceError::node_not_found(parent_unique_id))?;
            insert_child(&tx, &parent, &proposal).await
        }
        .await;
        let node = tx.finish(result).await?;

        tracing::info!(
            "Created {} '{}' ({}) under {}",
            node.node_type,
            node.name,
            node.unique_id,
            parent_unique_id
        );
        Ok(node)
    }

    /// Persist name, user name, properties and (for snapshots) tags of `node`
    ///
    /// The node is located by its unique id. With `custom_time_for_migration`
    /// the caller's `created` and `last_modified` are stored as given;
    /// otherwise `last_modified` is advanced.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if the node does not exist
    /// - `InvalidArgument` for the root, a type change, a blank name or a
    ///   rename onto an existing sibling of the same type
    pub async fn update_node(
        &self,
        node: Node,
        custom_time_for_migration: bool,
    ) -> Result<Node, NodeServiceError> {
        let tx = self.db.begin().await?;
        let result: Result<Node, NodeServiceError> = async {
            let stored = tx
                .node_by_unique_id(&node.unique_id)
                .await?
                .ok_or_else(|| NodeServiceError::node_not_found(&node.unique_id))?;

            if stored.is_root() {
                return Err(NodeServiceError::invalid_argument(
                    "The root node cannot be modified",
                ));
            }
            if stored.node_type != node.node_type {
                return Err(NodeServiceError::invalid_argument(format!(
                    "Cannot change type of node {} from {} to {}",
                    stored.unique_id, stored.node_type, node.node_type
                )));
            }
            node.validate()?;

            if node.name != stored.name {
                if let Some(parent_uid) = stored.parent_unique_id.as_deref() {
                    if let Some(parent) = tx.node_by_unique_id(parent_uid).await? {
                        if tx
                            .sibling_exists(parent.id, &node.name, node.node_type)
                            .await?
                        {
                            return Err(NodeServiceError::invalid_argument(format!(
                                "Node of type {} named '{}' already exists in parent {}",
                                node.node_type, node.name, parent_uid
                            )));
                        }
                    }
                }
            }

            let last_modified = if custom_time_for_migration {
                tx.set_created(stored.id, node.created).await?;
                node.last_modified
            } else {
                next_timestamp(stored.last_modified)
            };

            tx.update_node_row(
                stored.id,
                &node.name,
                node.user_name.as_deref(),
                last_modified,
            )
            .await?;
            tx.replace_properties(stored.id, &storable_properties(&node))
                .await?;

            if stored.node_type == NodeType::Snapshot {
                let tags: Vec<Tag> = node
                    .tags
                    .iter()
                    .cloned()
                    .map(|mut tag| {
                        tag.snapshot_id = stored.unique_id.clone();
                        tag
                    })
                    .collect();
                tx.replace_tags(stored.id, &tags).await?;
            }

            tx.node_by_id(stored.id)
                .await?
                .ok_or_else(|| NodeServiceError::node_not_found(&stored.unique_id))
        }
        .await;
        let updated = tx.finish(result).await?;

        tracing::info!("Updated {} '{}' ({})", updated.node_type, updated.name, updated.unique_id);
        Ok(updated)
    }

    /// Delete a node and its entire subtree
    pub async fn delete_node(&self, unique_id: &str) -> Result<(), NodeServiceError> {
        self.delete_nodes(&[unique_id.to_string()]).await
    }

    /// Delete several nodes (and their subtrees) atomically
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the list is empty, any id is blank or unknown, or
    /// the root is included. Nothing is deleted in that case.
    pub async fn delete_nodes(&self, unique_ids: &[String]) -> Result<(), NodeServiceError> {
        let tx = self.db.begin().await?;
        let result: Result<usize, NodeServiceError> = async {
            let nodes = load_selection(&tx, unique_ids).await?;
            if nodes.iter().any(Node::is_root) {
                return Err(NodeServiceError::invalid_argument(
                    "The root node cannot be deleted",
                ));
            }

            let mut removed = 0;
            for node in &nodes {
                removed += delete_subtree(&tx, node).await?;
                if let Some(parent_uid) = node.parent_unique_id.as_deref() {
                    if let Some(parent) = tx.node_by_unique_id(parent_uid).await? {
                        tx.touch(parent.id, None).await?;
                    }
                }
            }

            tx.delete_orphan_config_pvs().await?;
            Ok(removed)
        }
        .await;
        let removed = tx.finish(result).await?;

        tracing::info!(
            "Deleted {} node(s) ({} including descendants)",
            unique_ids.len(),
            removed
        );
        Ok(())
    }

    /// Direct children of a node, in creation order
    ///
    /// # Errors
    ///
    /// `NodeNotFound` if the parent does not exist.
    pub async fn get_child_nodes(
        &self,
        parent_unique_id: &str,
    ) -> Result<Vec<Node>, NodeServiceError> {
        let conn = self.db.open().await?;
        let parent = conn
            .node_by_unique_id(parent_unique_id)
            .await?
            .ok_or_else(|| NodeServiceError::node_not_found(parent_unique_id))?;
        Ok(conn.children(parent.id).await?)
    }

    /// Parent of a node; the root is its own parent
    pub async fn get_parent_node(&self, unique_id: &str) -> Result<Option<Node>, NodeServiceError> {
        let conn = self.db.open().await?;
        let Some(node) = conn.node_by_unique_id(unique_id).await? else {
            return Ok(None);
        };
        match node.parent_unique_id.as_deref() {
            Some(parent_uid) => Ok(conn.node_by_unique_id(parent_uid).await?),
            None => Ok(Some(node)),
        }
    }

    /// Tags of a snapshot in insertion order; empty for anything else
    pub async fn get_tags(&self, snapshot_unique_id: &str) -> Result<Vec<Tag>, NodeServiceError> {
        Ok(self
            .get_node(snapshot_unique_id)
            .await?
            .filter(|n| n.node_type == NodeType::Snapshot)
            .map(|n| n.tags)
            .unwrap_or_default())
    }

    /// Whether `nodes` may be moved or copied into `target`
    pub async fn is_move_or_copy_allowed(
        &self,
        nodes: &[Node],
        target: &Node,
    ) -> Result<bool, NodeServiceError> {
        let conn = self.db.open().await?;
        Ok(move_or_copy_allowed(&conn, nodes, target).await?)
    }

    /// Shared preconditions of move and copy; returns (target, selection)
    async fn check_relocation(
        conn: &TreeConnection,
        unique_ids: &[String],
        target_unique_id: &str,
    ) -> Result<(Node, Vec<Node>), NodeServiceError> {
        let target = conn
            .node_by_unique_id(target_unique_id)
            .await?
            .ok_or_else(|| NodeServiceError::node_not_found(target_unique_id))?;

        if target.node_type != NodeType::Folder {
            return Err(NodeServiceError::invalid_argument(format!(
                "Target {} is a {}, not a folder",
                target.unique_id, target.node_type
            )));
        }

        let nodes = load_selection(conn, unique_ids).await?;
        if !move_or_copy_allowed(conn, &nodes, &target).await? {
            return Err(NodeServiceError::invalid_argument(format!(
                "Moving or copying the selected nodes to {} is not allowed",
                target.unique_id
            )));
        }

        Ok((target, nodes))
    }

    /// Reparent nodes under a folder and return the refreshed target
    ///
    /// The target's and every former parent's `last_modified` are advanced,
    /// and the target's user name becomes `actor`.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if the target does not exist
    /// - `InvalidArgument` if the target is not a folder, an id is invalid, or
    ///   the move is not allowed
    pub async fn move_nodes(
        &self,
        unique_ids: &[String],
        target_unique_id: &str,
        actor: &str,
    ) -> Result<Node, NodeServiceError> {
        let tx = self.db.begin().await?;
        let result: Result<Node, NodeServiceError> = async {
            let (target, nodes) = Self::check_relocation(&tx, unique_ids, target_unique_id).await?;

            let mut former_parents: Vec<&str> = Vec::new();
            for node in &nodes {
                if let Some(parent_uid) = node.parent_unique_id.as_deref() {
                    if !former_parents.contains(&parent_uid) {
                        former_parents.push(parent_uid);
                    }
                }
                tx.set_parent(node.id, target.id).await?;
            }

            for parent_uid in former_parents {
                if let Some(parent) = tx.node_by_unique_id(parent_uid).await? {
                    tx.touch(parent.id, None).await?;
                }
            }
            tx.touch(target.id, Some(actor)).await?;

            tx.node_by_id(target.id)
                .await?
                .ok_or_else(|| NodeServiceError::node_not_found(&target.unique_id))
        }
        .await;
        let target = tx.finish(result).await?;

        tracing::info!(
            "Moved {} node(s) to {} by {}",
            unique_ids.len(),
            target.unique_id,
            actor
        );
        Ok(target)
    }

    /// Deep-copy nodes under a folder
    ///
    /// Every copied node gets a new unique id. Folders and configurations
    /// take `actor` as user name; snapshots keep their original user name,
    /// comment and tags. Configurations share ConfigPv rows with the source.
    ///
    /// # Errors
    ///
    /// Same as [`NodeService::move_nodes`].
    pub async fn copy_nodes(
        &self,
        unique_ids: &[String],
        target_unique_id: &str,
        actor: &str,
    ) -> Result<(), NodeServiceError> {
        let tx = self.db.begin().await?;
        let result: Result<usize, NodeServiceError> = async {
            let (target, nodes) = Self::check_relocation(&tx, unique_ids, target_unique_id).await?;

            let mut copied = 0;
            let mut pending: VecDeque<(Node, Node)> =
                nodes.into_iter().map(|n| (n, target.clone())).collect();

            // Breadth-first: copies keep the source's child order
            while let Some((source, destination)) = pending.pop_front() {
                let mut proposal = source.clone();
                if source.node_type != NodeType::Snapshot {
                    proposal.user_name = Some(actor.to_string());
                }

                let copy = insert_child(&tx, &destination, &proposal).await?;
                copied += 1;

                match source.node_type {
                    NodeType::Configuration => {
                        tx.copy_config_pv_relations(source.id, copy.id).await?
                    }
                    NodeType::Snapshot => tx.copy_snapshot_items(source.id, copy.id).await?,
                    NodeType::Folder => {}
                }

                for child in tx.children(source.id).await? {
                    pending.push_back((child, copy.clone()));
                }
            }

            tx.touch(target.id, Some(actor)).await?;
            Ok(copied)
        }
        .await;
        let copied = tx.finish(result).await?;

        tracing::info!(
            "Copied {} node(s) ({} including descendants) to {} by {}",
            unique_ids.len(),
            copied,
            target_unique_id,
            actor
        );
        Ok(())
    }

    /// Every node along `path` (root excluded), or `None` if any segment is missing
    pub async fn resolve_path(&self, path: &str) -> Result<Option<Vec<Node>>, NodeServiceError> {
        let conn = self.db.open().await?;
        let chain = path_resolver::resolve_path(&conn, path).await?;
        tracing::debug!("resolve_path {} -> {:?}", path, chain.as_ref().map(Vec::len));
        Ok(chain)
    }

    /// All nodes matching the final segment of `path` (any type)
    pub async fn nodes_at_path(&self, path: &str) -> Result<Vec<Node>, NodeServiceError> {
        let conn = self.db.open().await?;
        Ok(path_resolver::nodes_at_path(&conn, path).await?)
    }

    /// Full `/`-separated path of a node; `/` for the root
    pub async fn full_path(&self, unique_id: &str) -> Result<Option<String>, NodeServiceError> {
        let conn = self.db.open().await?;
        Ok(path_resolver::full_path(&conn, unique_id).await?)
    }

    /// Existing folder that would parent the last of `segments`
    ///
    /// Follows `segments[start_index..len - 1]` through folders below
    /// `ancestor`. Returns `None` if any of them is missing.
    pub async fn find_node_in_subtree(
        &self,
        ancestor: &Node,
        segments: &[&str],
        start_index: usize,
    ) -> Result<Option<Node>, NodeServiceError> {
        let conn = self.db.open().await?;
        let Some(ancestor) = conn.node_by_unique_id(&ancestor.unique_id).await? else {
            return Ok(None);
        };
        Ok(path_resolver::find_node_in_subtree(&conn, ancestor, segments, start_index).await?)
    }

    /// Create the missing folders of `path` and return the last one
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a malformed path or if an existing segment is
    /// not a folder.
    pub async fn create_path(&self, path: &str, actor: &str) -> Result<Node, NodeServiceError> {
        let segments = path_resolver::split_path(path)
            .ok_or_else(|| NodeServiceError::invalid_argument(format!("Malformed path '{}'", path)))?;

        let tx = self.db.begin().await?;
        let result: Result<(Node, usize), NodeServiceError> = async {
            let root = path_resolver::root(&tx).await?;
            let (deepest, matched) = path_resolver::walk_existing(&tx, root, &segments).await?;
            if deepest.node_type != NodeType::Folder {
                return Err(NodeServiceError::invalid_argument(format!(
                    "'{}' in path '{}' is a {}, not a folder",
                    deepest.name, path, deepest.node_type
                )));
            }

            let mut current = deepest;
            for segment in &segments[matched..] {
                let proposal = Node::folder(*segment).with_user_name(actor);
                current = insert_child(&tx, &current, &proposal).await?;
            }
            Ok((current, segments.len() - matched))
        }
        .await;
        let (folder, created) = tx.finish(result).await?;

        if created > 0 {
            tracing::info!("Created {} folder(s) for path {}", created, path);
        }
        Ok(folder)
    }
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "node_service_test.rs"]
mod node_service_test;

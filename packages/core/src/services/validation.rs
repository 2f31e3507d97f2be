//! Containment and move/copy rules

use crate::db::{DatabaseError, TreeConnection};
use crate::models::{Node, NodeType};
use std::collections::HashSet;

/// Whether a node of `parent` type may hold a child of `child` type.
///
/// Folders hold folders and configurations, configurations hold snapshots,
/// snapshots hold nothing.
pub fn can_contain(parent: NodeType, child: NodeType) -> bool {
    matches!(
        (parent, child),
        (NodeType::Folder, NodeType::Folder)
            | (NodeType::Folder, NodeType::Configuration)
            | (NodeType::Configuration, NodeType::Snapshot)
    )
}

/// Check a move/copy request against the stored tree.
///
/// Nodes are re-read from the store by unique id, so stale in-memory copies
/// cannot slip past the checks.
pub(crate) async fn move_or_copy_allowed(
    conn: &TreeConnection,
    selection: &[Node],
    target: &Node,
) -> Result<bool, DatabaseError> {
    if selection.is_empty() {
        return Ok(false);
    }

    let Some(target) = conn.node_by_unique_id(&target.unique_id).await? else {
        return Ok(false);
    };

    let mut stored = Vec::with_capacity(selection.len());
    for node in selection {
        match conn.node_by_unique_id(&node.unique_id).await? {
            Some(n) if !n.is_root() => stored.push(n),
            _ => return Ok(false),
        }
    }

    let selected_type = stored[0].node_type;
    if selected_type == NodeType::Snapshot || stored.iter().any(|n| n.node_type != selected_type) {
        return Ok(false);
    }

    if !can_contain(target.node_type, selected_type) {
        return Ok(false);
    }

    // Two selected nodes with the same name would clash with each other
    let mut names = HashSet::new();
    if !stored.iter().all(|n| names.insert(n.name.as_str())) {
        return Ok(false);
    }

    for node in &stored {
        if conn
            .sibling_exists(target.id, &node.name, node.node_type)
            .await?
        {
            return Ok(false);
        }
    }

    let target_chain: HashSet<String> = conn
        .ancestor_chain(&target.unique_id)
        .await?
        .into_iter()
        .map(|(uid, _)| uid)
        .collect();
    if stored.iter().any(|n| target_chain.contains(&n.unique_id)) {
        return Ok(false);
    }

    let target_uid = Some(target.unique_id.as_str());
    if stored
        .iter()
        .all(|n| n.parent_unique_id.as_deref() == target_uid)
    {
        return Ok(false);
    }

    Ok(true)
}

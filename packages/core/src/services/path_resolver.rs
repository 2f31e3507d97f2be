//! Path Resolution
//!
//! Paths address nodes by name from the root: `/Beamline/Injector/Daily`.
//! Names match exactly (case-sensitive). A well-formed path starts with `/`,
//! has no empty segments and does not end with `/`; anything else resolves
//! to nothing rather than failing.
//!
//! Names are only unique per (parent, type), so a segment may match both a
//! folder and a configuration. Resolution tries folders first and returns the
//! first complete chain.

use crate::db::{DatabaseError, TreeConnection};
use crate::models::{Node, NodeType, ROOT_NODE_UNIQUE_ID};

/// Split a path into its segments, or `None` if it is malformed.
///
/// `"/"` has no segments and is treated as malformed here.
pub fn split_path(path: &str) -> Option<Vec<&str>> {
    let rest = path.strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }
    let segments: Vec<&str> = rest.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments)
}

pub(crate) async fn root(conn: &TreeConnection) -> Result<Node, DatabaseError> {
    conn.node_by_unique_id(ROOT_NODE_UNIQUE_ID)
        .await?
        .ok_or_else(|| DatabaseError::initialization_failed("Root node is missing"))
}

/// Every node along the path, root excluded, or `None` if any segment is unmatched
pub(crate) async fn resolve_path(
    conn: &TreeConnection,
    path: &str,
) -> Result<Option<Vec<Node>>, DatabaseError> {
    let Some(segments) = split_path(path) else {
        return Ok(None);
    };

    // Depth-first over candidate chains; children_named yields folders first
    let mut stack: Vec<Vec<Node>> = vec![vec![root(conn).await?]];
    while let Some(chain) = stack.pop() {
        let depth = chain.len() - 1;
        if depth == segments.len() {
            return Ok(Some(chain.into_iter().skip(1).collect()));
        }

        let is_last = depth + 1 == segments.len();
        let parent_id = chain[depth].id;
        let mut matches = conn.children_named(parent_id, segments[depth]).await?;
        if !is_last {
            matches.retain(|n| n.node_type != NodeType::Snapshot);
        }

        for candidate in matches.into_iter().rev() {
            let mut next = chain.clone();
            next.push(candidate);
            stack.push(next);
        }
    }

    Ok(None)
}

/// All nodes named by the final segment under the resolved parent path
pub(crate) async fn nodes_at_path(
    conn: &TreeConnection,
    path: &str,
) -> Result<Vec<Node>, DatabaseError> {
    let Some(segments) = split_path(path) else {
        return Ok(Vec::new());
    };
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Ok(Vec::new()),
    };

    let parent = if parents.is_empty() {
        root(conn).await?
    } else {
        let parent_path = format!("/{}", parents.join("/"));
        match resolve_path(conn, &parent_path)
            .await?
            .and_then(|chain| chain.into_iter().last())
        {
            Some(node) => node,
            None => return Ok(Vec::new()),
        }
    };

    conn.children_named(parent.id, last).await
}

/// `/`-joined names from the root down to the node; `/` for the root itself
pub(crate) async fn full_path(
    conn: &TreeConnection,
    unique_id: &str,
) -> Result<Option<String>, DatabaseError> {
    if unique_id.trim().is_empty() {
        return Ok(None);
    }

    let chain = conn.ancestor_chain(unique_id).await?;
    if chain.is_empty() {
        return Ok(None);
    }

    // chain runs node -> root; drop the root and reverse
    let names: Vec<&str> = chain
        .iter()
        .rev()
        .filter(|(uid, _)| uid != ROOT_NODE_UNIQUE_ID)
        .map(|(_, name)| name.as_str())
        .collect();

    Ok(Some(format!("/{}", names.join("/"))))
}

/// Follow `segments` down from `ancestor` as far as they match.
///
/// Returns the deepest matched node and how many segments matched.
pub(crate) async fn walk_existing(
    conn: &TreeConnection,
    ancestor: Node,
    segments: &[&str],
) -> Result<(Node, usize), DatabaseError> {
    let mut current = ancestor;
    for (matched, segment) in segments.iter().enumerate() {
        if current.node_type == NodeType::Snapshot {
            return Ok((current, matched));
        }
        let next = conn
            .children_named(current.id, segment)
            .await?
            .into_iter()
            .find(|n| n.node_type != NodeType::Snapshot);
        match next {
            Some(node) => current = node,
            None => return Ok((current, matched)),
        }
    }
    Ok((current, segments.len()))
}

/// Existing parent for the last element of `segments`.
///
/// Every segment of `segments[start_index..len - 1]` must name a folder below
/// `ancestor`; the folder reached by the last of them is returned. `None` when
/// an intermediate folder is missing or `start_index` leaves nothing to place.
pub(crate) async fn find_node_in_subtree(
    conn: &TreeConnection,
    ancestor: Node,
    segments: &[&str],
    start_index: usize,
) -> Result<Option<Node>, DatabaseError> {
    if start_index >= segments.len() {
        return Ok(None);
    }

    let mut current = ancestor;
    for segment in &segments[start_index..segments.len() - 1] {
        let next = conn
            .children_named(current.id, segment)
            .await?
            .into_iter()
            .find(|n| n.node_type == NodeType::Folder);
        match next {
            Some(folder) => current = folder,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path_accepts_well_formed() {
        assert_eq!(split_path("/a"), Some(vec!["a"]));
        assert_eq!(split_path("/a/b c/d"), Some(vec!["a", "b c", "d"]));
    }

    #[test]
    fn test_split_path_rejects_malformed() {
        for path in ["", "/", "//", "a/b", "/a/", "/a//b", "///"] {
            assert_eq!(split_path(path), None, "path {:?}", path);
        }
    }
}

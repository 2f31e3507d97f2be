//! Row-Level Tree Access
//!
//! [`TreeConnection`] wraps one libsql connection and exposes the SQL used by
//! the services: node rows, properties, tags, ConfigPv lists and snapshot
//! items. It holds no state of its own, so every read reflects the latest
//! committed data (or the caller's own uncommitted writes inside a
//! transaction).
//!
//! Nodes are addressed by their storage-internal `id` here. Translation from
//! the external `unique_id` happens once per operation through
//! [`TreeConnection::node_by_unique_id`].

use crate::db::error::DatabaseError;
use crate::models::{ConfigPv, Node, NodeType, PvValue, SnapshotItem, Tag};
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use libsql::params;
use std::collections::BTreeMap;

const NODE_COLUMNS: &str = "n.id, n.unique_id, p.unique_id, n.name, n.type, n.created, n.last_modified, n.username
     FROM node n LEFT JOIN node p ON n.parent_id = p.id";

/// Format a timestamp the way it is stored (RFC3339, microsecond precision, `Z`)
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
///
/// Accepts RFC3339 as written by the store and "YYYY-MM-DD HH:MM:SS" as
/// produced by SQLite's CURRENT_TIMESTAMP.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    Err(format!(
        "Unable to parse timestamp '{}' as RFC3339 or SQLite format",
        s
    ))
}

/// Timestamp for a modification that must sort strictly after `previous`
///
/// Two writes within the same microsecond would otherwise leave
/// `last_modified` unchanged.
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(6);
    let bumped = previous.trunc_subsecs(6) + Duration::microseconds(1);
    now.max(bumped)
}

fn column_timestamp(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>, DatabaseError> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(DatabaseError::invalid_data)
}

fn encode_value(value: &Option<PvValue>) -> Result<Option<String>, DatabaseError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::invalid_data(format!("Failed to encode value: {}", e)))
}

fn decode_value(raw: Option<String>) -> Result<Option<PvValue>, DatabaseError> {
    raw.filter(|s| !s.is_empty())
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DatabaseError::invalid_data(format!("Failed to decode value: {}", e)))
}

/// One connection's view of the tree tables
pub struct TreeConnection {
    conn: libsql::Connection,
}

impl TreeConnection {
    pub fn new(conn: libsql::Connection) -> Self {
        Self { conn }
    }

    pub(crate) async fn begin(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e)))?;
        Ok(())
    }

    pub async fn commit(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute("COMMIT", ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to commit: {}", e)))?;
        Ok(())
    }

    pub async fn rollback(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute("ROLLBACK", ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to roll back: {}", e)))?;
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err`, and hand the result back
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<DatabaseError> + std::fmt::Display,
    {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!("Rolling back transaction: {}", err);
                if let Err(rollback_err) = self.rollback().await {
                    tracing::warn!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Node rows
    // ------------------------------------------------------------------

    /// Map a row selected with `NODE_COLUMNS` (properties and tags not loaded)
    fn row_to_node(row: &libsql::Row) -> Result<Node, DatabaseError> {
        let type_raw: String = row.get(4)?;
        let node_type: NodeType = type_raw
            .parse()
            .map_err(|e: crate::models::ValidationError| DatabaseError::invalid_data(e.to_string()))?;

        Ok(Node {
            id: row.get(0)?,
            unique_id: row.get(1)?,
            parent_unique_id: row.get::<Option<String>>(2)?,
            name: row.get(3)?,
            node_type,
            created: column_timestamp(row, 5)?,
            last_modified: column_timestamp(row, 6)?,
            user_name: row.get::<Option<String>>(7)?,
            properties: BTreeMap::new(),
            tags: Vec::new(),
        })
    }

    /// Run a node query and fully load each resulting node
    async fn query_nodes(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Node>, DatabaseError> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await? {
            nodes.push(Self::row_to_node(&row)?);
        }
        drop(rows);

        for node in nodes.iter_mut() {
            self.load_details(node).await?;
        }
        Ok(nodes)
    }

    async fn load_details(&self, node: &mut Node) -> Result<(), DatabaseError> {
        node.properties = self.properties(node.id).await?;
        if node.node_type == NodeType::Snapshot {
            node.tags = self.tags(node.id, &node.unique_id).await?;
        }
        Ok(())
    }

    pub async fn node_by_unique_id(&self, unique_id: &str) -> Result<Option<Node>, DatabaseError> {
        let sql = format!("SELECT {} WHERE n.unique_id = ?", NODE_COLUMNS);
        Ok(self.query_nodes(&sql, params![unique_id]).await?.into_iter().next())
    }

    pub async fn node_by_id(&self, id: i64) -> Result<Option<Node>, DatabaseError> {
        let sql = format!("SELECT {} WHERE n.id = ?", NODE_COLUMNS);
        Ok(self.query_nodes(&sql, params![id]).await?.into_iter().next())
    }

    /// Direct children in insertion order
    pub async fn children(&self, parent_id: i64) -> Result<Vec<Node>, DatabaseError> {
        let sql = format!("SELECT {} WHERE n.parent_id = ? ORDER BY n.id ASC", NODE_COLUMNS);
        self.query_nodes(&sql, params![parent_id]).await
    }

    /// Direct children with an exact (case-sensitive) name, folders first
    pub async fn children_named(
        &self,
        parent_id: i64,
        name: &str,
    ) -> Result<Vec<Node>, DatabaseError> {
        let sql = format!(
            "SELECT {} WHERE n.parent_id = ? AND n.name = ?
             ORDER BY CASE n.type WHEN 'FOLDER' THEN 0 WHEN 'CONFIGURATION' THEN 1 ELSE 2 END, n.id",
            NODE_COLUMNS
        );
        self.query_nodes(&sql, params![parent_id, name]).await
    }

    /// Whether `parent_id` already holds a child with this name and type
    pub async fn sibling_exists(
        &self,
        parent_id: i64,
        name: &str,
        node_type: NodeType,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM node WHERE parent_id = ? AND name = ? AND type = ? LIMIT 1",
                params![parent_id, name, node_type.as_str()],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Insert a node row under `parent_id` and return its internal id
    ///
    /// `created` and `last_modified` are both set to `created`.
    pub async fn insert_node(
        &self,
        parent_id: i64,
        unique_id: &str,
        name: &str,
        node_type: NodeType,
        user_name: Option<&str>,
        created: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let ts = format_timestamp(created);
        self.conn
            .execute(
                "INSERT INTO node (unique_id, parent_id, name, type, created, last_modified, username)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    unique_id,
                    parent_id,
                    name,
                    node_type.as_str(),
                    ts.as_str(),
                    ts.as_str(),
                    user_name
                ],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Rewrite the mutable columns of a node row
    pub async fn update_node_row(
        &self,
        id: i64,
        name: &str,
        user_name: Option<&str>,
        last_modified: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE node SET name = ?, username = ?, last_modified = ? WHERE id = ?",
                params![name, user_name, format_timestamp(last_modified), id],
            )
            .await?;
        Ok(())
    }

    /// Override the creation timestamp (used when migrating data)
    pub async fn set_created(&self, id: i64, created: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE node SET created = ? WHERE id = ?",
                params![format_timestamp(created), id],
            )
            .await?;
        Ok(())
    }

    pub async fn set_parent(&self, id: i64, parent_id: i64) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE node SET parent_id = ? WHERE id = ?",
                params![parent_id, id],
            )
            .await?;
        Ok(())
    }

    /// Advance `last_modified` strictly, optionally recording the actor
    pub async fn touch(&self, id: i64, actor: Option<&str>) -> Result<(), DatabaseError> {
        let mut rows = self
            .conn
            .query("SELECT last_modified FROM node WHERE id = ?", params![id])
            .await?;
        let previous = match rows.next().await? {
            Some(row) => column_timestamp(&row, 0)?,
            None => return Ok(()),
        };
        drop(rows);

        let ts = format_timestamp(next_timestamp(previous));
        match actor {
            Some(user) => {
                self.conn
                    .execute(
                        "UPDATE node SET last_modified = ?, username = ? WHERE id = ?",
                        params![ts, user, id],
                    )
                    .await?
            }
            None => {
                self.conn
                    .execute(
                        "UPDATE node SET last_modified = ? WHERE id = ?",
                        params![ts, id],
                    )
                    .await?
            }
        };
        Ok(())
    }

    /// Chain of (unique_id, name) from the node up to the root, node first
    pub async fn ancestor_chain(
        &self,
        unique_id: &str,
    ) -> Result<Vec<(String, String)>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "WITH RECURSIVE chain(id, parent_id, unique_id, name, depth) AS (
                    SELECT id, parent_id, unique_id, name, 0 FROM node WHERE unique_id = ?
                    UNION ALL
                    SELECT n.id, n.parent_id, n.unique_id, n.name, c.depth + 1
                    FROM node n JOIN chain c ON n.id = c.parent_id
                 )
                 SELECT unique_id, name FROM chain ORDER BY depth ASC",
                params![unique_id],
            )
            .await?;

        let mut chain = Vec::new();
        while let Some(row) = rows.next().await? {
            chain.push((row.get::<String>(0)?, row.get::<String>(1)?));
        }
        Ok(chain)
    }

    /// Internal ids of the subtree rooted at `id` (inclusive), deepest first
    pub async fn subtree_ids_bottom_up(&self, id: i64) -> Result<Vec<i64>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "WITH RECURSIVE subtree(id, depth) AS (
                    SELECT id, 0 FROM node WHERE id = ?
                    UNION ALL
                    SELECT n.id, s.depth + 1 FROM node n JOIN subtree s ON n.parent_id = s.id
                 )
                 SELECT id FROM subtree ORDER BY depth DESC, id DESC",
                params![id],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<i64>(0)?);
        }
        Ok(ids)
    }

    /// Delete a single node row; dependents cascade
    pub async fn delete_node_row(&self, id: i64) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM node WHERE id = ?", params![id])
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    pub async fn properties(&self, node_id: i64) -> Result<BTreeMap<String, String>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT property_name, value FROM node_property WHERE node_id = ?",
                params![node_id],
            )
            .await?;

        let mut properties = BTreeMap::new();
        while let Some(row) = rows.next().await? {
            properties.insert(row.get::<String>(0)?, row.get::<String>(1)?);
        }
        Ok(properties)
    }

    /// Replace all properties of a node; empty keys or values are skipped
    pub async fn replace_properties(
        &self,
        node_id: i64,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM node_property WHERE node_id = ?", params![node_id])
            .await?;

        for (key, value) in properties {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            self.conn
                .execute(
                    "INSERT INTO node_property (node_id, property_name, value) VALUES (?, ?, ?)",
                    params![node_id, key.as_str(), value.as_str()],
                )
                .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    pub async fn tags(&self, snapshot_id: i64, snapshot_uid: &str) -> Result<Vec<Tag>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT name, comment, username, created FROM tag WHERE snapshot_id = ? ORDER BY id",
                params![snapshot_id],
            )
            .await?;

        let mut tags = Vec::new();
        while let Some(row) = rows.next().await? {
            tags.push(Tag {
                snapshot_id: snapshot_uid.to_string(),
                name: row.get(0)?,
                comment: row.get::<Option<String>>(1)?,
                user_name: row.get::<Option<String>>(2)?,
                created: column_timestamp(&row, 3)?,
            });
        }
        Ok(tags)
    }

    pub async fn insert_tag(&self, snapshot_id: i64, tag: &Tag) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO tag (snapshot_id, name, comment, username, created) VALUES (?, ?, ?, ?, ?)",
                params![
                    snapshot_id,
                    tag.name.as_str(),
                    tag.comment.as_deref(),
                    tag.user_name.as_deref(),
                    format_timestamp(tag.created)
                ],
            )
            .await?;
        Ok(())
    }

    /// Replace the tag set; later duplicates of a name are dropped
    pub async fn replace_tags(&self, snapshot_id: i64, tags: &[Tag]) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM tag WHERE snapshot_id = ?", params![snapshot_id])
            .await?;

        let mut seen = std::collections::HashSet::new();
        for tag in tags {
            if seen.insert(tag.name.as_str()) {
                self.insert_tag(snapshot_id, tag).await?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // ConfigPv lists
    // ------------------------------------------------------------------

    /// Active PV list of a configuration in stored order
    pub async fn config_pvs(&self, config_id: i64) -> Result<Vec<ConfigPv>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT cp.id, cp.pv_name, cp.readback_pv_name, cp.read_only
                 FROM config_pv_relation r JOIN config_pv cp ON r.config_pv_id = cp.id
                 WHERE r.config_id = ?
                 ORDER BY r.position",
                params![config_id],
            )
            .await?;

        let mut pvs = Vec::new();
        while let Some(row) = rows.next().await? {
            pvs.push(Self::row_to_config_pv(&row, 0)?);
        }
        Ok(pvs)
    }

    fn row_to_config_pv(row: &libsql::Row, offset: i32) -> Result<ConfigPv, DatabaseError> {
        let readback: String = row.get(offset + 2)?;
        Ok(ConfigPv {
            id: Some(row.get(offset)?),
            pv_name: row.get(offset + 1)?,
            readback_pv_name: if readback.is_empty() { None } else { Some(readback) },
            read_only: row.get::<i64>(offset + 3)? != 0,
        })
    }

    /// Id of the shared row matching `pv`, inserting it if needed
    pub async fn find_or_insert_config_pv(&self, pv: &ConfigPv) -> Result<i64, DatabaseError> {
        let read_only = i64::from(pv.read_only);
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM config_pv WHERE pv_name = ? AND readback_pv_name = ? AND read_only = ?",
                params![pv.pv_name.as_str(), pv.readback_or_empty(), read_only],
            )
            .await?;
        if let Some(row) = rows.next().await? {
            return Ok(row.get::<i64>(0)?);
        }
        drop(rows);

        self.conn
            .execute(
                "INSERT INTO config_pv (pv_name, readback_pv_name, read_only) VALUES (?, ?, ?)",
                params![pv.pv_name.as_str(), pv.readback_or_empty(), read_only],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Replace the ordered PV list of a configuration
    pub async fn replace_config_pv_relations(
        &self,
        config_id: i64,
        config_pv_ids: &[i64],
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "DELETE FROM config_pv_relation WHERE config_id = ?",
                params![config_id],
            )
            .await?;

        for (position, pv_id) in config_pv_ids.iter().enumerate() {
            self.conn
                .execute(
                    "INSERT INTO config_pv_relation (config_id, config_pv_id, position) VALUES (?, ?, ?)",
                    params![config_id, *pv_id, position as i64],
                )
                .await?;
        }
        Ok(())
    }

    /// Point `to` at the same shared ConfigPv rows as `from`
    pub async fn copy_config_pv_relations(&self, from: i64, to: i64) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO config_pv_relation (config_id, config_pv_id, position)
                 SELECT ?, config_pv_id, position FROM config_pv_relation WHERE config_id = ?",
                params![to, from],
            )
            .await?;
        Ok(())
    }

    /// Drop ConfigPv rows no configuration or snapshot references anymore
    pub async fn delete_orphan_config_pvs(&self) -> Result<u64, DatabaseError> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM config_pv
                 WHERE id NOT IN (SELECT config_pv_id FROM config_pv_relation)
                   AND id NOT IN (SELECT config_pv_id FROM snapshot_node_pv)",
                (),
            )
            .await?;
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Snapshot items
    // ------------------------------------------------------------------

    pub async fn insert_snapshot_item(
        &self,
        snapshot_id: i64,
        position: usize,
        config_pv_id: i64,
        item: &SnapshotItem,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO snapshot_node_pv (snapshot_id, config_pv_id, position, value, readback_value)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    snapshot_id,
                    config_pv_id,
                    position as i64,
                    encode_value(&item.value)?,
                    encode_value(&item.readback_value)?
                ],
            )
            .await?;
        Ok(())
    }

    /// Items of a snapshot in capture order
    pub async fn snapshot_items(
        &self,
        snapshot_id: i64,
        snapshot_uid: &str,
    ) -> Result<Vec<SnapshotItem>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT cp.id, cp.pv_name, cp.readback_pv_name, cp.read_only, s.value, s.readback_value
                 FROM snapshot_node_pv s JOIN config_pv cp ON s.config_pv_id = cp.id
                 WHERE s.snapshot_id = ?
                 ORDER BY s.position, s.rowid",
                params![snapshot_id],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(SnapshotItem {
                snapshot_id: snapshot_uid.to_string(),
                config_pv: Self::row_to_config_pv(&row, 0)?,
                value: decode_value(row.get::<Option<String>>(4)?)?,
                readback_value: decode_value(row.get::<Option<String>>(5)?)?,
            });
        }
        Ok(items)
    }

    /// Duplicate all items of one snapshot onto another
    pub async fn copy_snapshot_items(&self, from: i64, to: i64) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO snapshot_node_pv (snapshot_id, config_pv_id, position, value, readback_value)
                 SELECT ?, config_pv_id, position, value, readback_value
                 FROM snapshot_node_pv WHERE snapshot_id = ? ORDER BY position, rowid",
                params![to, from],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip_keeps_micros() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::microseconds(42);
        let parsed = parse_timestamp(&format_timestamp(ts)).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_parse_sqlite_timestamp() {
        let parsed = parse_timestamp("2024-03-01 12:00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_next_timestamp_is_strictly_later() {
        let future = Utc::now() + Duration::hours(1);
        let next = next_timestamp(future);
        assert!(next > future);

        let past = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert!(next_timestamp(past) > past);
    }
}

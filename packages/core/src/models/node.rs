//! Node Data Structures
//!
//! This module defines the universal `Node` struct for the save & restore tree.
//!
//! # Architecture
//!
//! - **Universal Node**: One struct represents folders, configurations and snapshots
//! - **Closed type set**: `NodeType` is exactly `FOLDER | CONFIGURATION | SNAPSHOT`
//! - **Adjacency list**: Each node row stores its parent; the root has none
//! - **String properties**: Free-form key/value pairs, empty values are never stored
//!
//! # Examples
//!
//! ```rust
//! use saverestore_core::models::{Node, NodeType};
//!
//! let folder = Node::new("Beamline", NodeType::Folder)
//!     .with_user_name("operator")
//!     .with_property("description", "Injector settings");
//!
//! assert_eq!(folder.get_property("description"), Some("Injector settings"));
//! ```

use crate::models::Tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Unique id of the pre-seeded root folder
pub const ROOT_NODE_UNIQUE_ID: &str = "44bef5de-e8e6-4014-af37-b8f6c8a939a2";

/// Name of the pre-seeded root folder
pub const ROOT_NODE_NAME: &str = "Root folder";

/// Property key reserved for the root folder marker
pub const ROOT_PROPERTY_KEY: &str = "root";

/// Property key under which a snapshot's comment is stored
pub const COMMENT_PROPERTY_KEY: &str = "comment";

/// Validation errors for Node operations
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    #[error("Invalid process variable: {0}")]
    InvalidPv(String),
}

/// Kind of a node in the tree.
///
/// Containment rules: a folder holds folders and configurations, a
/// configuration holds snapshots, a snapshot is always a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Folder,
    Configuration,
    Snapshot,
}

impl NodeType {
    /// Storage representation (also the serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Folder => "FOLDER",
            NodeType::Configuration => "CONFIGURATION",
            NodeType::Snapshot => "SNAPSHOT",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FOLDER" => Ok(NodeType::Folder),
            "CONFIGURATION" => Ok(NodeType::Configuration),
            "SNAPSHOT" => Ok(NodeType::Snapshot),
            other => Err(ValidationError::InvalidNodeType(other.to_string())),
        }
    }
}

/// Drops `null` and empty entries while deserializing a property map.
fn deserialize_properties<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| match value {
            Some(v) if !key.is_empty() && !v.is_empty() => Some((key, v)),
            _ => None,
        })
        .collect())
}

/// Universal Node structure for folders, configurations and snapshots.
///
/// # Fields
///
/// - `id`: Storage-internal numeric key (`0` until persisted)
/// - `unique_id`: Stable external identifier, always generated by the store
/// - `parent_unique_id`: Unique id of the parent (`None` for the root and for proposals)
/// - `name`: Non-empty, unique among siblings of the same type
/// - `node_type`: `FOLDER`, `CONFIGURATION` or `SNAPSHOT`
/// - `created` / `last_modified`: Creation and last structural change timestamps
/// - `user_name`: Last actor that created or modified the node
/// - `properties`: String key/value pairs (empty values mean "absent")
/// - `tags`: Snapshot annotations, unique by name, in insertion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub id: i64,

    #[serde(default)]
    pub unique_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_unique_id: Option<String>,

    pub name: String,

    pub node_type: NodeType,

    pub created: DateTime<Utc>,

    pub last_modified: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    #[serde(default, deserialize_with = "deserialize_properties")]
    pub properties: BTreeMap<String, String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl Node {
    /// Create an unsaved node proposal.
    ///
    /// The `unique_id` is a fresh UUID, but the store replaces it on
    /// creation anyway; callers never choose identifiers.
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            unique_id: Uuid::new_v4().to_string(),
            parent_unique_id: None,
            name: name.into(),
            node_type,
            created: now,
            last_modified: now,
            user_name: None,
            properties: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    /// Shorthand for a folder proposal
    pub fn folder(name: impl Into<String>) -> Self {
        Self::new(name, NodeType::Folder)
    }

    /// Shorthand for a configuration proposal
    pub fn configuration(name: impl Into<String>) -> Self {
        Self::new(name, NodeType::Configuration)
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    /// Replace all properties; empty keys and values are dropped
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.set_properties(properties);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.put_property(key, value);
        self
    }

    /// Validate the node's own fields (structure is checked by the services)
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }
        Ok(())
    }

    /// The root is identified by its fixed unique id
    pub fn is_root(&self) -> bool {
        self.unique_id == ROOT_NODE_UNIQUE_ID
    }

    pub fn get_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Set a property. An empty value removes the key instead.
    pub fn put_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if key.is_empty() {
            return;
        }
        if value.is_empty() {
            self.properties.remove(&key);
        } else {
            self.properties.insert(key, value);
        }
    }

    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        self.properties.remove(key)
    }

    pub fn set_properties(&mut self, properties: BTreeMap<String, String>) {
        self.properties = properties
            .into_iter()
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();
    }

    /// Add a tag unless one with the same name already exists.
    ///
    /// Returns `false` (and leaves the node untouched) for duplicates and
    /// for nodes that are not snapshots.
    pub fn add_tag(&mut self, mut tag: Tag) -> bool {
        if self.node_type != NodeType::Snapshot || self.has_tag(&tag.name) {
            return false;
        }
        tag.snapshot_id = self.unique_id.clone();
        self.tags.push(tag);
        true
    }

    /// Remove the tag with the same name, if any
    pub fn remove_tag(&mut self, tag: &Tag) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t.name != tag.name);
        self.tags.len() != before
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }
}

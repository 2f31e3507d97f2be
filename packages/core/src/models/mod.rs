//! Data Models
//!
//! This module contains the data structures stored by the tree:
//!
//! - `Node` - Universal node model for folders, configurations and snapshots
//! - `ConfigPv` - Process variable reference tracked by a configuration
//! - `SnapshotItem` / `PvValue` - Values captured by a snapshot
//! - `Tag` - Named annotation on a snapshot

mod config_pv;
mod node;
mod snapshot_item;
mod tag;

pub use config_pv::ConfigPv;
pub use node::{
    Node, NodeType, ValidationError, COMMENT_PROPERTY_KEY, ROOT_NODE_NAME, ROOT_NODE_UNIQUE_ID,
    ROOT_PROPERTY_KEY,
};
pub use snapshot_item::{Alarm, AlarmSeverity, Display, PvData, PvValue, SnapshotItem};
pub use tag::Tag;

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;

//! Save & Restore Core Storage Layer
//!
//! This crate provides the persistence core of a configuration/snapshot
//! management tool: a tree of folders, configurations and snapshots stored in
//! an embedded libsql database.
//!
//! # Architecture
//!
//! - **Adjacency list**: each node row references its parent, the root is pre-seeded
//! - **Typed containment**: folders hold folders and configurations, configurations hold snapshots
//! - **Store-enforced uniqueness**: sibling names are unique per type
//! - **One transaction per operation**: create, move, copy, delete and saves are atomic
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, ConfigPv, SnapshotItem, Tag)
//! - [`services`] - Business services (NodeService, ConfigurationService, SnapshotService)
//! - [`db`] - Database layer with libsql integration
//! - [`config`] - Store configuration

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::StoreConfig;
pub use models::*;
pub use services::*;

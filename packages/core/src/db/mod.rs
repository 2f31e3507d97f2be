//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management
//! - Schema creation and root folder seeding
//! - Row-level access to nodes, properties, tags, PV lists and snapshot items
//!
//! # Architecture
//!
//! The tree is stored as an adjacency list (`node.parent_id`) in an embedded
//! SQLite-compatible database. Multi-row operations run inside one
//! `BEGIN IMMEDIATE` transaction opened with [`DatabaseService::begin`]; the
//! `UNIQUE (parent_id, name, type)` constraint is the final arbiter of
//! sibling name clashes between concurrent writers.

mod database;
mod error;
mod store;

pub use database::{DatabaseService, SCHEMA_TABLES};
pub use error::DatabaseError;
pub use store::{format_timestamp, next_timestamp, parse_timestamp, TreeConnection};

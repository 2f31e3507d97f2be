//! Database Connection Management
//!
//! This module provides the core database connection and initialization
//! functionality using libsql for the save & restore tree store.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **Adjacency list**: `node.parent_id` references the owning node
//! - **WAL mode**: Write-Ahead Logging for concurrent readers
//! - **Foreign keys**: Enabled on every connection, dependents cascade on delete
//! - **Store-enforced uniqueness**: `UNIQUE (parent_id, name, type)` on `node`
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` (or `open()` / `begin()`) in async
//! functions.** Each call creates a fresh connection with the busy timeout and
//! foreign key enforcement applied; both are per-connection settings in SQLite.
//!
//! ```no_run
//! # use saverestore_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/saverestore.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::StoreConfig;
use crate::db::error::DatabaseError;
use crate::db::store::{format_timestamp, TreeConnection};
use crate::models::{ROOT_NODE_NAME, ROOT_NODE_UNIQUE_ID, ROOT_PROPERTY_KEY};
use chrono::{SubsecRound, Utc};
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Tables created by [`DatabaseService::new`], in dependency order
pub const SCHEMA_TABLES: [&str; 6] = [
    "node",
    "node_property",
    "config_pv",
    "config_pv_relation",
    "snapshot_node_pv",
    "tag",
];

/// Database service for managing the libsql database and schema
///
/// # Examples
///
/// ```no_run
/// use saverestore_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_path = PathBuf::from("/path/to/saverestore.db");
///     let db_service = DatabaseService::new(db_path).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    busy_timeout_ms: u64,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    /// 4. Seed the root folder if it does not exist yet
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::with_config(&StoreConfig::default().with_database_path(db_path)).await
    }

    /// Open a store using an explicit configuration
    pub async fn with_config(config: &StoreConfig) -> Result<Self, DatabaseError> {
        if config.database_path.as_os_str().is_empty() {
            return Err(DatabaseError::invalid_path(config.database_path.clone()));
        }
        config
            .validate()
            .map_err(DatabaseError::initialization_failed)?;

        let db_path = config.database_path.clone();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms: config.busy_timeout_ms,
        };

        service.initialize_schema(config.wal_mode).await?;

        tracing::debug!("Opened save & restore store at {:?}", service.db_path);

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements may return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and seed the root folder
    ///
    /// Idempotent: safe to call on an existing database.
    ///
    /// # Schema
    ///
    /// - `node`: one row per tree node, `parent_id` NULL only for the root
    /// - `node_property`: string properties, cascade with the node
    /// - `config_pv`: shared process variable rows
    /// - `config_pv_relation`: ordered active PV list of each configuration
    /// - `snapshot_node_pv`: captured values, referencing `config_pv` directly
    /// - `tag`: snapshot tags, unique by name per snapshot
    async fn initialize_schema(&self, wal_mode: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        if wal_mode {
            self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
                .await?;
        }

        let statements = [
            (
                "node",
                "CREATE TABLE IF NOT EXISTS node (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    unique_id TEXT NOT NULL UNIQUE,
                    -- Parent deletion cascades to the whole subtree
                    parent_id INTEGER REFERENCES node(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    type TEXT NOT NULL CHECK (type IN ('FOLDER', 'CONFIGURATION', 'SNAPSHOT')),
                    created TEXT NOT NULL,
                    last_modified TEXT NOT NULL,
                    username TEXT,
                    UNIQUE (parent_id, name, type)
                )",
            ),
            (
                "node_property",
                "CREATE TABLE IF NOT EXISTS node_property (
                    node_id INTEGER NOT NULL REFERENCES node(id) ON DELETE CASCADE,
                    property_name TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (node_id, property_name)
                )",
            ),
            (
                "config_pv",
                "CREATE TABLE IF NOT EXISTS config_pv (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    pv_name TEXT NOT NULL,
                    -- Empty string stands for 'no readback PV' so the UNIQUE constraint applies
                    readback_pv_name TEXT NOT NULL DEFAULT '',
                    read_only INTEGER NOT NULL DEFAULT 0,
                    UNIQUE (pv_name, readback_pv_name, read_only)
                )",
            ),
            (
                "config_pv_relation",
                "CREATE TABLE IF NOT EXISTS config_pv_relation (
                    config_id INTEGER NOT NULL REFERENCES node(id) ON DELETE CASCADE,
                    config_pv_id INTEGER NOT NULL REFERENCES config_pv(id),
                    position INTEGER NOT NULL,
                    PRIMARY KEY (config_id, config_pv_id)
                )",
            ),
            (
                "snapshot_node_pv",
                "CREATE TABLE IF NOT EXISTS snapshot_node_pv (
                    snapshot_id INTEGER NOT NULL REFERENCES node(id) ON DELETE CASCADE,
                    config_pv_id INTEGER NOT NULL REFERENCES config_pv(id),
                    position INTEGER NOT NULL,
                    value TEXT,
                    readback_value TEXT
                )",
            ),
            (
                "tag",
                "CREATE TABLE IF NOT EXISTS tag (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    snapshot_id INTEGER NOT NULL REFERENCES node(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    comment TEXT,
                    username TEXT,
                    created TEXT NOT NULL,
                    UNIQUE (snapshot_id, name)
                )",
            ),
        ];

        for (table, sql) in statements {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to create {} table: {}", table, e))
            })?;
        }

        self.create_core_indexes(&conn).await?;
        self.seed_root_node(&conn).await?;

        Ok(())
    }

    /// Create indexes for the hot lookup paths (children, items, relations)
    async fn create_core_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        let indexes = [
            ("idx_node_parent", "CREATE INDEX IF NOT EXISTS idx_node_parent ON node(parent_id)"),
            ("idx_node_type", "CREATE INDEX IF NOT EXISTS idx_node_type ON node(type)"),
            (
                "idx_snapshot_pv_snapshot",
                "CREATE INDEX IF NOT EXISTS idx_snapshot_pv_snapshot ON snapshot_node_pv(snapshot_id)",
            ),
            (
                "idx_snapshot_pv_config_pv",
                "CREATE INDEX IF NOT EXISTS idx_snapshot_pv_config_pv ON snapshot_node_pv(config_pv_id)",
            ),
            (
                "idx_config_pv_relation_pv",
                "CREATE INDEX IF NOT EXISTS idx_config_pv_relation_pv ON config_pv_relation(config_pv_id)",
            ),
        ];

        for (name, sql) in indexes {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to create index '{}': {}", name, e))
            })?;
        }

        Ok(())
    }

    /// Seed the root folder exactly once
    async fn seed_root_node(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        let now = format_timestamp(Utc::now().trunc_subsecs(6));

        conn.execute(
            "INSERT OR IGNORE INTO node (unique_id, parent_id, name, type, created, last_modified, username)
             VALUES (?, NULL, ?, 'FOLDER', ?, ?, NULL)",
            (ROOT_NODE_UNIQUE_ID, ROOT_NODE_NAME, now.as_str(), now.as_str()),
        )
        .await
        .map_err(|e| DatabaseError::initialization_failed(format!("Failed to seed root node: {}", e)))?;

        conn.execute(
            "INSERT OR IGNORE INTO node_property (node_id, property_name, value)
             SELECT id, ?, 'true' FROM node WHERE unique_id = ?",
            (ROOT_PROPERTY_KEY, ROOT_NODE_UNIQUE_ID),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to seed root property: {}", e))
        })?;

        Ok(())
    }

    /// Get a synchronous connection to the database
    ///
    /// **⚠️ WARNING**: No busy timeout and no foreign key enforcement. Only for
    /// single-threaded inspection code; use `connect_with_timeout()` elsewhere.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout and foreign keys configured
    ///
    /// The busy timeout lets concurrent writers wait for the lock instead of
    /// failing immediately with `SQLITE_BUSY`.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms))
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Open a tree connection for reads (autocommit)
    pub async fn open(&self) -> Result<TreeConnection, DatabaseError> {
        Ok(TreeConnection::new(self.connect_with_timeout().await?))
    }

    /// Open a tree connection and start an IMMEDIATE transaction on it
    ///
    /// IMMEDIATE takes the write lock up front, so check-then-write sequences
    /// (uniqueness checks, move validation) are serialized between writers.
    pub async fn begin(&self) -> Result<TreeConnection, DatabaseError> {
        let conn = self.open().await?;
        conn.begin().await?;
        Ok(conn)
    }
}

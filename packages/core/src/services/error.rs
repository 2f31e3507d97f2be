//! Service Layer Error Types
//!
//! This module defines the error taxonomy returned by every repository
//! operation. Storage failures are translated here so callers never see a raw
//! libsql error for a structural problem.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

/// Service operation errors
///
/// - `NodeNotFound`: a referenced anchor (parent, target, node) does not exist
/// - `SnapshotNotFound`: snapshot lookups on an id that is not a snapshot
/// - `InvalidArgument`: the request would violate a structural rule
///
/// Lookups that merely find nothing return `Ok(None)` / an empty `Vec`
/// instead of an error.
#[derive(Error, Debug)]
pub enum NodeServiceError {
    /// Node not found by ID
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// Snapshot not found by ID
    #[error("Snapshot not found: {id}")]
    SnapshotNotFound { id: String },

    /// Request violates a structural rule
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(#[source] DatabaseError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<DatabaseError> for NodeServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            // Sibling clash detected by the store itself (concurrent writers)
            DatabaseError::ConstraintViolation(msg) => {
                Self::InvalidArgument(format!("Name clash: {}", msg))
            }
            DatabaseError::InvalidData(msg) => Self::SerializationError(msg),
            other => Self::DatabaseError(other),
        }
    }
}

impl From<libsql::Error> for NodeServiceError {
    fn from(err: libsql::Error) -> Self {
        DatabaseError::from(err).into()
    }
}

impl From<ValidationError> for NodeServiceError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<serde_json::Error> for NodeServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl NodeServiceError {
    /// Create a node not found error
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    /// Create a snapshot not found error
    pub fn snapshot_not_found(id: impl Into<String>) -> Self {
        Self::SnapshotNotFound { id: id.into() }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a serialization error
    pub fn serialization_error(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// True for both `NodeNotFound` and `SnapshotNotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound { .. } | Self::SnapshotNotFound { .. }
        )
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

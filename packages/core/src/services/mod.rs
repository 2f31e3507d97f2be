//! Business Services
//!
//! This module contains the core business logic services:
//!
//! - `NodeService` - Tree CRUD, paths, move and copy
//! - `ConfigurationService` - Active PV lists of configurations
//! - `SnapshotService` - Saving and reading snapshots
//!
//! Services coordinate between the database layer and application logic,
//! enforcing the tree's structural rules inside one transaction per
//! operation.

pub mod configuration_service;
pub mod error;
pub mod node_service;
pub mod path_resolver;
pub mod snapshot_service;
pub mod validation;

pub use configuration_service::ConfigurationService;
pub use error::NodeServiceError;
pub use node_service::NodeService;
pub use path_resolver::split_path;
pub use snapshot_service::SnapshotService;
pub use validation::can_contain;

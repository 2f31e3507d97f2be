//! Process variable references tracked by a configuration

use crate::models::ValidationError;
use serde::{Deserialize, Serialize};

/// A process variable (and optional readback PV) referenced by a configuration.
///
/// `id` is the storage key of the shared `config_pv` row; it is `None` for
/// proposals that have not been persisted yet. A ConfigPv carries no value,
/// values live in [`SnapshotItem`](crate::models::SnapshotItem).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPv {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub pv_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readback_pv_name: Option<String>,

    #[serde(default)]
    pub read_only: bool,
}

impl ConfigPv {
    pub fn new(pv_name: impl Into<String>) -> Self {
        Self {
            id: None,
            pv_name: pv_name.into(),
            readback_pv_name: None,
            read_only: false,
        }
    }

    /// Set the readback PV; an empty name clears it
    pub fn with_readback(mut self, readback_pv_name: impl Into<String>) -> Self {
        let name = readback_pv_name.into();
        self.readback_pv_name = if name.is_empty() { None } else { Some(name) };
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Readback name as stored (empty string stands for "no readback")
    pub fn readback_or_empty(&self) -> &str {
        self.readback_pv_name.as_deref().unwrap_or("")
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pv_name.trim().is_empty() {
            return Err(ValidationError::InvalidPv("pv_name cannot be blank".to_string()));
        }
        Ok(())
    }
}

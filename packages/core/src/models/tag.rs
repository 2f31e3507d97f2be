//! Snapshot tags

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// A named, commented annotation attached to a snapshot.
///
/// Identity is `(snapshot_id, name)`; the same name never appears twice
/// on one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Unique id of the owning snapshot (filled in when attached)
    #[serde(default)]
    pub snapshot_id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    pub created: DateTime<Utc>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            snapshot_id: String::new(),
            name: name.into(),
            comment: None,
            user_name: None,
            created: Utc::now().trunc_subsecs(6),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }
}

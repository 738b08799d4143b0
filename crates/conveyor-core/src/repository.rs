//! Repositories that own builds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;

/// A source repository builds belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: ResourceId,
    pub owner: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Repository {
    /// The `owner/name` slug used in queue routing rules.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

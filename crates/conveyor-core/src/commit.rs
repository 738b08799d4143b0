//! Commits referenced by builds and requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;

/// A commit a build runs against. A build's branch is always resolved
/// through its commit; builds store no branch of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: ResourceId,
    pub repository_id: ResourceId,
    pub sha: String,
    /// Branch the commit arrived on. Absent for events that carry no branch
    /// information.
    pub branch: Option<String>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committed_at: Option<DateTime<Utc>>,
}

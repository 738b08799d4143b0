//! Storage collaborator contract.

use async_trait::async_trait;

use crate::build::Build;
use crate::commit::Commit;
use crate::error::Result;
use crate::id::ResourceId;
use crate::repository::Repository;

/// Durable storage for repositories, commits, and builds.
///
/// Implementations must keep build ids ordered by insertion (UUIDv7 ids do
/// this naturally) so that "previous build" queries are well defined.
#[async_trait]
pub trait BuildStore: Send + Sync {
    async fn insert_repository(&self, repository: &Repository) -> Result<()>;
    async fn repository(&self, id: ResourceId) -> Result<Option<Repository>>;

    async fn insert_commit(&self, commit: &Commit) -> Result<()>;
    async fn commit(&self, id: ResourceId) -> Result<Option<Commit>>;

    async fn insert_build(&self, build: &Build) -> Result<()>;
    async fn update_build(&self, build: &Build) -> Result<()>;
    async fn build(&self, id: ResourceId) -> Result<Option<Build>>;

    /// Largest build number assigned in the repository; 0 when none exist.
    async fn max_build_number(&self, repository_id: ResourceId) -> Result<u64>;

    /// Most recent finished build on `branch` in the repository with an id
    /// strictly smaller than `before`; `None` when no such build exists.
    async fn previous_finished_on_branch(
        &self,
        repository_id: ResourceId,
        branch: &str,
        before: ResourceId,
    ) -> Result<Option<Build>>;
}

//! PostgreSQL implementation of the storage contract.
//!
//! Build ids are UUIDv7, which compare bytewise in creation order, so the
//! "previous build" query can use plain id comparison.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use conveyor_core::build::Build;
use conveyor_core::commit::Commit;
use conveyor_core::config::BuildConfig;
use conveyor_core::matrix::MatrixJob;
use conveyor_core::repository::Repository;
use conveyor_core::store::BuildStore;
use conveyor_core::{Error, ResourceId, Result};

/// PostgreSQL-backed build store.
pub struct PgBuildStore {
    pool: PgPool,
}

impl PgBuildStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct RepositoryRow {
    id: uuid::Uuid,
    owner: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<RepositoryRow> for Repository {
    fn from(row: RepositoryRow) -> Self {
        Repository {
            id: ResourceId::from_uuid(row.id),
            owner: row.owner,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CommitRow {
    id: uuid::Uuid,
    repository_id: uuid::Uuid,
    sha: String,
    branch: Option<String>,
    message: String,
    author_name: String,
    author_email: String,
    committed_at: Option<DateTime<Utc>>,
}

impl From<CommitRow> for Commit {
    fn from(row: CommitRow) -> Self {
        Commit {
            id: ResourceId::from_uuid(row.id),
            repository_id: ResourceId::from_uuid(row.repository_id),
            sha: row.sha,
            branch: row.branch,
            message: row.message,
            author_name: row.author_name,
            author_email: row.author_email,
            committed_at: row.committed_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct BuildRow {
    id: uuid::Uuid,
    repository_id: uuid::Uuid,
    commit_id: uuid::Uuid,
    request_id: uuid::Uuid,
    number: i64,
    state: String,
    status: Option<i32>,
    config: serde_json::Value,
    matrix: serde_json::Value,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl BuildRow {
    fn into_domain(self) -> Result<Build> {
        let matrix: Vec<MatrixJob> =
            serde_json::from_value(self.matrix).map_err(|e| Error::Storage(e.to_string()))?;

        Ok(Build {
            id: ResourceId::from_uuid(self.id),
            repository_id: ResourceId::from_uuid(self.repository_id),
            commit_id: ResourceId::from_uuid(self.commit_id),
            request_id: ResourceId::from_uuid(self.request_id),
            number: self.number as u64,
            state: self.state.parse()?,
            status: self.status,
            config: BuildConfig::from_value(self.config),
            matrix,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}

fn matrix_value(build: &Build) -> Result<serde_json::Value> {
    serde_json::to_value(&build.matrix).map_err(|e| Error::Storage(e.to_string()))
}

fn storage(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

#[async_trait]
impl BuildStore for PgBuildStore {
    async fn insert_repository(&self, repository: &Repository) -> Result<()> {
        sqlx::query("INSERT INTO repositories (id, owner, name, created_at) VALUES ($1, $2, $3, $4)")
            .bind(repository.id.as_uuid())
            .bind(&repository.owner)
            .bind(&repository.name)
            .bind(repository.created_at)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn repository(&self, id: ResourceId) -> Result<Option<Repository>> {
        let row = sqlx::query_as::<_, RepositoryRow>("SELECT * FROM repositories WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(Repository::from))
    }

    async fn insert_commit(&self, commit: &Commit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO commits (id, repository_id, sha, branch, message, author_name, author_email, committed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(commit.id.as_uuid())
        .bind(commit.repository_id.as_uuid())
        .bind(&commit.sha)
        .bind(&commit.branch)
        .bind(&commit.message)
        .bind(&commit.author_name)
        .bind(&commit.author_email)
        .bind(commit.committed_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn commit(&self, id: ResourceId) -> Result<Option<Commit>> {
        let row = sqlx::query_as::<_, CommitRow>("SELECT * FROM commits WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(Commit::from))
    }

    async fn insert_build(&self, build: &Build) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO builds (id, repository_id, commit_id, request_id, number, state, status,
                                config, matrix, created_at, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(build.id.as_uuid())
        .bind(build.repository_id.as_uuid())
        .bind(build.commit_id.as_uuid())
        .bind(build.request_id.as_uuid())
        .bind(build.number as i64)
        .bind(build.state.as_str())
        .bind(build.status)
        .bind(build.config.to_value())
        .bind(matrix_value(build)?)
        .bind(build.created_at)
        .bind(build.started_at)
        .bind(build.finished_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn update_build(&self, build: &Build) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE builds
            SET state = $2, status = $3, config = $4, matrix = $5, started_at = $6, finished_at = $7
            WHERE id = $1
            "#,
        )
        .bind(build.id.as_uuid())
        .bind(build.state.as_str())
        .bind(build.status)
        .bind(build.config.to_value())
        .bind(matrix_value(build)?)
        .bind(build.started_at)
        .bind(build.finished_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn build(&self, id: ResourceId) -> Result<Option<Build>> {
        let row = sqlx::query_as::<_, BuildRow>("SELECT * FROM builds WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(BuildRow::into_domain).transpose()
    }

    async fn max_build_number(&self, repository_id: ResourceId) -> Result<u64> {
        let max: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(number), 0) FROM builds WHERE repository_id = $1",
        )
        .bind(repository_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        Ok(max as u64)
    }

    async fn previous_finished_on_branch(
        &self,
        repository_id: ResourceId,
        branch: &str,
        before: ResourceId,
    ) -> Result<Option<Build>> {
        let row = sqlx::query_as::<_, BuildRow>(
            r#"
            SELECT builds.*
            FROM builds
            JOIN commits ON commits.id = builds.commit_id
            WHERE builds.repository_id = $1
              AND commits.branch = $2
              AND builds.id < $3
              AND builds.state = 'finished'
            ORDER BY builds.id DESC
            LIMIT 1
            "#,
        )
        .bind(repository_id.as_uuid())
        .bind(branch)
        .bind(before.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        row.map(BuildRow::into_domain).transpose()
    }
}

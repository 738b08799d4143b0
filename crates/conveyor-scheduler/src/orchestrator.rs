//! Build orchestration: request approval, lifecycle transitions, status
//! reports, and dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use conveyor_core::build::{Build, FinishData, NewBuild, StartData};
use conveyor_core::matrix::MatrixExpander;
use conveyor_core::request::Request;
use conveyor_core::status;
use conveyor_core::store::BuildStore;
use conveyor_core::{Error, ResourceId, Result};

use crate::dispatcher::{DispatchReceipt, Dispatcher, JobPayload};
use crate::registry::QueueRegistry;
use crate::router;

/// User-facing status for one build.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub message: String,
    pub color: String,
    pub human_message: String,
}

/// Wires the storage, matrix, registry, and broker collaborators together
/// around the build lifecycle.
pub struct BuildOrchestrator {
    store: Arc<dyn BuildStore>,
    expander: Arc<dyn MatrixExpander>,
    registry: Arc<QueueRegistry>,
    dispatcher: Dispatcher,
    /// Per-record transition locks; start/finish are not commutative, so
    /// at most one transition runs per build at a time.
    locks: Mutex<HashMap<ResourceId, Arc<Mutex<()>>>>,
}

impl BuildOrchestrator {
    pub fn new(
        store: Arc<dyn BuildStore>,
        expander: Arc<dyn MatrixExpander>,
        registry: Arc<QueueRegistry>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            store,
            expander,
            registry,
            dispatcher,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Configure an inbound request and, when the commit's branch clears
    /// the branch rules, create its build. Number assignment and matrix
    /// expansion complete before the record is persisted.
    pub async fn configure_request(
        &self,
        request: &mut Request,
        raw_config: serde_json::Value,
    ) -> Result<Option<Build>> {
        request.configure(raw_config)?;

        let commit = self
            .store
            .commit(request.commit_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("commit {}", request.commit_id)))?;

        let build = if request.approved(commit.branch.as_deref()) {
            Some(self.create_build(request).await?)
        } else {
            info!(request_id = %request.id, branch = ?commit.branch, "request not approved, no build");
            None
        };

        request.finish()?;
        Ok(build)
    }

    async fn create_build(&self, request: &Request) -> Result<Build> {
        let number = self.store.max_build_number(request.repository_id).await? + 1;

        let mut build = Build::create(
            NewBuild {
                repository_id: Some(request.repository_id),
                commit_id: Some(request.commit_id),
                request_id: Some(request.id),
                config: request.config.to_value(),
            },
            number,
            Utc::now(),
        )?;
        build.matrix = self.expander.expand(&build.config);

        self.store.insert_build(&build).await?;
        info!(build_id = %build.id, number = build.number, jobs = build.matrix.len(), "build created");
        Ok(build)
    }

    /// Apply the start transition under the record's lock.
    pub async fn start_build(&self, id: ResourceId, data: StartData) -> Result<Build> {
        let lock = self.record_lock(id).await;
        let _guard = lock.lock().await;

        let mut build = self.load(id).await?;
        build.start(data)?;
        self.store.update_build(&build).await?;
        info!(build_id = %build.id, "build started");
        Ok(build)
    }

    /// Record one constituent job's result under the record's lock.
    pub async fn record_job_result(
        &self,
        id: ResourceId,
        job_index: u32,
        job_status: i32,
    ) -> Result<Build> {
        let lock = self.record_lock(id).await;
        let _guard = lock.lock().await;

        let mut build = self.load(id).await?;
        let job = build
            .matrix
            .iter_mut()
            .find(|job| job.index == job_index)
            .ok_or_else(|| Error::NotFound(format!("job {job_index} of build {id}")))?;
        job.status = Some(job_status);

        self.store.update_build(&build).await?;
        Ok(build)
    }

    /// Apply the finish transition under the record's lock. The build's
    /// status is the matrix collaborator's aggregate over its job results.
    pub async fn finish_build(&self, id: ResourceId, finished_at: DateTime<Utc>) -> Result<Build> {
        let lock = self.record_lock(id).await;
        let _guard = lock.lock().await;

        let mut build = self.load(id).await?;
        let aggregate = self.expander.aggregate(&build.matrix);
        build.finish(FinishData {
            finished_at,
            status: aggregate,
        })?;

        self.store.update_build(&build).await?;
        info!(build_id = %build.id, status = aggregate, "build finished");
        Ok(build)
    }

    /// Derive the user-facing status for a build from its branch history.
    /// A build whose commit is missing or has no branch has no history to
    /// compare against.
    pub async fn status_of(&self, build: &Build) -> Result<StatusReport> {
        let branch = self
            .store
            .commit(build.commit_id)
            .await?
            .and_then(|commit| commit.branch);

        let previous = match branch {
            Some(branch) => {
                self.store
                    .previous_finished_on_branch(build.repository_id, &branch, build.id)
                    .await?
            }
            None => None,
        };

        let message = status::status_message(build, previous.as_ref());
        Ok(StatusReport {
            message: message.to_string(),
            color: status::color(build).to_string(),
            human_message: status::human_status_message(message),
        })
    }

    /// Route the build and hand its job to the broker. Routing itself never
    /// fails; builds no rule claims go to the default queue.
    pub async fn dispatch_build(&self, build: &Build) -> Result<DispatchReceipt> {
        let repository = self
            .store
            .repository(build.repository_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("repository {}", build.repository_id)))?;
        let commit = self
            .store
            .commit(build.commit_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("commit {}", build.commit_id)))?;

        let queue = router::worker_for(&self.registry, &repository, build);
        let payload = JobPayload::for_build(build, &repository, &commit, &queue);
        self.dispatcher.enqueue(&payload, &queue).await
    }

    async fn load(&self, id: ResourceId) -> Result<Build> {
        self.store
            .build(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("build {id}")))
    }

    async fn record_lock(&self, id: ResourceId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

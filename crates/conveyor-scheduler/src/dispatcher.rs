//! Broker handoff for routed jobs.
//!
//! The dispatcher makes exactly one publish call per dispatched job and
//! performs no retries; retry policy belongs to the broker. The handoff is
//! bounded by a timeout, surfaced as a dispatch failure to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use conveyor_core::build::Build;
use conveyor_core::commit::Commit;
use conveyor_core::repository::Repository;
use conveyor_core::{Error, ResourceId, Result};

use crate::registry::Queue;

/// Payload handed to the broker for one build job. The routed queue name is
/// merged into the payload itself so workers can see where they consumed
/// from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub build_id: ResourceId,
    pub number: u64,
    pub repository: String,
    pub sha: String,
    pub branch: Option<String>,
    pub config: Value,
    pub queue: String,
}

impl JobPayload {
    pub fn for_build(build: &Build, repository: &Repository, commit: &Commit, queue: &Queue) -> Self {
        Self {
            build_id: build.id,
            number: build.number,
            repository: repository.slug(),
            sha: commit.sha.clone(),
            branch: commit.branch.clone(),
            config: build.config.to_value(),
            queue: queue.name().to_string(),
        }
    }
}

/// Receipt for one accepted handoff.
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    pub queue: String,
    pub message_id: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

/// Message broker collaborator. At-least-once delivery and any retrying
/// live behind this trait, not in the dispatcher.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, queue: &str, payload: Value) -> Result<DispatchReceipt>;
}

/// Hands routed jobs to the broker.
pub struct Dispatcher {
    broker: Arc<dyn Broker>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(broker: Arc<dyn Broker>, timeout: Duration) -> Self {
        Self { broker, timeout }
    }

    /// Serialize the job and hand it to the broker, once.
    pub async fn enqueue(&self, payload: &JobPayload, queue: &Queue) -> Result<DispatchReceipt> {
        let body = serde_json::to_value(payload).map_err(|e| Error::Internal(e.to_string()))?;

        let receipt = tokio::time::timeout(self.timeout, self.broker.publish(queue.name(), body))
            .await
            .map_err(|_| Error::DispatchTimeout {
                queue: queue.name().to_string(),
            })??;

        info!(queue = %queue.name(), build_id = %payload.build_id, "job enqueued");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conveyor_core::build::NewBuild;
    use serde_json::json;
    use std::sync::Mutex;

    fn fixtures() -> (Build, Repository, Commit) {
        let repository = Repository {
            id: ResourceId::new(),
            owner: "a".to_string(),
            name: "b".to_string(),
            created_at: Utc::now(),
        };
        let commit = Commit {
            id: ResourceId::new(),
            repository_id: repository.id,
            sha: "deadbeef".to_string(),
            branch: Some("main".to_string()),
            message: "fix".to_string(),
            author_name: "dev".to_string(),
            author_email: "dev@example.com".to_string(),
            committed_at: Some(Utc::now()),
        };
        let build = Build::create(
            NewBuild {
                repository_id: Some(repository.id),
                commit_id: Some(commit.id),
                request_id: Some(ResourceId::new()),
                config: json!({ "target": "x" }),
            },
            7,
            Utc::now(),
        )
        .unwrap();
        (build, repository, commit)
    }

    #[derive(Default)]
    struct RecordingBroker {
        published: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Broker for RecordingBroker {
        async fn publish(&self, queue: &str, payload: Value) -> Result<DispatchReceipt> {
            self.published
                .lock()
                .unwrap()
                .push((queue.to_string(), payload));
            Ok(DispatchReceipt {
                queue: queue.to_string(),
                message_id: Some("m-1".to_string()),
                enqueued_at: Utc::now(),
            })
        }
    }

    struct StuckBroker;

    #[async_trait]
    impl Broker for StuckBroker {
        async fn publish(&self, _queue: &str, _payload: Value) -> Result<DispatchReceipt> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("publish should have timed out")
        }
    }

    struct FailingBroker;

    #[async_trait]
    impl Broker for FailingBroker {
        async fn publish(&self, queue: &str, _payload: Value) -> Result<DispatchReceipt> {
            Err(Error::DispatchFailed {
                queue: queue.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_enqueue_publishes_once_with_queue_in_payload() {
        let broker = Arc::new(RecordingBroker::default());
        let dispatcher = Dispatcher::new(broker.clone(), Duration::from_secs(5));
        let (build, repository, commit) = fixtures();
        let queue = Queue::default();

        let payload = JobPayload::for_build(&build, &repository, &commit, &queue);
        let receipt = dispatcher.enqueue(&payload, &queue).await.unwrap();
        assert_eq!(receipt.queue, "builds");

        let published = broker.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        let (queue_name, body) = &published[0];
        assert_eq!(queue_name, "builds");
        assert_eq!(body["queue"], "builds");
        assert_eq!(body["repository"], "a/b");
        assert_eq!(body["number"], 7);
        assert_eq!(body["config"]["target"], "x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_broker_surfaces_dispatch_timeout() {
        let dispatcher = Dispatcher::new(Arc::new(StuckBroker), Duration::from_secs(2));
        let (build, repository, commit) = fixtures();
        let queue = Queue::default();

        let payload = JobPayload::for_build(&build, &repository, &commit, &queue);
        let err = dispatcher.enqueue(&payload, &queue).await.unwrap_err();
        assert!(matches!(err, Error::DispatchTimeout { .. }));
    }

    #[tokio::test]
    async fn test_broker_failure_surfaces_without_retry() {
        let dispatcher = Dispatcher::new(Arc::new(FailingBroker), Duration::from_secs(2));
        let (build, repository, commit) = fixtures();
        let queue = Queue::default();

        let payload = JobPayload::for_build(&build, &repository, &commit, &queue);
        let err = dispatcher.enqueue(&payload, &queue).await.unwrap_err();
        assert!(matches!(err, Error::DispatchFailed { .. }));
    }
}

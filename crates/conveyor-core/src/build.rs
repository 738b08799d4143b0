//! Build records and their lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::id::ResourceId;
use crate::matrix::MatrixJob;

/// Lifecycle state of a build. The lifecycle is linear: a build is created,
/// started once, and finished once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Created,
    Started,
    Finished,
}

impl BuildState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildState::Created => "created",
            BuildState::Started => "started",
            BuildState::Finished => "finished",
        }
    }

    /// Transition table. Anything not listed here is rejected.
    pub fn step(self, event: BuildEvent) -> Result<BuildState> {
        match (self, event) {
            (BuildState::Created, BuildEvent::Start) => Ok(BuildState::Started),
            (BuildState::Started, BuildEvent::Finish) => Ok(BuildState::Finished),
            (state, event) => Err(Error::InvalidTransition {
                state: state.as_str(),
                event: event.as_str(),
            }),
        }
    }
}

impl std::str::FromStr for BuildState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(BuildState::Created),
            "started" => Ok(BuildState::Started),
            "finished" => Ok(BuildState::Finished),
            other => Err(Error::InvalidInput(format!("unknown build state: {other}"))),
        }
    }
}

/// Lifecycle events a build responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildEvent {
    Start,
    Finish,
}

impl BuildEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildEvent::Start => "start",
            BuildEvent::Finish => "finish",
        }
    }
}

/// Boundary data for creating a build. Associations arrive from inbound
/// payloads and are validated before anything is persisted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBuild {
    pub repository_id: Option<ResourceId>,
    pub commit_id: Option<ResourceId>,
    pub request_id: Option<ResourceId>,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Data recorded when a build starts.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StartData {
    pub started_at: DateTime<Utc>,
}

/// Data recorded when a build finishes. `status` is the aggregate of the
/// constituent job results, computed by the matrix collaborator's rule.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FinishData {
    pub finished_at: DateTime<Utc>,
    pub status: i32,
}

/// One CI run for a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: ResourceId,
    pub repository_id: ResourceId,
    pub commit_id: ResourceId,
    pub request_id: ResourceId,
    /// Sequence number, unique within the owning repository.
    pub number: u64,
    pub state: BuildState,
    /// Exit-code-like result; meaningful only once finished.
    pub status: Option<i32>,
    pub config: BuildConfig,
    /// Constituent jobs produced by matrix expansion.
    pub matrix: Vec<MatrixJob>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Build {
    /// Validate boundary data and assemble a record in the `created` state.
    ///
    /// `number` must already be assigned by storage for the owning
    /// repository; matrix expansion happens before the record is persisted.
    pub fn create(new: NewBuild, number: u64, created_at: DateTime<Utc>) -> Result<Build> {
        let repository_id = new
            .repository_id
            .ok_or(Error::MissingAssociation("repository"))?;
        let commit_id = new.commit_id.ok_or(Error::MissingAssociation("commit"))?;
        let request_id = new.request_id.ok_or(Error::MissingAssociation("request"))?;

        Ok(Build {
            id: ResourceId::new(),
            repository_id,
            commit_id,
            request_id,
            number,
            state: BuildState::Created,
            status: None,
            config: BuildConfig::from_value(new.config),
            matrix: Vec::new(),
            created_at,
            started_at: None,
            finished_at: None,
        })
    }

    /// Record the start of execution. Valid only from `created`.
    pub fn start(&mut self, data: StartData) -> Result<()> {
        self.state = self.state.step(BuildEvent::Start)?;
        self.started_at = Some(data.started_at);
        Ok(())
    }

    /// Record completion and the aggregate status of the constituent jobs.
    /// Valid only from `started`.
    pub fn finish(&mut self, data: FinishData) -> Result<()> {
        self.state = self.state.step(BuildEvent::Finish)?;
        self.status = Some(data.status);
        self.finished_at = Some(data.finished_at);
        Ok(())
    }

    /// Replace the configuration; keys are canonicalized on assignment.
    pub fn set_config(&mut self, raw: serde_json::Value) {
        self.config = BuildConfig::from_value(raw);
    }

    pub fn started(&self) -> bool {
        self.state == BuildState::Started
    }

    pub fn finished(&self) -> bool {
        self.state == BuildState::Finished
    }

    /// A build is pending until it has finished.
    pub fn pending(&self) -> bool {
        !self.finished()
    }

    pub fn passed(&self) -> bool {
        self.status == Some(0)
    }

    pub fn failed(&self) -> bool {
        !self.passed()
    }
}

//! Inbound change events and branch approval rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::id::ResourceId;

/// Lifecycle state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Created,
    Started,
    Configured,
    Finished,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Created => "created",
            RequestState::Started => "started",
            RequestState::Configured => "configured",
            RequestState::Finished => "finished",
        }
    }

    /// Transition table. Anything not listed here is rejected.
    pub fn step(self, event: RequestEvent) -> Result<RequestState> {
        match (self, event) {
            (RequestState::Created, RequestEvent::Start) => Ok(RequestState::Started),
            (RequestState::Started, RequestEvent::Configure) => Ok(RequestState::Configured),
            (RequestState::Configured, RequestEvent::Finish) => Ok(RequestState::Finished),
            (state, event) => Err(Error::InvalidTransition {
                state: state.as_str(),
                event: event.as_str(),
            }),
        }
    }
}

/// Lifecycle events a request responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvent {
    Start,
    Configure,
    Finish,
}

impl RequestEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestEvent::Start => "start",
            RequestEvent::Configure => "configure",
            RequestEvent::Finish => "finish",
        }
    }
}

/// Boundary data for creating a request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRequest {
    pub repository_id: Option<ResourceId>,
    pub commit_id: Option<ResourceId>,
    pub token: Option<String>,
}

/// An inbound change event. An approved, configured request yields a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: ResourceId,
    pub repository_id: ResourceId,
    pub commit_id: ResourceId,
    pub token: String,
    pub state: RequestState,
    pub config: BuildConfig,
    pub created_at: DateTime<Utc>,
}

impl Request {
    pub fn create(new: NewRequest, created_at: DateTime<Utc>) -> Result<Request> {
        let repository_id = new
            .repository_id
            .ok_or(Error::MissingAssociation("repository"))?;
        let commit_id = new.commit_id.ok_or(Error::MissingAssociation("commit"))?;
        let token = new
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::InvalidInput("request token missing".to_string()))?;

        Ok(Request {
            id: ResourceId::new(),
            repository_id,
            commit_id,
            token,
            state: RequestState::Created,
            config: BuildConfig::new(),
            created_at,
        })
    }

    pub fn start(&mut self) -> Result<()> {
        self.state = self.state.step(RequestEvent::Start)?;
        Ok(())
    }

    /// Store the canonicalized configuration. Valid only from `started`.
    pub fn configure(&mut self, raw: Value) -> Result<()> {
        self.state = self.state.step(RequestEvent::Configure)?;
        self.config = BuildConfig::from_value(raw);
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        self.state = self.state.step(RequestEvent::Finish)?;
        Ok(())
    }

    /// Whether the commit's branch clears the configured branch rules.
    /// A request with no branch information is approved.
    pub fn approved(&self, branch: Option<&str>) -> bool {
        match branch {
            None => true,
            Some(branch) => {
                branch_included(&self.config, branch) && !branch_excluded(&self.config, branch)
            }
        }
    }
}

/// Whether `branch` passes the `only` side of the `branches` config key.
/// No rule means every branch is included.
///
/// Accepted shapes: a comma-separated string, an array of names, or a map
/// with `only` / `except` lists.
pub fn branch_included(config: &BuildConfig, branch: &str) -> bool {
    match config.get("branches") {
        None => true,
        Some(value) => match rule_branches(value, "only") {
            None => true,
            Some(list) => list.iter().any(|b| b == branch),
        },
    }
}

/// Whether `branch` is listed on the `except` side of the `branches` key.
pub fn branch_excluded(config: &BuildConfig, branch: &str) -> bool {
    config
        .get("branches")
        .and_then(|value| rule_branches(value, "except"))
        .map(|list| list.iter().any(|b| b == branch))
        .unwrap_or(false)
}

/// Extract the branch list for one rule. A bare string or array is treated
/// as an `only` rule.
fn rule_branches(value: &Value, rule: &str) -> Option<Vec<String>> {
    match value {
        Value::String(s) if rule == "only" => Some(split_names(s)),
        Value::Array(items) if rule == "only" => Some(collect_names(items)),
        Value::Object(map) => map.get(rule).map(|v| match v {
            Value::String(s) => split_names(s),
            Value::Array(items) => collect_names(items),
            _ => Vec::new(),
        }),
        _ => None,
    }
}

fn split_names(s: &str) -> Vec<String> {
    s.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

fn collect_names(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

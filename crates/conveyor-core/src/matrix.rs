//! Matrix-expansion collaborator contract.
//!
//! Expanding a build's configuration into constituent jobs, and the rule
//! for folding their results back into one build status, are owned by a
//! collaborator. This module defines the contract the orchestrator consumes
//! and the default single-job expansion.

use serde::{Deserialize, Serialize};

use crate::config::BuildConfig;

/// One constituent job of a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixJob {
    /// Position within the build's matrix, starting at 1.
    pub index: u32,
    /// The job's slice of the build configuration.
    pub config: BuildConfig,
    /// Exit-code-like result; `None` until the job reports.
    pub status: Option<i32>,
}

/// Expands a build configuration into constituent jobs and owns the result
/// aggregation rule.
pub trait MatrixExpander: Send + Sync {
    /// Expand a build configuration into its constituent jobs.
    fn expand(&self, config: &BuildConfig) -> Vec<MatrixJob>;

    /// Fold constituent job results into one build status: 0 iff every job
    /// reported a pass. A job that has not reported counts as not passed.
    fn aggregate(&self, jobs: &[MatrixJob]) -> i32 {
        if jobs.iter().all(|job| job.status == Some(0)) {
            0
        } else {
            1
        }
    }
}

/// Expander for unconfigured or single-configuration builds: one job
/// carrying the whole configuration.
#[derive(Debug, Default)]
pub struct SingleJobExpander;

impl MatrixExpander for SingleJobExpander {
    fn expand(&self, config: &BuildConfig) -> Vec<MatrixJob> {
        vec![MatrixJob {
            index: 1,
            config: config.clone(),
            status: None,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(index: u32, status: Option<i32>) -> MatrixJob {
        MatrixJob {
            index,
            config: BuildConfig::new(),
            status,
        }
    }

    #[test]
    fn test_aggregate_passes_iff_all_jobs_pass() {
        let expander = SingleJobExpander;
        assert_eq!(expander.aggregate(&[job(1, Some(0)), job(2, Some(0))]), 0);
        assert_eq!(expander.aggregate(&[job(1, Some(0)), job(2, Some(1))]), 1);
    }

    #[test]
    fn test_unreported_job_counts_as_failed() {
        let expander = SingleJobExpander;
        assert_eq!(expander.aggregate(&[job(1, Some(0)), job(2, None)]), 1);
    }

    #[test]
    fn test_single_job_expansion_carries_config() {
        let mut config = BuildConfig::new();
        config.insert("target", serde_json::json!("gpu"));

        let jobs = SingleJobExpander.expand(&config);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].index, 1);
        assert_eq!(jobs[0].config.target(), Some("gpu"));
    }
}

//! Batch runners for tailoring and applying many jobs.
//!
//! One job's error never aborts the rest of the batch; each job gets its
//! own [`JobReport`].

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use futures_util::stream::{self, StreamExt};
use tracing::{error, info};

use super::{ApplyError, Orchestrator, SubmitOutcome};
use crate::artifact::{ArtifactLinker, TailorError, TemplateSelection};
use crate::ledger::JobRecord;

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Tailored(PathBuf),
    Applied,
    Failed(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job_id: String,
    pub outcome: JobOutcome,
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            JobOutcome::Tailored(path) => write!(f, "{}  tailored  {}", self.job_id, path.display()),
            JobOutcome::Applied => write!(f, "{}  applied", self.job_id),
            JobOutcome::Failed(reason) => write!(f, "{}  failed    {}", self.job_id, reason),
            JobOutcome::Error(message) => write!(f, "{}  error     {}", self.job_id, message),
        }
    }
}

/// Per-job reports in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub jobs: Vec<JobReport>,
}

impl BatchReport {
    /// True when any job ended `failed` or errored.
    pub fn has_failures(&self) -> bool {
        self.jobs
            .iter()
            .any(|r| matches!(r.outcome, JobOutcome::Failed(_) | JobOutcome::Error(_)))
    }

    pub fn count(&self, pred: impl Fn(&JobOutcome) -> bool) -> usize {
        self.jobs.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Keeps the first occurrence of each id so workers own disjoint jobs.
fn dedupe<T>(items: Vec<T>, key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item).to_string()))
        .collect()
}

/// Applies to every job in `job_ids`, at most `concurrency` at a time.
pub async fn apply_batch(
    orchestrator: &Orchestrator,
    job_ids: Vec<String>,
    concurrency: usize,
) -> BatchReport {
    let job_ids = dedupe(job_ids, |id| id.as_str());
    info!(jobs = job_ids.len(), concurrency, "Starting apply batch");

    let mut jobs: Vec<(usize, JobReport)> = stream::iter(job_ids.into_iter().enumerate())
        .map(|(index, job_id)| async move {
            let outcome = match orchestrator.apply(&job_id).await {
                Ok(result) => match result.outcome {
                    SubmitOutcome::Success => JobOutcome::Applied,
                    SubmitOutcome::Failure(reason) => JobOutcome::Failed(reason),
                },
                Err(e) => {
                    report_error(&job_id, &e);
                    JobOutcome::Error(e.to_string())
                }
            };
            (index, JobReport { job_id, outcome })
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    jobs.sort_by_key(|(index, _)| *index);
    BatchReport {
        jobs: jobs.into_iter().map(|(_, report)| report).collect(),
    }
}

/// Tailors every job in `jobs` with one template, at most `concurrency`
/// renders at a time.
pub async fn tailor_batch(
    linker: &ArtifactLinker,
    jobs: Vec<JobRecord>,
    template: &TemplateSelection,
    concurrency: usize,
) -> BatchReport {
    let jobs = dedupe(jobs, |job| job.job_id.as_str());
    info!(jobs = jobs.len(), concurrency, template = %template.name, "Starting tailor batch");

    let mut reports: Vec<(usize, JobReport)> = stream::iter(jobs.into_iter().enumerate())
        .map(|(index, job)| async move {
            let outcome = match linker.tailor(&job, template).await {
                Ok(artifact) => JobOutcome::Tailored(artifact.rendered_path),
                Err(TailorError::Ledger(e)) if e.is_contract_violation() => {
                    error!(job_id = %job.job_id, error = %e, "Tailoring rejected");
                    JobOutcome::Error(e.to_string())
                }
                Err(e) => JobOutcome::Error(e.to_string()),
            };
            (
                index,
                JobReport {
                    job_id: job.job_id,
                    outcome,
                },
            )
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    reports.sort_by_key(|(index, _)| *index);
    BatchReport {
        jobs: reports.into_iter().map(|(_, report)| report).collect(),
    }
}

fn report_error(job_id: &str, e: &ApplyError) {
    if e.is_contract_violation() {
        error!(job_id = %job_id, error = %e, "Application rejected");
    } else {
        error!(job_id = %job_id, error = %e, "Application errored");
    }
}

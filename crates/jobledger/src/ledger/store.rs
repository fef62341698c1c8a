//! Durable job store backed by the `jobs` table.
//!
//! Every mutating call commits its transaction before returning, so a
//! successful return means the change survives a crash.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::error::LedgerError;
use super::record::{derive_job_id, JobRecord, JobStatus, RawJob};
use crate::db::job_repo::{self, JobFilter, JobRow, NewJobRow, StatusWrite};
use crate::db::{artifact_repo, Database};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_timestamp(s: &str, job_id: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::CorruptRow {
            job_id: job_id.to_string(),
            reason: format!("bad timestamp '{}': {}", s, e),
        })
}

impl JobRecord {
    /// Creates a JobRecord from a database row.
    pub(crate) fn from_row(row: JobRow) -> Result<Self, LedgerError> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|reason| LedgerError::CorruptRow {
                job_id: row.job_id.clone(),
                reason,
            })?;
        let applied_at = row
            .applied_at
            .as_deref()
            .map(|s| parse_timestamp(s, &row.job_id))
            .transpose()?;
        let ingested_at = parse_timestamp(&row.ingested_at, &row.job_id)?;
        let updated_at = parse_timestamp(&row.updated_at, &row.job_id)?;

        Ok(Self {
            job_id: row.job_id,
            platform: row.platform,
            title: row.title,
            company: row.company,
            location: row.location,
            external_url: row.external_url,
            description: row.description,
            status,
            artifact_path: row.artifact_path,
            applied_at,
            failure_reason: row.failure_reason,
            ingested_at,
            updated_at,
        })
    }
}

// ─── Query types ────────────────────────────────────────────────────────────

/// Filter for [`JobStore::list`]. Results are always in ingest order.
#[derive(Debug, Default, Clone)]
pub struct StatusFilter {
    /// Accepted statuses. Empty means any.
    pub statuses: Vec<JobStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl StatusFilter {
    pub fn only(statuses: &[JobStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }
}

/// Side data carried by a status change.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Change<'a> {
    pub failure_reason: Option<&'a str>,
    pub artifact_path: Option<&'a str>,
}

// ─── JobStore ───────────────────────────────────────────────────────────────

/// The JobRecord store. Cloning is cheap (shares the database handle).
#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Inserts the records that are not yet known and returns how many were
    /// new. Existing jobs are left untouched so in-progress state survives a
    /// re-scrape. Every record is validated first; one invalid record fails
    /// the whole call and nothing is written.
    pub fn ingest(&self, records: &[RawJob]) -> Result<usize, LedgerError> {
        let mut prepared = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let url = record
                .validate()
                .map_err(|reason| LedgerError::Validation(format!("record {}: {}", index, reason)))?;
            let job_id = derive_job_id(&record.platform, &url);
            prepared.push((job_id, url, record));
        }

        let now = format_timestamp(Utc::now());
        let inserted = self.db.with_tx(|tx| -> Result<usize, LedgerError> {
            let mut seen = HashSet::new();
            let mut inserted = 0;
            for (job_id, url, record) in &prepared {
                if !seen.insert(job_id.as_str()) {
                    continue;
                }
                let row = NewJobRow {
                    job_id,
                    platform: record.platform.trim(),
                    title: record.title.trim(),
                    company: record.company.trim(),
                    location: record.location.trim(),
                    external_url: url,
                    description: &record.description,
                    ingested_at: &now,
                };
                if job_repo::insert_if_absent_in(tx, &row)? {
                    inserted += 1;
                }
            }
            Ok(inserted)
        })?;

        log::info!(
            "Ingested {} new job(s) out of {} record(s)",
            inserted,
            records.len()
        );
        Ok(inserted)
    }

    pub fn get(&self, job_id: &str) -> Result<JobRecord, LedgerError> {
        let row = job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| LedgerError::NotFound(job_id.to_string()))?;
        JobRecord::from_row(row)
    }

    /// Lists jobs in ingest order. Re-running the same filter yields the
    /// same sequence absent concurrent mutation, so `offset` paging is
    /// restartable.
    pub fn list(&self, filter: &StatusFilter) -> Result<Vec<JobRecord>, LedgerError> {
        let repo_filter = JobFilter {
            statuses: filter
                .statuses
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            limit: filter.limit,
            offset: filter.offset,
        };
        job_repo::query(&self.db, &repo_filter)?
            .into_iter()
            .map(JobRecord::from_row)
            .collect()
    }

    /// Jobs left mid-attempt, i.e. in `Applying`.
    pub fn find_applying(&self) -> Result<Vec<JobRecord>, LedgerError> {
        self.list(&StatusFilter::only(&[JobStatus::Applying]))
    }

    /// Changes a job's status. This is the only way status moves; the
    /// artifact linker and orchestrator go through the same transition
    /// logic inside their own transactions.
    ///
    /// Entering `Tailored` requires a rendered artifact and is only done
    /// by the artifact linker.
    pub fn update_status(
        &self,
        job_id: &str,
        new_status: JobStatus,
        failure_reason: Option<&str>,
    ) -> Result<JobRecord, LedgerError> {
        let change = Change {
            failure_reason,
            artifact_path: None,
        };
        let record = self
            .db
            .with_tx(|tx| transition_in(tx, job_id, new_status, change))?;
        log::debug!("Job {} is now {}", job_id, record.status);
        Ok(record)
    }

    pub fn count_by_status(&self) -> Result<Vec<(JobStatus, u64)>, LedgerError> {
        job_repo::count_by_status(&self.db)?
            .into_iter()
            .map(|(status, count)| {
                let status = status.parse::<JobStatus>().map_err(|reason| {
                    LedgerError::CorruptRow {
                        job_id: "<aggregate>".to_string(),
                        reason,
                    }
                })?;
                Ok((status, count))
            })
            .collect()
    }

    pub fn count(&self) -> Result<u64, LedgerError> {
        Ok(job_repo::count(&self.db)?)
    }
}

/// Loads a job on an already-open transaction.
pub(crate) fn load_in(conn: &Connection, job_id: &str) -> Result<JobRecord, LedgerError> {
    let row = job_repo::find_by_id_in(conn, job_id)?
        .ok_or_else(|| LedgerError::NotFound(job_id.to_string()))?;
    JobRecord::from_row(row)
}

/// Validates and applies one status transition on an open transaction and
/// returns the updated record.
pub(crate) fn transition_in(
    conn: &Connection,
    job_id: &str,
    to: JobStatus,
    change: Change<'_>,
) -> Result<JobRecord, LedgerError> {
    let current = load_in(conn, job_id)?;
    if !current.status.can_transition_to(to) {
        return Err(LedgerError::InvalidTransition {
            job_id: job_id.to_string(),
            from: current.status,
            to,
        });
    }

    let failure_reason = match (to, change.failure_reason.map(str::trim)) {
        (JobStatus::Failed, Some(reason)) if !reason.is_empty() => Some(reason),
        (JobStatus::Failed, _) => {
            return Err(LedgerError::Validation(
                "a failure reason is required to mark a job failed".to_string(),
            ))
        }
        (_, Some(_)) => {
            return Err(LedgerError::Validation(format!(
                "a failure reason is only accepted when marking a job failed, not {}",
                to
            )))
        }
        (_, None) => None,
    };

    let artifact_path = match to {
        JobStatus::Tailored => Some(change.artifact_path.ok_or_else(|| {
            LedgerError::Validation(
                "entering tailored requires a linked artifact; use the artifact linker"
                    .to_string(),
            )
        })?),
        JobStatus::Discovered | JobStatus::Skipped => {
            if let Some(stale) = artifact_repo::supersede_current_in(conn, job_id)? {
                log::debug!(
                    "Artifact {} of job {} marked stale",
                    stale.rendered_path,
                    job_id
                );
            }
            None
        }
        _ => current.artifact_path.as_deref(),
    };

    let now = format_timestamp(Utc::now());
    let applied_at = (to == JobStatus::Applied).then_some(now.as_str());

    let write = StatusWrite {
        job_id,
        expected_status: current.status.as_str(),
        status: to.as_str(),
        artifact_path,
        applied_at,
        failure_reason,
        updated_at: &now,
    };
    if !job_repo::write_status_in(conn, &write)? {
        return Err(LedgerError::InvalidState {
            job_id: job_id.to_string(),
            status: current.status,
            reason: "modified concurrently".to_string(),
        });
    }

    load_in(conn, job_id)
}

/// Replaces the artifact path of a job that stays `Tailored`.
pub(crate) fn relink_in(
    conn: &Connection,
    job: &JobRecord,
    artifact_path: &str,
) -> Result<JobRecord, LedgerError> {
    let now = format_timestamp(Utc::now());
    let write = StatusWrite {
        job_id: &job.job_id,
        expected_status: JobStatus::Tailored.as_str(),
        status: JobStatus::Tailored.as_str(),
        artifact_path: Some(artifact_path),
        applied_at: None,
        failure_reason: None,
        updated_at: &now,
    };
    if !job_repo::write_status_in(conn, &write)? {
        return Err(LedgerError::InvalidState {
            job_id: job.job_id.clone(),
            status: job.status,
            reason: "modified concurrently".to_string(),
        });
    }
    load_in(conn, &job.job_id)
}

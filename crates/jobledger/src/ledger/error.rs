use thiserror::Error;

use super::record::JobStatus;
use crate::db::DatabaseError;

/// Errors raised by the job ledger and by the components that drive jobs
/// through it.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Malformed input (raw record, reason, template selection, ...).
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    /// The requested status change is not in the transition table.
    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// An operation's precondition on the job's status does not hold.
    #[error("Job {job_id} is {status}: {reason}")]
    InvalidState {
        job_id: String,
        status: JobStatus,
        reason: String,
    },

    /// A stored row could not be mapped back to a `JobRecord`.
    #[error("Corrupt job row '{job_id}': {reason}")]
    CorruptRow { job_id: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Database(DatabaseError::Sqlite(e))
    }
}

impl LedgerError {
    /// True for status-machine contract violations, which indicate a
    /// concurrency or reconciliation bug rather than bad input.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidTransition { .. } | LedgerError::InvalidState { .. }
        )
    }
}

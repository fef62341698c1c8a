//! Application Orchestrator: drives one job from `tailored` (or `failed`)
//! through credential resolution and submission to a recorded outcome.
//!
//! A job is `applying` only while an attempt is in flight. After a crash
//! such jobs are reset to `failed("interrupted")` by [`Orchestrator::reconcile`],
//! which must run before any attempt is accepted.

mod actuator;
pub mod batch;

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn, Instrument};

use crate::ledger::store::{load_in, transition_in, Change};
use crate::ledger::{JobRecord, JobStatus, JobStore, LedgerError};
use crate::sanitize::{redact_path, redact_url};
use crate::vault::{normalize_domain, CredentialVault, DomainLocks, VaultError};

pub use actuator::{
    ActuatorError, BrowserActuator, CommandActuator, LoginCredential, NewAccount, SubmitOutcome,
};
pub use batch::{apply_batch, tailor_batch, BatchReport, JobOutcome, JobReport};

/// Failure reason recorded for attempts cut short by a crash.
pub const INTERRUPTED: &str = "interrupted";

/// Failure reason recorded when the actuator times out or is cancelled.
pub const TIMEOUT: &str = "timeout";

/// Failure reason recorded when the actuator reports none.
pub const UNSPECIFIED: &str = "unspecified failure";

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Interrupted applications have not been reconciled yet")]
    NotReconciled,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Credential vault error: {0}")]
    Vault(#[from] VaultError),
}

impl ApplyError {
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, ApplyError::Ledger(e) if e.is_contract_violation())
    }
}

/// Result of one `apply` call: the job as recorded and the outcome that
/// produced it.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub job: JobRecord,
    pub outcome: SubmitOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Jobs moved from `applying` to `failed("interrupted")`.
    pub reset: Vec<String>,
}

pub struct Orchestrator {
    store: JobStore,
    vault: CredentialVault,
    actuator: Arc<dyn BrowserActuator>,
    domain_locks: DomainLocks,
    gate: RwLock<()>,
    reconciled: AtomicBool,
}

impl Orchestrator {
    pub fn new(store: JobStore, vault: CredentialVault, actuator: Arc<dyn BrowserActuator>) -> Self {
        Self {
            store,
            vault,
            actuator,
            domain_locks: DomainLocks::new(),
            gate: RwLock::new(()),
            reconciled: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    pub fn is_reconciled(&self) -> bool {
        self.reconciled.load(Ordering::Acquire)
    }

    /// Resets every `applying` job to `failed("interrupted")` and opens the
    /// orchestrator for `apply`. Waits for this process's in-flight
    /// attempts to finish first.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ApplyError> {
        let _exclusive = self.gate.write().await;

        let mut report = ReconcileReport::default();
        for job in self.store.find_applying()? {
            self.store
                .update_status(&job.job_id, JobStatus::Failed, Some(INTERRUPTED))?;
            warn!(job_id = %job.job_id, "Reset interrupted application");
            report.reset.push(job.job_id);
        }

        self.reconciled.store(true, Ordering::Release);
        info!(reset = report.reset.len(), "Reconciliation complete");
        Ok(report)
    }

    /// Runs one application attempt for `job_id`.
    ///
    /// Fails with `InvalidState` unless the job is `tailored` or `failed`;
    /// a second concurrent call for the same job therefore sees
    /// `applying` and is rejected. Once the job is `applying`, every exit
    /// path records `applied` or `failed` before returning.
    pub async fn apply(&self, job_id: &str) -> Result<ApplyOutcome, ApplyError> {
        let _shared = self.gate.read().await;
        if !self.is_reconciled() {
            return Err(ApplyError::NotReconciled);
        }

        let span = tracing::info_span!("apply", job_id = %job_id);
        self.apply_inner(job_id).instrument(span).await
    }

    async fn apply_inner(&self, job_id: &str) -> Result<ApplyOutcome, ApplyError> {
        let (job, artifact) = self.begin_attempt(job_id)?;
        debug!(
            artifact = %redact_path(&artifact),
            url = %redact_url(&job.external_url),
            "Attempt started"
        );

        let domain = match normalize_domain(&job.external_url) {
            Ok(domain) => domain,
            Err(e) => {
                self.finish(&job, SubmitOutcome::Failure(e.to_string()))?;
                return Err(e.into());
            }
        };

        let credential = match self.resolve_credential(&domain).await {
            Ok(Ok(credential)) => credential,
            Ok(Err(reason)) => return self.finish(&job, SubmitOutcome::Failure(reason)),
            Err(e) => {
                self.finish(&job, SubmitOutcome::Failure(e.to_string()))?;
                return Err(e.into());
            }
        };

        let submitted = AssertUnwindSafe(self.actuator.submit_application(&job, &artifact, &credential))
            .catch_unwind()
            .await;
        let outcome = match submitted {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(ActuatorError::Timeout | ActuatorError::Cancelled)) => {
                SubmitOutcome::Failure(TIMEOUT.to_string())
            }
            Ok(Err(ActuatorError::Failed(reason))) => SubmitOutcome::Failure(reason),
            Ok(Err(e)) => SubmitOutcome::Failure(e.to_string()),
            Err(_) => {
                error!("Actuator panicked during submission");
                SubmitOutcome::Failure("actuator panicked".to_string())
            }
        };

        if outcome.is_success() {
            if let Err(e) = self.vault.touch(&domain) {
                warn!(domain = %domain, "Could not mark credential used: {}", e);
            }
        }
        self.finish(&job, outcome)
    }

    /// Checks the precondition and moves the job to `applying` in one
    /// transaction.
    fn begin_attempt(&self, job_id: &str) -> Result<(JobRecord, PathBuf), LedgerError> {
        self.store.database().with_tx(|tx| {
            let job = load_in(tx, job_id)?;
            if !job.status.accepts_apply() {
                return Err(LedgerError::InvalidState {
                    job_id: job.job_id,
                    status: job.status,
                    reason: "apply requires a tailored or failed job".to_string(),
                });
            }
            let artifact = match job.artifact_path.as_deref().map(PathBuf::from) {
                Some(path) if path.is_file() => path,
                Some(path) => {
                    return Err(LedgerError::InvalidState {
                        job_id: job.job_id,
                        status: job.status,
                        reason: format!("artifact {} is missing on disk", redact_path(&path)),
                    })
                }
                None => {
                    return Err(LedgerError::InvalidState {
                        job_id: job.job_id,
                        status: job.status,
                        reason: "no artifact linked".to_string(),
                    })
                }
            };
            let job = transition_in(tx, job_id, JobStatus::Applying, Change::default())?;
            Ok((job, artifact))
        })
    }

    /// Finds or creates the login for `domain` under its lock. The inner
    /// `Err` is a routine failure reason for the attempt.
    async fn resolve_credential(
        &self,
        domain: &str,
    ) -> Result<Result<LoginCredential, String>, VaultError> {
        let _domain_guard = self.domain_locks.lock(domain).await;

        let stored = match self.vault.find(domain)? {
            Some(existing) => {
                debug!(domain = %domain, "Reusing stored credential");
                existing
            }
            None => {
                info!(domain = %domain, "No credential stored, creating account");
                let created = AssertUnwindSafe(self.actuator.create_account(domain))
                    .catch_unwind()
                    .await;
                let account = match created {
                    Ok(Ok(account)) => account,
                    Ok(Err(e)) => return Ok(Err(format!("account creation failed: {}", e))),
                    Err(_) => {
                        error!(domain = %domain, "Actuator panicked during account creation");
                        return Ok(Err("account creation failed: actuator panicked".to_string()));
                    }
                };
                self.vault.upsert(domain, &account.username, &account.secret)?
            }
        };

        let secret = self.vault.reveal(&stored)?;
        Ok(Ok(LoginCredential {
            domain: stored.domain,
            username: stored.username,
            secret,
        }))
    }

    /// Records the terminal status of an attempt. A blank failure reason
    /// is replaced, since `failed` requires one.
    fn finish(&self, job: &JobRecord, outcome: SubmitOutcome) -> Result<ApplyOutcome, ApplyError> {
        let outcome = match outcome {
            SubmitOutcome::Failure(reason) if reason.trim().is_empty() => {
                SubmitOutcome::Failure(UNSPECIFIED.to_string())
            }
            outcome => outcome,
        };
        let recorded = match &outcome {
            SubmitOutcome::Success => {
                self.store
                    .update_status(&job.job_id, JobStatus::Applied, None)
            }
            SubmitOutcome::Failure(reason) => {
                self.store
                    .update_status(&job.job_id, JobStatus::Failed, Some(reason))
            }
        };
        let job = match recorded {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Could not record application outcome");
                return Err(e.into());
            }
        };

        match &outcome {
            SubmitOutcome::Success => info!("Application submitted"),
            SubmitOutcome::Failure(reason) => warn!(reason = %reason, "Application failed"),
        }
        Ok(ApplyOutcome { job, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::ledger::RawJob;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::path::Path;

    struct PanickingActuator;

    #[async_trait]
    impl BrowserActuator for PanickingActuator {
        async fn create_account(&self, _site: &str) -> Result<NewAccount, ActuatorError> {
            Ok(NewAccount {
                username: "me".to_string(),
                secret: SecretString::from("pw"),
            })
        }

        async fn submit_application(
            &self,
            _job: &JobRecord,
            _artifact_path: &Path,
            _credential: &LoginCredential,
        ) -> Result<SubmitOutcome, ActuatorError> {
            panic!("browser crashed");
        }
    }

    fn tailored_job(store: &JobStore, dir: &Path) -> String {
        store
            .ingest(&[RawJob {
                platform: "test".to_string(),
                title: "Engineer".to_string(),
                company: "Acme".to_string(),
                external_url: Some("https://jobs.acme.com/1".to_string()),
                ..Default::default()
            }])
            .unwrap();
        let job_id = store.list(&Default::default()).unwrap().remove(0).job_id;
        let artifact = dir.join("resume.pdf");
        std::fs::write(&artifact, b"%PDF").unwrap();
        let path = artifact.to_string_lossy().into_owned();
        store
            .database()
            .with_tx(|tx| {
                transition_in(
                    tx,
                    &job_id,
                    JobStatus::Tailored,
                    Change {
                        artifact_path: Some(&path),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        job_id
    }

    fn orchestrator() -> Orchestrator {
        let db = Database::open_in_memory().unwrap();
        Orchestrator::new(
            JobStore::new(db.clone()),
            CredentialVault::new(db),
            Arc::new(PanickingActuator),
        )
    }

    #[tokio::test]
    async fn test_apply_requires_reconciliation() {
        let orchestrator = orchestrator();
        let err = orchestrator.apply("any").await.unwrap_err();
        assert!(matches!(err, ApplyError::NotReconciled));

        orchestrator.reconcile().await.unwrap();
        let err = orchestrator.apply("any").await.unwrap_err();
        assert!(matches!(err, ApplyError::Ledger(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_actuator_panic_is_recorded_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator();
        let job_id = tailored_job(orchestrator.store(), dir.path());
        orchestrator.reconcile().await.unwrap();

        let result = orchestrator.apply(&job_id).await.unwrap();
        assert_eq!(
            result.outcome,
            SubmitOutcome::Failure("actuator panicked".to_string())
        );
        assert_eq!(result.job.status, JobStatus::Failed);
        assert_eq!(result.job.failure_reason.as_deref(), Some("actuator panicked"));
        // The account was still created and kept.
        assert!(orchestrator.vault().find("jobs.acme.com").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_apply_rejects_missing_artifact_file() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator();
        let job_id = tailored_job(orchestrator.store(), dir.path());
        std::fs::remove_file(dir.path().join("resume.pdf")).unwrap();
        orchestrator.reconcile().await.unwrap();

        let err = orchestrator.apply(&job_id).await.unwrap_err();
        assert!(err.is_contract_violation());
        assert_eq!(
            orchestrator.store().get(&job_id).unwrap().status,
            JobStatus::Tailored
        );
    }

    #[tokio::test]
    async fn test_reconcile_resets_applying() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator();
        let job_id = tailored_job(orchestrator.store(), dir.path());
        orchestrator
            .store()
            .update_status(&job_id, JobStatus::Applying, None)
            .unwrap();

        let report = orchestrator.reconcile().await.unwrap();
        assert_eq!(report.reset, vec![job_id.clone()]);
        let job = orchestrator.store().get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_reason.as_deref(), Some(INTERRUPTED));

        let again = orchestrator.reconcile().await.unwrap();
        assert!(again.reset.is_empty());
    }
}

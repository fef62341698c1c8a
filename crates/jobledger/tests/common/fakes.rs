//! In-process stand-ins for the renderer and browser actuator.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use jobledger::orchestrator::{ActuatorError, BrowserActuator, LoginCredential, NewAccount, SubmitOutcome};
use jobledger::{DocumentRenderer, JobRecord, RenderError, RenderRequest};

/// Writes a stub PDF at the suggested path, or fails on demand.
#[derive(Default)]
pub struct FakeRenderer {
    pub fail_with: Option<String>,
    pub fixed_path: Option<PathBuf>,
    pub calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Default::default()
        }
    }

    /// Always writes to `path`, ignoring the suggested output path.
    pub fn fixed(path: PathBuf) -> Self {
        Self {
            fixed_path: Some(path),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentRenderer for FakeRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<PathBuf, RenderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.fail_with {
            return Err(RenderError::Failed(reason.clone()));
        }
        // Distinct name per call; renders within one second share a timestamp.
        let path = match &self.fixed_path {
            Some(path) => path.clone(),
            None => request.output_path.with_extension(format!("{}.pdf", n)),
        };
        std::fs::write(&path, format!("%PDF-1.4 {}", request.title))
            .map_err(|e| RenderError::Failed(e.to_string()))?;
        Ok(path)
    }
}

/// A submission the actuator saw.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job_id: String,
    pub artifact_path: PathBuf,
    pub domain: String,
    pub username: String,
    pub secret: String,
}

/// Actuator with scripted submit results and call bookkeeping.
pub struct ScriptedActuator {
    outcomes: Mutex<VecDeque<Result<SubmitOutcome, ActuatorError>>>,
    account_result: Mutex<Option<ActuatorError>>,
    delay: Duration,
    pub accounts_created: AtomicUsize,
    submissions: Mutex<Vec<Submission>>,
}

impl Default for ScriptedActuator {
    fn default() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            account_result: Mutex::new(None),
            delay: Duration::ZERO,
            accounts_created: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedActuator {
    /// Every submission succeeds unless scripted otherwise.
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Each call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue the result of the next unscripted submission.
    pub fn then(self, result: Result<SubmitOutcome, ActuatorError>) -> Self {
        self.outcomes.lock().unwrap().push_back(result);
        self
    }

    pub fn failing_account_creation(self, error: ActuatorError) -> Self {
        *self.account_result.lock().unwrap() = Some(error);
        self
    }

    pub fn accounts_created(&self) -> usize {
        self.accounts_created.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserActuator for ScriptedActuator {
    async fn create_account(&self, site: &str) -> Result<NewAccount, ActuatorError> {
        tokio::time::sleep(self.delay).await;
        if let Some(error) = self.account_result.lock().unwrap().take() {
            return Err(error);
        }
        let n = self.accounts_created.fetch_add(1, Ordering::SeqCst);
        Ok(NewAccount {
            username: format!("applicant+{}@mail.test", n),
            secret: SecretString::from(format!("pw-{}-{}", site, n)),
        })
    }

    async fn submit_application(
        &self,
        job: &JobRecord,
        artifact_path: &Path,
        credential: &LoginCredential,
    ) -> Result<SubmitOutcome, ActuatorError> {
        tokio::time::sleep(self.delay).await;
        self.submissions.lock().unwrap().push(Submission {
            job_id: job.job_id.clone(),
            artifact_path: artifact_path.to_path_buf(),
            domain: credential.domain.clone(),
            username: credential.username.clone(),
            secret: credential.secret.expose_secret().to_string(),
        });
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(SubmitOutcome::Success))
    }
}

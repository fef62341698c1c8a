//! The browser actuator boundary and its process-backed implementation.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::ledger::JobRecord;

#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("Actuator timed out")]
    Timeout,

    #[error("Actuator call was cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),

    #[error("Failed to start actuator '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Actuator returned an unreadable response: {0}")]
    InvalidResponse(String),
}

/// Terminal result of one application attempt. Failure is a routine
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Success,
    Failure(String),
}

impl SubmitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmitOutcome::Success)
    }
}

/// Credential material produced by account creation.
pub struct NewAccount {
    pub username: String,
    pub secret: SecretString,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// A decoded login handed to the actuator for one submission.
pub struct LoginCredential {
    pub domain: String,
    pub username: String,
    pub secret: SecretString,
}

impl fmt::Debug for LoginCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredential")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Browser-driven side effects. Retry of transient failures is the
/// actuator's business; each call returns one terminal result.
#[async_trait]
pub trait BrowserActuator: Send + Sync {
    async fn create_account(&self, site: &str) -> Result<NewAccount, ActuatorError>;

    async fn submit_application(
        &self,
        job: &JobRecord,
        artifact_path: &Path,
        credential: &LoginCredential,
    ) -> Result<SubmitOutcome, ActuatorError>;
}

#[derive(Deserialize)]
struct AccountResponse {
    username: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
enum SubmitResponse {
    Success,
    Failure { reason: Option<String> },
}

/// Runs an external program per actuator call.
///
/// Invoked as `<program> <args…> create-account <site>` or
/// `<program> <args…> submit`, with a JSON request on stdin and a JSON
/// response on stdout. The call is killed once `timeout` elapses.
#[derive(Debug, Clone)]
pub struct CommandActuator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandActuator {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    async fn run(&self, command: &[&str], payload: &serde_json::Value) -> Result<String, ActuatorError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| ActuatorError::InvalidResponse(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ActuatorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let exchange = async move {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(&body)
                    .await
                    .map_err(|e| ActuatorError::Failed(format!("writing request: {}", e)))?;
            }
            child
                .wait_with_output()
                .await
                .map_err(|e| ActuatorError::Failed(e.to_string()))
        };

        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ActuatorError::Timeout)??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim().lines().last().unwrap_or("no output");
            return Err(ActuatorError::Failed(format!("{} ({})", detail, output.status)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl BrowserActuator for CommandActuator {
    async fn create_account(&self, site: &str) -> Result<NewAccount, ActuatorError> {
        let stdout = self
            .run(&["create-account", site], &serde_json::json!({ "site": site }))
            .await?;
        let response: AccountResponse = serde_json::from_str(&stdout)
            .map_err(|e| ActuatorError::InvalidResponse(e.to_string()))?;
        Ok(NewAccount {
            username: response.username,
            secret: SecretString::from(response.password),
        })
    }

    async fn submit_application(
        &self,
        job: &JobRecord,
        artifact_path: &Path,
        credential: &LoginCredential,
    ) -> Result<SubmitOutcome, ActuatorError> {
        let payload = serde_json::json!({
            "job": job,
            "artifactPath": artifact_path.to_string_lossy(),
            "credential": {
                "domain": credential.domain,
                "username": credential.username,
                "password": credential.secret.expose_secret(),
            },
        });
        let stdout = self.run(&["submit"], &payload).await?;
        let response: SubmitResponse = serde_json::from_str(&stdout)
            .map_err(|e| ActuatorError::InvalidResponse(e.to_string()))?;
        Ok(match response {
            SubmitResponse::Success => SubmitOutcome::Success,
            SubmitResponse::Failure { reason } => {
                SubmitOutcome::Failure(reason.unwrap_or_else(|| "rejected".to_string()))
            }
        })
    }
}

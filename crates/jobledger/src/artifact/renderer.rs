//! The document renderer boundary and its process-backed implementation.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to start renderer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Renderer failed: {0}")]
    Failed(String),

    #[error("Renderer returned an unreadable response: {0}")]
    InvalidResponse(String),

    #[error("Rendered artifact not found at {0}")]
    MissingOutput(PathBuf),
}

/// A named template the renderer tailors against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSelection {
    pub name: String,
    pub path: PathBuf,
}

/// Everything the renderer needs for one job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub description: String,
    pub template: TemplateSelection,
    /// Where the artifact should be written. A renderer may choose another
    /// path and return it instead.
    pub output_path: PathBuf,
}

/// Turns a job description and template into a rendered file.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<PathBuf, RenderError>;
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    path: Option<PathBuf>,
}

/// Runs an external program per render.
///
/// The request is written to stdin as JSON. The program exits 0 and either
/// prints `{"path": "..."}` or nothing, in which case the suggested output
/// path is used. A non-zero exit is a render failure carrying stderr.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl DocumentRenderer for CommandRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<PathBuf, RenderError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| RenderError::InvalidResponse(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| RenderError::Failed(format!("writing request: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RenderError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim().lines().last().unwrap_or("no output");
            return Err(RenderError::Failed(format!("{} ({})", detail, output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = if stdout.trim().is_empty() {
            request.output_path.clone()
        } else {
            serde_json::from_str::<RenderResponse>(stdout.trim())
                .map_err(|e| RenderError::InvalidResponse(e.to_string()))?
                .path
                .unwrap_or_else(|| request.output_path.clone())
        };

        Ok(path)
    }
}

//! Artifact Linker: renders a tailored resume for a job and links it to
//! the job record.
//!
//! Linking is one transaction over the `jobs` and `artifacts` tables, so a
//! job is never `tailored` without a current artifact and no current
//! artifact exists for a job that is not.

mod renderer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn, Instrument};

use crate::db::artifact_repo::{self, ArtifactRow};
use crate::ledger::store::{load_in, relink_in, transition_in, Change};
use crate::ledger::{JobRecord, JobStatus, JobStore, LedgerError};
use crate::sanitize::{redact_path, slugify};

pub use renderer::{CommandRenderer, DocumentRenderer, RenderError, RenderRequest, TemplateSelection};

#[derive(Error, Debug)]
pub enum TailorError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Failed to prepare artifact directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A rendered, job-specific resume.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: i64,
    pub job_id: String,
    pub rendered_path: PathBuf,
    pub source_template: String,
    pub generated_at: DateTime<Utc>,
    pub is_current: bool,
}

impl Artifact {
    fn from_row(row: ArtifactRow) -> Result<Self, LedgerError> {
        let generated_at = DateTime::parse_from_rfc3339(&row.generated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| LedgerError::CorruptRow {
                job_id: row.job_id.clone(),
                reason: format!("bad artifact timestamp '{}': {}", row.generated_at, e),
            })?;
        Ok(Self {
            id: row.id,
            job_id: row.job_id,
            rendered_path: PathBuf::from(row.rendered_path),
            source_template: row.source_template,
            generated_at,
            is_current: row.is_current,
        })
    }
}

/// `<title>_<company>_<YYYYmmdd_HHMMSS>.pdf`
pub fn artifact_file_name(job: &JobRecord, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.pdf",
        slugify(&job.title, "Unknown_Position"),
        slugify(&job.company, "Unknown_Company"),
        at.format("%Y%m%d_%H%M%S")
    )
}

pub struct ArtifactLinker {
    store: JobStore,
    renderer: Arc<dyn DocumentRenderer>,
    output_dir: PathBuf,
    keep_superseded: bool,
}

impl ArtifactLinker {
    pub fn new(
        store: JobStore,
        renderer: Arc<dyn DocumentRenderer>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            renderer,
            output_dir: output_dir.into(),
            keep_superseded: false,
        }
    }

    /// Keep files of superseded artifacts on disk instead of deleting them.
    pub fn keep_superseded(mut self, keep: bool) -> Self {
        self.keep_superseded = keep;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Renders an artifact for `job` and links it as the job's current one.
    ///
    /// The job must be `discovered` or already `tailored` (re-tailoring
    /// replaces the artifact). On any failure the job keeps its last
    /// committed status and the freshly rendered file is removed.
    pub async fn tailor(
        &self,
        job: &JobRecord,
        template: &TemplateSelection,
    ) -> Result<Artifact, TailorError> {
        let span = tracing::info_span!("tailor", job_id = %job.job_id, template = %template.name);
        self.tailor_inner(job, template).instrument(span).await
    }

    async fn tailor_inner(
        &self,
        job: &JobRecord,
        template: &TemplateSelection,
    ) -> Result<Artifact, TailorError> {
        let job = self.store.get(&job.job_id)?;
        if !matches!(job.status, JobStatus::Discovered | JobStatus::Tailored) {
            return Err(LedgerError::InvalidState {
                job_id: job.job_id,
                status: job.status,
                reason: "only discovered or tailored jobs can be tailored".to_string(),
            }
            .into());
        }
        if template.name.trim().is_empty() {
            return Err(LedgerError::Validation("template name is empty".to_string()).into());
        }

        std::fs::create_dir_all(&self.output_dir).map_err(|source| TailorError::Io {
            path: self.output_dir.clone(),
            source,
        })?;

        let request = RenderRequest {
            job_id: job.job_id.clone(),
            title: job.title.clone(),
            company: job.company.clone(),
            description: job.description.clone(),
            template: template.clone(),
            output_path: self.output_dir.join(artifact_file_name(&job, Utc::now())),
        };

        debug!("Rendering artifact");
        let rendered = self.renderer.render(&request).await?;
        if !rendered.is_file() {
            return Err(RenderError::MissingOutput(rendered).into());
        }

        let rendered_str = rendered.to_string_lossy().into_owned();
        let generated_at = Utc::now();
        let linked = self.store.database().with_tx(|tx| {
            let fresh = load_in(tx, &job.job_id)?;
            match fresh.status {
                JobStatus::Discovered => {
                    let change = Change {
                        artifact_path: Some(&rendered_str),
                        ..Default::default()
                    };
                    transition_in(tx, &job.job_id, JobStatus::Tailored, change)?;
                }
                JobStatus::Tailored => {
                    relink_in(tx, &fresh, &rendered_str)?;
                }
                status => {
                    return Err(LedgerError::InvalidState {
                        job_id: job.job_id.clone(),
                        status,
                        reason: "status changed while rendering".to_string(),
                    })
                }
            }
            let superseded = artifact_repo::supersede_current_in(tx, &job.job_id)?;
            let id = artifact_repo::insert_current_in(
                tx,
                &job.job_id,
                &rendered_str,
                &template.name,
                &generated_at.to_rfc3339(),
            )?;
            Ok::<_, LedgerError>((id, superseded))
        });

        let (id, superseded) = match linked {
            Ok(linked) => linked,
            Err(e) => {
                // A renderer may reuse the path the job already links to.
                let still_linked = self
                    .store
                    .get(&job.job_id)
                    .map(|current| current.artifact_path.as_deref() == Some(rendered_str.as_str()))
                    .unwrap_or(true);
                if still_linked {
                    warn!(error = %e, "Linking failed, keeping {}", redact_path(&rendered));
                } else {
                    warn!(error = %e, "Linking failed, discarding {}", redact_path(&rendered));
                    if let Err(rm) = std::fs::remove_file(&rendered) {
                        warn!("Could not remove {}: {}", redact_path(&rendered), rm);
                    }
                }
                return Err(e.into());
            }
        };

        if let Some(old) = superseded {
            let old_path = PathBuf::from(&old.rendered_path);
            if !self.keep_superseded && old_path != rendered {
                match std::fs::remove_file(&old_path) {
                    Ok(()) => debug!("Removed superseded artifact {}", redact_path(&old_path)),
                    Err(e) => warn!(
                        "Could not remove superseded artifact {}: {}",
                        redact_path(&old_path),
                        e
                    ),
                }
            }
        }

        info!("Tailored artifact {}", redact_path(&rendered));
        Ok(Artifact {
            id,
            job_id: job.job_id,
            rendered_path: rendered,
            source_template: template.name.clone(),
            generated_at,
            is_current: true,
        })
    }

    /// The job's current artifact.
    pub fn current(&self, job_id: &str) -> Result<Artifact, LedgerError> {
        artifact_repo::find_current(self.store.database(), job_id)?
            .map(Artifact::from_row)
            .transpose()?
            .ok_or_else(|| LedgerError::NotFound(format!("current artifact of job {}", job_id)))
    }

    /// Every artifact rendered for the job, newest first.
    pub fn history(&self, job_id: &str) -> Result<Vec<Artifact>, LedgerError> {
        artifact_repo::history(self.store.database(), job_id)?
            .into_iter()
            .map(Artifact::from_row)
            .collect()
    }
}

//! Test harness for isolated ledger tests.
//!
//! Each harness owns a temp directory holding a file-backed database and
//! the artifact directory, so tests can drop every handle and reopen the
//! ledger to simulate a process restart.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use jobledger::{
    ArtifactLinker, BrowserActuator, CredentialVault, Database, DocumentRenderer, JobRecord,
    JobStore, Orchestrator, RawJob, TemplateSelection,
};

pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub store: JobStore,
    pub vault: CredentialVault,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("ledger.db");
        let artifact_dir = temp_dir.path().join("resumes");
        let db = Database::open(&db_path).expect("Failed to open ledger database");

        Self {
            store: JobStore::new(db.clone()),
            vault: CredentialVault::new(db),
            temp_dir,
            db_path,
            artifact_dir,
        }
    }

    /// Drops this harness's handles and opens a fresh connection to the
    /// same database, as a restarted process would.
    pub fn restart(self) -> Self {
        let Self {
            temp_dir,
            db_path,
            artifact_dir,
            store,
            vault,
        } = self;
        drop(store);
        drop(vault);

        let db = Database::open(&db_path).expect("Failed to reopen ledger database");
        Self {
            store: JobStore::new(db.clone()),
            vault: CredentialVault::new(db),
            temp_dir,
            db_path,
            artifact_dir,
        }
    }

    pub fn posting(url: &str) -> RawJob {
        RawJob {
            platform: "hiring_cafe".to_string(),
            title: "Backend Engineer".to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            external_url: Some(url.to_string()),
            listing_url: None,
            description: "Rust, SQLite and distributed systems".to_string(),
        }
    }

    /// Ingests one posting per URL and returns the records in ingest order.
    pub fn ingest_urls(&self, urls: &[&str]) -> Vec<JobRecord> {
        let raw: Vec<RawJob> = urls.iter().map(|u| Self::posting(u)).collect();
        self.store.ingest(&raw).expect("ingest failed");
        self.store
            .list(&Default::default())
            .expect("list failed")
            .into_iter()
            .filter(|job| urls.iter().any(|u| job.external_url == *u))
            .collect()
    }

    pub fn template(&self) -> TemplateSelection {
        TemplateSelection {
            name: "backend".to_string(),
            path: self.temp_dir.path().join("templates").join("backend.tex"),
        }
    }

    pub fn linker(&self, renderer: Arc<dyn DocumentRenderer>) -> ArtifactLinker {
        ArtifactLinker::new(self.store.clone(), renderer, self.artifact_dir.clone())
    }

    pub fn orchestrator(&self, actuator: Arc<dyn BrowserActuator>) -> Orchestrator {
        Orchestrator::new(self.store.clone(), self.vault.clone(), actuator)
    }

    /// Tailors the given jobs with a fake renderer.
    pub async fn tailor_all(&self, jobs: &[JobRecord]) {
        let linker = self.linker(Arc::new(super::FakeRenderer::default()));
        for job in jobs {
            linker
                .tailor(job, &self.template())
                .await
                .expect("tailor failed");
        }
    }
}

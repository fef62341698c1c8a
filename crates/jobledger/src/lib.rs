//! Credential-aware, idempotent job-application ledger.
//!
//! Postings are ingested into a durable [`JobStore`], tailored into
//! resume artifacts by the [`ArtifactLinker`] and submitted at most once
//! each by the [`Orchestrator`], which reuses per-site logins from the
//! [`CredentialVault`].

pub mod artifact;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod ledger;
pub mod orchestrator;
pub mod sanitize;
pub mod secrets;
pub mod source;
pub mod vault;

pub use artifact::{
    Artifact, ArtifactLinker, CommandRenderer, DocumentRenderer, RenderError, RenderRequest,
    TailorError, TemplateSelection,
};
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{ConfigError, JobLedgerError, Result};
pub use ledger::{JobRecord, JobStatus, JobStore, LedgerError, RawJob, StatusFilter};
pub use orchestrator::{
    ActuatorError, ApplyError, ApplyOutcome, BatchReport, BrowserActuator, CommandActuator,
    JobReport, LoginCredential, NewAccount, Orchestrator, ReconcileReport, SubmitOutcome,
};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError, VaultCipher};
pub use source::{ingest_from_source, CsvJobSource, JobSource, SourceError};
pub use vault::{Credential, CredentialVault, VaultError};

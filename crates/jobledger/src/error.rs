use std::path::PathBuf;
use thiserror::Error;

use crate::artifact::TailorError;
use crate::export::ExportError;
use crate::ledger::LedgerError;
use crate::orchestrator::ApplyError;
use crate::secrets::SecretError;
use crate::source::{IngestError, SourceError};
use crate::vault::VaultError;

/// Any error the ledger can surface to a front end.
#[derive(Error, Debug)]
pub enum JobLedgerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Tailor(#[from] TailorError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("Job source error: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid template '{name}': {reason}")]
    InvalidTemplate { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, JobLedgerError>;

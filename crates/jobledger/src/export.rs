//! CSV export and import of the ledger tables in their on-disk column
//! layout.
//!
//! Exports are written to a hidden sibling file and renamed into place, so
//! a reader never sees a half-written CSV.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{JobStore, LedgerError, StatusFilter};
use crate::vault::{CredentialVault, VaultError};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error on '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Row {row} of '{path}': {reason}")]
    InvalidRow {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

const JOB_COLUMNS: [&str; 10] = [
    "job_id",
    "title",
    "company",
    "location",
    "external_url",
    "description",
    "status",
    "artifact_path",
    "applied_at",
    "failure_reason",
];

const CREDENTIAL_COLUMNS: [&str; 5] = ["domain", "username", "password", "created_date", "last_used"];

#[derive(Serialize)]
struct JobCsvRow<'a> {
    job_id: &'a str,
    title: &'a str,
    company: &'a str,
    location: &'a str,
    external_url: &'a str,
    description: &'a str,
    status: &'a str,
    artifact_path: Option<&'a str>,
    applied_at: Option<String>,
    failure_reason: Option<&'a str>,
}

#[derive(Serialize, Deserialize)]
struct CredentialCsvRow {
    domain: String,
    username: String,
    password: String,
    #[serde(default)]
    created_date: String,
    #[serde(default)]
    last_used: String,
}

/// Writes all jobs in ingest order. Returns the number of rows.
pub fn export_jobs(store: &JobStore, path: &Path) -> Result<usize, ExportError> {
    let jobs = store.list(&StatusFilter::default())?;
    write_atomically(path, &JOB_COLUMNS, |writer| {
        for job in &jobs {
            writer.serialize(JobCsvRow {
                job_id: &job.job_id,
                title: &job.title,
                company: &job.company,
                location: &job.location,
                external_url: &job.external_url,
                description: &job.description,
                status: job.status.as_str(),
                artifact_path: job.artifact_path.as_deref(),
                applied_at: job.applied_at.map(|t| t.to_rfc3339()),
                failure_reason: job.failure_reason.as_deref(),
            })?;
        }
        Ok(())
    })?;
    log::info!("Exported {} job(s) to {}", jobs.len(), path.display());
    Ok(jobs.len())
}

/// Writes all credentials with their secrets still encoded.
pub fn export_credentials(vault: &CredentialVault, path: &Path) -> Result<usize, ExportError> {
    let credentials = vault.list()?;
    write_atomically(path, &CREDENTIAL_COLUMNS, |writer| {
        for credential in &credentials {
            writer.serialize(CredentialCsvRow {
                domain: credential.domain.clone(),
                username: credential.username.clone(),
                password: credential.encoded_secret.clone(),
                created_date: credential.created_at.to_rfc3339(),
                last_used: credential.last_used_at.to_rfc3339(),
            })?;
        }
        Ok(())
    })?;
    log::info!(
        "Exported {} credential(s) to {}",
        credentials.len(),
        path.display()
    );
    Ok(credentials.len())
}

/// Upserts every row of a credentials CSV. The `password` column must
/// already be encoded the way the vault expects.
pub fn import_credentials(vault: &CredentialVault, path: &Path) -> Result<usize, ExportError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| ExportError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let now = Utc::now();
    let mut imported = 0;
    for (index, row) in reader.deserialize::<CredentialCsvRow>().enumerate() {
        let row_number = index + 1;
        let invalid = |reason: String| ExportError::InvalidRow {
            path: path.to_path_buf(),
            row: row_number,
            reason,
        };
        let row = row.map_err(|e| invalid(e.to_string()))?;
        let created = parse_legacy_timestamp(&row.created_date)
            .map_err(invalid)?
            .unwrap_or(now);
        let last_used = parse_legacy_timestamp(&row.last_used)
            .map_err(invalid)?
            .unwrap_or(created);

        vault
            .upsert_encoded(&row.domain, &row.username, &row.password, created, last_used)
            .map_err(|e| invalid(e.to_string()))?;
        imported += 1;
    }

    log::info!("Imported {} credential(s) from {}", imported, path.display());
    Ok(imported)
}

/// RFC 3339, or a naive ISO timestamp taken as UTC. Empty is `None`.
fn parse_legacy_timestamp(s: &str) -> Result<Option<DateTime<Utc>>, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| format!("unrecognized timestamp '{}'", s))
}

/// The header is written up front so an empty table still exports its
/// columns.
fn write_atomically<F>(path: &Path, header: &[&str], write_rows: F) -> Result<(), ExportError>
where
    F: FnOnce(&mut csv::Writer<fs::File>) -> Result<(), csv::Error>,
{
    let io_err = |path: &Path, source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export.csv".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let result = (|| {
        let file = fs::File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        let csv_err = |source| ExportError::Csv {
            path: path.to_path_buf(),
            source,
        };
        writer.write_record(header).map_err(csv_err)?;
        write_rows(&mut writer).map_err(csv_err)?;
        let file = writer
            .into_inner()
            .map_err(|e| io_err(&tmp, e.into_error()))?;
        file.sync_all().map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| io_err(path, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

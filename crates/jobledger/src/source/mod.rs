//! Job sources and the ingest pipeline that feeds the job store.

mod csv_file;

use async_trait::async_trait;
use thiserror::Error;

use crate::ledger::{JobStore, LedgerError, RawJob};

pub use csv_file::{latest_csv, CsvJobSource};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Malformed CSV in '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("No job CSV found in {0}")]
    NoSource(String),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Produces raw postings. Scraping itself lives outside the ledger.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Up to `count` postings matching `query`.
    async fn fetch(&self, query: &str, count: usize) -> Result<Vec<RawJob>, SourceError>;
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub fetched: usize,
    pub inserted: usize,
    /// Records skipped as invalid: position in the fetched batch and reason.
    pub rejected: Vec<(usize, String)>,
}

/// Fetches from `source` and ingests every valid record.
///
/// Unlike [`JobStore::ingest`], invalid records do not fail the batch:
/// they are reported and the rest are stored.
pub async fn ingest_from_source(
    store: &JobStore,
    source: &dyn JobSource,
    query: &str,
    count: usize,
) -> Result<IngestReport, IngestError> {
    let fetched = source.fetch(query, count).await?;

    let mut report = IngestReport {
        fetched: fetched.len(),
        ..Default::default()
    };
    let mut valid = Vec::with_capacity(fetched.len());
    for (index, record) in fetched.into_iter().enumerate() {
        match record.validate() {
            Ok(_) => valid.push(record),
            Err(reason) => {
                tracing::warn!(index, reason = %reason, "Skipping invalid posting");
                report.rejected.push((index, reason));
            }
        }
    }

    report.inserted = store.ingest(&valid)?;
    tracing::info!(
        fetched = report.fetched,
        inserted = report.inserted,
        rejected = report.rejected.len(),
        "Ingest complete"
    );
    Ok(report)
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use super::{JobSource, SourceError};
use crate::ledger::RawJob;

/// One row of the scraper's `<query>_jobs.csv`. Unknown columns are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScrapedRow {
    job_title: String,
    company: String,
    location: String,
    external_url: Option<String>,
    hiring_cafe_url: Option<String>,
    search_query: String,
    job_description: String,
    is_applied: String,
}

/// Reads postings from a scraper CSV file.
///
/// Rows already flagged `is_applied=true` by older tooling are skipped.
#[derive(Debug, Clone)]
pub struct CsvJobSource {
    path: PathBuf,
    platform: String,
}

impl CsvJobSource {
    pub fn new(path: impl Into<PathBuf>, platform: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            platform: platform.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self, query: &str, count: usize) -> Result<Vec<RawJob>, SourceError> {
        let path = self.path.display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_path(&self.path)
            .map_err(|source| SourceError::Csv {
                path: path.clone(),
                source,
            })?;

        let query = query.trim().to_lowercase();
        let mut jobs = Vec::new();
        for row in reader.deserialize::<ScrapedRow>() {
            if jobs.len() >= count {
                break;
            }
            let row = row.map_err(|source| SourceError::Csv {
                path: path.clone(),
                source,
            })?;
            if row.is_applied.trim().eq_ignore_ascii_case("true") {
                continue;
            }
            let matches = query.is_empty()
                || row.job_title.to_lowercase().contains(&query)
                || row.search_query.to_lowercase().contains(&query);
            if !matches {
                continue;
            }
            jobs.push(RawJob {
                platform: self.platform.clone(),
                title: row.job_title,
                company: row.company,
                location: row.location,
                external_url: row.external_url,
                listing_url: row.hiring_cafe_url,
                description: row.job_description,
            });
        }

        log::debug!("Read {} posting(s) from {}", jobs.len(), path);
        Ok(jobs)
    }
}

#[async_trait]
impl JobSource for CsvJobSource {
    async fn fetch(&self, query: &str, count: usize) -> Result<Vec<RawJob>, SourceError> {
        self.read(query, count)
    }
}

/// The most recently modified `*_jobs.csv` in `dir`.
pub fn latest_csv(dir: &Path) -> Result<PathBuf, SourceError> {
    let pattern = dir.join("*_jobs.csv");
    let pattern = pattern.to_string_lossy();

    glob::glob(&pattern)?
        .filter_map(|entry| entry.ok())
        .filter_map(|path| {
            let modified = path.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
        .ok_or_else(|| SourceError::NoSource(dir.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    const SCRAPED: &str = "\
job_title,company,posted,location,salary,work_type,employment_type,hiring_cafe_url,external_url,search_query,extracted_date,job_description
Rust Engineer,Acme,2d,Remote,$150k,Remote,Full Time,https://hiring.cafe/j/1,https://jobs.acme.com/1,rust engineer,2026-01-01,\"Build things, in Rust\"
Go Developer,Globex,1d,NYC,,Onsite,Full Time,https://hiring.cafe/j/2,Not found,golang,2026-01-01,Write Go
Senior Rust Engineer,Initech,3d,Berlin,,Hybrid,Contract,https://hiring.cafe/j/3,https://initech.io/careers/3,rust engineer,2026-01-01,More Rust
";

    #[tokio::test]
    async fn test_reads_scraper_columns() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("rust_engineer_jobs.csv");
        file.write_str(SCRAPED).unwrap();

        let source = CsvJobSource::new(file.path(), "hiring_cafe");
        let jobs = source.fetch("", 10).await.unwrap();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].title, "Rust Engineer");
        assert_eq!(jobs[0].description, "Build things, in Rust");
        assert_eq!(jobs[0].platform, "hiring_cafe");
        assert_eq!(jobs[1].external_url.as_deref(), Some("Not found"));
        assert_eq!(jobs[1].listing_url.as_deref(), Some("https://hiring.cafe/j/2"));
    }

    #[tokio::test]
    async fn test_query_and_count() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("rust_engineer_jobs.csv");
        file.write_str(SCRAPED).unwrap();
        let source = CsvJobSource::new(file.path(), "hiring_cafe");

        let rust = source.fetch("RUST", 10).await.unwrap();
        assert_eq!(rust.len(), 2);
        let first = source.fetch("rust", 1).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].company, "Acme");
    }

    #[tokio::test]
    async fn test_skips_rows_marked_applied() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("a_jobs.csv");
        file.write_str(
            "job_title,company,external_url,is_applied\n\
             A,X,https://x.com/1,True\n\
             B,Y,https://y.com/2,\n",
        )
        .unwrap();

        let jobs = CsvJobSource::new(file.path(), "hiring_cafe")
            .fetch("", 10)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "B");
    }

    #[test]
    fn test_latest_csv() {
        let temp = assert_fs::TempDir::new().unwrap();
        assert!(matches!(latest_csv(temp.path()), Err(SourceError::NoSource(_))));

        temp.child("old_jobs.csv").write_str("job_title\n").unwrap();
        temp.child("notes.csv").write_str("x\n").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        temp.child("new_jobs.csv").write_str("job_title\n").unwrap();

        let latest = latest_csv(temp.path()).unwrap();
        assert_eq!(latest.file_name().unwrap(), "new_jobs.csv");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let source = CsvJobSource::new("/nonexistent/x_jobs.csv", "hiring_cafe");
        assert!(matches!(
            source.fetch("", 10).await,
            Err(SourceError::Csv { .. })
        ));
    }
}

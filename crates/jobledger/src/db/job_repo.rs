//! Job repository: raw row access for the `jobs` table.
//!
//! Functions suffixed `_in` take a `&Connection` so they can run inside a
//! caller-owned transaction; the others lock the `Database` themselves.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub seq: i64,
    pub job_id: String,
    pub platform: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub external_url: String,
    pub description: String,
    pub status: String,
    pub artifact_path: Option<String>,
    pub applied_at: Option<String>,
    pub failure_reason: Option<String>,
    pub ingested_at: String,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            seq: row.get("seq")?,
            job_id: row.get("job_id")?,
            platform: row.get("platform")?,
            title: row.get("title")?,
            company: row.get("company")?,
            location: row.get("location")?,
            external_url: row.get("external_url")?,
            description: row.get("description")?,
            status: row.get("status")?,
            artifact_path: row.get("artifact_path")?,
            applied_at: row.get("applied_at")?,
            failure_reason: row.get("failure_reason")?,
            ingested_at: row.get("ingested_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Values for a new row. `seq` is assigned by SQLite.
#[derive(Debug, Clone)]
pub struct NewJobRow<'a> {
    pub job_id: &'a str,
    pub platform: &'a str,
    pub title: &'a str,
    pub company: &'a str,
    pub location: &'a str,
    pub external_url: &'a str,
    pub description: &'a str,
    pub ingested_at: &'a str,
}

/// A guarded status write. Only applied when the stored status still
/// equals `expected_status`.
#[derive(Debug, Clone)]
pub struct StatusWrite<'a> {
    pub job_id: &'a str,
    pub expected_status: &'a str,
    pub status: &'a str,
    pub artifact_path: Option<&'a str>,
    pub applied_at: Option<&'a str>,
    pub failure_reason: Option<&'a str>,
    pub updated_at: &'a str,
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    /// Accepted statuses. Empty means any.
    pub statuses: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a row unless one with the same `job_id` already exists.
/// Returns `true` when a row was inserted.
pub fn insert_if_absent_in(conn: &Connection, job: &NewJobRow<'_>) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT INTO jobs (job_id, platform, title, company, location, external_url,
         description, status, ingested_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'discovered', ?8, ?8)
         ON CONFLICT(job_id) DO NOTHING",
        params![
            job.job_id,
            job.platform,
            job.title,
            job.company,
            job.location,
            job.external_url,
            job.description,
            job.ingested_at,
        ],
    )?;
    Ok(changed == 1)
}

/// Finds a job by its ID on an already-locked connection.
pub fn find_by_id_in(conn: &Connection, job_id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM jobs WHERE job_id = ?1",
            params![job_id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, job_id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| find_by_id_in(conn, job_id))
}

/// Applies a guarded status write. Returns `false` when the row was not
/// in `expected_status` (or does not exist) and nothing changed.
pub fn write_status_in(conn: &Connection, write: &StatusWrite<'_>) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = ?3, artifact_path = ?4, applied_at = ?5,
         failure_reason = ?6, updated_at = ?7
         WHERE job_id = ?1 AND status = ?2",
        params![
            write.job_id,
            write.expected_status,
            write.status,
            write.artifact_path,
            write.applied_at,
            write.failure_reason,
            write.updated_at,
        ],
    )?;
    Ok(changed == 1)
}

/// Queries jobs in ingest order.
pub fn query(db: &Database, filter: &JobFilter) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        let where_clause = if filter.statuses.is_empty() {
            String::new()
        } else {
            let placeholders: Vec<String> = filter
                .statuses
                .iter()
                .map(|status| {
                    param_values.push(Box::new(status.clone()));
                    format!("?{}", param_values.len())
                })
                .collect();
            format!("WHERE status IN ({})", placeholders.join(", "))
        };

        // SQLite treats LIMIT -1 as "no limit".
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM jobs {} ORDER BY seq ASC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    })
}

/// Counts jobs grouped by status.
pub fn count_by_status(db: &Database) -> Result<Vec<(String, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")?;
        let counts = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    })
}

/// Total number of job rows.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?;
        Ok(count)
    })
}

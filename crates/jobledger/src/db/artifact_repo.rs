//! Artifact repository: rows of the `artifacts` table.
//!
//! At most one row per job has `is_current = 1` (enforced by a partial
//! unique index). Superseded rows are kept with `is_current = 0`.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw artifact row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRow {
    pub id: i64,
    pub job_id: String,
    pub rendered_path: String,
    pub source_template: String,
    pub generated_at: String,
    pub is_current: bool,
}

impl ArtifactRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            rendered_path: row.get("rendered_path")?,
            source_template: row.get("source_template")?,
            generated_at: row.get("generated_at")?,
            is_current: row.get("is_current")?,
        })
    }
}

/// Marks the current artifact of a job stale. Returns the superseded row,
/// if there was one.
pub fn supersede_current_in(
    conn: &Connection,
    job_id: &str,
) -> Result<Option<ArtifactRow>, DatabaseError> {
    let current = find_current_in(conn, job_id)?;
    if let Some(ref row) = current {
        conn.execute(
            "UPDATE artifacts SET is_current = 0 WHERE id = ?1",
            params![row.id],
        )?;
    }
    Ok(current)
}

/// Inserts a new current artifact row and returns its id.
pub fn insert_current_in(
    conn: &Connection,
    job_id: &str,
    rendered_path: &str,
    source_template: &str,
    generated_at: &str,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO artifacts (job_id, rendered_path, source_template, generated_at, is_current)
         VALUES (?1, ?2, ?3, ?4, 1)",
        params![job_id, rendered_path, source_template, generated_at],
    )?;
    Ok(conn.last_insert_rowid())
}

fn find_current_in(conn: &Connection, job_id: &str) -> Result<Option<ArtifactRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM artifacts WHERE job_id = ?1 AND is_current = 1",
            params![job_id],
            ArtifactRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Finds the current artifact of a job.
pub fn find_current(db: &Database, job_id: &str) -> Result<Option<ArtifactRow>, DatabaseError> {
    db.with_conn(|conn| find_current_in(conn, job_id))
}

/// All artifacts ever generated for a job, newest first.
pub fn history(db: &Database, job_id: &str) -> Result<Vec<ArtifactRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM artifacts WHERE job_id = ?1 ORDER BY id DESC")?;
        let rows = stmt
            .query_map(params![job_id], ArtifactRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

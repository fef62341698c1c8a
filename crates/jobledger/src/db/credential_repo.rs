//! Credential repository: CRUD operations for the `credentials` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw credential row from the database. `password` holds the encoded
/// secret, never plaintext.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRow {
    pub domain: String,
    pub username: String,
    pub password: String,
    pub created_date: String,
    pub last_used: String,
}

impl CredentialRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            domain: row.get(0)?,
            username: row.get(1)?,
            password: row.get(2)?,
            created_date: row.get(3)?,
            last_used: row.get(4)?,
        })
    }
}

/// Inserts or replaces the credential material for a domain.
///
/// `created_date` is only written for a new row; an existing row keeps
/// its original creation date.
pub fn upsert(db: &Database, row: &CredentialRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO credentials (domain, username, password, created_date, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(domain) DO UPDATE SET
               username = ?2,
               password = ?3,
               last_used = ?5",
            params![
                row.domain,
                row.username,
                row.password,
                row.created_date,
                row.last_used,
            ],
        )?;
        Ok(())
    })
}

fn find_in(conn: &Connection, domain: &str) -> Result<Option<CredentialRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT domain, username, password, created_date, last_used
             FROM credentials WHERE domain = ?1",
            params![domain],
            CredentialRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Finds a credential by domain.
pub fn find(db: &Database, domain: &str) -> Result<Option<CredentialRow>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, domain))
}

/// Updates `last_used` only. Returns `false` if the domain is unknown.
pub fn touch(db: &Database, domain: &str, last_used: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE credentials SET last_used = ?2 WHERE domain = ?1",
            params![domain, last_used],
        )?;
        Ok(changed == 1)
    })
}

/// Lists all credentials ordered by domain.
pub fn list(db: &Database) -> Result<Vec<CredentialRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT domain, username, password, created_date, last_used
             FROM credentials ORDER BY domain",
        )?;
        let rows = stmt
            .query_map([], CredentialRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Invalid query body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection lock poisoned")]
    Poisoned,
    #[error("Not found")]
    NotFound,
}

const QUERY_COLUMNS: &str = "id, dashboard_uid, panel_id, ref_id, body, created_at, updated_at";

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;

        // Embedded SQL, idempotent via IF NOT EXISTS
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- Query CRUD ---

    /// Add a new query and return its ID. The body must be a JSON object.
    pub fn add_query(&self, query: &mut StoredQuery) -> Result<i64, DbError> {
        check_body(&query.body)?;

        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO queries (dashboard_uid, panel_id, ref_id, body, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                query.dashboard_uid,
                query.panel_id,
                query.ref_id,
                query.body,
                format_db_time(now),
            ],
        )?;
        let id = conn.last_insert_rowid();
        query.id = id;
        query.created_at = now;
        query.updated_at = now;
        Ok(id)
    }

    /// Update an existing query's location and body.
    pub fn update_query(&self, query: &StoredQuery) -> Result<(), DbError> {
        check_body(&query.body)?;

        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE queries SET dashboard_uid=?1, panel_id=?2, ref_id=?3, body=?4, updated_at=?5 WHERE id=?6",
            params![
                query.dashboard_uid,
                query.panel_id,
                query.ref_id,
                query.body,
                format_db_time(Utc::now()),
                query.id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Replace the body only if it still equals `expected`.
    ///
    /// Returns `false` when the row was changed since `expected` was read.
    pub fn update_query_body(&self, id: i64, expected: &str, body: &str) -> Result<bool, DbError> {
        check_body(body)?;

        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE queries SET body=?1, updated_at=?2 WHERE id=?3 AND body=?4",
            params![body, format_db_time(Utc::now()), id, expected],
        )?;
        if changed > 0 {
            return Ok(true);
        }

        let exists = conn
            .query_row("SELECT 1 FROM queries WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(DbError::NotFound);
        }
        Ok(false)
    }

    /// Get all queries.
    pub fn get_queries(&self) -> Result<Vec<StoredQuery>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM queries ORDER BY id",
            QUERY_COLUMNS
        ))?;

        let queries = stmt
            .query_map([], row_to_query)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(queries)
    }

    /// Get a query by ID.
    pub fn get_query(&self, id: i64) -> Result<StoredQuery, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM queries WHERE id = ?1", QUERY_COLUMNS),
            params![id],
            row_to_query,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Delete a query.
    pub fn delete_query(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM queries WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

fn row_to_query(row: &Row<'_>) -> SqlResult<StoredQuery> {
    let created: String = row.get(5)?;
    let updated: String = row.get(6)?;
    Ok(StoredQuery {
        id: row.get(0)?,
        dashboard_uid: row.get(1)?,
        panel_id: row.get(2)?,
        ref_id: row.get(3)?,
        body: row.get(4)?,
        created_at: parse_db_time(&created).unwrap_or_else(Utc::now),
        updated_at: parse_db_time(&updated).unwrap_or_else(Utc::now),
    })
}

fn check_body(body: &str) -> Result<(), DbError> {
    serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(body)?;
    Ok(())
}

fn format_db_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.9f").to_string()
}

/// Parse a timestamp string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_query_crud() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        // Create
        let mut query = StoredQuery {
            dashboard_uid: "dash-1".to_string(),
            panel_id: 4,
            ref_id: "A".to_string(),
            body: r#"{"refId":"A"}"#.to_string(),
            ..Default::default()
        };
        let id = store.add_query(&mut query).unwrap();
        assert!(id > 0);

        // Read
        let fetched = store.get_query(id).unwrap();
        assert_eq!(fetched.dashboard_uid, "dash-1");
        assert_eq!(fetched.panel_id, 4);

        // Update
        let mut updated = fetched;
        updated.ref_id = "B".to_string();
        store.update_query(&updated).unwrap();
        assert_eq!(store.get_query(id).unwrap().ref_id, "B");

        assert!(store
            .update_query_body(id, r#"{"refId":"A"}"#, r#"{"refId":"B"}"#)
            .unwrap());
        assert_eq!(store.get_query(id).unwrap().body, r#"{"refId":"B"}"#);
        assert_eq!(store.get_queries().unwrap().len(), 1);

        // Delete
        store.delete_query(id).unwrap();
        assert!(matches!(store.get_query(id), Err(DbError::NotFound)));
        assert!(matches!(store.delete_query(id), Err(DbError::NotFound)));
    }

    #[test]
    fn test_rejects_non_object_body() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        let mut query = StoredQuery {
            body: "[1, 2]".to_string(),
            ..Default::default()
        };
        assert!(matches!(store.add_query(&mut query), Err(DbError::Json(_))));
        assert!(matches!(
            store.update_query_body(99, "{}", "{}"),
            Err(DbError::NotFound)
        ));
    }

    #[test]
    fn test_body_update_skips_stale_read() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        let mut query = StoredQuery {
            body: r#"{"refId":"A"}"#.to_string(),
            ..Default::default()
        };
        let id = store.add_query(&mut query).unwrap();

        // someone else saves between our read and our write
        let mut edited = store.get_query(id).unwrap();
        edited.body = r#"{"refId":"edited"}"#.to_string();
        store.update_query(&edited).unwrap();

        let written = store
            .update_query_body(id, r#"{"refId":"A"}"#, r#"{"refId":"upgraded"}"#)
            .unwrap();
        assert!(!written);
        assert_eq!(store.get_query(id).unwrap().body, r#"{"refId":"edited"}"#);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let store = Store::new(tmp.path()).unwrap();
            store.add_query(&mut StoredQuery::default()).unwrap();
        }
        let store = Store::new(tmp.path()).unwrap();
        assert_eq!(store.get_queries().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_db_time() {
        assert!(parse_db_time("2024-03-01 12:00:00").is_some());
        assert!(parse_db_time("2024-03-01 12:00:00.123456789").is_some());
        assert!(parse_db_time("2024-03-01T12:00:00Z").is_some());
        assert!(parse_db_time("yesterday").is_none());
    }
}

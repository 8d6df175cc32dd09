//! Append-only log of processing outcomes, kept in SQLite.

use crate::types::{DetectionKind, RecordStatus};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    type TEXT DEFAULT 'none',
    path TEXT,
    detected_at TEXT,
    status TEXT DEFAULT 'pending'
);
CREATE INDEX IF NOT EXISTS idx_photos_type ON photos(type);
";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("creating database directory: {0}")]
    CreateDir(#[from] std::io::Error),
    #[error("photo record lock poisoned")]
    Poisoned,
}

/// One row of the `photos` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoRecord {
    pub id: i64,
    pub filename: String,
    /// Wire name of the [`DetectionKind`].
    pub kind: String,
    pub path: Option<String>,
    pub detected_at: String,
    pub status: String,
}

impl PhotoRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            kind: row.get(2)?,
            path: row.get(3)?,
            detected_at: row.get(4)?,
            status: row.get(5)?,
        })
    }
}

/// Shared handle to the photo log. Safe to use from several workers.
pub struct PhotoRecorder {
    conn: Mutex<Connection>,
}

impl PhotoRecorder {
    /// Open (and create if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, RecordError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, RecordError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RecordError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append one outcome, stamped with local time. Returns the row id.
    pub fn record(
        &self,
        filename: &str,
        kind: DetectionKind,
        path: &Path,
        status: RecordStatus,
    ) -> Result<i64, RecordError> {
        let detected_at = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let path = path.to_string_lossy().into_owned();
        let conn = self.conn.lock().map_err(|_| RecordError::Poisoned)?;
        conn.execute(
            "INSERT INTO photos (filename, type, path, detected_at, status) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                filename,
                kind.as_str(),
                path,
                detected_at,
                status.as_str()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All records, newest first.
    pub fn list_all(&self) -> Result<Vec<PhotoRecord>, RecordError> {
        let conn = self.conn.lock().map_err(|_| RecordError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, filename, type, path, detected_at, status FROM photos
             ORDER BY detected_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], PhotoRecord::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Records of one kind, newest first.
    pub fn list_by_kind(&self, kind: DetectionKind) -> Result<Vec<PhotoRecord>, RecordError> {
        let conn = self.conn.lock().map_err(|_| RecordError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, filename, type, path, detected_at, status FROM photos
             WHERE type = ?1 ORDER BY detected_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([kind.as_str()], PhotoRecord::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_list_newest_first() {
        let rec = PhotoRecorder::open_in_memory().unwrap();
        rec.record("a.jpg", DetectionKind::Face, Path::new("/out/wajah/alice/a.jpg"), RecordStatus::Success)
            .unwrap();
        rec.record("b.jpg", DetectionKind::None, Path::new("/in/b.jpg"), RecordStatus::Failed)
            .unwrap();

        let all = rec.list_all().unwrap();
        assert_eq!(all.len(), 2);
        // same second → id breaks the tie
        assert_eq!(all[0].filename, "b.jpg");
        assert_eq!(all[0].kind, "none");
        assert_eq!(all[0].status, "failed");
        assert_eq!(all[1].path.as_deref(), Some("/out/wajah/alice/a.jpg"));
    }

    #[test]
    fn test_list_by_kind_filters() {
        let rec = PhotoRecorder::open_in_memory().unwrap();
        rec.record("a.jpg", DetectionKind::Digits, Path::new("/d/42/a.jpg"), RecordStatus::Success)
            .unwrap();
        rec.record("b.jpg", DetectionKind::Mixed, Path::new("/f/bob/b.jpg"), RecordStatus::Success)
            .unwrap();
        rec.record("c.jpg", DetectionKind::Digits, Path::new("/d/7/c.jpg"), RecordStatus::Success)
            .unwrap();

        let digits = rec.list_by_kind(DetectionKind::Digits).unwrap();
        let names: Vec<_> = digits.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["c.jpg", "a.jpg"]);
        assert!(rec.list_by_kind(DetectionKind::Skipped).unwrap().is_empty());
    }

    #[test]
    fn test_timestamp_format() {
        let rec = PhotoRecorder::open_in_memory().unwrap();
        rec.record("a.jpg", DetectionKind::Error, Path::new("a.jpg"), RecordStatus::Failed)
            .unwrap();
        let row = &rec.list_all().unwrap()[0];
        assert!(
            chrono::NaiveDateTime::parse_from_str(&row.detected_at, TIMESTAMP_FORMAT).is_ok(),
            "bad timestamp {}",
            row.detected_at
        );
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("nested/photos.db");
        PhotoRecorder::open(&db).unwrap();
        assert!(db.exists());
    }
}

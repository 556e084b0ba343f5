use chrono::NaiveDateTime;
use eyeline_core::{PhotoRecord, Point};
use rusqlite::{params, Connection, Transaction};
use std::path::Path;
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS eyes_in_photos (
    id              INTEGER PRIMARY KEY,
    photo_file_name TEXT NOT NULL,
    captured_at     TEXT NOT NULL,
    l_eye_x         INTEGER,
    l_eye_y         INTEGER,
    r_eye_x         INTEGER,
    r_eye_y         INTEGER
);
CREATE INDEX IF NOT EXISTS idx_eyes_file_name ON eyes_in_photos (photo_file_name);
CREATE INDEX IF NOT EXISTS idx_eyes_captured_at ON eyes_in_photos (captured_at);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store is corrupted: {rows} records for photo {filename}")]
    Corrupt { filename: String, rows: usize },
    #[error("only {photos} photos in the source directory but {records} records in the store; run tidy first if that is intended")]
    SourceShrunk { photos: usize, records: usize },
    #[error("invalid timestamp '{value}' stored for {filename}")]
    Timestamp { filename: String, value: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Raw row as read from SQLite, before timestamp parsing.
type Row = (String, String, Option<i32>, Option<i32>, Option<i32>, Option<i32>);

/// Eye positions per photo file name, persisted in SQLite.
pub struct PhotoStore {
    conn: Connection,
}

impl PhotoStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            tracing::info!(path = %path.display(), "creating new eye position store");
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM eyes_in_photos", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Every row stored under `filename`. More than one means corruption.
    pub fn fetch_by_filename(&self, filename: &str) -> Result<Vec<PhotoRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT photo_file_name, captured_at, l_eye_x, l_eye_y, r_eye_x, r_eye_y
             FROM eyes_in_photos WHERE photo_file_name = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![filename], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_record).collect()
    }

    /// The single record for `filename`, failing with [`StoreError::Corrupt`] on duplicates.
    pub fn fetch_unique(&self, filename: &str) -> Result<Option<PhotoRecord>> {
        let mut rows = self.fetch_by_filename(filename)?;
        match rows.len() {
            0 | 1 => Ok(rows.pop()),
            n => {
                tracing::error!(file = filename, rows = n, "store in bad shape: duplicate records");
                Err(StoreError::Corrupt {
                    filename: filename.to_string(),
                    rows: n,
                })
            }
        }
    }

    /// All records, oldest capture first.
    pub fn all_ordered(&self) -> Result<Vec<PhotoRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT photo_file_name, captured_at, l_eye_x, l_eye_y, r_eye_x, r_eye_y
             FROM eyes_in_photos ORDER BY captured_at, id",
        )?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_record).collect()
    }

    /// Plain insert, without checking for an existing row.
    pub fn insert(&self, record: &PhotoRecord) -> Result<()> {
        insert_row(&self.conn, record)?;
        Ok(())
    }

    /// Insert `record`, or overwrite the eye positions of the existing row, in one commit.
    pub fn upsert(&mut self, record: &PhotoRecord) -> Result<()> {
        let tx = self.conn.transaction()?;
        let rows: i64 = tx.query_row(
            "SELECT COUNT(*) FROM eyes_in_photos WHERE photo_file_name = ?1",
            params![record.filename],
            |row| row.get(0),
        )?;

        match rows {
            0 => {
                insert_row(&tx, record)?;
                tracing::debug!(file = %record.filename, "inserted record");
            }
            1 => {
                update_eyes(&tx, record)?;
                tracing::debug!(file = %record.filename, "updated record");
            }
            n => {
                return Err(StoreError::Corrupt {
                    filename: record.filename.clone(),
                    rows: n as usize,
                })
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Delete every row for `filename` in its own transaction.
    pub fn delete(&mut self, filename: &str) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM eyes_in_photos WHERE photo_file_name = ?1",
            params![filename],
        )?;
        tx.commit()?;
        tracing::debug!(file = filename, removed, "deleted record");
        Ok(removed)
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_record((filename, captured, lx, ly, rx, ry): Row) -> Result<PhotoRecord> {
    let captured_at = NaiveDateTime::parse_from_str(&captured, TIMESTAMP_FORMAT).map_err(|_| StoreError::Timestamp {
        filename: filename.clone(),
        value: captured.clone(),
    })?;
    let point = |x: Option<i32>, y: Option<i32>| Some(Point::new(x?, y?));

    Ok(PhotoRecord {
        filename,
        captured_at,
        left_eye: point(lx, ly),
        right_eye: point(rx, ry),
    })
}

fn eye_columns(record: &PhotoRecord) -> [Option<i32>; 4] {
    match record.eyes() {
        Some((l, r)) => [Some(l.x), Some(l.y), Some(r.x), Some(r.y)],
        None => [None; 4],
    }
}

fn insert_row(conn: &Connection, record: &PhotoRecord) -> rusqlite::Result<usize> {
    let [lx, ly, rx, ry] = eye_columns(record);
    conn.execute(
        "INSERT INTO eyes_in_photos (photo_file_name, captured_at, l_eye_x, l_eye_y, r_eye_x, r_eye_y)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.filename,
            record.captured_at.format(TIMESTAMP_FORMAT).to_string(),
            lx,
            ly,
            rx,
            ry
        ],
    )
}

fn update_eyes(tx: &Transaction<'_>, record: &PhotoRecord) -> rusqlite::Result<usize> {
    let [lx, ly, rx, ry] = eye_columns(record);
    tx.execute(
        "UPDATE eyes_in_photos SET l_eye_x = ?1, l_eye_y = ?2, r_eye_x = ?3, r_eye_y = ?4
         WHERE photo_file_name = ?5",
        params![lx, ly, rx, ry, record.filename],
    )
}

//! Database module - SQLite storage of the persisted media index

use rusqlite::{params, Connection, OpenFlags, Result as SqliteResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ScanError;
use crate::index::{IndexEntry, IndexSource};
use crate::models::{IndexRecord, MediaType};

/// How long a connection waits on a lock held by another writer
const BUSY_TIMEOUT: Duration = Duration::from_millis(500);

/// Database manager for the media index
pub struct ScanDatabase {
    conn: Connection,
}

impl ScanDatabase {
    /// Open or create database
    pub fn open(path: &Path) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.init_schema()?;
        db.migrate_schema()?;
        Ok(db)
    }

    /// Open an existing database without creating or migrating anything
    pub fn open_read_only(path: &Path) -> SqliteResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> SqliteResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS media_index (
                path TEXT PRIMARY KEY,
                size INTEGER NOT NULL,
                mtime INTEGER NOT NULL,
                media_type TEXT NOT NULL,
                hash TEXT,
                is_partial_hash INTEGER DEFAULT 0,
                indexed_at INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_media_index_mtime ON media_index(mtime);
            CREATE INDEX IF NOT EXISTS idx_media_index_type ON media_index(media_type);
            ",
        )?;
        Ok(())
    }

    /// Migrate schema for databases created before `indexed_at` existed
    fn migrate_schema(&self) -> SqliteResult<()> {
        let has_indexed_at: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('media_index') WHERE name='indexed_at'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !has_indexed_at {
            self.conn.execute(
                "ALTER TABLE media_index ADD COLUMN indexed_at INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }

        Ok(())
    }

    /// Whether the `media_index` table exists yet
    pub fn has_index_table(&self) -> SqliteResult<bool> {
        self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'media_index'",
            [],
            |row| row.get(0),
        )
    }

    /// Load (path, mtime) for every indexed file
    pub fn load_entries(&self) -> SqliteResult<Vec<IndexEntry>> {
        let mut stmt = self.conn.prepare("SELECT path, mtime FROM media_index")?;

        let rows = stmt.query_map([], |row| {
            Ok(IndexEntry {
                path: PathBuf::from(row.get::<_, String>(0)?),
                modified: row.get(1)?,
            })
        })?;

        rows.collect()
    }

    /// Load a full record by path
    pub fn get_record(&self, path: &Path) -> SqliteResult<Option<IndexRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, size, mtime, media_type, hash, is_partial_hash, indexed_at
             FROM media_index WHERE path = ?1",
        )?;

        let mut rows = stmt.query_map([path.to_string_lossy()], |row| {
            Ok(IndexRecord {
                path: PathBuf::from(row.get::<_, String>(0)?),
                size: row.get::<_, i64>(1)? as u64,
                mtime: row.get(2)?,
                media_type: MediaType::parse(&row.get::<_, String>(3)?),
                hash: row.get(4)?,
                is_partial_hash: row.get::<_, i64>(5)? != 0,
                indexed_at: row.get(6)?,
            })
        })?;

        rows.next().transpose()
    }

    /// Batch insert/update records
    pub fn upsert_records(&mut self, records: &[IndexRecord]) -> SqliteResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO media_index
                 (path, size, mtime, media_type, hash, is_partial_hash, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for record in records {
                stmt.execute(params![
                    record.path.to_string_lossy(),
                    record.size as i64,
                    record.mtime,
                    record.media_type.as_str(),
                    record.hash,
                    record.is_partial_hash as i32,
                    record.indexed_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete records by path
    pub fn remove_paths(&mut self, paths: &[PathBuf]) -> SqliteResult<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM media_index WHERE path = ?1")?;
            for path in paths {
                stmt.execute(params![path.to_string_lossy()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Get entry count
    pub fn entry_count(&self) -> SqliteResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM media_index", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Get entry counts per media type
    pub fn media_type_counts(&self) -> SqliteResult<HashMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT media_type, COUNT(*) FROM media_index GROUP BY media_type")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (media_type, count) = row?;
            counts.insert(media_type, count);
        }
        Ok(counts)
    }
}

/// Index source reading a SQLite media index file.
///
/// A fresh read-only connection is opened per read so the file can be
/// shared with the indexer writing to it. A file or table that does not
/// exist yet reads as an empty index.
#[derive(Debug, Clone)]
pub struct MediaIndex {
    db_path: PathBuf,
}

impl MediaIndex {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl IndexSource for MediaIndex {
    fn load_entries(&self) -> Result<Vec<IndexEntry>, ScanError> {
        if !self.db_path.exists() {
            log::debug!("No index at {} yet", self.db_path.display());
            return Ok(Vec::new());
        }

        let access_err =
            |e: rusqlite::Error| ScanError::index_access(e.to_string()).with_path(self.db_path.clone());

        let db = ScanDatabase::open_read_only(&self.db_path).map_err(access_err)?;
        if !db.has_index_table().map_err(access_err)? {
            return Ok(Vec::new());
        }
        db.load_entries().map_err(access_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanErrorKind;

    fn record(path: &str, mtime: i64) -> IndexRecord {
        IndexRecord::new(PathBuf::from(path), 10, mtime, MediaType::from_extension("jpg"))
    }

    #[test]
    fn test_upsert_and_load_entries() {
        let mut db = ScanDatabase::open_memory().unwrap();
        db.upsert_records(&[record("/sdcard/a.jpg", 100), record("/sdcard/b.jpg", 200)])
            .unwrap();
        db.upsert_records(&[record("/sdcard/a.jpg", 150)]).unwrap();

        let mut entries = db.load_entries().unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(
            entries,
            vec![
                IndexEntry::new("/sdcard/a.jpg", 150),
                IndexEntry::new("/sdcard/b.jpg", 200),
            ]
        );
        assert_eq!(db.entry_count().unwrap(), 2);
    }

    #[test]
    fn test_get_record_round_trip() {
        let mut db = ScanDatabase::open_memory().unwrap();
        let stored = record("/sdcard/c.jpg", 7).with_hash("d41d8cd9".to_string(), true);
        db.upsert_records(&[stored.clone()]).unwrap();

        let loaded = db.get_record(Path::new("/sdcard/c.jpg")).unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert!(db.get_record(Path::new("/sdcard/none.jpg")).unwrap().is_none());
    }

    #[test]
    fn test_remove_paths() {
        let mut db = ScanDatabase::open_memory().unwrap();
        db.upsert_records(&[record("/sdcard/a.jpg", 1), record("/sdcard/b.jpg", 2)])
            .unwrap();
        db.remove_paths(&[PathBuf::from("/sdcard/a.jpg")]).unwrap();
        assert_eq!(db.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_media_type_counts() {
        let mut db = ScanDatabase::open_memory().unwrap();
        db.upsert_records(&[
            record("/sdcard/a.jpg", 1),
            IndexRecord::new(PathBuf::from("/sdcard/v.mp4"), 1, 1, MediaType::Video),
            IndexRecord::new(PathBuf::from("/sdcard"), 0, 1, MediaType::Directory),
        ])
        .unwrap();

        let counts = db.media_type_counts().unwrap();
        assert_eq!(counts.get("image"), Some(&1));
        assert_eq!(counts.get("video"), Some(&1));
        assert_eq!(counts.get("directory"), Some(&1));
    }

    #[test]
    fn test_media_index_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("index.db");
        {
            let mut db = ScanDatabase::open(&db_path).unwrap();
            db.upsert_records(&[record("/sdcard/a.jpg", 100)]).unwrap();
        }

        let entries = MediaIndex::new(&db_path).load_entries().unwrap();
        assert_eq!(entries, vec![IndexEntry::new("/sdcard/a.jpg", 100)]);
    }

    #[test]
    fn test_media_index_read_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("never_created.db");

        let entries = MediaIndex::new(&db_path).load_entries().unwrap();
        assert!(entries.is_empty());
        assert!(!db_path.exists());
    }

    #[test]
    fn test_media_index_read_does_not_create_table() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("empty.db");
        Connection::open(&db_path)
            .unwrap()
            .execute_batch("CREATE TABLE other (id INTEGER)")
            .unwrap();

        let entries = MediaIndex::new(&db_path).load_entries().unwrap();
        assert!(entries.is_empty());

        let db = ScanDatabase::open_read_only(&db_path).unwrap();
        assert!(!db.has_index_table().unwrap());
    }

    #[test]
    fn test_media_index_unreadable_is_index_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("garbage.db");
        std::fs::write(&db_path, vec![0x42u8; 4096]).unwrap();

        let err = MediaIndex::new(&db_path).load_entries().unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::IndexAccess);
    }
}

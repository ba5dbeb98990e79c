//! Catalog store: the persistence boundary of the synchronizer

use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::ScanError;
use crate::models::{CatalogEntry, NumberPair};

/// Operations the reconciler needs from a catalog
///
/// Calls are blocking; a call returns once the store has applied it.
pub trait CatalogStore {
    /// All rows of one vpath
    fn entries_for_vpath(&self, vpath: &str) -> Result<Vec<CatalogEntry>, ScanError>;

    /// Rewrite metadata of existing rows in place
    fn batch_update(&mut self, entries: &[CatalogEntry]) -> Result<(), ScanError>;

    /// Insert new rows under `vpath`, stamping their ingestion time
    fn insert(&mut self, entries: &[CatalogEntry], vpath: &str) -> Result<(), ScanError>;

    /// Remove one row
    fn delete(&mut self, vpath: &str, filepath: &str) -> Result<(), ScanError>;

    /// Persist everything written so far
    fn save(&mut self) -> Result<(), ScanError>;
}

const ENTRY_COLUMNS: &str = "vpath, filepath, artist, album, title, track_no, track_of, \
     disk_no, disk_of, year, format, modified, hash, aa_file, ts";

/// SQLite-backed catalog
///
/// Writes accumulate in one open transaction which is committed once the
/// save interval has elapsed, and always on [`CatalogStore::save`].
pub struct SqliteCatalog {
    conn: Connection,
    save_interval: Duration,
    last_save: Instant,
}

impl SqliteCatalog {
    /// Open or create the catalog database
    pub fn open(path: &Path, save_interval_ms: u64) -> Result<Self, ScanError> {
        let conn = Connection::open(path).map_err(|e| ScanError::from(e).with_path(path))?;
        Self::with_connection(conn, save_interval_ms)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self, ScanError> {
        Self::with_connection(Connection::open_in_memory()?, 0)
    }

    fn with_connection(conn: Connection, save_interval_ms: u64) -> Result<Self, ScanError> {
        let db = Self {
            conn,
            save_interval: Duration::from_millis(save_interval_ms),
            last_save: Instant::now(),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                vpath TEXT NOT NULL,
                filepath TEXT NOT NULL,
                artist TEXT,
                album TEXT,
                title TEXT,
                track_no INTEGER,
                track_of INTEGER,
                disk_no INTEGER,
                disk_of INTEGER,
                year INTEGER,
                format TEXT NOT NULL,
                modified INTEGER NOT NULL,
                hash TEXT NOT NULL,
                aa_file TEXT,
                ts INTEGER NOT NULL,
                UNIQUE (vpath, filepath)
            );
            CREATE INDEX IF NOT EXISTS idx_files_vpath ON files(vpath);
            CREATE INDEX IF NOT EXISTS idx_files_hash ON files(hash);
            CREATE INDEX IF NOT EXISTS idx_files_ts ON files(ts);
            ",
        )
    }

    /// Start the write transaction if none is open
    fn begin_write(&self) -> rusqlite::Result<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn commit(&mut self) -> rusqlite::Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        self.last_save = Instant::now();
        Ok(())
    }

    /// Commit if the save interval has elapsed
    fn autosave(&mut self) -> rusqlite::Result<()> {
        if self.last_save.elapsed() >= self.save_interval {
            log::debug!("Catalog autosave");
            self.commit()?;
        }
        Ok(())
    }

    /// Whether uncommitted writes are pending
    pub fn has_pending_writes(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Rows of the given vpaths, in insertion order
    pub fn entries_for_vpaths(&self, vpaths: &[String]) -> rusqlite::Result<Vec<CatalogEntry>> {
        if vpaths.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; vpaths.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM files WHERE vpath IN ({}) ORDER BY id",
            ENTRY_COLUMNS, placeholders
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(vpaths.iter()), entry_from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Exact lookup by unique key
    pub fn find_entry(&self, vpath: &str, filepath: &str) -> rusqlite::Result<Option<CatalogEntry>> {
        let sql = format!(
            "SELECT {} FROM files WHERE vpath = ?1 AND filepath = ?2",
            ENTRY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![vpath, filepath], entry_from_row)?;
        rows.next().transpose()
    }

    /// Number of rows in the given vpaths
    pub fn count_for_vpaths(&self, vpaths: &[String]) -> rusqlite::Result<u64> {
        let mut total = 0u64;
        for vpath in vpaths {
            let count: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM files WHERE vpath = ?1",
                [vpath],
                |row| row.get(0),
            )?;
            total += count as u64;
        }
        Ok(total)
    }
}

impl CatalogStore for SqliteCatalog {
    fn entries_for_vpath(&self, vpath: &str) -> Result<Vec<CatalogEntry>, ScanError> {
        Ok(self.entries_for_vpaths(&[vpath.to_string()])?)
    }

    fn batch_update(&mut self, entries: &[CatalogEntry]) -> Result<(), ScanError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.begin_write()?;
        {
            let mut stmt = self.conn.prepare_cached(
                "UPDATE files SET artist = ?1, album = ?2, title = ?3, track_no = ?4,
                 track_of = ?5, disk_no = ?6, disk_of = ?7, year = ?8, format = ?9,
                 modified = ?10, hash = ?11, aa_file = ?12
                 WHERE vpath = ?13 AND filepath = ?14",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.artist,
                    entry.album,
                    entry.title,
                    entry.track.no,
                    entry.track.of,
                    entry.disk.no,
                    entry.disk.of,
                    entry.year,
                    entry.format,
                    entry.modified,
                    entry.hash,
                    entry.album_art,
                    entry.vpath,
                    entry.filepath,
                ])?;
            }
        }
        self.autosave()?;
        Ok(())
    }

    fn insert(&mut self, entries: &[CatalogEntry], vpath: &str) -> Result<(), ScanError> {
        let now = chrono::Utc::now().timestamp_millis();
        self.begin_write()?;
        {
            let sql = format!(
                "INSERT INTO files ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                ENTRY_COLUMNS
            );
            let mut stmt = self.conn.prepare_cached(&sql)?;
            for entry in entries {
                stmt.execute(params![
                    vpath,
                    entry.filepath.replace('\\', "/"),
                    entry.artist,
                    entry.album,
                    entry.title,
                    entry.track.no,
                    entry.track.of,
                    entry.disk.no,
                    entry.disk.of,
                    entry.year,
                    entry.format,
                    entry.modified,
                    entry.hash,
                    entry.album_art,
                    now,
                ])?;
            }
        }
        self.autosave()?;
        Ok(())
    }

    fn delete(&mut self, vpath: &str, filepath: &str) -> Result<(), ScanError> {
        self.begin_write()?;
        self.conn.execute(
            "DELETE FROM files WHERE vpath = ?1 AND filepath = ?2",
            params![vpath, filepath],
        )?;
        self.autosave()?;
        Ok(())
    }

    fn save(&mut self) -> Result<(), ScanError> {
        self.commit()?;
        Ok(())
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    Ok(CatalogEntry {
        vpath: row.get(0)?,
        filepath: row.get(1)?,
        artist: row.get(2)?,
        album: row.get(3)?,
        title: row.get(4)?,
        track: NumberPair::new(row.get(5)?, row.get(6)?),
        disk: NumberPair::new(row.get(7)?, row.get(8)?),
        year: row.get(9)?,
        format: row.get(10)?,
        modified: row.get(11)?,
        hash: row.get(12)?,
        album_art: row.get(13)?,
        ingested_at: row.get(14)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_entry(vpath: &str, filepath: &str, hash: &str) -> CatalogEntry {
        CatalogEntry {
            vpath: vpath.to_string(),
            filepath: filepath.to_string(),
            artist: Some("Artist".to_string()),
            album: Some("Album".to_string()),
            title: Some(filepath.to_string()),
            track: NumberPair::new(Some(1), Some(10)),
            disk: NumberPair::new(Some(1), Some(1)),
            year: Some(1999),
            format: "mp3".to_string(),
            modified: 1_000,
            hash: hash.to_string(),
            album_art: None,
            ingested_at: 0,
        }
    }

    #[test]
    fn test_insert_and_load_vpath() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        db.insert(&[sample_entry("", "a.mp3", "h1")], "music").unwrap();
        db.insert(&[sample_entry("", "b.mp3", "h2")], "other").unwrap();

        let rows = db.entries_for_vpath("music").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].vpath, "music");
        assert_eq!(rows[0].filepath, "a.mp3");
        assert_eq!(rows[0].track, NumberPair::new(Some(1), Some(10)));
        assert!(rows[0].ingested_at > 0);
    }

    #[test]
    fn test_duplicate_key_insert_fails() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        db.insert(&[sample_entry("", "a.mp3", "h1")], "music").unwrap();
        assert!(db.insert(&[sample_entry("", "a.mp3", "h1")], "music").is_err());
    }

    #[test]
    fn test_batch_update_rewrites_album_art() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        db.insert(&[sample_entry("", "a.mp3", "h1")], "music").unwrap();

        let mut row = db.find_entry("music", "a.mp3").unwrap().unwrap();
        row.album_art = Some("cover.jpg".to_string());
        db.batch_update(&[row]).unwrap();

        let updated = db.find_entry("music", "a.mp3").unwrap().unwrap();
        assert_eq!(updated.album_art.as_deref(), Some("cover.jpg"));
    }

    #[test]
    fn test_delete_is_scoped_to_vpath() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        db.insert(&[sample_entry("", "a.mp3", "h1")], "music").unwrap();
        db.insert(&[sample_entry("", "a.mp3", "h1")], "other").unwrap();

        db.delete("music", "a.mp3").unwrap();
        assert!(db.find_entry("music", "a.mp3").unwrap().is_none());
        assert!(db.find_entry("other", "a.mp3").unwrap().is_some());
        assert_eq!(db.count_for_vpaths(&["music".into(), "other".into()]).unwrap(), 1);
    }

    #[test]
    fn test_writes_persist_after_save() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("files.db");
        {
            let mut db = SqliteCatalog::open(&path, 60_000).unwrap();
            db.insert(&[sample_entry("", "a.mp3", "h1")], "music").unwrap();
            assert!(db.has_pending_writes());
            db.save().unwrap();
            assert!(!db.has_pending_writes());
        }
        let db = SqliteCatalog::open(&path, 60_000).unwrap();
        assert_eq!(db.entries_for_vpath("music").unwrap().len(), 1);
    }

    #[test]
    fn test_zero_interval_commits_every_write() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut db = SqliteCatalog::open(&tmp.path().join("files.db"), 0).unwrap();
        db.insert(&[sample_entry("", "a.mp3", "h1")], "music").unwrap();
        assert!(!db.has_pending_writes());
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        for name in ["c.mp3", "a.mp3", "b.mp3"] {
            db.insert(&[sample_entry("", name, name)], "music").unwrap();
        }
        let order: Vec<String> = db
            .entries_for_vpaths(&["music".to_string()])
            .unwrap()
            .into_iter()
            .map(|e| e.filepath)
            .collect();
        assert_eq!(order, vec!["c.mp3", "a.mp3", "b.mp3"]);
    }
}

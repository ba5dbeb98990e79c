//! Overlay store: per-user ratings and playlists
//!
//! Every mutating call commits before returning. There is no write batching
//! and no concurrency token; concurrent writers to the same key race and the
//! last commit wins.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::models::{PlaylistRecord, RatingRow};

/// SQLite-backed overlay store
pub struct OverlayStore {
    conn: Connection,
}

impl OverlayStore {
    /// Open or create the overlay database
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> rusqlite::Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS user_metadata (
                hash TEXT NOT NULL,
                user TEXT NOT NULL,
                rating INTEGER NOT NULL,
                PRIMARY KEY (hash, user)
            );
            CREATE TABLE IF NOT EXISTS playlists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                filepath TEXT NOT NULL,
                user TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_playlists_user_name ON playlists(user, name);
            ",
        )
    }

    // Ratings

    /// Rating of one (hash, user) key
    pub fn find_rating(&self, hash: &str, user: &str) -> rusqlite::Result<Option<RatingRow>> {
        self.conn
            .query_row(
                "SELECT hash, user, rating FROM user_metadata WHERE hash = ?1 AND user = ?2",
                params![hash, user],
                |row| {
                    Ok(RatingRow {
                        hash: row.get(0)?,
                        user: row.get(1)?,
                        rating: row.get(2)?,
                    })
                },
            )
            .optional()
    }

    /// All ratings of one user
    pub fn ratings_for_user(&self, user: &str) -> rusqlite::Result<Vec<RatingRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT hash, user, rating FROM user_metadata WHERE user = ?1")?;
        let rows = stmt.query_map([user], |row| {
            Ok(RatingRow {
                hash: row.get(0)?,
                user: row.get(1)?,
                rating: row.get(2)?,
            })
        })?;

        let mut ratings = Vec::new();
        for row in rows {
            ratings.push(row?);
        }
        Ok(ratings)
    }

    /// Insert or update a rating; returns true when a new row was inserted
    pub fn upsert_rating(&mut self, hash: &str, user: &str, rating: u8) -> rusqlite::Result<bool> {
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE user_metadata SET rating = ?3 WHERE hash = ?1 AND user = ?2",
            params![hash, user, rating],
        )?;
        if updated == 0 {
            tx.execute(
                "INSERT INTO user_metadata (hash, user, rating) VALUES (?1, ?2, ?3)",
                params![hash, user, rating],
            )?;
        }
        tx.commit()?;
        Ok(updated == 0)
    }

    /// Remove one rating; returns true if a row was removed
    pub fn remove_rating(&mut self, hash: &str, user: &str) -> rusqlite::Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM user_metadata WHERE hash = ?1 AND user = ?2",
            params![hash, user],
        )?;
        Ok(removed > 0)
    }

    /// Remove every rating of one user
    pub fn clear_ratings(&mut self, user: &str) -> rusqlite::Result<u64> {
        let removed = self
            .conn
            .execute("DELETE FROM user_metadata WHERE user = ?1", [user])?;
        Ok(removed as u64)
    }

    /// Number of ratings of one user
    pub fn rating_count(&self, user: &str) -> rusqlite::Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM user_metadata WHERE user = ?1",
            [user],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // Playlists

    /// Append one song to a playlist
    pub fn add_playlist_song(&mut self, name: &str, filepath: &str, user: &str) -> rusqlite::Result<i64> {
        self.conn.execute(
            "INSERT INTO playlists (name, filepath, user) VALUES (?1, ?2, ?3)",
            params![name, filepath, user],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Remove one playlist record owned by `user`
    pub fn remove_playlist_record(&mut self, id: i64, user: &str) -> rusqlite::Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM playlists WHERE id = ?1 AND user = ?2",
            params![id, user],
        )?;
        Ok(removed > 0)
    }

    /// Replace the whole content of a playlist
    pub fn replace_playlist(&mut self, name: &str, user: &str, songs: &[String]) -> rusqlite::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM playlists WHERE user = ?1 AND name = ?2",
            params![user, name],
        )?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO playlists (name, filepath, user) VALUES (?1, ?2, ?3)")?;
            for song in songs {
                stmt.execute(params![name, song, user])?;
            }
        }
        tx.commit()
    }

    /// Delete a playlist; returns the number of records removed
    pub fn delete_playlist(&mut self, name: &str, user: &str) -> rusqlite::Result<u64> {
        let removed = self.conn.execute(
            "DELETE FROM playlists WHERE user = ?1 AND name = ?2",
            params![user, name],
        )?;
        Ok(removed as u64)
    }

    /// Records of one playlist in insertion order
    pub fn playlist_records(&self, name: &str, user: &str) -> rusqlite::Result<Vec<PlaylistRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, filepath, user FROM playlists WHERE user = ?1 AND name = ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user, name], |row| {
            Ok(PlaylistRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                filepath: row.get(2)?,
                user: row.get(3)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Distinct playlist names of one user, in first-seen order
    pub fn playlist_names(&self, user: &str) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM playlists WHERE user = ?1 GROUP BY name ORDER BY MIN(id)",
        )?;
        let rows = stmt.query_map([user], |row| row.get(0))?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }
}

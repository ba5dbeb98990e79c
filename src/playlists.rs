//! Playlist operations
//!
//! A playlist is the set of overlay records sharing `(name, user)`. Records
//! store the caller-facing `vpath/path` string, not a catalog key, so a
//! playlist keeps its entries across re-ingestion.

use serde::Serialize;

use crate::error::{QueryError, QueryResult};
use crate::query::{Library, SongMetadata, User};

/// One playlist record with the song's current metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistItem {
    /// Record id, used to remove this one entry
    pub id: i64,
    pub filepath: String,
    pub metadata: SongMetadata,
}

fn require(value: &str, what: &str) -> QueryResult<()> {
    if value.is_empty() {
        return Err(QueryError::BadInput(format!("missing {}", what)));
    }
    Ok(())
}

impl Library {
    /// Append one song to a playlist; returns the new record id
    pub fn add_playlist_song(&mut self, user: &User, playlist: &str, song: &str) -> QueryResult<i64> {
        require(playlist, "playlist")?;
        require(song, "song")?;
        Ok(self
            .overlay_mut()?
            .add_playlist_song(playlist, song, &user.username)?)
    }

    /// Remove one record by id; records of other users are left alone
    pub fn remove_playlist_song(&mut self, user: &User, id: Option<i64>) -> QueryResult<bool> {
        let id = id.ok_or_else(|| QueryError::BadInput("missing record id".to_string()))?;
        Ok(self.overlay_mut()?.remove_playlist_record(id, &user.username)?)
    }

    /// Replace a playlist with `songs`, in order
    pub fn save_playlist(&mut self, user: &User, title: &str, songs: &[String]) -> QueryResult<()> {
        require(title, "title")?;
        self.overlay_mut()?
            .replace_playlist(title, &user.username, songs)?;
        log::debug!("Saved playlist {} with {} songs", title, songs.len());
        Ok(())
    }

    /// Names of the caller's playlists in creation order
    pub fn playlists(&self, user: &User) -> QueryResult<Vec<String>> {
        Ok(self.overlay()?.playlist_names(&user.username)?)
    }

    /// Records of one playlist with joined metadata
    ///
    /// A record pointing outside the caller's vpaths fails the whole load.
    /// Records of files that are no longer catalogued carry empty metadata.
    pub fn load_playlist(&self, user: &User, name: &str) -> QueryResult<Vec<PlaylistItem>> {
        require(name, "playlist name")?;
        let records = self.overlay()?.playlist_records(name, &user.username)?;

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let info = user.resolve(&record.filepath)?;
            let metadata = self
                .song_view(user, &info)?
                .map(|view| view.metadata)
                .unwrap_or_default();
            items.push(PlaylistItem {
                id: record.id,
                filepath: record.filepath,
                metadata,
            });
        }
        Ok(items)
    }

    /// Delete a playlist; returns the number of records removed
    pub fn delete_playlist(&mut self, user: &User, name: &str) -> QueryResult<u64> {
        require(name, "playlist name")?;
        Ok(self.overlay_mut()?.delete_playlist(name, &user.username)?)
    }
}

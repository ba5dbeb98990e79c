//! Query layer over the catalog and the overlay store
//!
//! Every operation is scoped to a caller's accessible vpaths. Reads return
//! empty results when the catalog has not been created yet; operations that
//! need a store to exist report [`QueryError::NotInitialized`].

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::DEFAULT_SAVE_INTERVAL_MS;
use crate::db::SqliteCatalog;
use crate::error::{QueryError, QueryResult, ScanError};
use crate::join::{with_ratings, RatedEntry};
use crate::models::CatalogEntry;
use crate::overlay::OverlayStore;

/// Default cap for recently-added and rated listings
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// An authenticated caller and the vpaths it may read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub vpaths: Vec<String>,
}

/// A request path split into its vpath and the path below it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VPathInfo {
    pub vpath: String,
    pub relative_path: String,
}

impl User {
    pub fn new(username: impl Into<String>, vpaths: Vec<String>) -> Self {
        Self {
            username: username.into(),
            vpaths,
        }
    }

    /// Resolve `vpath/rest/of/path` against this user's vpaths
    pub fn resolve(&self, filepath: &str) -> QueryResult<VPathInfo> {
        let normalized = filepath.replace('\\', "/");
        let trimmed = normalized.trim_start_matches('/');
        let (vpath, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));

        if vpath.is_empty() || !self.vpaths.iter().any(|v| v == vpath) {
            return Err(QueryError::FileNotFound(filepath.to_string()));
        }
        Ok(VPathInfo {
            vpath: vpath.to_string(),
            relative_path: rest.to_string(),
        })
    }
}

/// Metadata block of a song view
///
/// The default value is the empty block returned for uncatalogued files.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SongMetadata {
    pub artist: Option<String>,
    pub hash: Option<String>,
    pub album: Option<String>,
    pub track: Option<u32>,
    pub title: Option<String>,
    pub year: Option<i32>,
    #[serde(rename = "album-art")]
    pub album_art: Option<String>,
    pub filename: Option<String>,
    pub rating: Option<u8>,
}

impl SongMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A song as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongView {
    /// `vpath/relative/path`
    pub filepath: String,
    pub metadata: SongMetadata,
}

impl From<&RatedEntry> for SongView {
    fn from(rated: &RatedEntry) -> Self {
        let entry = &rated.entry;
        Self {
            filepath: entry.public_path(),
            metadata: SongMetadata {
                artist: entry.artist.clone(),
                hash: Some(entry.hash.clone()),
                album: entry.album.clone(),
                track: entry.track.no,
                title: entry.title.clone(),
                year: entry.year,
                album_art: entry.album_art.clone(),
                filename: Some(entry.file_name().to_string()),
                rating: rated.rating,
            },
        }
    }
}

/// One album in a listing, with a representative cover
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumSummary {
    pub name: Option<String>,
    pub album_art_file: Option<String>,
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub name: String,
    pub album_art_file: Option<String>,
    /// Set for file and title hits
    pub filepath: Option<String>,
}

/// Search input; each field group can be switched off
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub artists: bool,
    pub albums: bool,
    pub files: bool,
    pub titles: bool,
}

impl SearchRequest {
    /// Search every field group
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            artists: true,
            albums: true,
            files: true,
            titles: true,
        }
    }
}

/// Search output, one list per field group
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub artists: Vec<SearchHit>,
    pub albums: Vec<SearchHit>,
    pub files: Vec<SearchHit>,
    pub title: Vec<SearchHit>,
}

/// Accent- and case-insensitive sort key: NFD with combining marks dropped
fn collation_key(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Listing order for names
///
/// Compares base letters first, so `Édith` sorts with `Eagles`. Ties fall back
/// to the unaccented form first, then lower case before upper case.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| b.cmp(a))
}

/// Effective limit for capped listings
pub(crate) fn effective_limit(limit: Option<i64>) -> usize {
    match limit {
        Some(n) if n > 0 => n as usize,
        _ => DEFAULT_LIST_LIMIT,
    }
}

/// Read handle over the catalog and the overlay store
pub struct Library {
    catalog: Option<SqliteCatalog>,
    overlay: Option<OverlayStore>,
}

impl Library {
    pub fn new(catalog: Option<SqliteCatalog>, overlay: Option<OverlayStore>) -> Self {
        Self { catalog, overlay }
    }

    /// Open both stores
    ///
    /// A catalog file that does not exist yet leaves the catalog unset until a
    /// sync job has created it. The overlay file is created on demand.
    pub fn open(catalog_path: &Path, overlay_path: &Path) -> Result<Self, ScanError> {
        let catalog = if catalog_path.exists() {
            Some(SqliteCatalog::open(catalog_path, DEFAULT_SAVE_INTERVAL_MS)?)
        } else {
            log::info!("Catalog {:?} does not exist yet", catalog_path);
            None
        };
        let overlay = OverlayStore::open(overlay_path)?;
        Ok(Self::new(catalog, Some(overlay)))
    }

    pub(crate) fn catalog(&self) -> QueryResult<&SqliteCatalog> {
        self.catalog.as_ref().ok_or(QueryError::NotInitialized("catalog"))
    }

    pub(crate) fn overlay(&self) -> QueryResult<&OverlayStore> {
        self.overlay.as_ref().ok_or(QueryError::NotInitialized("overlay"))
    }

    pub(crate) fn overlay_mut(&mut self) -> QueryResult<&mut OverlayStore> {
        self.overlay.as_mut().ok_or(QueryError::NotInitialized("overlay"))
    }

    /// Catalog rows of the caller's vpaths; empty when there is no catalog
    pub(crate) fn accessible_entries(&self, vpaths: &[String]) -> QueryResult<Vec<CatalogEntry>> {
        match &self.catalog {
            Some(catalog) => Ok(catalog.entries_for_vpaths(vpaths)?),
            None => Ok(Vec::new()),
        }
    }

    /// Attach the caller's ratings; rows stay unrated without an overlay
    pub(crate) fn attach_ratings(&self, user: &User, entries: &[CatalogEntry]) -> QueryResult<Vec<RatedEntry>> {
        let ratings = match &self.overlay {
            Some(overlay) => overlay.ratings_for_user(&user.username)?,
            None => Vec::new(),
        };
        Ok(with_ratings(entries, &ratings, &user.username))
    }

    /// Song view of one caller-visible path, if catalogued
    pub(crate) fn song_view(&self, user: &User, info: &VPathInfo) -> QueryResult<Option<SongView>> {
        let Some(catalog) = &self.catalog else {
            return Ok(None);
        };
        let Some(entry) = catalog.find_entry(&info.vpath, &info.relative_path)? else {
            return Ok(None);
        };
        let rated = self.attach_ratings(user, std::slice::from_ref(&entry))?;
        Ok(rated.first().map(SongView::from))
    }

    /// Distinct artists, locale ordered
    pub fn artists(&self, user: &User) -> QueryResult<Vec<String>> {
        let entries = self.accessible_entries(&user.vpaths)?;
        let mut seen = HashSet::new();
        let mut artists: Vec<String> = entries
            .into_iter()
            .filter_map(|e| e.artist)
            .filter(|a| seen.insert(a.clone()))
            .collect();
        artists.sort_by(|a, b| locale_cmp(a, b));
        Ok(artists)
    }

    /// Distinct albums, locale ordered, each with the first row's cover
    pub fn albums(&self, user: &User) -> QueryResult<Vec<AlbumSummary>> {
        let entries = self.accessible_entries(&user.vpaths)?;
        let mut seen = HashSet::new();
        let mut albums = Vec::new();
        for entry in entries {
            let Some(album) = entry.album else { continue };
            if seen.insert(album.clone()) {
                albums.push(AlbumSummary {
                    name: Some(album),
                    album_art_file: entry.album_art,
                });
            }
        }
        albums.sort_by(|a, b| {
            locale_cmp(
                a.name.as_deref().unwrap_or_default(),
                b.name.as_deref().unwrap_or_default(),
            )
        });
        Ok(albums)
    }

    /// Albums of one artist, newest first
    pub fn artist_albums(&self, user: &User, artist: &str) -> QueryResult<Vec<AlbumSummary>> {
        let mut entries: Vec<CatalogEntry> = self
            .accessible_entries(&user.vpaths)?
            .into_iter()
            .filter(|e| e.artist.as_deref() == Some(artist))
            .collect();
        entries.sort_by(|a, b| b.year.cmp(&a.year));

        let mut seen = HashSet::new();
        Ok(entries
            .into_iter()
            .filter(|e| seen.insert(e.album.clone()))
            .map(|e| AlbumSummary {
                name: e.album,
                album_art_file: e.album_art,
            })
            .collect())
    }

    /// Songs of one album ordered by disk, track and path
    pub fn album_songs(&self, user: &User, album: Option<&str>, artist: Option<&str>) -> QueryResult<Vec<SongView>> {
        let mut entries: Vec<CatalogEntry> = self
            .accessible_entries(&user.vpaths)?
            .into_iter()
            .filter(|e| e.album.as_deref() == album)
            .filter(|e| artist.map_or(true, |a| e.artist.as_deref() == Some(a)))
            .collect();
        entries.sort_by(|a, b| {
            a.disk
                .cmp(&b.disk)
                .then_with(|| a.track.cmp(&b.track))
                .then_with(|| a.filepath.cmp(&b.filepath))
        });

        let rated = self.attach_ratings(user, &entries)?;
        Ok(rated.iter().map(SongView::from).collect())
    }

    /// Case-insensitive substring search
    pub fn search(&self, user: &User, request: &SearchRequest) -> QueryResult<SearchResults> {
        if request.query.is_empty() {
            return Err(QueryError::BadInput("empty search".to_string()));
        }
        let entries = self.accessible_entries(&user.vpaths)?;
        let needle = request.query.to_lowercase();
        let hit = |field: Option<&str>| field.is_some_and(|f| f.to_lowercase().contains(&needle));

        let mut results = SearchResults::default();
        if request.artists {
            results.artists = collect_hits(&entries, |e| {
                let artist = e.artist.as_deref();
                hit(artist).then(|| (artist.unwrap_or_default().to_string(), None))
            });
        }
        if request.albums {
            results.albums = collect_hits(&entries, |e| {
                let album = e.album.as_deref();
                hit(album).then(|| (album.unwrap_or_default().to_string(), None))
            });
        }
        if request.files {
            results.files = collect_hits(&entries, |e| {
                hit(Some(e.filepath.as_str())).then(|| {
                    let path = e.public_path();
                    (path.clone(), Some(path))
                })
            });
        }
        if request.titles {
            results.title = collect_hits(&entries, |e| {
                hit(e.title.as_deref()).then(|| {
                    let title = e.title.as_deref().unwrap_or_default();
                    let name = match &e.artist {
                        Some(artist) => format!("{} - {}", artist, title),
                        None => title.to_string(),
                    };
                    (name, Some(e.public_path()))
                })
            });
        }
        Ok(results)
    }

    /// Most recently ingested songs first
    pub fn recently_added(&self, user: &User, limit: Option<i64>) -> QueryResult<Vec<SongView>> {
        let mut entries: Vec<CatalogEntry> = self
            .accessible_entries(&user.vpaths)?
            .into_iter()
            .filter(|e| e.ingested_at > 0)
            .collect();
        entries.sort_by(|a, b| b.ingested_at.cmp(&a.ingested_at));
        entries.truncate(effective_limit(limit));

        let rated = self.attach_ratings(user, &entries)?;
        Ok(rated.iter().map(SongView::from).collect())
    }

    /// Metadata of one `vpath/path`; an empty block when it is not catalogued
    pub fn metadata(&self, user: &User, filepath: &str) -> QueryResult<SongView> {
        let info = user.resolve(filepath)?;
        let view = self.song_view(user, &info)?;
        Ok(SongView {
            filepath: filepath.to_string(),
            metadata: view.map(|v| v.metadata).unwrap_or_default(),
        })
    }

    /// Number of catalogued files in the caller's vpaths
    pub fn song_count(&self, user: &User) -> QueryResult<u64> {
        match &self.catalog {
            Some(catalog) => Ok(catalog.count_for_vpaths(&user.vpaths)?),
            None => Ok(0),
        }
    }
}

/// Build hits in catalog order, keeping the first row per rendered name
fn collect_hits<F>(entries: &[CatalogEntry], mut render: F) -> Vec<SearchHit>
where
    F: FnMut(&CatalogEntry) -> Option<(String, Option<String>)>,
{
    let mut seen = HashSet::new();
    let mut hits = Vec::new();
    for entry in entries {
        let Some((name, filepath)) = render(entry) else { continue };
        if seen.insert(name.clone()) {
            hits.push(SearchHit {
                name,
                album_art_file: entry.album_art.clone(),
                filepath,
            });
        }
    }
    hits
}

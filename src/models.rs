//! Core data models for the catalog

use serde::{Deserialize, Serialize};

/// A `{no, of}` pair used for track and disk numbering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NumberPair {
    /// Position within the set
    pub no: Option<u32>,
    /// Size of the set
    pub of: Option<u32>,
}

impl NumberPair {
    /// Create a pair
    pub fn new(no: Option<u32>, of: Option<u32>) -> Self {
        Self { no, of }
    }
}

/// Persisted metadata record for one media file within one vpath
///
/// Unique key is `(vpath, filepath)`. `hash` joins to per-user overlay rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Virtual library path
    pub vpath: String,
    /// Path relative to the vpath root, forward-slash separated
    pub filepath: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub track: NumberPair,
    pub disk: NumberPair,
    pub year: Option<i32>,
    /// File extension as found on disk
    pub format: String,
    /// Modification time, milliseconds since the UNIX epoch
    pub modified: i64,
    /// Content hash (MD5 hex)
    pub hash: String,
    /// Album art pointer, relative to the vpath root or the art directory
    #[serde(rename = "aaFile", skip_serializing_if = "Option::is_none")]
    pub album_art: Option<String>,
    /// Ingestion time, milliseconds since the UNIX epoch
    #[serde(rename = "ts")]
    pub ingested_at: i64,
}

impl CatalogEntry {
    /// File name component of the relative path
    pub fn file_name(&self) -> &str {
        self.filepath.rsplit('/').next().unwrap_or(&self.filepath)
    }

    /// `vpath/filepath` as exposed to callers
    pub fn public_path(&self) -> String {
        format!("{}/{}", self.vpath, self.filepath).replace('\\', "/")
    }
}

/// Per-user rating keyed by content hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRow {
    pub hash: String,
    pub user: String,
    pub rating: u8,
}

/// One song within a named playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    /// Store-assigned record id
    pub id: i64,
    pub name: String,
    /// `vpath/relative` path as supplied by the caller
    pub filepath: String,
    pub user: String,
}

/// Classification of a file relative to the prior snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    /// Not in the snapshot
    New,
    /// Only the album art pointer changed
    ArtUpdate,
    /// Modification time changed; delete and reinsert
    Stale,
    /// Same modification time and album art pointer
    Unchanged,
}

impl FileStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::New => "new",
            FileStatus::ArtUpdate => "art-update",
            FileStatus::Stale => "stale",
            FileStatus::Unchanged => "unchanged",
        }
    }
}

/// Counters for one completed synchronization pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Catalogued-extension files seen on disk
    pub scanned: u64,
    pub new: u64,
    pub stale: u64,
    pub art_updated: u64,
    pub unchanged: u64,
    /// Snapshot rows not seen on disk
    pub removed: u64,
    /// Rows successfully inserted
    pub inserted: u64,
    /// Files whose hashing or insert failed
    pub insert_failures: u64,
    /// Files that vanished or stopped being regular files before extraction
    pub skipped: u64,
    /// Total pass duration in milliseconds
    pub duration_ms: u64,
}

impl SyncReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of store mutations issued
    pub fn mutation_count(&self) -> u64 {
        self.art_updated + self.stale + self.removed + self.inserted
    }

    /// Whether the pass changed nothing
    pub fn is_noop(&self) -> bool {
        self.mutation_count() == 0
    }
}

//! Incremental media catalog synchronizer and catalog query layer
//!
//! The sync side walks one vpath root, diffs it against the stored snapshot
//! and reconciles the SQLite catalog. The query side reads the catalog and a
//! separate overlay store holding per-user ratings and playlists.

pub mod album_art;
pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod join;
pub mod models;
pub mod overlay;
pub mod playlists;
pub mod progress;
pub mod query;
pub mod ratings;
pub mod scanner;
pub mod sync;

pub use album_art::AlbumArtResolver;
pub use config::ScanJobConfig;
pub use db::{CatalogStore, SqliteCatalog};
pub use error::{QueryError, QueryResult, ScanError, ScanErrorKind};
pub use extractor::{LoftyTagReader, MetadataExtractor, TagReader};
pub use models::{CatalogEntry, FileStatus, NumberPair, PlaylistRecord, RatingRow, SyncReport};
pub use overlay::OverlayStore;
pub use playlists::PlaylistItem;
pub use progress::{ProgressReporter, SyncPhase};
pub use query::{
    AlbumSummary, Library, SearchHit, SearchRequest, SearchResults, SongMetadata, SongView, User,
    VPathInfo,
};
pub use ratings::{RandomPick, RandomRequest, RateOutcome, RatedSong};
pub use sync::{run_job, SyncJob};

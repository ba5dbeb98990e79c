//! Directory scanner - walks a vpath root and classifies files against the prior snapshot

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path};
use std::time::Instant;
use walkdir::WalkDir;

use crate::album_art::{extension_of, relative_to, AlbumArtResolver};
use crate::config::ScanJobConfig;
use crate::models::{CatalogEntry, FileStatus};
use crate::progress::{ProgressReporter, SyncPhase, SyncProgress};

/// Working snapshot: relative path to the catalog row it was loaded from
pub type Snapshot = HashMap<String, CatalogEntry>;

/// Delta produced by one walk
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Relative paths not in the snapshot
    pub new: Vec<String>,
    /// Relative paths whose modification time changed
    pub stale: Vec<String>,
    /// Rows whose album art pointer changed, already carrying the new pointer
    pub art_updates: Vec<CatalogEntry>,
    /// Relative paths in the snapshot that were not seen on disk
    pub removed: Vec<String>,
    /// Catalogued-extension files seen
    pub scanned: u64,
    pub unchanged: u64,
    /// Directories walked
    pub dirs: u64,
}

impl ScanOutcome {
    /// Paths that need extraction and insertion, in discovery order
    pub fn to_ingest(&self) -> impl Iterator<Item = &String> {
        self.new.iter().chain(self.stale.iter())
    }

    /// Paths whose rows must be deleted
    pub fn to_delete(&self) -> impl Iterator<Item = &String> {
        self.stale.iter().chain(self.removed.iter())
    }
}

/// Modification time in milliseconds since the UNIX epoch
pub fn modified_millis(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Forward-slash path of `path` below `root`, if it survives the round trip
///
/// Names that are not valid UTF-8 or contain a backslash cannot be joined back
/// onto the root unchanged, so they have no catalog path.
pub fn catalog_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str()?;
                if part.contains('\\') {
                    return None;
                }
                parts.push(part);
            }
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

/// Classify one file seen on disk against its snapshot row
///
/// A changed modification time wins over an album art change, since the
/// reinsert picks up the new pointer anyway. The pointer only counts as
/// changed when the directory resolved to some image.
pub fn classify(previous: Option<&CatalogEntry>, modified: i64, album_art: Option<&str>) -> FileStatus {
    let Some(previous) = previous else {
        return FileStatus::New;
    };
    if previous.modified != modified {
        return FileStatus::Stale;
    }
    match album_art {
        Some(art) if previous.album_art.as_deref() != Some(art) => FileStatus::ArtUpdate,
        _ => FileStatus::Unchanged,
    }
}

/// Walk `root`, consuming matched rows out of `snapshot`
///
/// Unreadable directories and files are skipped silently. Whatever is left in
/// the snapshot after the walk is reported as removed, and the snapshot is
/// left empty.
pub fn scan_directory(
    root: &Path,
    snapshot: &mut Snapshot,
    resolver: &mut AlbumArtResolver,
    reporter: &ProgressReporter,
) -> ScanOutcome {
    let start = Instant::now();
    let mut outcome = ScanOutcome::default();
    let mut current_dir = String::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Skipping unreadable path {:?}: {}", e.path(), e);
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            outcome.dirs += 1;
            current_dir = relative_to(root, path);
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        if !ScanJobConfig::should_include_extension(extension_of(&file_name)) {
            continue;
        }
        let Some(relative) = catalog_path(root, path) else {
            log::warn!("Skipping {:?}: name cannot be stored as a catalog path", path);
            continue;
        };

        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("Cannot stat {:?}: {}", path, e);
                continue;
            }
        };

        let album_art = path.parent().and_then(|dir| resolver.resolve(dir));
        outcome.scanned += 1;

        let previous = snapshot.remove(&relative);
        let status = classify(previous.as_ref(), modified_millis(&metadata), album_art.as_deref());
        log::debug!("{} {}", status.as_str(), relative);
        match status {
            FileStatus::New => outcome.new.push(relative),
            FileStatus::Stale => outcome.stale.push(relative),
            FileStatus::ArtUpdate => {
                log::info!("New cover file {:?} for {}", album_art, relative);
                if let Some(mut row) = previous {
                    row.album_art = album_art;
                    outcome.art_updates.push(row);
                }
            }
            FileStatus::Unchanged => outcome.unchanged += 1,
        }

        reporter.report_progress(&SyncProgress {
            phase: SyncPhase::Scan,
            examined: outcome.scanned,
            new: outcome.new.len() as u64,
            stale: outcome.stale.len() as u64,
            art_updates: outcome.art_updates.len() as u64,
            current_dir: current_dir.clone(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        });
    }

    let mut removed: Vec<String> = snapshot.drain().map(|(path, _)| path).collect();
    removed.sort();
    outcome.removed = removed;
    outcome
}

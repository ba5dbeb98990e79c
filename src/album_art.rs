//! Per-directory album art heuristic

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ScanJobConfig;

/// Picks one representative image per directory
///
/// Results are memoized for the lifetime of the resolver, which is one scan.
#[derive(Debug)]
pub struct AlbumArtResolver {
    /// Root the returned pointers are relative to
    root: PathBuf,
    /// Whether resolution is enabled at all
    enabled: bool,
    cache: HashMap<PathBuf, Option<String>>,
}

impl AlbumArtResolver {
    /// Create a resolver for the given vpath root
    pub fn new(root: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            root: root.into(),
            enabled,
            cache: HashMap::new(),
        }
    }

    /// Create a resolver from a job config
    pub fn for_job(config: &ScanJobConfig) -> Self {
        Self::new(config.root_directory.clone(), !config.skip_album_art)
    }

    /// Resolve the album art for `dir`, relative to the root
    ///
    /// Returns `None` when the directory holds no image or resolution is off.
    pub fn resolve(&mut self, dir: &Path) -> Option<String> {
        if !self.enabled {
            return None;
        }
        if let Some(cached) = self.cache.get(dir) {
            return cached.clone();
        }

        let picked = pick_album_art(&list_images(dir)).map(|name| {
            let full = dir.join(name);
            relative_to(&self.root, &full)
        });
        self.cache.insert(dir.to_path_buf(), picked.clone());
        picked
    }

    /// Number of directories resolved so far
    pub fn cached_dirs(&self) -> usize {
        self.cache.len()
    }
}

/// Image file names directly inside `dir`, in listing order
///
/// Listing order is byte order of the file names. Unreadable directories and
/// entries are treated as absent.
pub fn list_images(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot list {:?} for album art: {}", dir, e);
            return Vec::new();
        }
    };

    let allowed = ScanJobConfig::album_art_extensions();
    let mut images: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| fs::metadata(entry.path()).map(|m| !m.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| allowed.contains(extension_of(name)))
        .collect();
    images.sort();
    images
}

/// Choose an image out of a directory listing
///
/// One image wins outright; with several, the first whose lowercase name
/// contains "front" wins, falling back to the first image.
pub fn pick_album_art(images: &[String]) -> Option<&str> {
    match images {
        [] => None,
        [only] => Some(only.as_str()),
        _ => images
            .iter()
            .find(|name| name.to_lowercase().contains("front"))
            .or_else(|| images.first())
            .map(String::as_str),
    }
}

/// Text after the last dot, or the whole name when there is none
pub(crate) fn extension_of(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Forward-slash path of `path` relative to `root`
pub(crate) fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

//! Configuration for one synchronization job

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::ScanError;

/// Default catalog autosave interval in milliseconds
pub const DEFAULT_SAVE_INTERVAL_MS: u64 = 1000;

/// Default pause between files in milliseconds
pub const DEFAULT_PAUSE_MS: u64 = 0;

/// Default interval between progress events in milliseconds
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Parameters of a single synchronization invocation
///
/// Deserialised from the job's JSON argument:
///
/// ```json
/// {
///   "vpath": "metal",
///   "directory": "/path/to/metal/music",
///   "dbPath": "/path/to/files.db",
///   "pause": 500,
///   "saveInterval": 1000,
///   "skipImg": true,
///   "albumArtDirectory": "/album/art/dir"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJobConfig {
    /// Virtual library path the scanned files are filed under
    pub vpath: String,

    /// Root directory mapped to the vpath
    #[serde(rename = "directory")]
    pub root_directory: PathBuf,

    /// Catalog database file
    #[serde(rename = "dbPath")]
    pub store_path: PathBuf,

    /// Pause after each ingested file, in milliseconds
    #[serde(rename = "pause", default)]
    pub inter_file_pause_ms: u64,

    /// Catalog autosave interval, in milliseconds
    #[serde(rename = "saveInterval", default = "default_save_interval")]
    pub save_interval_ms: u64,

    /// Skip album art resolution and embedded cover reading
    #[serde(rename = "skipImg", default)]
    pub skip_album_art: bool,

    /// Where embedded covers are extracted to
    #[serde(
        rename = "albumArtDirectory",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub album_art_directory: Option<PathBuf>,
}

fn default_save_interval() -> u64 {
    DEFAULT_SAVE_INTERVAL_MS
}

impl Default for ScanJobConfig {
    fn default() -> Self {
        Self {
            vpath: String::new(),
            root_directory: PathBuf::new(),
            store_path: PathBuf::new(),
            inter_file_pause_ms: DEFAULT_PAUSE_MS,
            save_interval_ms: DEFAULT_SAVE_INTERVAL_MS,
            skip_album_art: false,
            album_art_directory: None,
        }
    }
}

impl ScanJobConfig {
    /// Create a config builder
    pub fn builder() -> ScanJobConfigBuilder {
        ScanJobConfigBuilder::new()
    }

    /// Parse and validate the job's JSON argument
    pub fn from_json(raw: &str) -> Result<Self, ScanError> {
        let config: ScanJobConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations missing a required field
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.vpath.trim().is_empty() {
            return Err(ScanError::config_error("vpath must not be empty"));
        }
        if self.root_directory.as_os_str().is_empty() {
            return Err(ScanError::config_error("directory must not be empty"));
        }
        if self.store_path.as_os_str().is_empty() {
            return Err(ScanError::config_error("dbPath must not be empty"));
        }
        Ok(())
    }

    /// Audio file extensions that are catalogued
    pub fn audio_extensions() -> HashSet<String> {
        ["mp3", "flac", "wav", "ogg", "aac", "m4a", "opus"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Image extensions considered album art
    ///
    /// Matched case-sensitively, so `Cover.Jpg` is not picked up.
    pub fn album_art_extensions() -> HashSet<String> {
        ["png", "jpg", "PNG", "JPG"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Check if a file extension is catalogued (case-insensitive)
    pub fn should_include_extension(ext: &str) -> bool {
        Self::audio_extensions().contains(&ext.to_lowercase())
    }

    /// Whether the job pauses between files
    pub fn has_pause(&self) -> bool {
        self.inter_file_pause_ms > 0
    }
}

/// Builder for ScanJobConfig
#[derive(Debug, Default)]
pub struct ScanJobConfigBuilder {
    config: ScanJobConfig,
}

impl ScanJobConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the vpath
    pub fn vpath(mut self, vpath: impl Into<String>) -> Self {
        self.config.vpath = vpath.into();
        self
    }

    /// Set the root directory
    pub fn root_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.root_directory = dir.into();
        self
    }

    /// Set the catalog database path
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store_path = path.into();
        self
    }

    /// Set the pause between files
    pub fn inter_file_pause_ms(mut self, pause: u64) -> Self {
        self.config.inter_file_pause_ms = pause;
        self
    }

    /// Set the autosave interval
    pub fn save_interval_ms(mut self, interval: u64) -> Self {
        self.config.save_interval_ms = interval;
        self
    }

    /// Enable or disable album art handling
    pub fn skip_album_art(mut self, skip: bool) -> Self {
        self.config.skip_album_art = skip;
        self
    }

    /// Set the embedded cover output directory
    pub fn album_art_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.album_art_directory = Some(dir.into());
        self
    }

    /// Build the config
    pub fn build(self) -> ScanJobConfig {
        self.config
    }
}

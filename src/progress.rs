//! JSON-lines progress events for the sync job
//!
//! Each line is one event object: `{"_t": kind, "seq": n, "ts": ms, ...body}`.
//! `seq` increases by one per emitted line and `ts` counts milliseconds since
//! the reporter was created. Progress lines are throttled to one per interval;
//! start, error and done lines are never throttled.

use serde::Serialize;
use std::cell::Cell;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::config::ScanJobConfig;
use crate::error::ScanError;
use crate::models::SyncReport;

/// Named checkpoints of a synchronization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Load,
    Scan,
    Update,
    Delete,
    Ingest,
    Save,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Load => "load",
            SyncPhase::Scan => "scan",
            SyncPhase::Update => "update",
            SyncPhase::Delete => "delete",
            SyncPhase::Ingest => "ingest",
            SyncPhase::Save => "save",
        }
    }
}

/// Running counters of a pass, as sampled for a progress line
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    /// Files examined in the current phase
    #[serde(rename = "f")]
    pub examined: u64,
    #[serde(rename = "n")]
    pub new: u64,
    #[serde(rename = "s")]
    pub stale: u64,
    #[serde(rename = "a")]
    pub art_updates: u64,
    /// Directory being walked, relative to the root
    #[serde(rename = "dir")]
    pub current_dir: String,
    #[serde(rename = "ms")]
    pub elapsed_ms: u64,
}

#[derive(Serialize)]
struct StartEvent<'a> {
    vpath: &'a str,
    root: String,
    pause: u64,
    #[serde(rename = "skipImg")]
    skip_img: bool,
}

#[derive(Serialize)]
struct ErrorEvent {
    error_type: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "_t")]
    kind: &'static str,
    seq: u64,
    ts: u64,
    #[serde(flatten)]
    body: &'a T,
}

/// Writes progress events to stderr when enabled
pub struct ProgressReporter {
    enabled: bool,
    interval_ms: u64,
    last_progress: Cell<Instant>,
    seq: AtomicU64,
    created: Instant,
}

impl ProgressReporter {
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        let now = Instant::now();
        Self {
            enabled,
            interval_ms,
            last_progress: Cell::new(now),
            seq: AtomicU64::new(0),
            created: now,
        }
    }

    /// A reporter that never writes
    pub fn disabled() -> Self {
        Self::new(false, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a progress line may be written now
    pub fn progress_due(&self) -> bool {
        self.enabled && self.last_progress.get().elapsed().as_millis() as u64 >= self.interval_ms
    }

    /// Serialize one event, consuming a sequence number
    fn render<T: Serialize>(&self, kind: &'static str, body: &T) -> Option<String> {
        let envelope = Envelope {
            kind,
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            ts: self.created.elapsed().as_millis() as u64,
            body,
        };
        match serde_json::to_string(&envelope) {
            Ok(line) => Some(line),
            Err(e) => {
                log::debug!("Dropping {} event: {}", kind, e);
                None
            }
        }
    }

    fn emit<T: Serialize>(&self, kind: &'static str, body: &T) {
        if !self.enabled {
            return;
        }
        if let Some(line) = self.render(kind, body) {
            let mut stderr = std::io::stderr().lock();
            writeln!(stderr, "{}", line).ok();
            stderr.flush().ok();
        }
    }

    pub fn report_start(&self, config: &ScanJobConfig) {
        self.emit(
            "start",
            &StartEvent {
                vpath: &config.vpath,
                root: config.root_directory.to_string_lossy().into_owned(),
                pause: config.inter_file_pause_ms,
                skip_img: config.skip_album_art,
            },
        );
    }

    /// Write a progress line if one is due; returns whether it was written
    pub fn report_progress(&self, progress: &SyncProgress) -> bool {
        if !self.progress_due() {
            return false;
        }
        self.emit("p", progress);
        self.last_progress.set(Instant::now());
        true
    }

    pub fn report_error(&self, error: &ScanError) {
        self.emit(
            "err",
            &ErrorEvent {
                error_type: format!("{:?}", error.kind),
                message: error.message.clone(),
                path: error.path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            },
        );
    }

    pub fn report_done(&self, report: &SyncReport) {
        self.emit("done", report);
    }
}

//! Catalog reconciler - one sequential synchronization pass over a vpath
//!
//! The pass runs through fixed checkpoints: open the store, load the vpath
//! snapshot, walk the tree, apply album art updates, delete stale and removed
//! rows, ingest new and stale files one at a time, then save. All mutable
//! state of a pass lives in [`SyncJob`], which is owned by exactly one
//! invocation. Two passes over the same vpath must not overlap; callers are
//! responsible for serializing them.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::album_art::AlbumArtResolver;
use crate::config::ScanJobConfig;
use crate::db::{CatalogStore, SqliteCatalog};
use crate::error::ScanError;
use crate::extractor::{LoftyTagReader, MetadataExtractor, TagReader};
use crate::models::SyncReport;
use crate::progress::{ProgressReporter, SyncPhase, SyncProgress};
use crate::scanner::{scan_directory, ScanOutcome, Snapshot};

/// Open the catalog named by `config` and run one pass with the lofty reader
///
/// Fails only when the store cannot be opened, loaded or saved.
pub fn run_job(config: &ScanJobConfig, reporter: &ProgressReporter) -> Result<SyncReport, ScanError> {
    let mut store = SqliteCatalog::open(&config.store_path, config.save_interval_ms)?;
    SyncJob::new(config, &mut store, LoftyTagReader, reporter).run()
}

/// State of one synchronization pass
pub struct SyncJob<'a, S: CatalogStore, R: TagReader> {
    config: &'a ScanJobConfig,
    store: &'a mut S,
    extractor: MetadataExtractor<'a, R>,
    resolver: AlbumArtResolver,
    snapshot: Snapshot,
    reporter: &'a ProgressReporter,
    report: SyncReport,
}

impl<'a, S: CatalogStore, R: TagReader> SyncJob<'a, S, R> {
    /// Create a pass over an already opened store
    pub fn new(
        config: &'a ScanJobConfig,
        store: &'a mut S,
        reader: R,
        reporter: &'a ProgressReporter,
    ) -> Self {
        Self {
            config,
            store,
            extractor: MetadataExtractor::new(config, reader),
            resolver: AlbumArtResolver::for_job(config),
            snapshot: Snapshot::new(),
            reporter,
            report: SyncReport::new(),
        }
    }

    /// Run the pass to completion
    pub fn run(mut self) -> Result<SyncReport, ScanError> {
        let start = Instant::now();
        self.reporter.report_start(self.config);
        log::info!(
            "Syncing vpath {} from {:?}",
            self.config.vpath,
            self.config.root_directory
        );

        self.checkpoint(SyncPhase::Load, start);
        self.load_snapshot()?;

        self.checkpoint(SyncPhase::Scan, start);
        let outcome = scan_directory(
            &self.config.root_directory,
            &mut self.snapshot,
            &mut self.resolver,
            self.reporter,
        );
        self.report.scanned = outcome.scanned;
        self.report.new = outcome.new.len() as u64;
        self.report.stale = outcome.stale.len() as u64;
        self.report.unchanged = outcome.unchanged;
        self.report.removed = outcome.removed.len() as u64;
        log::info!(
            "Scan of {} found {} new, {} stale, {} art updates, {} removed, {} unchanged",
            self.config.vpath,
            outcome.new.len(),
            outcome.stale.len(),
            outcome.art_updates.len(),
            outcome.removed.len(),
            outcome.unchanged
        );

        self.checkpoint(SyncPhase::Update, start);
        self.apply_art_updates(&outcome);
        self.checkpoint(SyncPhase::Delete, start);
        self.apply_deletes(&outcome);
        self.checkpoint(SyncPhase::Ingest, start);
        self.ingest(&outcome, start);

        self.checkpoint(SyncPhase::Save, start);
        self.store.save()?;

        self.report.duration_ms = start.elapsed().as_millis() as u64;
        self.reporter.report_done(&self.report);
        log::info!(
            "Sync of {} finished in {}ms: {} inserted, {} failed",
            self.config.vpath,
            self.report.duration_ms,
            self.report.inserted,
            self.report.insert_failures
        );
        Ok(self.report)
    }

    fn load_snapshot(&mut self) -> Result<(), ScanError> {
        for entry in self.store.entries_for_vpath(&self.config.vpath)? {
            self.snapshot.insert(entry.filepath.clone(), entry);
        }
        log::debug!("Loaded {} catalog rows", self.snapshot.len());
        Ok(())
    }

    fn apply_art_updates(&mut self, outcome: &ScanOutcome) {
        if outcome.art_updates.is_empty() {
            return;
        }
        match self.store.batch_update(&outcome.art_updates) {
            Ok(()) => self.report.art_updated = outcome.art_updates.len() as u64,
            Err(e) => self.non_fatal("Album art update failed", e),
        }
    }

    fn apply_deletes(&mut self, outcome: &ScanOutcome) {
        for filepath in outcome.to_delete() {
            if let Err(e) = self.store.delete(&self.config.vpath, filepath) {
                self.non_fatal("Delete failed", e.with_path(filepath));
            }
        }
    }

    fn ingest(&mut self, outcome: &ScanOutcome, start: Instant) {
        let pause = Duration::from_millis(self.config.inter_file_pause_ms);
        let mut examined = 0u64;

        for filepath in outcome.to_ingest() {
            let full_path = self.config.root_directory.join(filepath);
            self.ingest_file(&full_path);

            examined += 1;
            self.reporter.report_progress(&SyncProgress {
                phase: SyncPhase::Ingest,
                examined,
                new: self.report.new,
                stale: self.report.stale,
                art_updates: self.report.art_updated,
                current_dir: filepath.clone(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            });

            if self.config.has_pause() {
                std::thread::sleep(pause);
            }
        }
    }

    /// Extract, hash and insert one file; failures only affect this file
    fn ingest_file(&mut self, full_path: &Path) {
        let album_art = full_path.parent().and_then(|dir| self.resolver.resolve(dir));

        let entry = match self.extractor.extract(full_path, album_art) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.report.skipped += 1;
                return;
            }
            Err(e) => {
                self.report.insert_failures += 1;
                self.non_fatal("Failed to hash file", e);
                return;
            }
        };

        match self.store.insert(std::slice::from_ref(&entry), &self.config.vpath) {
            Ok(()) => self.report.inserted += 1,
            Err(e) => {
                self.report.insert_failures += 1;
                self.non_fatal("Failed to add file to catalog", e.with_path(full_path));
            }
        }
    }

    fn checkpoint(&self, phase: SyncPhase, start: Instant) {
        log::debug!("Checkpoint {} after {}ms", phase.as_str(), start.elapsed().as_millis());
    }

    fn non_fatal(&self, context: &str, error: ScanError) {
        log::warn!("{}: {}", context, error);
        self.reporter.report_error(&error);
    }
}

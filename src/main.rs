//! Catalog sync job
//!
//! One-shot synchronization of a single vpath. Exits with 0 when the pass
//! completes and 1 when the job configuration cannot be parsed or the
//! catalog store fails.

use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::process::ExitCode;

use catalog_sync::config::DEFAULT_PROGRESS_INTERVAL_MS;
use catalog_sync::{run_job, ProgressReporter, ScanJobConfig};

/// Synchronize one vpath of the media catalog
#[derive(Parser)]
#[command(name = "catalog_sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit JSON-lines progress on stderr
    #[arg(long)]
    progress: bool,

    /// Job configuration as JSON:
    /// {"vpath", "directory", "dbPath", "pause", "saveInterval", "skipImg", "albumArtDirectory"}
    config: String,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match ScanJobConfig::from_json(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid job configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Catalog: {:?}", config.store_path);
    if config.has_pause() {
        info!("Pause between files: {}ms", config.inter_file_pause_ms);
    }

    let reporter = ProgressReporter::new(cli.progress, DEFAULT_PROGRESS_INTERVAL_MS);

    match run_job(&config, &reporter) {
        Ok(report) => {
            info!(
                "Sync of {} finished: {} scanned, {} inserted, {} removed, {} art updates in {}ms",
                config.vpath,
                report.scanned,
                report.inserted,
                report.removed,
                report.art_updated,
                report.duration_ms
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Sync of {} failed: {}", config.vpath, e);
            reporter.report_error(&e);
            ExitCode::FAILURE
        }
    }
}

//! Offline pass that turns a recording's ledger into playable files.
//!
//! The ledger is split into runs of consecutive indices, each run gets its own
//! local VOD playlist and is remuxed into a separate container, so a gap in the
//! source never gets silently concatenated.

mod manifest;
mod remux;
mod runs;

pub use manifest::{manifest_file_name, render_manifest, write_manifest};
pub use remux::{FfmpegRemuxer, Remuxer};
pub use runs::{PlaylistRun, partition_runs};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::MergeConfig;
use crate::error::{RecorderError, Result};
use crate::ledger::{ledger_path, read_entries};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Remuxed,
    /// Dry run: only the playlist was written
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub first_index: u64,
    pub last_index: u64,
    pub segments: usize,
    /// Segments listed in the ledger whose file is missing from the destination
    pub missing: usize,
    pub manifest: PathBuf,
    pub output: PathBuf,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub runs: Vec<RunReport>,
}

impl MergeReport {
    /// True when every run was remuxed (or skipped by a dry run).
    pub fn is_success(&self) -> bool {
        self.runs
            .iter()
            .all(|run| !matches!(run.outcome, RunOutcome::Failed(_)))
    }

    pub fn failed_runs(&self) -> impl Iterator<Item = &RunReport> {
        self.runs
            .iter()
            .filter(|run| matches!(run.outcome, RunOutcome::Failed(_)))
    }
}

pub struct MergeEngine {
    config: MergeConfig,
    remuxer: Arc<dyn Remuxer>,
}

impl MergeEngine {
    /// Engine remuxing through ffmpeg as configured.
    pub fn new(config: MergeConfig) -> Self {
        let remuxer = Arc::new(FfmpegRemuxer::new(&config));
        Self::with_remuxer(config, remuxer)
    }

    pub fn with_remuxer(config: MergeConfig, remuxer: Arc<dyn Remuxer>) -> Self {
        Self { config, remuxer }
    }

    fn output_path(&self, destination: &Path, run: &PlaylistRun) -> PathBuf {
        let extension = self.config.extension.trim_start_matches('.');
        destination.join(format!("{}.{}", run.file_stem(), extension))
    }

    /// Merges the recording under `destination`.
    ///
    /// A failed remux is recorded in the report and does not stop the
    /// remaining runs; only an unreadable ledger or playlist write aborts.
    pub async fn run(&self, destination: &Path) -> Result<MergeReport> {
        let ledger = ledger_path(destination);
        let entries = read_entries(&ledger).await?;
        if entries.is_empty() {
            warn!(ledger = %ledger.display(), "Ledger is empty, nothing to merge");
            return Ok(MergeReport::default());
        }

        let runs = partition_runs(entries);
        info!(
            runs = runs.len(),
            destination = %destination.display(),
            "Merging recorded segments"
        );

        let mut report = MergeReport::default();
        for run in &runs {
            report.runs.push(self.merge_run(destination, run).await?);
        }

        let failed = report.failed_runs().count();
        if failed > 0 {
            error!(failed, total = report.runs.len(), "Some runs failed to remux");
        } else {
            info!(total = report.runs.len(), "Merge finished");
        }
        Ok(report)
    }

    async fn merge_run(&self, destination: &Path, run: &PlaylistRun) -> Result<RunReport> {
        let missing = count_missing(destination, run).await?;
        if missing > 0 {
            warn!(
                first = run.first_index(),
                last = run.last_index(),
                missing,
                "Run references segments that were never downloaded"
            );
        }

        let manifest = write_manifest(destination, run).await?;
        let output = self.output_path(destination, run);

        let outcome = if self.config.dry_run {
            info!(manifest = %manifest.display(), "Dry run, skipping remux");
            RunOutcome::Skipped
        } else {
            match self.remuxer.remux(&manifest, &output).await {
                Ok(()) => {
                    if self.config.delete_segments {
                        delete_segments(destination, run).await;
                    }
                    RunOutcome::Remuxed
                }
                Err(e) => {
                    let e = RecorderError::Remux {
                        first_index: run.first_index(),
                        reason: e.to_string(),
                    };
                    error!(error = %e, "Run remux failed");
                    RunOutcome::Failed(e.to_string())
                }
            }
        };

        Ok(RunReport {
            first_index: run.first_index(),
            last_index: run.last_index(),
            segments: run.len(),
            missing,
            manifest,
            output,
            outcome,
        })
    }
}

async fn count_missing(destination: &Path, run: &PlaylistRun) -> Result<usize> {
    let mut missing = 0;
    for segment in run.segments() {
        if !tokio::fs::try_exists(segment.file_path(destination)).await? {
            missing += 1;
        }
    }
    Ok(missing)
}

async fn delete_segments(destination: &Path, run: &PlaylistRun) {
    for segment in run.segments() {
        let path = segment.file_path(destination);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove segment file"),
        }
    }
}

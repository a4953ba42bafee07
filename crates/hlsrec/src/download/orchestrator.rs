//! Fixed-size worker pool for segment downloads.
//!
//! Submissions never block: tasks go through an unbounded channel that the
//! workers drain, and results come back over a second channel that the owner
//! classifies with non-blocking receives. Workers do not observe the recording's
//! cancellation token; aborting the pool (dropping it) abandons in-flight
//! transfers and leaves partial files behind for a later resume.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{DownloadConfig, MIN_TICK_INTERVAL};
use crate::download::task::{DownloadTask, SegmentDownloader};
use crate::error::{RecorderError, Result};
use crate::retry::RetryExhausted;
use crate::segment::Segment;

/// Terminal state of a download task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded { size: u64 },
    Failed { attempts: u32, reason: String },
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub index: u64,
    pub url: String,
    pub outcome: TaskOutcome,
}

/// Snapshot of outstanding work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    pub submitted: usize,
    pub completed: usize,
    /// Indices of permanently failed segments, in completion order
    pub failed: Vec<u64>,
    pub bytes: u64,
}

impl DownloadSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct DownloadOrchestrator {
    destination: PathBuf,
    config: DownloadConfig,
    task_tx: Option<mpsc::UnboundedSender<DownloadTask>>,
    report_rx: mpsc::UnboundedReceiver<TaskReport>,
    workers: JoinSet<()>,
    summary: DownloadSummary,
}

impl DownloadOrchestrator {
    /// Spawns `config.workers` workers sharing `downloader`.
    pub fn start(
        downloader: Arc<dyn SegmentDownloader>,
        destination: impl Into<PathBuf>,
        config: DownloadConfig,
    ) -> Self {
        let worker_count = config.workers.max(1);
        let (task_tx, task_rx) = mpsc::unbounded_channel::<DownloadTask>();
        let (report_tx, report_rx) = mpsc::unbounded_channel::<TaskReport>();
        let task_rx = Arc::new(Mutex::new(task_rx));

        info!("Starting download pool with {} workers", worker_count);

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let task_rx = Arc::clone(&task_rx);
            let report_tx = report_tx.clone();
            let downloader = Arc::clone(&downloader);
            workers.spawn(
                worker_loop(task_rx, report_tx, downloader)
                    .instrument(info_span!("worker", id = worker_id)),
            );
        }

        Self {
            destination: destination.into(),
            config,
            task_tx: Some(task_tx),
            report_rx,
            workers,
            summary: DownloadSummary::default(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Queues `segment` for download without waiting for a free worker.
    pub fn submit(&mut self, segment: Segment) -> Result<()> {
        let tx = self
            .task_tx
            .as_ref()
            .ok_or_else(|| RecorderError::internal("download pool no longer accepts tasks"))?;
        let destination = segment.file_path(&self.destination);
        let index = segment.index;
        tx.send(DownloadTask::new(segment, destination))
            .map_err(|_| RecorderError::internal("download workers are gone"))?;
        self.summary.submitted += 1;
        debug!(msn = index, "Segment submitted for download");
        Ok(())
    }

    /// Collects finished tasks without waiting and returns the running totals.
    pub fn poll_progress(&mut self) -> DownloadProgress {
        while let Ok(report) = self.report_rx.try_recv() {
            self.record(report);
        }
        self.progress()
    }

    pub fn progress(&self) -> DownloadProgress {
        let completed = self.summary.completed;
        let failed = self.summary.failed.len();
        DownloadProgress {
            pending: self.summary.submitted - completed - failed,
            completed,
            failed,
        }
    }

    /// Logs the current totals.
    pub fn report_progress(&mut self) -> DownloadProgress {
        let progress = self.poll_progress();
        info!(
            pending = progress.pending,
            completed = progress.completed,
            failed = progress.failed,
            "Download progress"
        );
        progress
    }

    /// Stops accepting tasks, waits for every submitted task to resolve and shuts
    /// the pool down.
    pub async fn finish(mut self) -> DownloadSummary {
        self.task_tx = None;
        let period = self.config.drain_interval.max(MIN_TICK_INTERVAL);
        let mut ticker = tokio::time::interval(period);

        loop {
            ticker.tick().await;
            let progress = self.report_progress();
            if progress.pending == 0 {
                break;
            }
            if self.workers.is_empty() {
                error!(
                    pending = progress.pending,
                    "Download workers exited with tasks outstanding"
                );
                break;
            }
            // Reap workers that already exited so the check above stays accurate.
            while let Some(result) = self.workers.try_join_next() {
                if let Err(e) = result {
                    error!(error = %e, "Download worker terminated abnormally");
                }
            }
        }

        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Download worker terminated abnormally");
            }
        }
        // Workers are gone; pick up anything reported after the last tick.
        self.poll_progress();

        info!(
            submitted = self.summary.submitted,
            completed = self.summary.completed,
            failed = self.summary.failed.len(),
            bytes = self.summary.bytes,
            "Download pool shut down"
        );
        self.summary
    }

    /// Abandons queued and in-flight downloads.
    pub fn abort(mut self) -> DownloadSummary {
        self.task_tx = None;
        self.workers.abort_all();
        self.poll_progress();
        warn!(
            pending = self.progress().pending,
            "Download pool aborted, in-flight segments left partial"
        );
        self.summary
    }

    fn record(&mut self, report: TaskReport) {
        match report.outcome {
            TaskOutcome::Succeeded { size } => {
                self.summary.completed += 1;
                self.summary.bytes += size;
            }
            TaskOutcome::Failed { attempts, reason } => {
                error!(
                    msn = report.index,
                    url = %report.url,
                    attempts,
                    reason = %reason,
                    "Segment permanently failed"
                );
                self.summary.failed.push(report.index);
            }
        }
    }
}

async fn worker_loop(
    task_rx: Arc<Mutex<mpsc::UnboundedReceiver<DownloadTask>>>,
    report_tx: mpsc::UnboundedSender<TaskReport>,
    downloader: Arc<dyn SegmentDownloader>,
) {
    debug!("Download worker started");
    loop {
        let task = {
            let mut rx = task_rx.lock().await;
            rx.recv().await
        };
        let Some(task) = task else {
            break;
        };

        let result = downloader.download(&task).await;
        let outcome = task_outcome(task.segment.index, result);
        let report = TaskReport {
            index: task.segment.index,
            url: task.segment.url,
            outcome,
        };
        if report_tx.send(report).is_err() {
            break;
        }
    }
    debug!("Download worker shutting down");
}

fn task_outcome(index: u64, result: std::result::Result<u64, RetryExhausted>) -> TaskOutcome {
    match result {
        Ok(size) => TaskOutcome::Succeeded { size },
        Err(exhausted) => {
            let attempts = exhausted.attempts;
            let error = RecorderError::SegmentFailed {
                index,
                attempts,
                reason: exhausted.last_error.to_string(),
            };
            TaskOutcome::Failed {
                attempts,
                reason: error.to_string(),
            }
        }
    }
}

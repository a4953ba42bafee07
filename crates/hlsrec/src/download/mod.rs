// Segment download side: per-segment resumable transfers and the worker pool running them.

mod orchestrator;
mod task;

pub use orchestrator::{
    DownloadOrchestrator, DownloadProgress, DownloadSummary, TaskOutcome, TaskReport,
};
pub use task::{DownloadTask, SegmentDownloader, SegmentFetcher};

//! Live HLS recording engine
//!
//! Records a live HLS media playlist to disk and turns the recording into
//! playable files afterwards.
//!
//! ## Component Overview
//!
//! - `hls`: playlist fetching, parsing and the polling state machine
//! - `ledger`: durable, append-only record of discovered segments
//! - `download`: resumable segment downloads on a fixed-size worker pool
//! - `merge`: per-run local playlists and remuxing through ffmpeg
//! - `recorder`: runs a whole recording for one playlist URL

pub mod config;
pub mod download;
pub mod error;
pub mod hls;
pub mod ledger;
pub mod merge;
pub mod recorder;
pub mod retry;
pub mod segment;

pub use config::{DownloadConfig, HttpConfig, MergeConfig, PollerConfig, RecorderConfig};
pub use error::{RecorderError, Result};
pub use merge::{MergeEngine, MergeReport};
pub use recorder::{Recorder, RecordingSummary};
pub use segment::Segment;

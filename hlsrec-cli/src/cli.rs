use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use hlsrec_engine::config::DEFAULT_USER_AGENT;
use hlsrec_engine::{HttpConfig, MergeConfig, RecorderConfig};

use crate::error::{AppError, Result};
use crate::params::{parse_headers, parse_params};

#[derive(Parser, Debug)]
#[command(
    name = "hlsrec",
    author,
    version,
    about = "Records live HLS streams and remuxes them into playable files"
)]
pub struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors to the console
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a live media playlist into a destination directory
    Record(RecordArgs),
    /// Remux a finished recording, one output file per contiguous run
    Merge(MergeArgs),
}

impl Commands {
    pub fn destination(&self) -> &PathBuf {
        match self {
            Commands::Record(args) => &args.destination,
            Commands::Merge(args) => &args.destination,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct RecordArgs {
    /// URL of the live media playlist
    pub url: String,

    /// Directory receiving segments, ledger and logs
    pub destination: PathBuf,

    /// Number of concurrent segment downloads
    #[arg(short = 'w', long, default_value_t = 6)]
    pub workers: usize,

    /// Seconds between two playlist refreshes
    #[arg(long, default_value_t = 2.0)]
    pub poll_interval: f64,

    /// Hard deadline for one playlist request, in seconds
    #[arg(long, default_value_t = 10)]
    pub playlist_timeout: u64,

    /// Consecutive failed playlist refreshes tolerated before giving up
    #[arg(long, default_value_t = 5)]
    pub playlist_retries: u32,

    /// Deadline for one segment request, in seconds
    #[arg(long, default_value_t = 30)]
    pub segment_timeout: u64,

    /// Retries per segment before it is marked as failed
    #[arg(long, default_value_t = 5)]
    pub segment_retries: u32,

    /// Upper bound for backoff delays, in seconds
    #[arg(long, default_value_t = 30)]
    pub backoff_cap: u64,

    /// Extra request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Query parameter appended to playlist requests, `key=value` (repeatable)
    #[arg(long = "param")]
    pub params: Vec<String>,

    /// User agent for all requests
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Do not follow HTTP redirects
    #[arg(long)]
    pub no_redirects: bool,
}

impl RecordArgs {
    pub fn to_config(&self) -> Result<RecorderConfig> {
        let mut headers = HttpConfig::get_default_headers();
        parse_headers(&self.headers, &mut headers)?;

        let mut config = RecorderConfig::new(&self.destination);
        config.http = HttpConfig {
            user_agent: self.user_agent.clone(),
            headers,
            params: parse_params(&self.params)?,
            follow_redirects: !self.no_redirects,
            ..HttpConfig::default()
        };

        config.poller.poll_interval = Duration::try_from_secs_f64(self.poll_interval)
            .map_err(|e| {
                AppError::InvalidInput(format!(
                    "invalid poll interval {}: {e}",
                    self.poll_interval
                ))
            })?;
        config.poller.request_timeout = Duration::from_secs(self.playlist_timeout);
        config.poller.max_retries = self.playlist_retries;
        config.poller.backoff_cap = Duration::from_secs(self.backoff_cap);

        config.download.workers = self.workers.max(1);
        config.download.request_timeout = Duration::from_secs(self.segment_timeout);
        config.download.max_retries = self.segment_retries;
        config.download.backoff_cap = Duration::from_secs(self.backoff_cap);
        Ok(config)
    }
}

#[derive(ClapArgs, Debug)]
pub struct MergeArgs {
    /// Directory of a previous recording
    pub destination: PathBuf,

    /// Output container extension
    #[arg(short, long, default_value = "mp4")]
    pub format: String,

    /// Path to the ffmpeg binary (defaults to $FFMPEG_PATH, then `ffmpeg`)
    #[arg(long)]
    pub ffmpeg: Option<String>,

    /// Keep existing output files instead of overwriting them
    #[arg(long)]
    pub no_overwrite: bool,

    /// Remove segment files of every successfully remuxed run
    #[arg(long)]
    pub delete_segments: bool,

    /// Only write the run playlists
    #[arg(long)]
    pub dry_run: bool,
}

impl MergeArgs {
    pub fn to_config(&self) -> MergeConfig {
        let defaults = MergeConfig::default();
        MergeConfig {
            ffmpeg_path: self.ffmpeg.clone().unwrap_or(defaults.ffmpeg_path),
            extension: self.format.clone(),
            overwrite: !self.no_overwrite,
            delete_segments: self.delete_segments,
            dry_run: self.dry_run,
        }
    }
}

use std::path::{Path, PathBuf};

use url::Url;

const DEFAULT_SEGMENT_EXTENSION: &str = "ts";

/// A media segment discovered in the live playlist.
///
/// Cheap to clone and passed by value between the poller, the queue and the workers.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Absolute media sequence number
    pub index: u64,
    /// Absolute segment URI
    pub url: String,
    /// Nominal playback duration in seconds
    pub duration: f64,
    /// Position of the segment in the recording's ledger, assigned on append
    pub entry: u64,
}

impl Segment {
    pub fn new(index: u64, url: impl Into<String>, duration: f64) -> Self {
        Self {
            index,
            url: url.into(),
            duration,
            entry: 0,
        }
    }

    pub fn with_entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }

    /// File name of the segment inside the recording destination.
    ///
    /// Zero-padded index first so a plain directory listing sorts in sequence
    /// order, then the ledger entry: a stream whose media sequence restarts
    /// reuses indices, and each recorded segment needs a file of its own.
    pub fn file_name(&self) -> String {
        format!("{:010}_{:06}.{}", self.index, self.entry, self.extension())
    }

    pub fn file_path(&self, destination: &Path) -> PathBuf {
        destination.join(self.file_name())
    }

    fn extension(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                let path = url.path();
                let name = path.rsplit('/').next()?;
                let (_, ext) = name.rsplit_once('.')?;
                if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                    None
                } else {
                    Some(ext.to_ascii_lowercase())
                }
            })
            .unwrap_or_else(|| DEFAULT_SEGMENT_EXTENSION.to_string())
    }
}

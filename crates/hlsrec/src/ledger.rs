//! Durable append-only record of discovered segments.
//!
//! One line per segment, `index url duration`, duration with 6 decimals. The file is
//! only ever appended to, and every append is synced before it is acknowledged, so
//! replaying it after a restart yields exactly the segments that were handed to the
//! download queue.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{RecorderError, Result};
use crate::segment::Segment;

pub const LEDGER_FILE_NAME: &str = "segments.ledger";

pub fn ledger_path(destination: &Path) -> PathBuf {
    destination.join(LEDGER_FILE_NAME)
}

pub struct Ledger {
    path: PathBuf,
    file: File,
    known_urls: HashSet<String>,
    durations: HashMap<String, f64>,
    last_index: Option<u64>,
    entries: usize,
}

impl Ledger {
    /// Opens the ledger of `destination`, replaying any existing entries.
    pub async fn open(destination: &Path) -> Result<Self> {
        let path = ledger_path(destination);
        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let (entries, valid_len) = parse_entries(&existing)?;
        if valid_len < existing.len() {
            warn!(
                path = %path.display(),
                dropped_bytes = existing.len() - valid_len,
                "Dropping incomplete trailing ledger line"
            );
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        if valid_len < existing.len() {
            file.set_len(valid_len as u64).await?;
        }

        let mut ledger = Self {
            path,
            file,
            known_urls: HashSet::with_capacity(entries.len()),
            durations: HashMap::with_capacity(entries.len()),
            last_index: None,
            entries: 0,
        };
        for segment in entries {
            ledger.remember(segment);
        }

        if ledger.entries > 0 {
            info!(
                path = %ledger.path.display(),
                entries = ledger.entries,
                last_index = ?ledger.last_index,
                "Resuming from existing ledger"
            );
        }
        Ok(ledger)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.known_urls.contains(url)
    }

    pub fn duration_of(&self, url: &str) -> Option<f64> {
        self.durations.get(url).copied()
    }

    /// Index of the most recently recorded segment.
    pub fn last_index(&self) -> Option<u64> {
        self.last_index
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Appends `segment` and syncs it to disk before returning.
    ///
    /// Returns the segment numbered with its ledger entry, which names its file.
    pub async fn append(&mut self, segment: Segment) -> Result<Segment> {
        let segment = segment.with_entry(self.entries as u64);
        self.file
            .write_all(format_entry(&segment).as_bytes())
            .await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        debug!(
            index = segment.index,
            entry = segment.entry,
            url = %segment.url,
            "Segment recorded in ledger"
        );
        self.remember(segment.clone());
        Ok(segment)
    }

    fn remember(&mut self, segment: Segment) {
        self.last_index = Some(segment.index);
        self.durations.insert(segment.url.clone(), segment.duration);
        self.known_urls.insert(segment.url);
        self.entries += 1;
    }
}

/// Reads every entry of the ledger at `path` in the order they were recorded.
pub async fn read_entries(path: &Path) -> Result<Vec<Segment>> {
    let content = tokio::fs::read_to_string(path).await?;
    let (entries, valid_len) = parse_entries(&content)?;
    if valid_len < content.len() {
        warn!(path = %path.display(), "Ignoring incomplete trailing ledger line");
    }
    Ok(entries)
}

fn format_entry(segment: &Segment) -> String {
    format!("{} {} {:.6}\n", segment.index, segment.url, segment.duration)
}

/// Parses complete lines, returning the entries and the byte length they span.
///
/// An unterminated last line is what a crash mid-append leaves behind, so it is
/// excluded instead of being reported as corruption.
fn parse_entries(content: &str) -> Result<(Vec<Segment>, usize)> {
    let mut entries = Vec::new();
    let mut consumed = 0;

    for (line_no, raw) in content.split_inclusive('\n').enumerate() {
        let Some(line) = raw.strip_suffix('\n') else {
            break;
        };
        consumed += raw.len();

        let line = line.trim_end_matches('\r').trim();
        if line.is_empty() {
            continue;
        }
        let entry = entries.len() as u64;
        entries.push(parse_line(line, line_no + 1)?.with_entry(entry));
    }

    Ok((entries, consumed))
}

fn parse_line(line: &str, line_no: usize) -> Result<Segment> {
    let invalid = |reason: &str| RecorderError::Ledger {
        line: line_no,
        reason: reason.to_string(),
    };

    let mut fields = line.split_whitespace();
    let index = fields
        .next()
        .ok_or_else(|| invalid("missing index"))?
        .parse::<u64>()
        .map_err(|_| invalid("index is not an unsigned integer"))?;
    let url = fields.next().ok_or_else(|| invalid("missing url"))?;
    let duration = fields
        .next()
        .ok_or_else(|| invalid("missing duration"))?
        .parse::<f64>()
        .map_err(|_| invalid("duration is not a number"))?;
    if fields.next().is_some() {
        return Err(invalid("unexpected trailing fields"));
    }

    Ok(Segment::new(index, url, duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_format_uses_six_decimals() {
        let segment = Segment::new(12, "https://example.com/12.ts", 2.002);
        assert_eq!(
            format_entry(&segment),
            "12 https://example.com/12.ts 2.002000\n"
        );
    }

    #[test]
    fn parse_rejects_garbage_line() {
        let err = parse_entries("1 https://example.com/1.ts 2.0\nnot-a-number url 1.0\n")
            .unwrap_err();
        assert!(matches!(err, RecorderError::Ledger { line: 2, .. }));
    }

    #[test]
    fn parse_skips_unterminated_tail() {
        let content = "1 https://example.com/1.ts 2.000000\n2 https://exa";
        let (entries, valid_len) = parse_entries(content).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(valid_len, "1 https://example.com/1.ts 2.000000\n".len());
    }

    #[tokio::test]
    async fn replay_restores_known_urls_and_last_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut ledger = Ledger::open(dir.path()).await.unwrap();
            assert!(ledger.is_empty());
            ledger
                .append(Segment::new(5, "https://example.com/5.ts", 2.0))
                .await
                .unwrap();
            ledger
                .append(Segment::new(6, "https://example.com/6.ts", 1.5))
                .await
                .unwrap();
        }

        let ledger = Ledger::open(dir.path()).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.last_index(), Some(6));
        assert!(ledger.contains("https://example.com/5.ts"));
        assert_eq!(ledger.duration_of("https://example.com/6.ts"), Some(1.5));
        assert!(!ledger.contains("https://example.com/7.ts"));
    }

    #[tokio::test]
    async fn reopen_truncates_torn_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = ledger_path(dir.path());
        tokio::fs::write(&path, "3 https://example.com/3.ts 2.000000\n4 https://ex")
            .await
            .unwrap();

        let mut ledger = Ledger::open(dir.path()).await.unwrap();
        assert_eq!(ledger.last_index(), Some(3));
        ledger
            .append(Segment::new(4, "https://example.com/4.ts", 2.0))
            .await
            .unwrap();

        let entries = read_entries(&path).await.unwrap();
        assert_eq!(
            entries,
            vec![
                Segment::new(3, "https://example.com/3.ts", 2.0),
                Segment::new(4, "https://example.com/4.ts", 2.0).with_entry(1),
            ]
        );
    }

    #[tokio::test]
    async fn entries_are_numbered_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut ledger = Ledger::open(dir.path()).await.unwrap();
            let first = ledger
                .append(Segment::new(0, "https://example.com/x_0.ts", 2.0))
                .await
                .unwrap();
            assert_eq!(first.entry, 0);
        }

        let mut ledger = Ledger::open(dir.path()).await.unwrap();
        let second = ledger
            .append(Segment::new(0, "https://example.com/y_0.ts", 2.0))
            .await
            .unwrap();
        assert_eq!(second.entry, 1);

        let entries = read_entries(&ledger_path(dir.path())).await.unwrap();
        let numbered: Vec<(u64, u64)> = entries.iter().map(|s| (s.index, s.entry)).collect();
        assert_eq!(numbered, vec![(0, 0), (0, 1)]);
        assert_ne!(entries[0].file_name(), entries[1].file_name());
    }
}

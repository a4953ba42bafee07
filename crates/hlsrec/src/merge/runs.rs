use crate::segment::Segment;

/// A maximal sequence of recorded segments with strictly consecutive indices.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistRun {
    ordinal: usize,
    segments: Vec<Segment>,
}

impl PlaylistRun {
    fn start(ordinal: usize, segment: Segment) -> Self {
        Self {
            ordinal,
            segments: vec![segment],
        }
    }

    fn accepts(&self, segment: &Segment) -> bool {
        self.last_index().checked_add(1) == Some(segment.index)
    }

    /// Position of the run in ledger order.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Stem shared by the run's playlist and output container.
    ///
    /// Two runs may start at the same index once the media sequence restarts,
    /// so the ordinal leads and the first index follows for readability.
    pub fn file_stem(&self) -> String {
        format!("run_{:03}_{:010}", self.ordinal, self.first_index())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn first_index(&self) -> u64 {
        self.segments[0].index
    }

    pub fn last_index(&self) -> u64 {
        self.segments[self.segments.len() - 1].index
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Ceiling of the longest segment duration, as `#EXT-X-TARGETDURATION` requires.
    pub fn target_duration(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.duration)
            .fold(0.0, f64::max)
            .ceil() as u64
    }
}

/// Splits ledger entries into runs, in ledger order.
///
/// A new run starts whenever an index is not exactly one more than the previous
/// one, so discontinuities and replays (index going backwards) both split.
pub fn partition_runs(entries: impl IntoIterator<Item = Segment>) -> Vec<PlaylistRun> {
    let mut runs: Vec<PlaylistRun> = Vec::new();
    for segment in entries {
        match runs.last_mut() {
            Some(run) if run.accepts(&segment) => run.segments.push(segment),
            _ => runs.push(PlaylistRun::start(runs.len(), segment)),
        }
    }
    runs
}

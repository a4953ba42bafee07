// Live playlist side of the recorder: fetching, parsing, polling and queueing.

mod fetcher;
mod playlist;
mod poller;
mod queue;

pub use fetcher::{FetchOutcome, HttpManifestSource, ManifestSource};
pub use playlist::{PlaylistSnapshot, parse_media_playlist};
pub use poller::{PlaylistPoller, PollState, PollerStatus};
pub use queue::{SegmentQueue, SegmentSender};

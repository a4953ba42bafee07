mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use hlsrec_engine::DownloadConfig;
use hlsrec_engine::download::{DownloadTask, SegmentDownloader, SegmentFetcher};
use hlsrec_engine::segment::Segment;

#[derive(Clone)]
struct Media {
    body: Arc<Vec<u8>>,
    honor_range: bool,
    failures_left: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
}

impl Media {
    fn new(body: Vec<u8>, honor_range: bool, failures: usize) -> Self {
        Self {
            body: Arc::new(body),
            honor_range,
            failures_left: Arc::new(AtomicUsize::new(failures)),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }
}

fn range_start(headers: &HeaderMap) -> Option<usize> {
    let value = headers.get(header::RANGE)?.to_str().ok()?;
    value.strip_prefix("bytes=")?.strip_suffix('-')?.parse().ok()
}

async fn segment(State(media): State<Media>, headers: HeaderMap) -> Response {
    media.requests.fetch_add(1, Ordering::SeqCst);
    if media
        .failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let total = media.body.len();
    match range_start(&headers) {
        Some(start) if media.honor_range && start < total => (
            StatusCode::PARTIAL_CONTENT,
            [(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, total - 1, total),
            )],
            media.body[start..].to_vec(),
        )
            .into_response(),
        _ => (StatusCode::OK, media.body.to_vec()).into_response(),
    }
}

async fn start(media: Media) -> String {
    let router = Router::new()
        .route("/seg/{name}", get(segment))
        .with_state(media);
    let addr = common::serve(router).await;
    format!("http://{addr}/seg/0000000001.ts")
}

fn fetcher() -> SegmentFetcher {
    let config = DownloadConfig {
        max_retries: 3,
        backoff_cap: Duration::from_secs(1),
        chunk_size: 1024,
        ..DownloadConfig::default()
    };
    SegmentFetcher::new(reqwest::Client::new(), config)
}

#[tokio::test]
async fn resumed_download_is_byte_identical_to_full_download() {
    let body = common::payload(200_000, 7);
    let media = Media::new(body.clone(), true, 0);
    let requests = media.requests.clone();
    let url = start(media).await;
    let dir = tempfile::tempdir().unwrap();

    let full = DownloadTask::new(Segment::new(1, &url, 2.0), dir.path().join("full.ts"));
    let size = fetcher().download(&full).await.unwrap();
    assert_eq!(size, body.len() as u64);

    let offset = 73_123;
    let resumed_path = dir.path().join("resumed.ts");
    tokio::fs::write(&resumed_path, &body[..offset]).await.unwrap();
    let resumed = DownloadTask::new(Segment::new(1, &url, 2.0), resumed_path.clone());
    let size = fetcher().download(&resumed).await.unwrap();
    assert_eq!(size, body.len() as u64);

    let full_bytes = tokio::fs::read(dir.path().join("full.ts")).await.unwrap();
    let resumed_bytes = tokio::fs::read(&resumed_path).await.unwrap();
    assert_eq!(full_bytes, body);
    assert_eq!(resumed_bytes, full_bytes);
    assert_eq!(requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn server_ignoring_range_restarts_from_zero() {
    let body = common::payload(50_000, 3);
    let url = start(Media::new(body.clone(), false, 0)).await;
    let dir = tempfile::tempdir().unwrap();

    let path = dir.path().join("partial.ts");
    tokio::fs::write(&path, b"stale bytes from an older attempt")
        .await
        .unwrap();
    let task = DownloadTask::new(Segment::new(1, &url, 2.0), path.clone());
    let size = fetcher().download(&task).await.unwrap();

    assert_eq!(size, body.len() as u64);
    assert_eq!(tokio::fs::read(&path).await.unwrap(), body);
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let body = common::payload(4_096, 11);
    let media = Media::new(body.clone(), true, 2);
    let requests = media.requests.clone();
    let url = start(media).await;
    let dir = tempfile::tempdir().unwrap();

    let task = DownloadTask::new(Segment::new(1, &url, 2.0), dir.path().join("a.ts"));
    fetcher().download(&task).await.unwrap();

    assert_eq!(requests.load(Ordering::SeqCst), 3);
    assert_eq!(tokio::fs::read(dir.path().join("a.ts")).await.unwrap(), body);
}

#[tokio::test]
async fn persistent_errors_exhaust_the_segment_budget() {
    let media = Media::new(vec![0; 16], true, usize::MAX);
    let requests = media.requests.clone();
    let url = start(media).await;
    let dir = tempfile::tempdir().unwrap();

    let task = DownloadTask::new(Segment::new(1, &url, 2.0), dir.path().join("a.ts"));
    let exhausted = fetcher().download(&task).await.unwrap_err();

    assert_eq!(exhausted.attempts, 4);
    assert_eq!(requests.load(Ordering::SeqCst), 4);
}

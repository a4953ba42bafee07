// Playlist fetcher: a single bounded request per poll cycle, classified into a tagged outcome.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::trace;
use url::Url;

/// Result of one playlist request.
///
/// Timeouts are kept apart from transport errors because the poller charges only
/// the latter against its retry budget.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The overall request deadline elapsed.
    Timeout,
    /// The request could not be completed (DNS, connect, reset, body read).
    /// Connect and read timeouts of the client land here as well.
    TransportError(reqwest::Error),
    /// The server answered.
    Response { status: StatusCode, body: Bytes },
}

#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// URL the playlist is fetched from, used to resolve relative segment URIs.
    fn url(&self) -> &Url;

    async fn fetch(&self) -> FetchOutcome;
}

/// Fetches the playlist over HTTP(S) with a hard deadline covering headers and body.
pub struct HttpManifestSource {
    client: Client,
    url: Url,
    params: Vec<(String, String)>,
    timeout: Duration,
}

impl HttpManifestSource {
    pub fn new(client: Client, url: Url, params: Vec<(String, String)>, timeout: Duration) -> Self {
        Self {
            client,
            url,
            params,
            timeout,
        }
    }

    async fn fetch_inner(&self) -> Result<(StatusCode, Bytes), reqwest::Error> {
        let response = self
            .client
            .get(self.url.clone())
            .query(&self.params)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn fetch(&self) -> FetchOutcome {
        match tokio::time::timeout(self.timeout, self.fetch_inner()).await {
            Err(_) => FetchOutcome::Timeout,
            Ok(Err(e)) => FetchOutcome::TransportError(e),
            Ok(Ok((status, body))) => {
                trace!(url = %self.url, %status, bytes = body.len(), "Playlist fetched");
                FetchOutcome::Response { status, body }
            }
        }
    }
}

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::stream::{BoxStream, StreamExt};
use reqwest::Url;
use siphon_core::error::HarvestError;
use tracing::debug;

use crate::http::ApiClient;

/// Chunked body of a binary download.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, HarvestError>>;

/// Streams media and file bodies, fetching each URL at most once per run.
///
/// Clones share the seen-set, so concurrent crawl tasks never download the
/// same asset twice.
#[derive(Clone, Debug)]
pub struct MediaDownloader {
    http: ApiClient,
    seen: Arc<Mutex<HashSet<String>>>,
}

impl MediaDownloader {
    pub fn new(http: ApiClient) -> Self {
        Self {
            http,
            seen: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Marks `url` as taken. Returns false if it was taken before.
    fn claim(&self, url: &Url) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        seen.insert(url.as_str().to_string())
    }

    /// Starts downloading `url`.
    ///
    /// Returns `Ok(None)` when the URL was already fetched in this run.
    /// Status handling, throttling and retries are those of
    /// [`ApiClient::execute`]; only the body is streamed.
    pub async fn fetch(&self, url: Url) -> Result<Option<ByteStream>, HarvestError> {
        if !self.claim(&url) {
            debug!(%url, "Skipping already downloaded URL");
            return Ok(None);
        }
        let resp = self.http.execute(200, |c| c.get(url.clone())).await?;
        let stream = resp
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| HarvestError::Network(format!("download interrupted: {}", e)))
            })
            .boxed();
        Ok(Some(stream))
    }

    /// Number of distinct URLs requested so far.
    pub fn requested(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

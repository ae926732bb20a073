//! Remote image cache for avatars.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use tanuki_core::JobRunner;

use crate::error::GitlabError;

/// Messages sent from image jobs back to the UI thread.
#[derive(Debug)]
pub enum ImageMessage {
    /// Result of fetching one image.
    Fetched {
        url: String,
        result: Result<Bytes, GitlabError>,
    },
}

/// Byte cache of downloaded images keyed by exact URL string.
///
/// Each URL is downloaded at most once per process. There is no
/// eviction or size bound; acceptable for a small set of avatars.
#[derive(Default)]
pub struct RemoteImageCache {
    client: reqwest::Client,
    images: Mutex<HashMap<String, Bytes>>,
}

impl RemoteImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes for `url` if already downloaded.
    pub fn cached(&self, url: &str) -> Option<Bytes> {
        self.images.lock().get(url).cloned()
    }

    /// Fetch `url`, hitting the network only on the first request.
    pub async fn fetch(&self, url: &str) -> Result<Bytes, GitlabError> {
        if let Some(bytes) = self.cached(url) {
            return Ok(bytes);
        }

        tracing::debug!("Downloading image {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GitlabError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        self.images.lock().insert(url.to_string(), bytes.clone());
        Ok(bytes)
    }
}

/// Request an image fetch in the background.
/// Sends [`ImageMessage::Fetched`] on the channel when complete.
pub fn request_fetch(
    runner: &JobRunner,
    cache: Arc<RemoteImageCache>,
    url: String,
    tx: &Sender<ImageMessage>,
) {
    runner.spawn(
        async move {
            let result = cache.fetch(&url).await;
            (url, result)
        },
        tx,
        |(url, result)| ImageMessage::Fetched { url, result },
    );
}

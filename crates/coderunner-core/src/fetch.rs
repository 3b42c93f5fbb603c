//! Download plumbing for release artifacts, behind a trait for testing.

use async_trait::async_trait;

use crate::errors::RunnerError;

/// Fetches release artifacts over the network. Provisioning depends on this
/// trait so tests can serve canned archives without reaching GitHub.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Downloads `url` fully into memory.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RunnerError>;
}

/// Production fetcher backed by a shared `reqwest` client. Redirects are
/// followed, which `releases/latest/download` URLs rely on.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RunnerError> {
        log::debug!("Fetching {}", url);
        let response = self
            .client
            .get(url)
            .header("User-Agent", "coderunner")
            .send()
            .await
            .map_err(|e| RunnerError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(RunnerError::Fetch {
                url: url.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| RunnerError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

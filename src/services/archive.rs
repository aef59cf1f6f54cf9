use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const UPLOAD_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Error)]
pub enum ArchiveError {
    #[error("archive upload failed: {0}")]
    Upload(String),
}

/// Persists one finished session archive and returns a durable reference.
#[allow(async_fn_in_trait)]
pub trait ArchiveSink {
    async fn upload(&self, bytes: &[u8], mime: &str) -> Result<String, ArchiveError>;
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

/// HTTP archive sink posting raw archive bytes.
#[derive(Clone)]
pub struct HttpArchiveSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpArchiveSink {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(UPLOAD_TIMEOUT_MS))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl ArchiveSink for HttpArchiveSink {
    async fn upload(&self, bytes: &[u8], mime: &str) -> Result<String, ArchiveError> {
        let url = format!("{}/recordings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ArchiveError::Upload(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ArchiveError::Upload(format!("{url}: {}", resp.status())));
        }
        let parsed: UploadResponse = resp
            .json()
            .await
            .map_err(|e| ArchiveError::Upload(e.to_string()))?;
        Ok(parsed.url)
    }
}

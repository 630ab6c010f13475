//! Single bounded GET of the target URL.
//!
//! Every failure mode comes back as a [`FetchError`]; the caller never sees a
//! panic and decides how to degrade.

use crate::{config::FetchConfig, types::RawPage};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
    #[error("Unsuccessful status: {0}")]
    Status(u16),
    #[error("Content too large: {0} bytes")]
    ContentTooLarge(usize),
    #[error("Failed to parse URL: {0}")]
    InvalidUrl(String),
}

pub struct ContentFetcher {
    http_client: reqwest::Client,
    config: FetchConfig,
}

impl ContentFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { http_client, config })
    }

    /// Shared client, reused by the search-index lookup.
    pub fn client(&self) -> &reqwest::Client {
        &self.http_client
    }

    pub async fn fetch(&self, raw_url: &str) -> Result<RawPage, FetchError> {
        let url = Url::parse(raw_url.trim()).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!("unsupported scheme {}", url.scheme())));
        }

        let start = Instant::now();
        let timeout = self.config.timeout();

        match tokio::time::timeout(timeout, self.fetch_http(url)).await {
            Ok(result) => {
                debug!("fetch of {} finished in {:?}", raw_url, start.elapsed());
                result
            }
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }

    async fn fetch_http(&self, url: Url) -> Result<RawPage, FetchError> {
        let mut response = self.http_client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.config.timeout())
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.config.max_body_bytes {
                return Err(FetchError::ContentTooLarge(len as usize));
            }
        }

        // Chunked responses carry no length, so the cap is enforced while reading.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() > self.config.max_body_bytes {
                return Err(FetchError::ContentTooLarge(body.len()));
            }
        }

        Ok(RawPage {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

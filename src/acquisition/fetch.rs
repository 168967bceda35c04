//! Image download seam.
//!
//! - [`ImageFetcher`]: fetch the bytes behind a URL
//! - [`HttpImageFetcher`]: reqwest implementation with browser-like headers,
//!   per-domain rate limiting, content-type and size checks
//! - [`RetryFetch`]: decorator retrying transient failures with backoff

use super::rate_limit::RateLimiter;
use crate::config::AcquisitionConfig;
use crate::error::FetchError;
use crate::retry::Backoff;
use crate::utils::{host_of, origin_of};
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, REFERER};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";

/// Bytes of one downloaded resource.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

pub trait ImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError>;
}

/// Build the HTTP client shared by every network collaborator.
pub fn build_client(config: &AcquisitionConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.timeout.min(Duration::from_secs(10)))
        .user_agent(config.user_agent.clone())
        .build()
}

pub struct HttpImageFetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    accept_language: String,
    max_bytes: usize,
}

impl HttpImageFetcher {
    pub fn new(client: Client, limiter: Arc<RateLimiter>, config: &AcquisitionConfig) -> Self {
        Self {
            client,
            limiter,
            accept_language: config.accept_language.clone(),
            max_bytes: config.max_download_bytes,
        }
    }
}

impl fmt::Debug for HttpImageFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpImageFetcher")
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

/// Image types, plus the generic binary type some CDNs send for photos.
fn is_image_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("image/") || mime == "application/octet-stream" || mime == "binary/octet-stream"
}

impl ImageFetcher for HttpImageFetcher {
    #[instrument(level = "debug", skip_all, fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        if let Some(host) = host_of(url) {
            self.limiter.acquire(&host).await;
        }

        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, IMAGE_ACCEPT)
            .header(ACCEPT_LANGUAGE, &self.accept_language);
        if let Some(origin) = origin_of(url) {
            request = request.header(REFERER, origin);
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(ct) = &content_type {
            if !is_image_content_type(ct) {
                return Err(FetchError::NotAnImage {
                    content_type: ct.clone(),
                });
            }
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_bytes {
                return Err(FetchError::TooLarge {
                    bytes: len as usize,
                    limit: self.max_bytes,
                });
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(FetchError::TooLarge {
                    bytes: bytes.len() + chunk.len(),
                    limit: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(bytes = bytes.len(), content_type = ?content_type, "Downloaded image");
        Ok(FetchedImage { bytes, content_type })
    }
}

/// Wraps any [`ImageFetcher`], retrying transient failures.
pub struct RetryFetch<T> {
    inner: T,
    backoff: Backoff,
}

impl<T: ImageFetcher> RetryFetch<T> {
    pub fn new(inner: T, backoff: Backoff) -> Self {
        Self { inner, backoff }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl<T: ImageFetcher> ImageFetcher for RetryFetch<T> {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        self.backoff
            .retry(url, FetchError::is_transient, || self.inner.fetch(url))
            .await
    }
}

//! Content fetching from URLs, files, and stdin.
//!
//! The free functions propagate errors. The [`Fetcher`] trait is the seam the
//! resolver and the downloader use: it answers `None` for any failure and
//! logs the cause, because an unreachable page is an expected outcome there.

use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Client, Response};
use tracing::{debug, warn};
use url::Url;

use crate::{PicgrabError, Result};

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";

/// HTTP client configuration for fetching web pages and images.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Custom User-Agent string.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout: 30, user_agent: "Mozilla/5.0 (compatible; picgrab/1.0)".to_string() }
    }
}

/// Source of page markup and image bytes.
///
/// Implementations return `None` on any failure (network, DNS, non-2xx
/// status) instead of an error.
pub trait Fetcher: Send + Sync {
    fn fetch_text(&self, url: &str) -> impl Future<Output = Option<String>> + Send;

    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Option<Vec<u8>>> + Send;
}

/// [`Fetcher`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// # Errors
    ///
    /// Returns [`PicgrabError::HttpError`] if the HTTP client cannot be built.
    pub fn new(config: FetchConfig) -> Result<Self> {
        Ok(Self { client: build_client(&config)?, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Option<String> {
        let result = match get(&self.client, url, &self.config, HTML_ACCEPT).await {
            Ok(response) => response.text().await.map_err(PicgrabError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(text) => {
                debug!(%url, bytes = text.len(), "fetched page");
                Some(text)
            }
            Err(e) => {
                warn!(%url, error = %e, "fetching page failed");
                None
            }
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Option<Vec<u8>> {
        let result = match get(&self.client, url, &self.config, IMAGE_ACCEPT).await {
            Ok(response) => response.bytes().await.map_err(PicgrabError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                debug!(%url, bytes = bytes.len(), "fetched image");
                Some(bytes.to_vec())
            }
            Err(e) => {
                warn!(%url, error = %e, "fetching image failed");
                None
            }
        }
    }
}

fn build_client(config: &FetchConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout))
        .build()
        .map_err(PicgrabError::HttpError)
}

async fn get(client: &Client, url: &str, config: &FetchConfig, accept: &str) -> Result<Response> {
    let parsed_url = Url::parse(url).map_err(|e| PicgrabError::InvalidUrl(e.to_string()))?;

    if !matches!(parsed_url.scheme(), "http" | "https") {
        return Err(PicgrabError::InvalidUrl(format!(
            "URL must use http:// or https://, got {}",
            parsed_url.scheme()
        )));
    }

    let response = client
        .get(parsed_url)
        .header("User-Agent", &config.user_agent)
        .header("Accept", accept)
        .header("Accept-Language", "en-US,en;q=0.9")
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                PicgrabError::Timeout { timeout: config.timeout }
            } else {
                PicgrabError::HttpError(e)
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(PicgrabError::HttpStatus { status: status.as_u16(), url: url.to_string() });
    }

    Ok(response)
}

/// Fetches HTML content from a URL.
///
/// Follows redirects and respects the configured timeout. Non-2xx answers
/// are reported as [`PicgrabError::HttpStatus`].
pub async fn fetch_url(url: &str, config: &FetchConfig) -> Result<String> {
    let client = build_client(config)?;
    let response = get(&client, url, config, HTML_ACCEPT).await?;

    Ok(response.text().await?)
}

/// Fetches raw bytes, typically an image, from a URL.
pub async fn fetch_bytes(url: &str, config: &FetchConfig) -> Result<Vec<u8>> {
    let client = build_client(config)?;
    let response = get(&client, url, config, IMAGE_ACCEPT).await?;

    Ok(response.bytes().await?.to_vec())
}

/// Reads HTML content from a local file.
pub fn fetch_file(path: &str) -> Result<String> {
    let path_buf = PathBuf::from(path);

    if !path_buf.exists() {
        Err(PicgrabError::FileNotFound(path_buf))
    } else {
        fs::read_to_string(&path_buf).map_err(PicgrabError::from)
    }
}

/// Reads HTML content from standard input until EOF.
pub fn fetch_stdin() -> Result<String> {
    use std::io::{self, Read};

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(PicgrabError::from)?;

    Ok(buffer)
}

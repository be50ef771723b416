//! Remote tag definition retrieval
//!
//! Definitions live as one JSON file per tag type in a repository
//! directory. Retrieval is two-phase: list the directory (GitHub contents
//! API), then download each file through its `download_url`. The
//! [`FetchAdapter`] trait keeps the transport injectable; the manager
//! never constructs HTTP requests itself.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default directory listing endpoint for tag definitions
pub const DEFAULT_API_URL: &str =
    "https://api.github.com/repos/OpenEPaperLink/OpenEPaperLink/contents/resources/tagtypes";

/// HTTP timeout for listing and download requests
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// One entry of the remote directory listing
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEntry {
    /// Filename within the directory (e.g. "2E.json")
    pub name: String,
    /// Direct download location for the file content
    pub download_url: String,
}

/// Two-step remote retrieval: directory listing, then per-file download
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    /// List the available definition files
    async fn list_entries(&self) -> Result<Vec<RemoteEntry>, FetchError>;

    /// Download one definition file as text
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Derive a tag type ID from a definition filename base (extension
/// already stripped)
///
/// Filenames are hexadecimal first, decimal second, matching the remote
/// repository convention - so "17" parses as 0x17 = 23, not 17.
pub fn parse_type_id(base: &str) -> Option<u16> {
    u16::from_str_radix(base, 16)
        .ok()
        .or_else(|| base.parse().ok())
}

/// Fetcher backed by the GitHub contents API
pub struct GithubFetcher {
    client: reqwest::Client,
    api_url: String,
}

impl GithubFetcher {
    pub fn new(api_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("tagtypesd/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, api_url })
    }
}

#[async_trait]
impl FetchAdapter for GithubFetcher {
    async fn list_entries(&self) -> Result<Vec<RemoteEntry>, FetchError> {
        debug!(url = %self.api_url, "Listing remote tag definitions");

        let response = self
            .client
            .get(&self.api_url)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: self.api_url.clone(),
                status: response.status().as_u16(),
            });
        }

        let entries: Vec<RemoteEntry> = response.json().await?;
        Ok(entries)
    }

    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

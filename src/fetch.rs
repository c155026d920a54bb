//! Fetch collaborator used by the crawl engine and the media pipelines.
//!
//! The production implementation is [`crate::http_client::HttpClient`]; tests
//! substitute in-memory fakes.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a [`Fetcher`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered 404. Distinguished so callers can track missing content.
    #[error("Not found: {url}")]
    NotFound { url: String },

    /// Any other non-success status.
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl FetchError {
    /// Whether this error is an HTTP 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Network access to the source site and to media origins.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a source-site page as text.
    ///
    /// Implementations apply the configured politeness delay before the request.
    async fn get_page(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch raw bytes of a resource (image, stylesheet, font, list file).
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Read a resource's response headers without downloading the body.
    async fn head(&self, url: &str) -> Result<HashMap<String, String>, FetchError>;
}

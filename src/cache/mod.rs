//! Optimization cache for processed media.
//!
//! Entries are keyed by the source URL and carry the version identity of the
//! source plus the encoder version that produced them. A stored entry whose
//! metadata differs from what the caller expects is a miss.
//!
//! `--devel-cache` without a remote cache uses [`DevelCache`] instead, which
//! mirrors raw downloads rather than processed output.

mod disk;
mod memory;
mod s3;

pub use disk::DevelCache;
pub use memory::MemoryCache;
pub use s3::S3Cache;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

static SCHEME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(https?)://").unwrap());

/// Metadata an entry must match to be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMeta {
    pub ident: String,
    pub encoder_version: u32,
}

impl CacheMeta {
    pub fn new(ident: &str, encoder_version: u32) -> Self {
        Self {
            ident: ident.to_string(),
            encoder_version,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid optimization cache URL: {0}")]
    InvalidUrl(String),

    #[error("Optimization cache backend error: {0}")]
    Backend(String),

    #[error("Optimization cache credentials check failed: {0}")]
    Credentials(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Content-addressed store of already-processed media.
#[async_trait]
pub trait OptimizationCache: Send + Sync {
    /// Return the cached bytes when an entry exists and its metadata matches.
    ///
    /// `Ok(None)` is a miss (absent or stale). `Err` is a backend failure.
    async fn fetch(&self, key: &str, meta: &CacheMeta) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store bytes under `key`, replacing any previous entry.
    async fn store(&self, key: &str, data: &[u8], meta: &CacheMeta) -> Result<(), CacheError>;
}

/// Cache key for a source URL: `https://host/path` becomes `https/host/path`.
pub fn cache_key_for(url: &str) -> String {
    SCHEME_RE.replace(url, "$1/").into_owned()
}

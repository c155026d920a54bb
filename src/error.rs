//! Top-level crawl errors.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::cache::CacheError;
use crate::executor::ExecutorError;
use crate::fetch::FetchError;
use crate::media::MediaError;

/// Errors that end a crawl run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Too many expected pages answered 404.
    #[error(
        "Too many missing pages: {missing} missing out of {expected} expected \
         (tolerance {tolerance}%)"
    )]
    MissingThresholdExceeded {
        missing: usize,
        expected: usize,
        tolerance: u8,
    },

    /// The source site's markup no longer matches what the crawler expects.
    #[error("DOM integrity check failed: {0}")]
    DomIntegrity(String),

    #[error("Interrupted by user")]
    Interrupted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Template error: {0}")]
    Render(#[from] askama::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    /// Whether this error is the missing-content circuit breaker.
    pub fn is_missing_threshold(&self) -> bool {
        matches!(self, ScrapeError::MissingThresholdExceeded { .. })
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

//! Deferred media pipeline.
//!
//! `defer()` runs on the crawl task while a page is being rewritten: it
//! reserves the archive path for a resource, records its digest as handled
//! and parks a job. `submit_deferred()` later hands parked jobs to the
//! pipeline's worker pool, which fetches (or transcodes), consults the
//! optimization cache and writes the result under the reserved path.

mod imager;
mod transcode;
mod videos;

pub use imager::{convert_to_webp, make_illustration, Imager, IMAGES_ENCODER_VERSION};
pub use transcode::{pick_candidate, ExternalTools, VideoPreset, VideoTools};
pub use videos::{
    is_youtube_url, normalize_youtube_url, youtube_id_from, youtube_poster_url, VideoGrabber,
    VIDEOS_ENCODER_VERSION,
};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::cache::{CacheMeta, OptimizationCache};
use crate::fetch::FetchError;
use crate::utils::VersionIdent;

/// Errors from a single media job. Never fatal to the crawl.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Image conversion failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("Required binary `{0}` not found in PATH")]
    MissingBinary(String),

    #[error("No video file produced in {dir} for {url}")]
    MissingOutput { dir: PathBuf, url: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Abort flag and counters shared between a pipeline and its jobs.
#[derive(Debug, Default)]
pub struct PipelineState {
    aborted: AtomicBool,
    requested: AtomicUsize,
    done: AtomicUsize,
}

impl PipelineState {
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn requested(&self) -> usize {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    fn record_requested(&self) {
        self.requested.fetch_add(1, Ordering::SeqCst);
    }

    /// Completion callback for the worker pool.
    fn once_done(self: &Arc<Self>, label: &'static str) -> crate::executor::Callback {
        let state = self.clone();
        Box::new(move || {
            let done = state.done.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("{} {}/{}", label, done, state.requested());
        })
    }
}

/// Outcome of consulting the optimization cache.
#[derive(Debug)]
enum CacheLookup {
    Hit(Vec<u8>),
    /// Regenerate; `store` says whether the fresh result may be uploaded.
    Miss { store: bool },
}

/// Look an entry up, failing open toward regeneration.
///
/// An unknown version identity never matches and is never stored. A backend
/// error regenerates without uploading, so a possibly valid entry is not
/// overwritten.
async fn lookup(
    cache: &dyn OptimizationCache,
    key: &str,
    ident: &VersionIdent,
    encoder_version: u32,
) -> CacheLookup {
    let Some(ident) = ident.as_str() else {
        warn!("No version identity for {}, regenerating", key);
        return CacheLookup::Miss { store: false };
    };
    let meta = CacheMeta::new(ident, encoder_version);
    debug!("Attempting download of cache::{}", key);
    match cache.fetch(key, &meta).await {
        Ok(Some(data)) => CacheLookup::Hit(data),
        Ok(None) => CacheLookup::Miss { store: true },
        Err(e) => {
            error!("Failed to download {} from cache: {}", key, e);
            CacheLookup::Miss { store: false }
        }
    }
}

/// Best-effort upload of a regenerated resource.
async fn upload(
    cache: &dyn OptimizationCache,
    key: &str,
    data: &[u8],
    ident: &VersionIdent,
    encoder_version: u32,
) {
    let Some(ident) = ident.as_str() else {
        return;
    };
    let meta = CacheMeta::new(ident, encoder_version);
    debug!("Uploading to cache::{} with {:?}", key, meta);
    if let Err(e) = cache.store(key, data, &meta).await {
        error!("{} failed to upload to cache: {}", key, e);
    }
}

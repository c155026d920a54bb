//! Local download mirror for `--devel-cache`.
//!
//! Raw downloaded bytes are kept flat in the build directory as
//! `cache_<digest>`, keyed by the digest of the source URL, so a reused build
//! directory (`--build-in-tmp`) skips downloads done by a previous run.
//! Videos keep the extension picked by the downloader: `cache_<digest>.<ext>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::fetch::{FetchError, Fetcher};
use crate::media::{pick_candidate, MediaError, VideoPreset, VideoTools};
use crate::utils::get_digest;

/// Wraps the run's fetcher and video downloader, mirroring what they download.
pub struct DevelCache {
    dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    tools: Arc<dyn VideoTools>,
}

impl DevelCache {
    pub fn new(dir: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>, tools: Arc<dyn VideoTools>) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
            tools,
        }
    }

    fn bytes_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("cache_{}", get_digest(url)))
    }

    /// Mirrored download of a video, whatever its extension.
    async fn find_video(&self, url: &str) -> Option<PathBuf> {
        let prefix = format!("cache_{}.", get_digest(url));
        let mut read_dir = tokio::fs::read_dir(&self.dir).await.ok()?;
        let mut found = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                found.push(entry.path());
            }
        }
        found.sort();
        found.into_iter().next()
    }
}

async fn list_dir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        entries.push(entry.path());
    }
    Ok(entries)
}

#[async_trait]
impl Fetcher for DevelCache {
    async fn get_page(&self, url: &str) -> Result<String, FetchError> {
        self.fetcher.get_page(url).await
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.bytes_path(url);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                debug!("Reusing {} from {}", url, path.display());
                return Ok(data);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Unable to read {}: {}", path.display(), e),
        }

        let data = self.fetcher.get_bytes(url).await?;
        if let Err(e) = tokio::fs::write(&path, &data).await {
            warn!("Unable to keep {} in {}: {}", url, path.display(), e);
        }
        Ok(data)
    }

    async fn head(&self, url: &str) -> Result<HashMap<String, String>, FetchError> {
        self.fetcher.head(url).await
    }
}

#[async_trait]
impl VideoTools for DevelCache {
    async fn download(&self, url: &str, output_dir: &Path, stem: &str) -> Result<(), MediaError> {
        if let Some(cached) = self.find_video(url).await {
            if let Some(ext) = cached.extension() {
                let dst = output_dir.join(format!("{}.{}", stem, ext.to_string_lossy()));
                tokio::fs::copy(&cached, &dst).await?;
                debug!("Reusing {} from {}", url, cached.display());
                return Ok(());
            }
        }

        self.tools.download(url, output_dir, stem).await?;
        let entries = list_dir(output_dir).await?;
        let Some(src) = pick_candidate(&entries, stem) else {
            return Ok(());
        };
        if let Some(ext) = src.extension() {
            let mirror = self
                .dir
                .join(format!("cache_{}.{}", get_digest(url), ext.to_string_lossy()));
            if let Err(e) = tokio::fs::copy(&src, &mirror).await {
                warn!("Unable to keep {} in {}: {}", url, mirror.display(), e);
            }
        }
        Ok(())
    }

    async fn reencode(&self, src: &Path, dst: &Path, preset: VideoPreset) -> Result<(), MediaError> {
        self.tools.reencode(src, dst, preset).await
    }
}

//! Video pipeline: every video ends up as WebM in the archive.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use super::{lookup, pick_candidate, upload, CacheLookup, MediaError, PipelineState, VideoPreset, VideoTools};
use crate::archive::{ArchiveItem, SharedArchive};
use crate::cache::{cache_key_for, OptimizationCache};
use crate::executor::{Executor, ExecutorError};
use crate::fetch::Fetcher;
use crate::utils::{get_digest, slugify_stem, to_url, version_ident_from_headers, VersionIdent};

/// Bump when the encoding presets change so cached encodings are redone.
pub const VIDEOS_ENCODER_VERSION: u32 = 1;

/// YouTube answers HEAD requests poorly; its videos get a fixed identity.
const YOUTUBE_IDENT: &str = "1";

const VIDEO_MIME: &str = "video/webm";

/// Whether a URL is hosted on YouTube.
pub fn is_youtube_url(url: &Url) -> bool {
    match url.host_str() {
        Some(host) => {
            host == "youtu.be"
                || host == "youtube.com"
                || host.ends_with(".youtube.com")
                || host == "youtube-nocookie.com"
                || host.ends_with(".youtube-nocookie.com")
        }
        None => false,
    }
}

/// YouTube video id from a watch, embed, short or share URL.
pub fn youtube_id_from(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    if !is_youtube_url(&url) {
        return None;
    }
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let id = if url.host_str() == Some("youtu.be") {
        segments.next().map(str::to_string)
    } else {
        match segments.next() {
            Some("embed" | "v" | "shorts" | "live") => segments.next().map(str::to_string),
            _ => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
        }
    };
    id.filter(|id| !id.is_empty())
}

/// Canonical watch URL, dropping tracking and player parameters.
///
/// Non-YouTube URLs are returned unchanged.
pub fn normalize_youtube_url(url: &str) -> String {
    match youtube_id_from(url) {
        Some(id) => format!("https://www.youtube.com/watch?v={}", id),
        None => url.to_string(),
    }
}

/// WebP poster image for a YouTube video.
pub fn youtube_poster_url(url: &str) -> Option<String> {
    youtube_id_from(url).map(|id| format!("http://img.youtube.com/vi_webp/{}/sddefault.webp", id))
}

#[derive(Debug, Clone)]
struct VideoJob {
    url: String,
    is_youtube: bool,
    path: String,
}

struct VideoShared {
    fetcher: Arc<dyn Fetcher>,
    cache: Option<Arc<dyn OptimizationCache>>,
    archive: SharedArchive,
    tools: Arc<dyn VideoTools>,
    videos_dir: PathBuf,
    low_quality: bool,
    state: Arc<PipelineState>,
}

pub struct VideoGrabber {
    base_url: Url,
    handled: HashSet<String>,
    pending: Vec<VideoJob>,
    executor: Arc<Executor>,
    shared: Arc<VideoShared>,
}

impl VideoGrabber {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_url: Url,
        fetcher: Arc<dyn Fetcher>,
        cache: Option<Arc<dyn OptimizationCache>>,
        archive: SharedArchive,
        tools: Arc<dyn VideoTools>,
        build_dir: &Path,
        low_quality: bool,
        executor: Arc<Executor>,
    ) -> Self {
        Self {
            base_url,
            handled: HashSet::new(),
            pending: Vec::new(),
            executor,
            shared: Arc::new(VideoShared {
                fetcher,
                cache,
                archive,
                tools,
                videos_dir: build_dir.join("videos"),
                low_quality,
                state: Arc::new(PipelineState::default()),
            }),
        }
    }

    pub fn start(&self) {
        self.executor.start();
    }

    pub fn state(&self) -> &PipelineState {
        &self.shared.state
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn videos_dir(&self) -> &Path {
        &self.shared.videos_dir
    }

    /// Canonical URL and whether it is a YouTube video.
    fn canonical(&self, url: &str) -> Option<(Url, bool)> {
        let absolute = to_url(url, &self.base_url);
        let parsed = Url::parse(&absolute).ok()?;
        if is_youtube_url(&parsed) {
            let normalized = normalize_youtube_url(parsed.as_str());
            return Url::parse(&normalized).ok().map(|u| (u, true));
        }
        Some((parsed, false))
    }

    /// Archive path for a canonical video URL.
    fn path_for(url: &Url, is_youtube: bool) -> String {
        let slug = if is_youtube {
            youtube_id_from(url.as_str()).unwrap_or_default()
        } else {
            slugify_stem(url.path())
        };
        format!("videos/{}-{}.webm", get_digest(url.as_str()), slug)
    }

    /// Request processing of a video, returning its archive path immediately.
    pub fn defer(&mut self, url: &str) -> Option<String> {
        let Some((url, is_youtube)) = self.canonical(url) else {
            warn!("Can't parse video URL `{}`. Skipping", url);
            return None;
        };
        if !matches!(url.scheme(), "http" | "https") {
            warn!("Not supporting video URL `{}`. Skipping", url);
            return None;
        }

        let path = Self::path_for(&url, is_youtube);
        if !self.handled.insert(get_digest(url.as_str())) {
            debug!("URL `{}` already processed.", url);
            return Some(path);
        }

        self.shared.state.record_requested();
        self.pending.push(VideoJob {
            url: url.to_string(),
            is_youtube,
            path: path.clone(),
        });
        Some(path)
    }

    /// Hand parked jobs to the worker pool, waiting while its queue is full.
    pub async fn submit_deferred(&mut self) -> Result<(), ExecutorError> {
        for job in std::mem::take(&mut self.pending) {
            let shared = self.shared.clone();
            self.executor
                .submit(
                    Box::pin(async move {
                        process_video(&shared, job).await.map_err(anyhow::Error::from)
                    }),
                    Some(self.shared.state.once_done("Videos")),
                )
                .await?;
        }
        Ok(())
    }

    pub async fn drain(&mut self) -> Result<(), ExecutorError> {
        self.submit_deferred().await?;
        self.executor.shutdown(true).await;
        debug!(
            "Videos done: {}/{}",
            self.state().done(),
            self.state().requested()
        );
        Ok(())
    }

    pub async fn abort(&mut self) {
        self.shared.state.abort();
        self.pending.clear();
        self.executor.shutdown(false).await;
    }
}

/// Download (and re-encode when needed) a video, returning the WebM file.
async fn get_video_fpath(shared: &VideoShared, url: &str) -> Result<PathBuf, MediaError> {
    let digest = get_digest(url);
    let dir = &shared.videos_dir;
    shared.tools.download(url, dir, &digest).await?;

    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        entries.push(entry.path());
    }
    let src = pick_candidate(&entries, &digest).ok_or_else(|| MediaError::MissingOutput {
        dir: dir.clone(),
        url: url.to_string(),
    })?;

    let is_webm = src.extension().is_some_and(|e| e == "webm");
    if is_webm && !shared.low_quality {
        return Ok(src);
    }

    let dst = dir.join(format!("{}-2.webm", digest));
    let preset = VideoPreset::for_quality(shared.low_quality);
    shared.tools.reencode(&src, &dst, preset).await?;
    if let Err(e) = tokio::fs::remove_file(&src).await {
        debug!("Unable to remove {}: {}", src.display(), e);
    }
    Ok(dst)
}

async fn version_ident(shared: &VideoShared, job: &VideoJob) -> VersionIdent {
    if job.is_youtube {
        return VersionIdent::fixed(YOUTUBE_IDENT);
    }
    match shared.fetcher.head(&job.url).await {
        Ok(headers) => version_ident_from_headers(&headers),
        Err(e) => {
            warn!("Unable to query {}: {}", job.url, e);
            VersionIdent::Unknown
        }
    }
}

async fn process_video(shared: &VideoShared, job: VideoJob) -> Result<(), MediaError> {
    if shared.state.is_aborted() {
        return Ok(());
    }

    let Some(cache) = shared.cache.as_deref() else {
        let fpath = get_video_fpath(shared, &job.url).await?;
        add(shared, ArchiveItem::file(&job.path, VIDEO_MIME, fpath, true));
        return Ok(());
    };

    let key = cache_key_for(&job.url);
    let ident = version_ident(shared, &job).await;
    let store = match lookup(cache, &key, &ident, VIDEOS_ENCODER_VERSION).await {
        CacheLookup::Hit(data) => {
            add(shared, ArchiveItem::resource(&job.path, VIDEO_MIME, data));
            return Ok(());
        }
        CacheLookup::Miss { store } => store,
    };

    let fpath = get_video_fpath(shared, &job.url).await?;
    let data = tokio::fs::read(&fpath).await?;
    if let Err(e) = tokio::fs::remove_file(&fpath).await {
        debug!("Unable to remove {}: {}", fpath.display(), e);
    }
    add(shared, ArchiveItem::resource(&job.path, VIDEO_MIME, data.clone()));
    if store {
        upload(cache, &key, &data, &ident, VIDEOS_ENCODER_VERSION).await;
    }
    Ok(())
}

fn add(shared: &VideoShared, item: ArchiveItem) {
    let path = item.path.clone();
    if let Err(e) = shared.archive.add_item(item) {
        warn!("Unable to add {} to archive: {}", path, e);
    }
}

//! Image pipeline: bitmaps become lossy WebP, SVG is stored unchanged.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};
use url::Url;
use webp::Encoder;

use super::{lookup, upload, CacheLookup, MediaError, PipelineState};
use crate::archive::{ArchiveItem, SharedArchive};
use crate::cache::{cache_key_for, OptimizationCache};
use crate::executor::{Executor, ExecutorError};
use crate::fetch::Fetcher;
use crate::utils::{get_digest, slugify_stem, to_url, VersionIdent};

/// Bump when the conversion settings change so cached encodings are redone.
pub const IMAGES_ENCODER_VERSION: u32 = 1;

/// Image URLs are treated as stable: a fixed version identity.
const IMAGES_IDENT: &str = "1";

const WEBP_QUALITY: f32 = 60.0;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ImageKind {
    /// Convert to WebP (or keep SVG) and use the optimization cache.
    Optimize,
    /// Store bytes as fetched (stylesheet assets, fonts).
    Raw,
}

#[derive(Debug, Clone)]
struct ImageJob {
    url: String,
    path: String,
    mime_type: String,
    kind: ImageKind,
}

struct ImagerShared {
    fetcher: Arc<dyn Fetcher>,
    cache: Option<Arc<dyn OptimizationCache>>,
    archive: SharedArchive,
    state: Arc<PipelineState>,
    /// Archive path of every finished job and whether it produced an entry.
    outcomes: Mutex<HashMap<String, bool>>,
}

impl ImagerShared {
    fn settle(&self, path: &str, ok: bool) {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_string(), ok);
    }

    fn outcome(&self, path: &str) -> Option<bool> {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .copied()
    }
}

pub struct Imager {
    base_url: Url,
    handled: HashSet<String>,
    pending: Vec<ImageJob>,
    /// Paths handed out by `defer` since the last `take_referenced`.
    referenced: Vec<String>,
    executor: Arc<Executor>,
    shared: Arc<ImagerShared>,
}

fn is_svg(url: &Url) -> bool {
    url.path().ends_with(".svg") || url.path().contains("/math/render/svg/")
}

impl Imager {
    pub fn new(
        base_url: Url,
        fetcher: Arc<dyn Fetcher>,
        cache: Option<Arc<dyn OptimizationCache>>,
        archive: SharedArchive,
        executor: Arc<Executor>,
    ) -> Self {
        Self {
            base_url,
            handled: HashSet::new(),
            pending: Vec::new(),
            referenced: Vec::new(),
            executor,
            shared: Arc::new(ImagerShared {
                fetcher,
                cache,
                archive,
                state: Arc::new(PipelineState::default()),
                outcomes: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn start(&self) {
        self.executor.start();
    }

    pub fn state(&self) -> &PipelineState {
        &self.shared.state
    }

    /// Number of parked jobs waiting for `submit_deferred`.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Paths returned by `defer` since the previous call, in order.
    pub fn take_referenced(&mut self) -> Vec<String> {
        std::mem::take(&mut self.referenced)
    }

    /// `Some(true)` once the image at `path` is in the archive, `Some(false)`
    /// once its job failed, `None` while it is still pending.
    pub fn outcome(&self, path: &str) -> Option<bool> {
        self.shared.outcome(path)
    }

    /// Archive path for an image URL.
    pub fn path_for(url: &Url) -> String {
        let suffix = if is_svg(url) { ".svg" } else { ".webp" };
        format!(
            "images/{}-{}{}",
            get_digest(url.as_str()),
            slugify_stem(url.path()),
            suffix
        )
    }

    /// Request processing of an image, returning its archive path immediately.
    ///
    /// Returns `None` for URLs that cannot be fetched (unparseable or non-HTTP).
    /// Repeated calls for the same URL return the same path and queue nothing.
    pub fn defer(&mut self, url: &str) -> Option<String> {
        let url = match Url::parse(&to_url(url, &self.base_url)) {
            Ok(url) => url,
            Err(_) => {
                warn!("Can't parse image URL `{}`. Skipping", url);
                return None;
            }
        };
        if !matches!(url.scheme(), "http" | "https") {
            warn!("Not supporting image URL `{}`. Skipping", url);
            return None;
        }

        let path = Self::path_for(&url);
        if self.outcome(&path) == Some(false) {
            debug!("Image `{}` is known to be unavailable", url);
            return None;
        }
        let mime_type = if is_svg(&url) {
            "image/svg+xml"
        } else {
            "image/webp"
        };
        let path = self.park(url, path, mime_type, ImageKind::Optimize)?;
        self.referenced.push(path.clone());
        Some(path)
    }

    /// Request a resource stored unchanged under `path` (stylesheet assets).
    pub fn defer_raw(&mut self, url: &str, path: &str) -> Option<String> {
        let url = Url::parse(&to_url(url, &self.base_url)).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let mime_type = mime_guess::from_path(url.path())
            .first_or_octet_stream()
            .to_string();
        self.park(url, path.to_string(), &mime_type, ImageKind::Raw)
    }

    fn park(&mut self, url: Url, path: String, mime_type: &str, kind: ImageKind) -> Option<String> {
        let digest = get_digest(url.as_str());
        if !self.handled.insert(digest) {
            debug!("URL `{}` already processed.", url);
            return Some(path);
        }
        self.shared.state.record_requested();
        self.pending.push(ImageJob {
            url: url.to_string(),
            path: path.clone(),
            mime_type: mime_type.to_string(),
            kind,
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
                        let path = job.path.clone();
                        let result = process_image(&shared, job).await;
                        shared.settle(&path, result.is_ok());
                        result.map_err(anyhow::Error::from)
                    }),
                    Some(self.shared.state.once_done("Images")),
                )
                .await?;
        }
        Ok(())
    }

    /// Submit what is parked and wait for every job to finish.
    pub async fn drain(&mut self) -> Result<(), ExecutorError> {
        self.submit_deferred().await?;
        self.executor.shutdown(true).await;
        debug!(
            "Images done: {}/{}",
            self.state().done(),
            self.state().requested()
        );
        Ok(())
    }

    /// Skip every job not yet started and stop the pool without draining.
    pub async fn abort(&mut self) {
        self.shared.state.abort();
        self.pending.clear();
        self.executor.shutdown(false).await;
    }
}

/// Re-encode a bitmap as lossy WebP.
pub fn convert_to_webp(data: &[u8], quality: f32) -> Result<Vec<u8>, MediaError> {
    let img = image::load_from_memory(data)?;
    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        Encoder::from_rgba(&rgba, rgba.width(), rgba.height()).encode(quality)
    } else {
        let rgb = match img {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        };
        Encoder::from_rgb(&rgb, rgb.width(), rgb.height()).encode(quality)
    };
    Ok(encoded.to_vec())
}

/// Square PNG of `size` pixels, cropped to fill, for the archive illustration.
pub fn make_illustration(data: &[u8], size: u32) -> Result<Vec<u8>, MediaError> {
    let img = image::load_from_memory(data)?;
    let resized = img.resize_to_fill(size, size, FilterType::Lanczos3);
    let mut out = Cursor::new(Vec::new());
    resized.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Bytes to store for an image: SVG as is, everything else as WebP.
async fn get_image_data(fetcher: &dyn Fetcher, url: &str) -> Result<Vec<u8>, MediaError> {
    let src = fetcher.get_bytes(url).await?;
    let parsed = Url::parse(url).ok();
    if parsed.as_ref().is_some_and(is_svg) {
        return Ok(src);
    }
    tokio::task::spawn_blocking(move || convert_to_webp(&src, WEBP_QUALITY)).await?
}

async fn process_image(shared: &ImagerShared, job: ImageJob) -> Result<(), MediaError> {
    if shared.state.is_aborted() {
        return Ok(());
    }

    if job.kind == ImageKind::Raw {
        let data = shared.fetcher.get_bytes(&job.url).await?;
        add(shared, &job, data);
        return Ok(());
    }

    let Some(cache) = shared.cache.as_deref() else {
        let data = get_image_data(shared.fetcher.as_ref(), &job.url).await?;
        add(shared, &job, data);
        return Ok(());
    };

    let key = cache_key_for(&job.url);
    let ident = VersionIdent::fixed(IMAGES_IDENT);
    let store = match lookup(cache, &key, &ident, IMAGES_ENCODER_VERSION).await {
        CacheLookup::Hit(data) => {
            add(shared, &job, data);
            return Ok(());
        }
        CacheLookup::Miss { store } => store,
    };

    let data = get_image_data(shared.fetcher.as_ref(), &job.url).await?;
    add(shared, &job, data.clone());
    if store {
        upload(cache, &key, &data, &ident, IMAGES_ENCODER_VERSION).await;
    }
    Ok(())
}

fn add(shared: &ImagerShared, job: &ImageJob, data: Vec<u8>) {
    let item = ArchiveItem::resource(&job.path, &job.mime_type, data);
    if let Err(e) = shared.archive.add_item(item) {
        warn!("Unable to add {} to archive: {}", job.path, e);
    }
}

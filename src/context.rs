//! Everything one crawl run shares, built once at startup.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::info;

use crate::archive::{ArchiveMetadata, SharedArchive, ZipArchiveBuilder};
use crate::cache::{DevelCache, OptimizationCache, S3Cache};
use crate::config::Config;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::http_client::HttpClient;
use crate::media::{ExternalTools, VideoTools};

/// Collaborators of a run. Components receive the pieces they need from it.
pub struct RunContext {
    pub config: Config,
    pub fetcher: Arc<dyn Fetcher>,
    pub archive: SharedArchive,
    pub cache: Option<Arc<dyn OptimizationCache>>,
    pub video_tools: Arc<dyn VideoTools>,
    pub build_dir: PathBuf,
    pub today: NaiveDate,
}

impl RunContext {
    /// Production wiring: HTTP client, ZIP archive, optional S3 cache or local
    /// download mirror, `yt-dlp`/`ffmpeg` from PATH.
    pub async fn from_config(config: Config) -> Result<Self> {
        let today = Local::now().date_naive();
        let unique = format!(
            "wikihow_offline_{}_{}",
            Local::now().format("%Y%m%d%H%M%S"),
            std::process::id()
        );
        let build_dir = config.build_dir_for(&unique);

        let mut fetcher: Arc<dyn Fetcher> =
            Arc::new(HttpClient::new(config.request_timeout, config.delay)?);
        let mut video_tools: Arc<dyn VideoTools> = Arc::new(ExternalTools::locate()?);

        let output = config.archive_path(today);
        info!("Archive will be written to {}", output.display());
        let metadata = ArchiveMetadata::new(
            &config.archive_name(),
            config.language.iso_639_3,
            today,
        );
        let archive = SharedArchive::new(ZipArchiveBuilder::new(output, metadata));

        let cache: Option<Arc<dyn OptimizationCache>> = match &config.optimization_cache {
            Some(url) => {
                let s3 = S3Cache::from_url(url)?;
                s3.check_credentials().await?;
                info!("Optimization cache ready on bucket {}", s3.params().bucket);
                Some(Arc::new(s3))
            }
            None if config.devel_cache => {
                info!("Keeping raw downloads in {}", build_dir.display());
                let mirror = Arc::new(DevelCache::new(
                    build_dir.clone(),
                    fetcher.clone(),
                    video_tools.clone(),
                ));
                fetcher = mirror.clone();
                video_tools = mirror;
                None
            }
            None => None,
        };

        Ok(Self {
            config,
            fetcher,
            archive,
            cache,
            video_tools,
            build_dir,
            today,
        })
    }
}

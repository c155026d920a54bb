//! Run configuration.
//!
//! Command-line options are turned into a fully typed [`Config`] once, at
//! startup; every component receives the parts it needs from it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use url::Url;

use crate::error::{Result, ScrapeError};

/// A wikiHow edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub iso_639_3: &'static str,
    pub base_url: &'static str,
}

pub const LANGUAGES: &[Language] = &[
    Language { code: "en", iso_639_3: "eng", base_url: "https://www.wikihow.com" },
    Language { code: "es", iso_639_3: "spa", base_url: "https://es.wikihow.com" },
    Language { code: "pt", iso_639_3: "por", base_url: "https://pt.wikihow.com" },
    Language { code: "it", iso_639_3: "ita", base_url: "https://www.wikihow.it" },
    Language { code: "fr", iso_639_3: "fra", base_url: "https://fr.wikihow.com" },
    Language { code: "ru", iso_639_3: "rus", base_url: "https://ru.wikihow.com" },
    Language { code: "de", iso_639_3: "deu", base_url: "https://de.wikihow.com" },
    Language { code: "zh", iso_639_3: "zho", base_url: "https://zh.wikihow.com" },
    Language { code: "nl", iso_639_3: "nld", base_url: "https://nl.wikihow.com" },
    Language { code: "cs", iso_639_3: "ces", base_url: "https://www.wikihow.cz" },
    Language { code: "id", iso_639_3: "ind", base_url: "https://id.wikihow.com" },
    Language { code: "ja", iso_639_3: "jpn", base_url: "https://www.wikihow.jp" },
    Language { code: "hi", iso_639_3: "hin", base_url: "https://hi.wikihow.com" },
    Language { code: "th", iso_639_3: "tha", base_url: "https://th.wikihow.com" },
    Language { code: "ar", iso_639_3: "ara", base_url: "https://ar.wikihow.com" },
    Language { code: "ko", iso_639_3: "kor", base_url: "https://ko.wikihow.com" },
    Language { code: "tr", iso_639_3: "tur", base_url: "https://www.wikihow.com.tr" },
    Language { code: "vi", iso_639_3: "vie", base_url: "https://www.wikihow.vn" },
];

impl Language {
    pub fn find(code: &str) -> Option<Language> {
        LANGUAGES.iter().copied().find(|l| l.code == code)
    }

    pub fn codes() -> Vec<&'static str> {
        LANGUAGES.iter().map(|l| l.code).collect()
    }
}

/// Tags every archive carries.
pub const DEFAULT_TAGS: &[&str] = &["_category:wikihow", "wikihow"];

pub const DEFAULT_CREATOR: &str = "wikiHow";
pub const DEFAULT_PUBLISHER: &str = "openZIM";

/// One crawl run.
#[derive(Debug, Clone)]
pub struct Config {
    pub language: Language,
    pub base_url: Url,

    pub output_dir: PathBuf,
    pub tmp_dir: PathBuf,
    /// Build directly inside `tmp_dir` instead of a unique sub-folder.
    pub build_in_tmp: bool,
    pub keep_build_dir: bool,

    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub creator: String,
    pub publisher: String,
    pub tags: Vec<String>,
    pub fname: Option<String>,

    /// Category identities to crawl. A trailing `/` disables recursion.
    pub categories: Vec<String>,
    pub single_article: Option<String>,
    pub exclude: Option<String>,
    pub only: Option<String>,

    pub without_videos: bool,
    pub without_external_links: bool,
    pub low_quality: bool,

    pub optimization_cache: Option<String>,
    pub devel_cache: bool,

    /// `None` disables the missing-content circuit breaker.
    pub missing_tolerance: Option<u8>,
    pub delay: Duration,
    pub request_timeout: Duration,

    pub skip_dom_check: bool,
    pub skip_footer_links: bool,
    pub skip_relateds: bool,
    pub stats_filename: Option<PathBuf>,

    pub debug: bool,
}

impl Config {
    /// Defaults for a language; everything optional left unset.
    pub fn for_language(code: &str) -> Result<Self> {
        let language = Language::find(code).ok_or_else(|| {
            ScrapeError::Config(format!(
                "unknown language `{}` (expected one of {})",
                code,
                Language::codes().join(", ")
            ))
        })?;
        let base_url = Url::parse(language.base_url)
            .map_err(|e| ScrapeError::Config(format!("invalid base URL: {}", e)))?;
        Ok(Self {
            language,
            base_url,
            output_dir: PathBuf::from("/output"),
            tmp_dir: std::env::var_os("TMPDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            build_in_tmp: false,
            keep_build_dir: false,
            name: None,
            title: None,
            description: None,
            icon: None,
            creator: DEFAULT_CREATOR.to_string(),
            publisher: DEFAULT_PUBLISHER.to_string(),
            tags: Vec::new(),
            fname: None,
            categories: Vec::new(),
            single_article: None,
            exclude: None,
            only: None,
            without_videos: false,
            without_external_links: false,
            low_quality: false,
            optimization_cache: None,
            devel_cache: false,
            missing_tolerance: None,
            delay: Duration::ZERO,
            request_timeout: Duration::from_secs(30),
            skip_dom_check: false,
            skip_footer_links: false,
            skip_relateds: false,
            stats_filename: None,
            debug: false,
        })
    }

    /// Source site host, e.g. `www.wikihow.com`.
    pub fn domain(&self) -> &str {
        self.base_url.host_str().unwrap_or_default()
    }

    /// Archive name, derived from language and selection when not given.
    pub fn archive_name(&self) -> String {
        if let Some(name) = self.name.as_ref().filter(|n| !n.trim().is_empty()) {
            return name.trim().to_string();
        }
        let selection = if self.single_article.is_some() {
            "single".to_string()
        } else if self.categories.is_empty() {
            "maxi".to_string()
        } else {
            self.categories
                .iter()
                .map(|c| c.trim_end_matches('/').to_lowercase())
                .collect::<Vec<_>>()
                .join("_")
        };
        format!("wikihow_{}_{}", self.language.code, selection)
    }

    /// Archive file name: `<name>_<YYYY-MM>.zip` unless given.
    pub fn archive_filename(&self, today: NaiveDate) -> String {
        match self.fname.as_ref().filter(|f| !f.trim().is_empty()) {
            Some(fname) => fname.trim().to_string(),
            None => format!("{}_{}.zip", self.archive_name(), today.format("%Y-%m")),
        }
    }

    pub fn archive_path(&self, today: NaiveDate) -> PathBuf {
        self.output_dir.join(self.archive_filename(today))
    }

    /// Tags with the always-present ones added, deduplicated, in order.
    pub fn all_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        let split = self
            .tags
            .iter()
            .flat_map(|t| t.split(';'))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        for tag in split.chain(DEFAULT_TAGS.iter().map(|t| t.to_string())) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    /// Whether YouTube-hosted videos end up in the archive.
    pub fn include_youtube(&self) -> bool {
        !self.without_videos
    }

    /// Worker count for the video pool: one worker while YouTube is in scope.
    pub fn video_workers(&self) -> usize {
        if self.without_videos {
            10
        } else {
            1
        }
    }

    /// Per-run build directory.
    pub fn build_dir_for(&self, unique: &str) -> PathBuf {
        if self.build_in_tmp {
            self.tmp_dir.clone()
        } else {
            self.tmp_dir.join(unique)
        }
    }
}

/// Expand `~` and environment variables in a user path.
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(path),
    }
}

/// Whether `path` looks like an URL rather than a local file.
pub fn is_remote(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

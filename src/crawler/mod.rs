//! Crawl engine.
//!
//! A run resolves the set of expected nodes up front through the site's query
//! API, then walks them breadth-first: every category page and article is
//! fetched once, rewritten, rendered and added to the archive, while media is
//! handed to the deferred pipelines. Links discovered on the way (subcategories,
//! related articles) extend the queue unless a filter rules them out.

mod api;
mod homepage;
mod missing;
mod visited;

pub use api::{is_soft_404, title_to_ident, CategoryMembers, QueryApi};
pub use homepage::{check_dom_integrity, fetch_site_info, SiteInfo, TopCategory};
pub use missing::{MissingTracker, ZERO_TOLERANCE_ALLOWANCE};
pub use visited::VisitedSet;

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use askama::Template;
use regex::Regex;
use scraper::Selector;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::archive::{ArchiveItem, ArchiveMetadata};
use crate::config::{expand_path, is_remote, Config};
use crate::context::RunContext;
use crate::error::{Result, ScrapeError};
use crate::executor::Executor;
use crate::fetch::Fetcher;
use crate::filters::{load_list, FilterLists, ListEntries};
use crate::media::{make_illustration, Imager, MediaError, VideoGrabber};
use crate::rewriter::{selector, PageDocument, Rewriter};
use crate::site;
use crate::templates::{HomeCategory, PageFrame};
use crate::utils::{
    article_ident_for, cat_ident_for, get_digest, normalize_ident, parse_css, to_root_for,
};

/// Archive entry the reader opens first.
pub const MAIN_PATH: &str = "index";
pub const ILLUSTRATION_SIZE: u32 = 48;

const IMAGE_QUEUE_SIZE: usize = 20;
const IMAGE_WORKERS: usize = 10;
const VIDEO_QUEUE_SIZE: usize = 20;

const TITLE_MAX_CHARS: usize = 30;
const DESCRIPTION_MAX_CHARS: usize = 80;

const APP_CSS: &str = include_str!("../../assets/app.css");
const APP_JS: &str = include_str!("../../assets/app.js");

static PAGE_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(site::PAGE_TITLE));
static DOCUMENT_TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static SUBCATEGORY_LINKS: LazyLock<Selector> = LazyLock::new(|| selector(site::SUBCATEGORY_LINKS));
static ARTICLE_LINKS: LazyLock<Selector> =
    LazyLock::new(|| selector(site::CATEGORY_ARTICLE_LINKS));
static PAGINATION_LINKS: LazyLock<Selector> = LazyLock::new(|| selector(site::PAGINATION_LINKS));
static RELATED_LINKS: LazyLock<Selector> = LazyLock::new(|| selector(site::RELATED_LINKS));
static ALL_LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static CONTENT_REGIONS: LazyLock<Vec<Selector>> =
    LazyLock::new(|| site::CONTENT_REGIONS.iter().map(|css| selector(css)).collect());
static BLOCKS: LazyLock<Vec<Selector>> =
    LazyLock::new(|| site::BLOCK_LIST.iter().map(|css| selector(css)).collect());
static PAGE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?&]pg=(\d+)").unwrap());

/// Absolute URL of a path on the source site.
pub(crate) fn page_url(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CrawlTask {
    Category { ident: String, recurse: bool },
    Article { ident: String, strip_links: bool },
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeSummary {
    pub categories: usize,
    pub articles: usize,
    pub missing: usize,
    pub images: usize,
    pub videos: usize,
}

#[derive(Serialize)]
struct Progress {
    done: usize,
    total: usize,
}

/// The two media pipelines of a run.
struct Pipelines {
    imager: Imager,
    videos: VideoGrabber,
}

impl Pipelines {
    fn new(ctx: &RunContext) -> Self {
        let config = &ctx.config;
        let images = Arc::new(Executor::new("IMG-T-", IMAGE_QUEUE_SIZE, IMAGE_WORKERS));
        let videos = Arc::new(Executor::new(
            "VID-T-",
            VIDEO_QUEUE_SIZE,
            config.video_workers(),
        ));
        let imager = Imager::new(
            config.base_url.clone(),
            ctx.fetcher.clone(),
            ctx.cache.clone(),
            ctx.archive.clone(),
            images,
        );
        let videos = VideoGrabber::new(
            config.base_url.clone(),
            ctx.fetcher.clone(),
            ctx.cache.clone(),
            ctx.archive.clone(),
            ctx.video_tools.clone(),
            &ctx.build_dir,
            config.low_quality,
            videos,
        );
        imager.start();
        videos.start();
        Self { imager, videos }
    }

    /// Hand everything parked by the last page to the workers.
    async fn submit(&mut self) -> Result<()> {
        self.imager.submit_deferred().await?;
        self.videos.submit_deferred().await?;
        Ok(())
    }

    async fn drain(&mut self) -> Result<()> {
        info!(
            "Waiting for media: {} images, {} videos",
            self.imager.state().requested(),
            self.videos.state().requested()
        );
        self.imager.drain().await?;
        self.videos.drain().await?;
        Ok(())
    }

    async fn abort(&mut self) {
        self.imager.abort().await;
        self.videos.abort().await;
    }
}

/// A rendered page waiting for its images to settle.
struct HeldPage {
    path: String,
    title: String,
    html: String,
    to_root: String,
    images: Vec<String>,
}

/// What exists only once the archive has been started.
struct Session {
    pipelines: Pipelines,
    rewriter: Rewriter,
    stylesheets: Vec<String>,
    site_name: String,
    language: String,
    held: Vec<HeldPage>,
}

impl Session {
    fn frame(&self) -> PageFrame<'_> {
        PageFrame {
            site_name: &self.site_name,
            language: &self.language,
            stylesheets: &self.stylesheets,
        }
    }

    /// Add a rendered page, or hold it until the images it references are done.
    fn add_page(
        &mut self,
        ctx: &RunContext,
        path: &str,
        title: &str,
        html: String,
        to_root: &str,
    ) -> Result<()> {
        let images = self.pipelines.imager.take_referenced();
        let page = HeldPage {
            path: path.to_string(),
            title: title.to_string(),
            html,
            to_root: to_root.to_string(),
            images,
        };
        if page.images.is_empty() {
            return self.write_page(ctx, page);
        }
        self.held.push(page);
        Ok(())
    }

    /// Write held pages whose images are all settled, or every held page when
    /// `all` is set.
    fn flush_pages(&mut self, ctx: &RunContext, all: bool) -> Result<()> {
        let imager = &self.pipelines.imager;
        let (ready, waiting): (Vec<HeldPage>, Vec<HeldPage>) =
            std::mem::take(&mut self.held).into_iter().partition(|page| {
                all || page.images.iter().all(|p| imager.outcome(p).is_some())
            });
        self.held = waiting;
        for page in ready {
            self.write_page(ctx, page)?;
        }
        Ok(())
    }

    /// Drop `src` and `poster` attributes pointing at images that never made it in.
    fn write_page(&self, ctx: &RunContext, page: HeldPage) -> Result<()> {
        let mut html = page.html;
        for image in &page.images {
            if self.pipelines.imager.outcome(image) == Some(true) {
                continue;
            }
            debug!("Image {} unavailable, removing it from {}", image, page.path);
            for attr in ["src", "poster"] {
                html = html.replace(&format!(r#" {}="{}{}""#, attr, page.to_root, image), "");
            }
        }
        ctx.archive
            .add_item(ArchiveItem::page(&page.path, &page.title, html))?;
        Ok(())
    }
}

/// Mutable bookkeeping of a run.
struct CrawlState {
    category_prefix: String,
    site: SiteInfo,
    filters: FilterLists,
    visited: VisitedSet,
    missing: MissingTracker,
    expected_categories: BTreeSet<String>,
    expected_articles: BTreeSet<String>,
    non_recursive: HashSet<String>,
    queue: VecDeque<CrawlTask>,
    done: usize,
}

/// Crawls one wikiHow edition into an archive.
pub struct Scraper {
    ctx: RunContext,
    state: CrawlState,
    session: Option<Session>,
}

impl Scraper {
    pub fn new(ctx: RunContext) -> Self {
        let missing = MissingTracker::new(ctx.config.missing_tolerance);
        Self {
            ctx,
            state: CrawlState {
                category_prefix: site::DEFAULT_CATEGORY_PREFIX.to_string(),
                site: SiteInfo::default(),
                filters: FilterLists::default(),
                visited: VisitedSet::new(),
                missing,
                expected_categories: BTreeSet::new(),
                expected_articles: BTreeSet::new(),
                non_recursive: HashSet::new(),
                queue: VecDeque::new(),
                done: 0,
            },
            session: None,
        }
    }

    /// Crawl until done, failed or interrupted with Ctrl-C.
    pub async fn run(self) -> Result<ScrapeSummary> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Crawl until done or failed, or until `shutdown` completes.
    ///
    /// On any failure the archive is discarded and the media pipelines are
    /// stopped without waiting for queued work.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<ScrapeSummary>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting crawl of {} ({})",
            self.ctx.config.base_url, self.ctx.config.language.code
        );
        let result = tokio::select! {
            result = crawl(&self.ctx, &mut self.state, &mut self.session) => result,
            _ = shutdown => {
                warn!("Interrupt received, stopping");
                Err(ScrapeError::Interrupted)
            }
        };

        if let Err(e) = &result {
            debug!("Crawl failed: {:?}", e);
            self.discard().await;
        }
        self.cleanup();
        result
    }

    async fn discard(&mut self) {
        self.ctx.archive.set_can_finish(false);
        if let Some(session) = self.session.as_mut() {
            session.pipelines.abort().await;
        }
        if let Err(e) = self.ctx.archive.finish() {
            debug!("Archive not finalized: {}", e);
        }
    }

    fn cleanup(&self) {
        let build_dir = &self.ctx.build_dir;
        if self.ctx.config.keep_build_dir {
            info!("Keeping build folder {}", build_dir.display());
            return;
        }
        if self.ctx.config.build_in_tmp {
            // The build folder is the user's temporary folder: only remove our files.
            remove_path(&build_dir.join("videos"));
            remove_path(&build_dir.join(EXCLUDES_COPY));
            remove_path(&build_dir.join(INCLUDES_COPY));
        } else {
            remove_path(build_dir);
        }
    }
}

const EXCLUDES_COPY: &str = "excludes.txt";
const INCLUDES_COPY: &str = "includes.txt";

fn remove_path(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else if path.exists() {
        std::fs::remove_file(path)
    } else {
        return;
    };
    if let Err(e) = result {
        warn!("Unable to remove {}: {}", path.display(), e);
    }
}

async fn crawl(
    ctx: &RunContext,
    state: &mut CrawlState,
    slot: &mut Option<Session>,
) -> Result<ScrapeSummary> {
    let config = &ctx.config;
    tokio::fs::create_dir_all(ctx.build_dir.join("videos")).await?;

    let fetcher = ctx.fetcher.as_ref();
    let api = QueryApi::new(fetcher, &config.base_url)?;
    state.category_prefix = match api.category_prefix().await {
        Ok(Some(prefix)) => prefix,
        Ok(None) => site::DEFAULT_CATEGORY_PREFIX.to_string(),
        Err(e) => {
            warn!("Unable to read category namespace, assuming default: {}", e);
            site::DEFAULT_CATEGORY_PREFIX.to_string()
        }
    };
    debug!("Category prefix is `{}`", state.category_prefix);

    if config.skip_dom_check {
        info!("Skipping DOM integrity checks");
    } else {
        check_dom_integrity(fetcher, &config.base_url, &state.category_prefix).await?;
    }

    state.site = fetch_site_info(fetcher, &config.base_url, &state.category_prefix).await?;
    ctx.archive.set_metadata(state.archive_metadata(ctx));
    ctx.archive.set_main_path(MAIN_PATH);
    ctx.archive.start()?;

    state.load_filters(ctx).await?;
    state.build_expected(config, &api).await;
    if state.crawls_footer(config) {
        for ident in &state.site.footer_articles {
            state.filters.allow_article(ident);
        }
    }

    let rewriter = Rewriter::new(
        config.domain(),
        &state.category_prefix,
        config.without_external_links,
        Arc::new(state.filters.clone()),
    )
    .map_err(|e| ScrapeError::Config(format!("invalid domain pattern: {}", e)))?;
    let session = slot.insert(Session {
        pipelines: Pipelines::new(ctx),
        rewriter,
        stylesheets: Vec::new(),
        site_name: state.site_name(config),
        language: config.language.code.to_string(),
        held: Vec::new(),
    });

    state.add_assets(ctx, session).await?;
    state.add_main_page(ctx, session)?;
    state.queue_all(config);
    state.write_progress(config)?;

    while let Some(task) = state.queue.pop_front() {
        match task {
            CrawlTask::Category { ident, recurse } => {
                state.crawl_category(ctx, session, &ident, recurse).await?
            }
            CrawlTask::Article { ident, strip_links } => {
                state
                    .crawl_article(ctx, session, &api, &ident, strip_links)
                    .await?
            }
        }
        state.done += 1;
        session.pipelines.submit().await?;
        session.flush_pages(ctx, false)?;
        state.write_progress(config)?;
    }

    session.pipelines.drain().await?;
    session.flush_pages(ctx, true)?;
    ctx.archive.finish()?;

    let summary = ScrapeSummary {
        categories: state.visited.categories(),
        articles: state.visited.articles(),
        missing: state.missing.missing(),
        images: session.pipelines.imager.state().done(),
        videos: session.pipelines.videos.state().done(),
    };
    info!(
        "Crawl finished: {} categories, {} articles, {} missing, {} images, {} videos",
        summary.categories, summary.articles, summary.missing, summary.images, summary.videos
    );
    Ok(summary)
}

/// Truncate to at most `max` characters, ending with an ellipsis when cut.
fn truncate_chars(value: &str, max: usize) -> String {
    let value = value.trim();
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out = out.trim_end().to_string();
    out.push('…');
    out
}

fn first_text(doc: &PageDocument, sel: &Selector) -> Option<String> {
    doc.select_first(sel)
        .map(|id| doc.text(id).split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
}

fn page_title(doc: &PageDocument, ident: &str) -> String {
    first_text(doc, &PAGE_TITLE)
        .or_else(|| first_text(doc, &DOCUMENT_TITLE))
        .unwrap_or_else(|| ident.replace('-', " "))
}

fn strip_blocks(doc: &mut PageDocument) {
    for sel in BLOCKS.iter() {
        for id in doc.select(sel) {
            doc.remove(id);
        }
    }
}

/// Markup of the page's main content region.
fn content_html(doc: &PageDocument) -> String {
    CONTENT_REGIONS
        .iter()
        .find_map(|sel| {
            doc.select(sel)
                .into_iter()
                .find(|id| !doc.is_detached(*id))
        })
        .map(|id| doc.inner_html(id))
        .unwrap_or_default()
}

/// Highest page number linked from the pagination block.
fn last_page_number(doc: &PageDocument) -> usize {
    doc.select(&PAGINATION_LINKS)
        .into_iter()
        .filter_map(|link| {
            let from_href = doc
                .attr(link, "href")
                .and_then(|href| PAGE_NUMBER.captures(&href).map(|c| c[1].to_string()))
                .and_then(|n| n.parse::<usize>().ok());
            from_href.or_else(|| doc.text(link).trim().parse::<usize>().ok())
        })
        .max()
        .unwrap_or(1)
        .max(1)
}

async fn read_source(
    fetcher: &dyn Fetcher,
    source: &str,
) -> std::result::Result<Vec<u8>, MediaError> {
    if is_remote(source) {
        Ok(fetcher.get_bytes(source).await?)
    } else {
        Ok(tokio::fs::read(expand_path(source)).await?)
    }
}

impl CrawlState {
    fn site_name(&self, config: &Config) -> String {
        config
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.site.title.clone())
    }

    fn archive_metadata(&self, ctx: &RunContext) -> ArchiveMetadata {
        let config = &ctx.config;
        let mut metadata =
            ArchiveMetadata::new(&config.archive_name(), config.language.iso_639_3, ctx.today);
        let title = self.site_name(config);
        if !title.trim().is_empty() {
            metadata.title = truncate_chars(&title, TITLE_MAX_CHARS);
        }
        let description = config
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| Some(self.site.description.clone()).filter(|d| !d.trim().is_empty()))
            .unwrap_or_else(|| format!("Offline version of {}", metadata.title));
        metadata.description = truncate_chars(&description, DESCRIPTION_MAX_CHARS);
        metadata.creator = config.creator.clone();
        metadata.publisher = config.publisher.clone();
        metadata.tags = config.all_tags();
        metadata.main_path = MAIN_PATH.to_string();
        metadata
    }

    fn crawls_footer(&self, config: &Config) -> bool {
        !config.skip_footer_links && config.single_article.is_none()
    }

    fn follows_related(&self, config: &Config) -> bool {
        !config.skip_relateds && config.single_article.is_none()
    }

    async fn load_filters(&mut self, ctx: &RunContext) -> Result<()> {
        let fetcher = ctx.fetcher.as_ref();
        let prefix = &self.category_prefix;
        let exclusion = match &ctx.config.exclude {
            Some(source) => {
                load_list(fetcher, source, &ctx.build_dir.join(EXCLUDES_COPY), prefix).await?
            }
            None => ListEntries::default(),
        };
        let inclusion = match &ctx.config.only {
            Some(source) => {
                load_list(fetcher, source, &ctx.build_dir.join(INCLUDES_COPY), prefix).await?
            }
            None => ListEntries::default(),
        };
        self.filters = FilterLists::new(exclusion, inclusion);
        if self.filters.whitelist_mode() {
            info!("Whitelist mode: only listed entries and their members are crawled");
        }
        Ok(())
    }

    /// Resolve every category and article the run is expected to produce.
    async fn build_expected(&mut self, config: &Config, api: &QueryApi<'_>) {
        if let Some(article) = &config.single_article {
            let ident = normalize_ident(article.trim().trim_matches('/'));
            info!("Single article mode: {}", ident);
            self.expected_articles.insert(ident);
            self.missing.expect_at_least(1);
            return;
        }

        let whitelist = self.filters.whitelist_mode();
        let from_inclusion = whitelist && config.categories.is_empty();
        let roots: Vec<(String, bool)> = if !config.categories.is_empty() {
            config
                .categories
                .iter()
                .map(|c| {
                    let c = c.trim();
                    (normalize_ident(c.trim_end_matches('/')), !c.ends_with('/'))
                })
                .collect()
        } else if from_inclusion {
            let mut articles: Vec<String> =
                self.filters.inclusion.articles.iter().cloned().collect();
            articles.sort();
            self.expected_articles.extend(articles);
            let mut categories: Vec<String> =
                self.filters.inclusion.categories.iter().cloned().collect();
            categories.sort();
            categories.into_iter().map(|c| (c, true)).collect()
        } else {
            self.site
                .top_categories
                .iter()
                .map(|c| (c.ident.clone(), true))
                .collect()
        };

        self.enumerate(api, roots, !from_inclusion).await;

        if from_inclusion {
            let categories: Vec<String> = self.expected_categories.iter().cloned().collect();
            for ident in categories {
                self.filters.allow_category(&ident);
            }
            let articles: Vec<String> = self.expected_articles.iter().cloned().collect();
            for ident in articles {
                self.filters.allow_article(&ident);
            }
        }

        self.missing.expect_at_least(self.expected_articles.len());
        info!(
            "Expecting {} categories and {} articles",
            self.expected_categories.len(),
            self.expected_articles.len()
        );
    }

    /// Depth-first walk of category membership through the query API.
    async fn enumerate(
        &mut self,
        api: &QueryApi<'_>,
        roots: Vec<(String, bool)>,
        filtered: bool,
    ) {
        let mut stack: Vec<(String, bool)> = Vec::new();
        for (ident, recurse) in roots.into_iter().rev() {
            if filtered && self.filters.exclusion.categories.contains(&ident) {
                info!("Category {} is excluded", ident);
                continue;
            }
            stack.push((ident, recurse));
        }

        while let Some((ident, recurse)) = stack.pop() {
            if !self.expected_categories.insert(ident.clone()) {
                continue;
            }
            if !recurse {
                self.non_recursive.insert(ident.clone());
            }
            let members = match api.category_members(&self.category_prefix, &ident).await {
                Ok(members) => members,
                Err(e) => {
                    warn!("Unable to list members of {}: {}", ident, e);
                    continue;
                }
            };
            for article in members.articles {
                if filtered && self.filters.skip_article(&article) {
                    continue;
                }
                self.expected_articles.insert(article);
            }
            if !recurse {
                continue;
            }
            for sub in members.subcategories.into_iter().rev() {
                if filtered && self.filters.skip_category(&sub) {
                    continue;
                }
                if !self.expected_categories.contains(&sub) {
                    stack.push((sub, true));
                }
            }
        }
    }

    /// Footer pages first, then expected categories, then expected articles.
    fn queue_all(&mut self, config: &Config) {
        if self.crawls_footer(config) {
            for ident in self.site.footer_articles.clone() {
                if self.visited.mark_article(&ident) {
                    self.queue.push_back(CrawlTask::Article {
                        ident,
                        strip_links: true,
                    });
                }
            }
        }
        for ident in self.expected_categories.clone() {
            if self.visited.mark_category(&ident) {
                let recurse = !self.non_recursive.contains(&ident);
                self.queue.push_back(CrawlTask::Category { ident, recurse });
            }
        }
        for ident in self.expected_articles.clone() {
            if self.visited.mark_article(&ident) {
                self.queue.push_back(CrawlTask::Article {
                    ident,
                    strip_links: false,
                });
            }
        }
    }

    fn schedule_category(&mut self, ident: String) {
        if self.filters.skip_category(&ident) || !self.visited.mark_category(&ident) {
            return;
        }
        debug!("Discovered category {}", ident);
        self.queue.push_back(CrawlTask::Category {
            ident,
            recurse: true,
        });
    }

    fn schedule_article(&mut self, ident: String) {
        if self.filters.skip_article(&ident) || !self.visited.mark_article(&ident) {
            return;
        }
        debug!("Discovered article {}", ident);
        self.queue.push_back(CrawlTask::Article {
            ident,
            strip_links: false,
        });
        self.missing.expect_at_least(self.visited.articles());
    }

    fn article_links(&self, doc: &PageDocument, sel: &Selector, base: &Url) -> Vec<String> {
        doc.select(sel)
            .into_iter()
            .filter_map(|link| doc.attr(link, "href"))
            .filter(|href| cat_ident_for(href, &self.category_prefix).is_none())
            .filter_map(|href| article_ident_for(&href, base))
            .collect()
    }

    /// Fetch a page, recording 404s. Other failures skip the node.
    async fn fetch_node(&mut self, fetcher: &dyn Fetcher, url: &str) -> Result<Option<String>> {
        match fetcher.get_page(url).await {
            Ok(html) => Ok(Some(html)),
            Err(e) if e.is_not_found() => {
                warn!("Missing page {}", url);
                self.missing.record_missing(url)?;
                Ok(None)
            }
            Err(e) => {
                warn!("Skipping {}: {}", url, e);
                Ok(None)
            }
        }
    }

    async fn crawl_category(
        &mut self,
        ctx: &RunContext,
        session: &mut Session,
        ident: &str,
        recurse: bool,
    ) -> Result<()> {
        let config = &ctx.config;
        let fetcher = ctx.fetcher.as_ref();
        let base_path = format!("{}:{}", self.category_prefix, ident);
        let url = page_url(&config.base_url, &base_path);
        info!("Category {}", ident);

        let Some(html) = self.fetch_node(fetcher, &url).await? else {
            return Ok(());
        };
        let mut doc = PageDocument::document(&html);
        let title = page_title(&doc, ident);
        let last_page = last_page_number(&doc);

        if recurse {
            let subcategories: Vec<String> = doc
                .select(&SUBCATEGORY_LINKS)
                .into_iter()
                .filter_map(|link| doc.attr(link, "href"))
                .filter_map(|href| cat_ident_for(&href, &self.category_prefix))
                .collect();
            for sub in subcategories {
                self.schedule_category(sub);
            }
        }
        for article in self.article_links(&doc, &ARTICLE_LINKS, &config.base_url) {
            self.schedule_article(article);
        }
        self.store_category_page(ctx, session, &mut doc, &base_path, &title, 1, last_page)?;
        ctx.archive
            .add_redirect(&base_path, &format!("{}/1", base_path), &title)?;

        for page in 2..=last_page {
            let url = format!("{}?pg={}", url, page);
            let Some(html) = self.fetch_node(fetcher, &url).await? else {
                continue;
            };
            let mut doc = PageDocument::document(&html);
            for article in self.article_links(&doc, &ARTICLE_LINKS, &config.base_url) {
                self.schedule_article(article);
            }
            self.store_category_page(ctx, session, &mut doc, &base_path, &title, page, last_page)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn store_category_page(
        &self,
        ctx: &RunContext,
        session: &mut Session,
        doc: &mut PageDocument,
        base_path: &str,
        title: &str,
        page: usize,
        last_page: usize,
    ) -> Result<()> {
        strip_blocks(doc);
        let path = format!("{}/{}", base_path, page);
        let to_root = to_root_for(&path);
        let content = content_html(doc);
        let content = session
            .rewriter
            .rewrite(&content, &to_root, &mut session.pipelines.imager);
        let html = session
            .frame()
            .category(title, &content, page, last_page, &to_root)
            .render()?;
        session.add_page(ctx, &path, title, html, &to_root)
    }

    async fn crawl_article(
        &mut self,
        ctx: &RunContext,
        session: &mut Session,
        api: &QueryApi<'_>,
        ident: &str,
        strip_links: bool,
    ) -> Result<()> {
        let config = &ctx.config;
        let url = page_url(&config.base_url, ident);
        debug!("Article {}", ident);

        let html = match ctx.fetcher.get_page(&url).await {
            Ok(html) => html,
            Err(e) if e.is_not_found() => {
                if is_soft_404(api, ident).await {
                    info!("Article {} exists but is not published, adding placeholder", ident);
                    return self.store_unavailable(ctx, session, ident);
                }
                warn!("Missing article {}", url);
                self.missing.record_missing(&url)?;
                return Ok(());
            }
            Err(e) => {
                warn!("Skipping {}: {}", url, e);
                return Ok(());
            }
        };

        let mut doc = PageDocument::document(&html);
        if !strip_links && self.follows_related(config) {
            for related in self.article_links(&doc, &RELATED_LINKS, &config.base_url) {
                self.schedule_article(related);
            }
        }
        strip_blocks(&mut doc);
        if strip_links {
            for link in doc.select(&ALL_LINKS) {
                doc.remove_attr(link, "href");
            }
        }

        let title = page_title(&doc, ident);
        let to_root = to_root_for(ident);
        let content = content_html(&doc);
        let content = session.rewriter.rewrite_page(
            &content,
            &to_root,
            &mut session.pipelines.imager,
            &mut session.pipelines.videos,
            config.include_youtube(),
        );
        let html = session.frame().article(&title, &content, &to_root).render()?;
        session.add_page(ctx, ident, &title, html, &to_root)
    }

    fn store_unavailable(&self, ctx: &RunContext, session: &Session, ident: &str) -> Result<()> {
        let title = ident.replace('-', " ");
        let to_root = to_root_for(ident);
        let html = session.frame().unavailable(&title, &to_root).render()?;
        ctx.archive.add_item(ArchiveItem::page(ident, &title, html))?;
        Ok(())
    }

    fn add_main_page(&self, ctx: &RunContext, session: &Session) -> Result<()> {
        let config = &ctx.config;
        let site_name = &session.site_name;

        if config.single_article.is_some() {
            if let Some(article) = self.expected_articles.iter().next() {
                ctx.archive.add_redirect(MAIN_PATH, article, site_name)?;
                return Ok(());
            }
        }
        if let [category] = config.categories.as_slice() {
            let ident = normalize_ident(category.trim().trim_end_matches('/'));
            if self.expected_categories.contains(&ident) {
                let target = format!("{}:{}/1", self.category_prefix, ident);
                ctx.archive.add_redirect(MAIN_PATH, &target, site_name)?;
                return Ok(());
            }
        }

        let categories: Vec<HomeCategory> = if config.categories.is_empty() {
            self.site
                .top_categories
                .iter()
                .filter(|c| self.expected_categories.contains(&c.ident))
                .map(|c| HomeCategory {
                    path: format!("{}:{}/1", self.category_prefix, c.ident),
                    title: c.title.clone(),
                })
                .collect()
        } else {
            config
                .categories
                .iter()
                .map(|c| normalize_ident(c.trim().trim_end_matches('/')))
                .filter(|ident| self.expected_categories.contains(ident))
                .map(|ident| HomeCategory {
                    path: format!("{}:{}/1", self.category_prefix, ident),
                    title: ident.replace('-', " "),
                })
                .collect()
        };
        let description = if self.site.description.is_empty() {
            site_name.clone()
        } else {
            self.site.description.clone()
        };
        let html = session
            .frame()
            .home(site_name, &description, categories)
            .render()?;
        ctx.archive
            .add_item(ArchiveItem::page(MAIN_PATH, site_name, html))?;
        Ok(())
    }

    async fn add_assets(&self, ctx: &RunContext, session: &mut Session) -> Result<()> {
        ctx.archive.add_item(ArchiveItem::resource(
            "assets/app.css",
            "text/css",
            APP_CSS.as_bytes().to_vec(),
        ))?;
        ctx.archive.add_item(ArchiveItem::resource(
            "assets/app.js",
            "application/javascript",
            APP_JS.as_bytes().to_vec(),
        ))?;
        session.stylesheets.push("assets/app.css".to_string());

        for css_url in &self.site.stylesheets {
            match add_stylesheet(ctx, session, css_url).await {
                Ok(path) => session.stylesheets.insert(session.stylesheets.len() - 1, path),
                Err(e) => warn!("Skipping stylesheet {}: {}", css_url, e),
            }
        }

        let icon = ctx
            .config
            .icon
            .clone()
            .or_else(|| self.site.icon_url.clone());
        match icon {
            Some(source) => match add_illustration(ctx, &source).await {
                Ok(()) => debug!("Illustration from {}", source),
                Err(e) => warn!("Unable to use {} as illustration: {}", source, e),
            },
            None => warn!("No icon found, archive will have no illustration"),
        }
        Ok(())
    }

    fn write_progress(&self, config: &Config) -> Result<()> {
        let Some(path) = &config.stats_filename else {
            return Ok(());
        };
        let progress = Progress {
            done: self.done,
            total: self.done + self.queue.len(),
        };
        std::fs::write(path, serde_json::to_vec(&progress)?)?;
        Ok(())
    }
}

/// Store a site stylesheet with its `url()` resources deferred to the imager.
async fn add_stylesheet(ctx: &RunContext, session: &mut Session, css_url: &str) -> Result<String> {
    let parsed = Url::parse(css_url)
        .map_err(|e| ScrapeError::Config(format!("invalid stylesheet URL: {}", e)))?;
    let bytes = ctx.fetcher.get_bytes(css_url).await?;
    let (css, resources) = parse_css(&String::from_utf8_lossy(&bytes), &parsed);
    for resource in &resources {
        session
            .pipelines
            .imager
            .defer_raw(&resource.url, &resource.path);
    }
    let path = format!("assets/{}.css", get_digest(css_url));
    ctx.archive
        .add_item(ArchiveItem::resource(&path, "text/css", css.into_bytes()))?;
    debug!("Stylesheet {} with {} resources", css_url, resources.len());
    Ok(path)
}

async fn add_illustration(ctx: &RunContext, source: &str) -> Result<()> {
    let data = read_source(ctx.fetcher.as_ref(), source).await?;
    let png = tokio::task::spawn_blocking(move || make_illustration(&data, ILLUSTRATION_SIZE))
        .await
        .map_err(MediaError::from)??;
    ctx.archive.add_illustration(ILLUSTRATION_SIZE, &png)?;
    Ok(())
}

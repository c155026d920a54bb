//! End-to-end crawls against an in-memory site, archive and cache.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use url::Url;

use wikihow_offline::archive::{MemoryArchive, SharedArchive};
use wikihow_offline::cache::{cache_key_for, CacheMeta, MemoryCache, OptimizationCache};
use wikihow_offline::config::Config;
use wikihow_offline::context::RunContext;
use wikihow_offline::crawler::{ScrapeSummary, Scraper};
use wikihow_offline::fetch::{FetchError, Fetcher};
use wikihow_offline::media::{MediaError, VideoPreset, VideoTools, VIDEOS_ENCODER_VERSION};
use wikihow_offline::ScrapeError;

const BASE: &str = "https://www.wikihow.com/";

/// A wikiHow site served from memory, query API included.
#[derive(Default)]
struct FakeSite {
    pages: HashMap<String, String>,
    bytes: HashMap<String, Vec<u8>>,
    headers: HashMap<String, HashMap<String, String>>,
    /// `cmtitle` → (namespace, title) members.
    members: HashMap<String, Vec<(i64, String)>>,
    /// Titles the query API reports as existing.
    existing: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl FakeSite {
    fn new() -> Self {
        let mut site = Self::default();
        site.page(
            "",
            r#"<html><head><title>wikiHow</title>
            <meta name="description" content="How to do anything"></head>
            <body><p>Home</p></body></html>"#,
        );
        site.page(
            "Special:CategoryListing",
            r#"<html><body><div id="catlist_container"><div id="catlist">
            <a href="/Category:Foo">Foo</a></div></div></body></html>"#,
        );
        site
    }

    fn page(&mut self, path: &str, html: &str) {
        self.pages.insert(format!("{}{}", BASE, path), html.to_string());
    }

    fn article(&mut self, ident: &str, body: &str) {
        self.page(
            ident,
            &format!(
                r#"<html><body><div id="bodycontents"><h1>{}</h1>{}</div></body></html>"#,
                ident.replace('-', " "),
                body
            ),
        );
    }

    fn members(&mut self, category: &str, members: &[(i64, &str)]) {
        self.members.insert(
            format!("Category:{}", category),
            members.iter().map(|(ns, t)| (*ns, t.to_string())).collect(),
        );
    }

    fn requested(&self, needle: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(needle))
            .count()
    }

    fn api(&self, url: &Url) -> Result<String, FetchError> {
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        if params.get("meta").map(String::as_str) == Some("siteinfo") {
            return Ok(r#"{"query":{"namespaces":{
                "0":{"id":0,"*":""},
                "14":{"id":14,"*":"Category","canonical":"Category"}}}}"#
                .to_string());
        }
        if let Some(title) = params.get("cmtitle") {
            let members: Vec<serde_json::Value> = self
                .members
                .get(title)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|(ns, title)| serde_json::json!({"ns": ns, "title": title}))
                .collect();
            return Ok(serde_json::json!({"query": {"categorymembers": members}}).to_string());
        }
        if let Some(title) = params.get("titles") {
            let body = if self.existing.contains(title) {
                serde_json::json!({"query": {"pages": {"42": {"title": title}}}})
            } else {
                serde_json::json!({"query": {"pages": {"-1": {"title": title, "missing": ""}}}})
            };
            return Ok(body.to_string());
        }
        Err(FetchError::Status {
            url: url.to_string(),
            status: 400,
        })
    }
}

#[async_trait]
impl Fetcher for FakeSite {
    async fn get_page(&self, url: &str) -> Result<String, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.path() == "/api.php" {
            return self.api(&parsed);
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound { url: url.to_string() })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.bytes
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound { url: url.to_string() })
    }

    async fn head(&self, url: &str) -> Result<HashMap<String, String>, FetchError> {
        Ok(self.headers.get(url).cloned().unwrap_or_default())
    }
}

/// Stands in for yt-dlp/ffmpeg: "downloads" a small WebM.
#[derive(Default)]
struct FakeTools {
    downloads: Mutex<Vec<String>>,
}

#[async_trait]
impl VideoTools for FakeTools {
    async fn download(&self, url: &str, output_dir: &Path, stem: &str) -> Result<(), MediaError> {
        self.downloads.lock().unwrap().push(url.to_string());
        tokio::fs::write(output_dir.join(format!("{}.webm", stem)), b"fresh-video").await?;
        Ok(())
    }

    async fn reencode(&self, src: &Path, dst: &Path, _preset: VideoPreset) -> Result<(), MediaError> {
        tokio::fs::copy(src, dst).await?;
        Ok(())
    }
}

fn png() -> Vec<u8> {
    let mut out = Vec::new();
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([0, 128, 0]));
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

struct Harness {
    site: Arc<FakeSite>,
    tools: Arc<FakeTools>,
    cache: Option<Arc<MemoryCache>>,
    archive: MemoryArchive,
    tmp: tempfile::TempDir,
}

impl Harness {
    fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            tools: Arc::new(FakeTools::default()),
            cache: None,
            archive: MemoryArchive::new(),
            tmp: tempfile::tempdir().unwrap(),
        }
    }

    fn with_cache(mut self, cache: MemoryCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    fn config(&self) -> Config {
        let mut config = Config::for_language("en").unwrap();
        config.output_dir = self.tmp.path().join("output");
        config.tmp_dir = self.tmp.path().to_path_buf();
        config.skip_dom_check = true;
        config.skip_footer_links = true;
        config
    }

    fn build_dir(&self) -> PathBuf {
        self.tmp.path().join("build")
    }

    fn context(&self, config: Config) -> RunContext {
        RunContext {
            config,
            fetcher: self.site.clone(),
            archive: SharedArchive::new(self.archive.clone()),
            cache: self
                .cache
                .clone()
                .map(|c| c as Arc<dyn OptimizationCache>),
            video_tools: self.tools.clone(),
            build_dir: self.build_dir(),
            today: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        }
    }

    async fn run(&self, config: Config) -> Result<ScrapeSummary, ScrapeError> {
        Scraper::new(self.context(config))
            .run_until(std::future::pending::<()>())
            .await
    }

    fn html(&self, path: &str) -> String {
        self.archive
            .item(path)
            .unwrap_or_else(|| panic!("no entry {} in {:?}", path, self.archive.paths()))
            .text()
    }
}

fn foo_category_page(extra: &str, articles: &[&str]) -> String {
    let links: String = articles
        .iter()
        .map(|a| format!(r#"<div class="responsive_thumb"><a href="/{a}">{a}</a></div>"#))
        .collect();
    format!(
        r#"<html><body><div id="bodycontents"><h1>Foo</h1>{extra}
        <div id="cat_all">{links}</div></div></body></html>"#
    )
}

#[tokio::test]
async fn test_category_with_subcategory_and_shared_article() {
    let mut site = FakeSite::new();
    site.members("Foo", &[(0, "Alpha"), (0, "Beta"), (14, "Category:Sub")]);
    site.members("Sub", &[(0, "Beta"), (0, "Gamma")]);
    site.page(
        "Category:Foo",
        &foo_category_page(
            r#"<div id="subcats"><ul><li><a href="/Category:Sub">Sub</a></li></ul></div>"#,
            &["Alpha", "Beta"],
        ),
    );
    site.page(
        "Category:Sub",
        r#"<html><body><div id="bodycontents"><h1>Sub</h1><div id="cat_all">
        <div class="responsive_thumb"><a href="/Beta">Beta</a></div>
        <div class="responsive_thumb"><a href="/Gamma">Gamma</a></div>
        </div></div></body></html>"#,
    );
    for ident in ["Alpha", "Beta", "Gamma"] {
        site.article(ident, "<p>Step one.</p>");
    }
    let harness = Harness::new(site);

    let mut config = harness.config();
    config.categories = vec!["Foo".to_string()];
    config.skip_dom_check = false;
    let stats = harness.tmp.path().join("stats.json");
    config.stats_filename = Some(stats.clone());

    let summary = harness.run(config).await.unwrap();
    assert_eq!(summary.categories, 2);
    assert_eq!(summary.articles, 3);
    assert_eq!(summary.missing, 0);

    for path in ["Category:Foo/1", "Category:Sub/1", "Alpha", "Beta", "Gamma"] {
        assert!(harness.archive.item(path).is_some(), "{} missing", path);
    }
    assert_eq!(harness.archive.duplicates(), 0);
    assert_eq!(harness.site.requested("wikihow.com/Beta"), 1);
    assert_eq!(harness.site.requested("wikihow.com/Gamma"), 1);
    assert_eq!(
        harness.archive.redirect("Category:Foo").as_deref(),
        Some("Category:Foo/1")
    );
    assert_eq!(harness.archive.redirect("index").as_deref(), Some("Category:Foo/1"));
    assert!(harness.archive.item("assets/app.css").is_some());
    assert!(harness.archive.is_finished());

    let metadata = harness.archive.metadata().unwrap();
    assert_eq!(metadata.name, "wikihow_en_foo");
    assert_eq!(metadata.title, "wikiHow");
    assert_eq!(metadata.description, "How to do anything");
    assert!(metadata.tags.contains(&"wikihow".to_string()));

    let progress: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&stats).unwrap()).unwrap();
    assert_eq!(progress, serde_json::json!({"done": 5, "total": 5}));
    assert!(!harness.build_dir().exists());
}

#[tokio::test]
async fn test_excluded_category_is_neither_linked_nor_fetched() {
    let mut site = FakeSite::new();
    site.members("Foo", &[(0, "Alpha"), (14, "Category:Bar")]);
    site.members("Bar", &[(0, "Hidden")]);
    site.page(
        "Category:Foo",
        &foo_category_page(
            r#"<p id="cat_description">See also <a href="/Category:Bar">Bar things</a>.</p>"#,
            &["Alpha"],
        ),
    );
    site.page("Category:Bar", &foo_category_page("", &["Hidden"]));
    site.article("Alpha", "<p>Alpha content.</p>");
    site.article("Hidden", "<p>Hidden content.</p>");
    let harness = Harness::new(site);

    let excludes = harness.tmp.path().join("excludes.txt");
    std::fs::write(&excludes, "# never\nCategory:Bar\n").unwrap();
    let mut config = harness.config();
    config.exclude = Some(excludes.to_string_lossy().into_owned());

    harness.run(config).await.unwrap();

    let foo = harness.html("Category:Foo/1");
    assert!(foo.contains("Bar things"));
    assert!(!foo.contains("Category:Bar"));
    assert_eq!(harness.site.requested("wikihow.com/Category:Bar"), 0);
    assert_eq!(harness.site.requested("Category%3ABar"), 0);
    assert!(harness.archive.item("Category:Bar/1").is_none());
    assert!(harness.archive.item("Hidden").is_none());
    assert!(harness.archive.item("Alpha").is_some());
}

#[tokio::test]
async fn test_unreachable_image_loses_its_src() {
    let mut site = FakeSite::new();
    site.members("Foo", &[(0, "Alpha")]);
    site.page("Category:Foo", &foo_category_page("", &["Alpha"]));
    site.article(
        "Alpha",
        r#"<p><img src="/images/ok.png" alt="ok"></p><p><img src="/images/gone.jpg" alt="gone"></p>"#,
    );
    site.bytes.insert(format!("{}images/ok.png", BASE), png());
    let harness = Harness::new(site);

    let summary = harness.run(harness.config()).await.unwrap();
    assert_eq!(summary.images, 2);

    let alpha = harness.html("Alpha");
    assert!(alpha.contains(r#"alt="gone""#));
    assert!(!alpha.contains("-gone.webp"));
    assert!(alpha.contains("-ok.webp"));
    let stored: Vec<String> = harness
        .archive
        .paths()
        .into_iter()
        .filter(|p| p.starts_with("images/"))
        .collect();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ends_with("-ok.webp"));
    assert!(harness.archive.is_finished());
}

#[tokio::test]
async fn test_cache_hit_skips_work_and_mismatch_regenerates() {
    let hit_video = "https://www.wikihow.com/video/hit.mp4";
    let stale_video = "https://www.wikihow.com/video/stale.mp4";
    let cached_image = "https://www.wikihow.com/images/cached.jpg";

    let mut site = FakeSite::new();
    site.members("Foo", &[(0, "Alpha")]);
    site.page("Category:Foo", &foo_category_page("", &["Alpha"]));
    site.article(
        "Alpha",
        &format!(
            r#"<video src="{hit_video}"></video><video src="{stale_video}"></video>
            <img src="/images/cached.jpg">"#
        ),
    );
    site.headers.insert(
        hit_video.to_string(),
        HashMap::from([("ETag".to_string(), "v1".to_string())]),
    );
    site.headers.insert(
        stale_video.to_string(),
        HashMap::from([("ETag".to_string(), "v2".to_string())]),
    );

    let cache = MemoryCache::new();
    cache.insert(
        &cache_key_for(hit_video),
        b"cached-video",
        CacheMeta::new("v1", VIDEOS_ENCODER_VERSION),
    );
    cache.insert(
        &cache_key_for(stale_video),
        b"old-video",
        CacheMeta::new("v1", VIDEOS_ENCODER_VERSION),
    );
    // Image URLs are versioned by a fixed identity.
    cache.insert(
        &cache_key_for(cached_image),
        b"cached-webp",
        CacheMeta::new("1", wikihow_offline::media::IMAGES_ENCODER_VERSION),
    );
    let harness = Harness::new(site).with_cache(cache);

    harness.run(harness.config()).await.unwrap();

    let downloads = harness.tools.downloads.lock().unwrap().clone();
    assert_eq!(downloads, vec![stale_video.to_string()]);
    assert_eq!(harness.site.requested("images/cached.jpg"), 0);

    let entry = |suffix: &str| {
        harness
            .archive
            .paths()
            .into_iter()
            .find(|p| p.ends_with(suffix))
            .and_then(|p| harness.archive.item(&p))
            .unwrap_or_else(|| panic!("no entry ending with {}", suffix))
    };
    assert_eq!(entry("-hit.webm").content, b"cached-video");
    assert_eq!(entry("-stale.webm").content, b"fresh-video");
    assert_eq!(entry("-cached.webp").content, b"cached-webp");

    let cache = harness.cache.as_ref().unwrap();
    let (data, meta) = cache.get(&cache_key_for(stale_video)).unwrap();
    assert_eq!(data, b"fresh-video");
    assert_eq!(meta.ident, "v2");
    assert_eq!(cache.store_count(), 1);
}

#[tokio::test]
async fn test_missing_articles_beyond_tolerance_abort_the_run() {
    let mut site = FakeSite::new();
    let articles = ["A1", "A2", "A3", "A4", "A5"];
    let members: Vec<(i64, &str)> = articles.iter().map(|a| (0, *a)).collect();
    site.members("Foo", &members);
    site.page("Category:Foo", &foo_category_page("", &articles));
    let harness = Harness::new(site);

    let mut config = harness.config();
    config.missing_tolerance = Some(0);
    let err = harness.run(config).await.unwrap_err();

    assert!(err.is_missing_threshold(), "unexpected error: {}", err);
    assert!(!harness.archive.is_finished());
    assert!(!harness.build_dir().exists());
}

#[tokio::test]
async fn test_soft_404_is_not_missing() {
    let mut site = FakeSite::new();
    site.members("Foo", &[(0, "Under-Review")]);
    site.page("Category:Foo", &foo_category_page("", &["Under-Review"]));
    site.existing.insert("Under Review".to_string());
    let harness = Harness::new(site);

    let mut config = harness.config();
    config.missing_tolerance = Some(0);
    let summary = harness.run(config).await.unwrap();

    assert_eq!(summary.missing, 0);
    assert!(harness.html("Under-Review").contains("Under Review"));
}

#[tokio::test]
async fn test_category_pages_and_discovered_articles() {
    let mut site = FakeSite::new();
    site.members("Foo", &[(0, "Alpha")]);
    site.page(
        "Category:Foo",
        &foo_category_page(
            r#"<div id="large_pagination"><a href="/Category:Foo?pg=2">2</a></div>"#,
            &["Alpha"],
        ),
    );
    site.page("Category:Foo?pg=2", &foo_category_page("", &["Delta"]));
    site.article(
        "Alpha",
        r#"<p>See <a href="/Delta">Delta</a>.</p>
        <div id="relatedwikihows"><a class="related-wh" href="/Epsilon">Epsilon</a></div>"#,
    );
    site.article("Delta", "<p>Delta.</p>");
    site.article("Epsilon", "<p>Epsilon.</p>");
    let harness = Harness::new(site);

    let summary = harness.run(harness.config()).await.unwrap();
    assert_eq!(summary.articles, 3);

    let second = harness.html("Category:Foo/2");
    assert!(second.contains("2 / 2"));
    assert!(harness.html("Category:Foo/1").contains(r#"href="./../Category:Foo/2""#));
    assert!(harness.html("Alpha").contains(r#"href="./Delta""#));
    assert!(harness.archive.item("Epsilon").is_some());
    assert_eq!(harness.archive.main_path(), "index");
    assert!(harness.archive.item("index").is_some());
}

#[tokio::test]
async fn test_interrupt_discards_the_archive() {
    let mut site = FakeSite::new();
    site.members("Foo", &[(0, "Alpha")]);
    site.page("Category:Foo", &foo_category_page("", &["Alpha"]));
    site.article("Alpha", "<p>Alpha.</p>");
    let harness = Harness::new(site);

    let mut config = harness.config();
    config.keep_build_dir = true;
    let err = Scraper::new(harness.context(config))
        .run_until(std::future::ready(()))
        .await
        .unwrap_err();

    assert!(matches!(err, ScrapeError::Interrupted));
    assert!(!harness.archive.is_finished());
}

#[tokio::test]
async fn test_whitelist_crawls_only_listed_entries() {
    let mut site = FakeSite::new();
    site.members("Foo", &[(0, "Alpha"), (14, "Category:Sub")]);
    site.members("Sub", &[(0, "Beta")]);
    site.page(
        "Category:Foo",
        &foo_category_page(
            r#"<div id="subcats"><ul><li><a href="/Category:Sub">Sub</a></li></ul></div>"#,
            &["Alpha", "Outsider"],
        ),
    );
    site.page("Category:Sub", &foo_category_page("", &["Beta"]));
    site.article(
        "Alpha",
        r#"<p>Read <a href="/Beta">Beta</a>, <a href="/Outsider">Outsider</a>
        and <a href="/Category:Elsewhere">Elsewhere</a>.</p>"#,
    );
    site.article("Beta", "<p>Beta.</p>");
    site.article("Gamma", "<p>Gamma.</p>");
    site.article("Outsider", "<p>Not listed.</p>");
    let harness = Harness::new(site);

    let includes = harness.tmp.path().join("includes.txt");
    std::fs::write(&includes, "Category:Foo\nGamma\n").unwrap();
    let mut config = harness.config();
    config.only = Some(includes.to_string_lossy().into_owned());

    let summary = harness.run(config).await.unwrap();
    assert_eq!(summary.categories, 2);
    assert_eq!(summary.articles, 3);

    for path in ["Category:Foo/1", "Category:Sub/1", "Alpha", "Beta", "Gamma"] {
        assert!(harness.archive.item(path).is_some(), "{} missing", path);
    }
    assert!(harness.archive.item("Outsider").is_none());
    assert_eq!(harness.site.requested("wikihow.com/Outsider"), 0);
    assert_eq!(harness.site.requested("Elsewhere"), 0);

    let alpha = harness.html("Alpha");
    assert!(alpha.contains(r#"href="./Beta""#));
    assert!(!alpha.contains(r#"href="./Outsider""#));
    assert!(alpha.contains(">Outsider</a>"));
    assert!(!alpha.contains("Category:Elsewhere"));
    assert!(alpha.contains(">Elsewhere</a>"));

    let foo = harness.html("Category:Foo/1");
    assert!(foo.contains(r#"href="./../Alpha""#));
    assert!(foo.contains(r#"href="./../Category:Sub""#));
    assert!(!foo.contains("Outsider"));
}

#[tokio::test]
async fn test_trailing_slash_category_does_not_recurse() {
    let mut site = FakeSite::new();
    site.members("Foo", &[(0, "Alpha"), (14, "Category:Sub")]);
    site.members("Sub", &[(0, "Beta")]);
    site.page(
        "Category:Foo",
        &foo_category_page(
            r#"<div id="subcats"><ul><li><a href="/Category:Sub">Sub</a></li></ul></div>"#,
            &["Alpha"],
        ),
    );
    site.page("Category:Sub", &foo_category_page("", &["Beta"]));
    site.article("Alpha", "<p>Alpha.</p>");
    site.article("Beta", "<p>Beta.</p>");
    let harness = Harness::new(site);

    let mut config = harness.config();
    config.categories = vec!["Foo/".to_string()];

    let summary = harness.run(config).await.unwrap();
    assert_eq!(summary.categories, 1);
    assert_eq!(summary.articles, 1);

    assert!(harness.archive.item("Category:Foo/1").is_some());
    assert!(harness.archive.item("Alpha").is_some());
    assert!(harness.archive.item("Category:Sub/1").is_none());
    assert!(harness.archive.item("Beta").is_none());
    assert_eq!(harness.site.requested("wikihow.com/Category:Sub"), 0);
    assert_eq!(harness.site.requested("Category%3ASub"), 0);
    assert_eq!(harness.archive.redirect("index").as_deref(), Some("Category:Foo/1"));
}

#[tokio::test]
async fn test_single_article_mode() {
    let mut site = FakeSite::new();
    site.members("Foo", &[(0, "Alpha"), (0, "Beta")]);
    site.page("Category:Foo", &foo_category_page("", &["Alpha", "Beta"]));
    site.article(
        "Alpha",
        r#"<p>See <a href="/Beta">Beta</a>.</p>
        <div id="relatedwikihows"><a class="related-wh" href="/Epsilon">Epsilon</a></div>"#,
    );
    site.article("Beta", "<p>Beta.</p>");
    site.article("Epsilon", "<p>Epsilon.</p>");
    let harness = Harness::new(site);

    let mut config = harness.config();
    config.single_article = Some("Alpha".to_string());
    config.skip_footer_links = false;

    let summary = harness.run(config).await.unwrap();
    assert_eq!(summary.categories, 0);
    assert_eq!(summary.articles, 1);

    assert!(harness.archive.item("Alpha").is_some());
    assert_eq!(harness.archive.main_path(), "index");
    assert_eq!(harness.archive.redirect("index").as_deref(), Some("Alpha"));
    for path in ["Beta", "Epsilon", "Category:Foo/1"] {
        assert!(harness.archive.item(path).is_none(), "{} stored", path);
    }
    assert_eq!(harness.site.requested("wikihow.com/Category:Foo"), 0);
    assert_eq!(harness.site.requested("cmtitle"), 0);
    assert_eq!(harness.site.requested("wikihow.com/Beta"), 0);
    assert_eq!(harness.site.requested("wikihow.com/Epsilon"), 0);
    assert!(harness.archive.is_finished());
}

fn youtube_article() -> FakeSite {
    let mut site = FakeSite::new();
    site.members("Foo", &[(0, "Alpha")]);
    site.page("Category:Foo", &foo_category_page("", &["Alpha"]));
    site.article(
        "Alpha",
        r#"<div class="section video"><h2>Watch</h2>
        <iframe src="https://www.youtube.com/embed/dQw4w9WgXcQ?rel=0"></iframe></div>
        <p>Step one.</p>"#,
    );
    site
}

#[tokio::test]
async fn test_without_videos_drops_youtube_players() {
    let harness = Harness::new(youtube_article());
    let mut config = harness.config();
    config.without_videos = true;
    assert_eq!(config.video_workers(), 10);

    let summary = harness.run(config).await.unwrap();
    assert_eq!(summary.videos, 0);

    let alpha = harness.html("Alpha");
    assert!(alpha.contains("Step one."));
    assert!(!alpha.contains("<iframe"));
    assert!(!alpha.contains("youtube"));
    assert!(!alpha.contains("Watch"));
    assert!(harness.tools.downloads.lock().unwrap().is_empty());
    assert!(!harness
        .archive
        .paths()
        .iter()
        .any(|p| p.starts_with("videos/")));
}

#[tokio::test]
async fn test_youtube_players_become_archive_videos() {
    let harness = Harness::new(youtube_article());
    let config = harness.config();
    assert_eq!(config.video_workers(), 1);

    let summary = harness.run(config).await.unwrap();
    assert_eq!(summary.videos, 1);

    let downloads = harness.tools.downloads.lock().unwrap().clone();
    assert_eq!(
        downloads,
        vec!["https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string()]
    );
    let alpha = harness.html("Alpha");
    assert!(!alpha.contains("<iframe"));
    assert!(alpha.contains("video-js youtube"));
    assert!(harness
        .archive
        .paths()
        .iter()
        .any(|p| p.starts_with("videos/") && p.ends_with("-dQw4w9WgXcQ.webm")));
}

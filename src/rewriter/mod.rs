//! Page rewriting: source-site markup to archive-relative markup.
//!
//! Links become paths relative to the archive root, links to hidden content
//! are dropped, and `<img>`/`<video>` references are handed to the media
//! pipeline which answers with the archive path the resource will live at.

mod document;
mod exclusions;
mod videos;

pub use document::{selector, PageDocument};

use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::Selector;
use tracing::debug;

use crate::filters::FilterLists;
use crate::media::{Imager, VideoGrabber};

/// Class added to links leaving the archive.
pub const EXTERNAL_LINK_CLASS: &str = "external-link";

/// Schemes that never point into the archive.
const FOREIGN_SCHEMES: &[&str] = &[
    "mailto:",
    "tel:",
    "sms:",
    "javascript:",
    "data:",
    "ftp:",
    "whatsapp:",
    "fb-messenger:",
];

static LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static PICTURES: LazyLock<Selector> = LazyLock::new(|| selector("picture"));
static IMAGES: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static FOLDER_WALK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\.\.?/)+").unwrap());
static PAGE_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|&)pg=(?P<page>\d+)(?:&|$)").unwrap());

pub struct Rewriter {
    domain_link: Regex,
    category_prefix: String,
    without_external_links: bool,
    filters: Arc<FilterLists>,
}

impl Rewriter {
    /// `domain` is the source site's host, e.g. `www.wikihow.com`.
    pub fn new(
        domain: &str,
        category_prefix: &str,
        without_external_links: bool,
        filters: Arc<FilterLists>,
    ) -> Result<Self, regex::Error> {
        let domain_link = Regex::new(&format!(
            r"^https?://{}(?P<path>/.*)?$",
            regex::escape(domain)
        ))?;
        Ok(Self {
            domain_link,
            category_prefix: category_prefix.to_string(),
            without_external_links,
            filters,
        })
    }

    /// Rewrite a content fragment for an entry whose path back to the
    /// archive root is `to_root`.
    ///
    /// Input the parser can make nothing of is returned unchanged.
    pub fn rewrite(&self, content: &str, to_root: &str, imager: &mut Imager) -> String {
        if content.trim().is_empty() {
            return String::new();
        }
        let mut doc = PageDocument::fragment(content);
        if !doc.has_content_elements() {
            debug!("Nothing to rewrite in {} bytes of content", content.len());
            return content.to_string();
        }
        self.rewrite_document(&mut doc, to_root, imager);
        doc.html()
    }

    /// Like [`Rewriter::rewrite`], also replacing embedded and inline videos.
    ///
    /// YouTube blocks are dropped unless `include_youtube` is set.
    pub fn rewrite_page(
        &self,
        content: &str,
        to_root: &str,
        imager: &mut Imager,
        videos: &mut VideoGrabber,
        include_youtube: bool,
    ) -> String {
        if content.trim().is_empty() {
            return String::new();
        }
        let mut doc = PageDocument::fragment(content);
        if !doc.has_content_elements() {
            return content.to_string();
        }
        self.rewrite_document(&mut doc, to_root, imager);
        videos::handle_videos(&mut doc, to_root, imager, videos, include_youtube);
        doc.html()
    }

    pub fn rewrite_document(&self, doc: &mut PageDocument, to_root: &str, imager: &mut Imager) {
        self.rewrite_links(doc, to_root);
        exclusions::remove_links_for_excludes(
            doc,
            to_root,
            &self.category_prefix,
            &self.filters,
        );
        rewrite_pictures(doc);
        rewrite_images(doc, to_root, imager);
    }

    fn rewrite_links(&self, doc: &mut PageDocument, to_root: &str) {
        for link in doc.select(&LINKS) {
            let Some(href) = doc.attr(link, "href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty() {
                doc.remove_attr(link, "href");
                continue;
            }
            if href.starts_with('#') || doc.is_in_code(link) {
                continue;
            }

            match self.site_path(href) {
                Some(path) => {
                    let target = self.relative_href(&path, to_root);
                    doc.set_attr(link, "href", &target);
                }
                None => {
                    doc.add_class(link, EXTERNAL_LINK_CLASS);
                    if self.without_external_links {
                        doc.remove_attr(link, "href");
                    }
                }
            }
        }
    }

    /// Path of a link target on the source site, or `None` when it leaves it.
    fn site_path(&self, href: &str) -> Option<String> {
        let href = match href.strip_prefix("//") {
            Some(rest) => format!("https://{}", rest),
            None => href.to_string(),
        };
        if let Some(caps) = self.domain_link.captures(&href) {
            let path = caps.name("path").map(|p| p.as_str()).unwrap_or("");
            return Some(path.trim_start_matches('/').to_string());
        }
        let lower = href.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return None;
        }
        if FOREIGN_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            return None;
        }
        Some(href)
    }

    /// Archive-relative form of a site path.
    ///
    /// Any leading folder walk targets the archive root. Category pagination
    /// (`?pg=N`) maps to the category's numbered entry.
    pub fn relative_href(&self, path: &str, to_root: &str) -> String {
        let (path, fragment) = match path.split_once('#') {
            Some((path, fragment)) => (path, Some(fragment)),
            None => (path, None),
        };
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        let walked = FOLDER_WALK.replace(path, "");
        let mut path = walked.trim_start_matches('/');
        if path == "." || path == ".." {
            path = "";
        }

        let mut target = format!("{}{}", to_root, path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            let page = PAGE_QUERY
                .captures(query)
                .and_then(|caps| caps.name("page").map(|p| p.as_str().to_string()));
            match page {
                Some(page) if self.is_category_path(path) => {
                    target = format!("{}/{}", target.trim_end_matches('/'), page);
                }
                _ => {
                    target.push('?');
                    target.push_str(query);
                }
            }
        }
        if let Some(fragment) = fragment {
            target.push('#');
            target.push_str(fragment);
        }
        target
    }

    fn is_category_path(&self, path: &str) -> bool {
        let decoded = crate::utils::normalize_ident(path);
        decoded.starts_with(&format!("{}:", self.category_prefix))
    }
}

/// Drop responsive sources from pictures that carry a fallback `<img>`.
fn rewrite_pictures(doc: &mut PageDocument) {
    for picture in doc.select(&PICTURES) {
        if doc.select_within(picture, &IMAGES).is_empty() {
            continue;
        }
        for child in doc.child_elements(picture) {
            if doc.tag_name(child) != Some("img") {
                doc.remove(child);
            }
        }
    }
}

fn rewrite_images(doc: &mut PageDocument, to_root: &str, imager: &mut Imager) {
    for img in doc.select(&IMAGES) {
        doc.remove_attr(img, "onload");

        let src = doc.attr(img, "src").filter(|s| !s.trim().is_empty());
        let data_src = doc.attr(img, "data-src").filter(|s| !s.trim().is_empty());
        let src = match (src, data_src) {
            (Some(src), _) => src,
            (None, Some(data_src)) => {
                doc.set_attr(img, "src", &data_src);
                data_src
            }
            (None, None) => continue,
        };
        doc.remove_attr(img, "data-src");
        doc.remove_attr(img, "data-src-nowebp");
        doc.remove_attr(img, "srcset");

        if doc.is_in_code(img) {
            continue;
        }

        match imager.defer(src.trim()) {
            Some(path) => doc.set_attr(img, "src", &format!("{}{}", to_root, path)),
            None => doc.remove_attr(img, "src"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::archive::{MemoryArchive, SharedArchive};
    use crate::executor::Executor;
    use crate::fetch::{FetchError, Fetcher};
    use crate::filters::parse_list;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use url::Url;

    pub(crate) struct NoFetch;

    #[async_trait]
    impl Fetcher for NoFetch {
        async fn get_page(&self, url: &str) -> Result<String, FetchError> {
            Err(FetchError::NotFound { url: url.to_string() })
        }
        async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::NotFound { url: url.to_string() })
        }
        async fn head(&self, url: &str) -> Result<HashMap<String, String>, FetchError> {
            Err(FetchError::NotFound { url: url.to_string() })
        }
    }

    pub(crate) fn imager() -> Imager {
        Imager::new(
            Url::parse("https://www.wikihow.com/").unwrap(),
            Arc::new(NoFetch),
            None,
            SharedArchive::new(MemoryArchive::new()),
            Arc::new(Executor::new("IMG-T-", 20, 2)),
        )
    }

    fn rewriter(filters: FilterLists, without_external_links: bool) -> Rewriter {
        Rewriter::new(
            "www.wikihow.com",
            "Category",
            without_external_links,
            Arc::new(filters),
        )
        .unwrap()
    }

    fn plain() -> Rewriter {
        rewriter(FilterLists::default(), false)
    }

    #[test]
    fn test_folder_walk_targets_archive_root() {
        let r = plain();
        assert_eq!(
            r.relative_href("../../Category:Foo", "./../"),
            "./../Category:Foo"
        );
        assert_eq!(r.relative_href("./Knit", "./"), "./Knit");
        assert_eq!(r.relative_href("/Knit", "./../"), "./../Knit");
        assert_eq!(r.relative_href("./", "./../"), "./../");
    }

    #[test]
    fn test_category_pagination_maps_to_numbered_entry() {
        let r = plain();
        assert_eq!(
            r.relative_href("/Category:Food?pg=3", "./"),
            "./Category:Food/3"
        );
        assert_eq!(r.relative_href("/Knit?pg=3", "./"), "./Knit?pg=3");
        assert_eq!(r.relative_href("/Knit#Steps", "./"), "./Knit#Steps");
    }

    #[test]
    fn test_same_domain_link_becomes_relative() {
        let out = plain().rewrite(
            r#"<p><a href="https://www.wikihow.com/Tie-a-Tie">tie</a></p>"#,
            "./../",
            &mut imager(),
        );
        assert_eq!(out, r#"<p><a href="./../Tie-a-Tie">tie</a></p>"#);
    }

    #[test]
    fn test_link_edge_cases() {
        let out = plain().rewrite(
            concat!(
                r#"<a href="  ">empty</a>"#,
                r##"<a href="#step-1">anchor</a>"##,
                r#"<pre><a href="/in-code">code</a></pre>"#,
                r#"<a href="//www.wikihow.com/Knit">proto</a>"#,
            ),
            "./",
            &mut imager(),
        );
        assert!(out.contains("<a>empty</a>"));
        assert!(out.contains(r##"<a href="#step-1">anchor</a>"##));
        assert!(out.contains(r#"<a href="/in-code">code</a>"#));
        assert!(out.contains(r#"<a href="./Knit">proto</a>"#));
    }

    #[test]
    fn test_external_links() {
        let src = r#"<a href="https://example.org/x">ext</a><a href="mailto:a@b.c">mail</a>"#;
        let kept = plain().rewrite(src, "./", &mut imager());
        assert!(kept.contains(r#"<a href="https://example.org/x" class="external-link">ext</a>"#));
        assert!(kept.contains(r#"class="external-link">mail</a>"#));

        let stripped = rewriter(FilterLists::default(), true).rewrite(src, "./", &mut imager());
        assert!(stripped.contains(r#"<a class="external-link">ext</a>"#));
        assert!(!stripped.contains("example.org"));
    }

    #[test]
    fn test_unparseable_input_is_returned_unchanged() {
        let r = plain();
        assert_eq!(r.rewrite("", "./", &mut imager()), "");
        assert_eq!(r.rewrite("just text", "./", &mut imager()), "just text");
        assert_eq!(r.rewrite("<<<>>", "./", &mut imager()), "<<<>>");
    }

    #[test]
    fn test_images_are_deferred() {
        let mut imager = imager();
        let out = plain().rewrite(
            concat!(
                r#"<img data-src="/images/a/Knit-Step-1.jpg" onload="x()">"#,
                r#"<img src="data:image/gif;base64,AAAA">"#,
                r#"<img alt="none">"#,
            ),
            "./../",
            &mut imager,
        );
        assert!(out.contains(r#"src="./../images/"#));
        assert!(out.contains("-Knit-Step-1.webp"));
        assert!(!out.contains("onload"));
        assert!(!out.contains("data-src"));
        assert!(!out.contains("data:image"));
        assert!(out.contains(r#"<img alt="none">"#));
        assert_eq!(imager.pending(), 1);
    }

    #[test]
    fn test_picture_sources_removed_with_fallback_img() {
        let out = plain().rewrite(
            concat!(
                r#"<picture><source srcset="/a.webp"><img src="/a.jpg"></picture>"#,
                r#"<picture><source srcset="/b.webp"></picture>"#,
            ),
            "./",
            &mut imager(),
        );
        assert_eq!(out.matches("<source").count(), 1);
        assert!(out.contains("/b.webp"));
    }

    #[test]
    fn test_excluded_links_lose_href_but_keep_text() {
        let filters = FilterLists::new(parse_list("Category:Bar\nSecret", "Category"), Default::default());
        let out = rewriter(filters, false).rewrite(
            concat!(
                r#"<p>See <a href="/Category:Bar">Bar things</a>, "#,
                r#"<a href="/Secret">secret</a> and <a href="/Category:Baz">Baz</a>.</p>"#,
            ),
            "./",
            &mut imager(),
        );
        assert!(out.contains("<a>Bar things</a>"));
        assert!(out.contains("<a>secret</a>"));
        assert!(out.contains(r#"<a href="./Category:Baz">Baz</a>"#));
    }
}

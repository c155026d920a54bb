//! Site-level inspection: homepage metadata and DOM integrity checks.

use std::sync::LazyLock;

use scraper::Selector;
use tracing::{debug, info};
use url::Url;

use super::page_url;
use crate::error::{Result, ScrapeError};
use crate::fetch::Fetcher;
use crate::rewriter::{selector, PageDocument};
use crate::site::{self, CheckTarget, DOM_CHECKS};
use crate::utils::{article_ident_for, cat_ident_for, to_url};

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector(site::HOME_TITLE));
static DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| selector(site::HOME_DESCRIPTION));
static ICON: LazyLock<Selector> = LazyLock::new(|| selector(site::HOME_ICON));
static FAVICON: LazyLock<Selector> = LazyLock::new(|| selector(site::HOME_FAVICON));
static STYLESHEETS: LazyLock<Selector> = LazyLock::new(|| selector(site::STYLESHEETS));
static FOOTER_LINKS: LazyLock<Selector> = LazyLock::new(|| selector(site::FOOTER_LINKS));
static LISTING_LINKS: LazyLock<Selector> =
    LazyLock::new(|| selector(site::CATEGORY_LISTING_LINKS));
static ARTICLE_LINKS: LazyLock<Selector> =
    LazyLock::new(|| selector(site::CATEGORY_ARTICLE_LINKS));

/// A top-level category as listed by the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopCategory {
    pub ident: String,
    pub title: String,
}

/// What the homepage and category listing tell us about the site.
#[derive(Debug, Clone, Default)]
pub struct SiteInfo {
    pub title: String,
    pub description: String,
    pub icon_url: Option<String>,
    /// Absolute stylesheet URLs, in page order.
    pub stylesheets: Vec<String>,
    /// Article identities linked from the footer (about, terms...).
    pub footer_articles: Vec<String>,
    pub top_categories: Vec<TopCategory>,
}

fn text_of(doc: &PageDocument, sel: &Selector) -> Option<String> {
    doc.select_first(sel)
        .map(|id| doc.text(id).split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
}

/// Top-level categories from the category listing page.
fn top_categories(doc: &PageDocument, prefix: &str) -> Vec<TopCategory> {
    let mut categories: Vec<TopCategory> = Vec::new();
    for link in doc.select(&LISTING_LINKS) {
        let Some(href) = doc.attr(link, "href") else {
            continue;
        };
        let Some(ident) = cat_ident_for(&href, prefix) else {
            continue;
        };
        if categories.iter().any(|c| c.ident == ident) {
            continue;
        }
        let title = doc.text(link).trim().to_string();
        let title = if title.is_empty() {
            ident.replace('-', " ")
        } else {
            title
        };
        categories.push(TopCategory { ident, title });
    }
    categories
}

/// Fetch homepage metadata and the list of top-level categories.
pub async fn fetch_site_info(fetcher: &dyn Fetcher, base_url: &Url, prefix: &str) -> Result<SiteInfo> {
    let home = PageDocument::document(&fetcher.get_page(base_url.as_str()).await?);

    let title = text_of(&home, &TITLE).unwrap_or_default();
    let description = home
        .select_first(&DESCRIPTION)
        .and_then(|id| home.attr(id, "content"))
        .map(|d| d.trim().to_string())
        .unwrap_or_default();
    let icon_url = home
        .select_first(&ICON)
        .or_else(|| home.select_first(&FAVICON))
        .and_then(|id| home.attr(id, "href"))
        .map(|href| to_url(&href, base_url));

    let mut stylesheets: Vec<String> = Vec::new();
    for link in home.select(&STYLESHEETS) {
        if let Some(href) = home.attr(link, "href") {
            let url = to_url(&href, base_url);
            if !stylesheets.contains(&url) {
                stylesheets.push(url);
            }
        }
    }

    let mut footer_articles: Vec<String> = Vec::new();
    for link in home.select(&FOOTER_LINKS) {
        let Some(href) = home.attr(link, "href") else {
            continue;
        };
        if cat_ident_for(&href, prefix).is_some() {
            continue;
        }
        if let Some(ident) = article_ident_for(&href, base_url) {
            if !footer_articles.contains(&ident) {
                footer_articles.push(ident);
            }
        }
    }

    let listing_url = page_url(base_url, site::CATEGORY_LISTING_PATH);
    let listing = PageDocument::document(&fetcher.get_page(&listing_url).await?);
    let top_categories = top_categories(&listing, prefix);

    info!(
        "Site `{}`: {} top categories, {} footer pages, {} stylesheets",
        title,
        top_categories.len(),
        footer_articles.len(),
        stylesheets.len()
    );
    Ok(SiteInfo {
        title,
        description,
        icon_url,
        stylesheets,
        footer_articles,
        top_categories,
    })
}

async fn fetch_check_page(fetcher: &dyn Fetcher, url: &str) -> Result<PageDocument> {
    let html = fetcher
        .get_page(url)
        .await
        .map_err(|e| ScrapeError::DomIntegrity(format!("unable to fetch {}: {}", url, e)))?;
    Ok(PageDocument::document(&html))
}

fn run_checks(doc: &PageDocument, target: CheckTarget, url: &str) -> Result<()> {
    for check in DOM_CHECKS.iter().filter(|p| p.target == target) {
        if doc.select_first(&selector(check.selector)).is_none() {
            return Err(ScrapeError::DomIntegrity(format!(
                "no {} (`{}`) on {}",
                check.description, check.selector, url
            )));
        }
        debug!("DOM check `{}` passed on {}", check.description, url);
    }
    Ok(())
}

/// Verify that the markup the crawler relies on is still there.
///
/// Walks the category listing, its first category and that category's first
/// article.
pub async fn check_dom_integrity(fetcher: &dyn Fetcher, base_url: &Url, prefix: &str) -> Result<()> {
    let listing_url = page_url(base_url, site::CATEGORY_LISTING_PATH);
    let listing = fetch_check_page(fetcher, &listing_url).await?;
    run_checks(&listing, CheckTarget::CategoryListing, &listing_url)?;

    let category = top_categories(&listing, prefix)
        .into_iter()
        .next()
        .ok_or_else(|| ScrapeError::DomIntegrity(format!("no category link on {}", listing_url)))?;
    let category_url = page_url(base_url, &format!("{}:{}", prefix, category.ident));
    let category_doc = fetch_check_page(fetcher, &category_url).await?;
    run_checks(&category_doc, CheckTarget::FirstCategory, &category_url)?;

    let article = category_doc
        .select(&ARTICLE_LINKS)
        .into_iter()
        .filter_map(|link| category_doc.attr(link, "href"))
        .find_map(|href| article_ident_for(&href, base_url))
        .ok_or_else(|| ScrapeError::DomIntegrity(format!("no article link on {}", category_url)))?;
    let article_url = page_url(base_url, &article);
    let article_doc = fetch_check_page(fetcher, &article_url).await?;
    run_checks(&article_doc, CheckTarget::FirstArticle, &article_url)?;

    info!("DOM integrity checks passed");
    Ok(())
}

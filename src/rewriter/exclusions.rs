//! Removal of links that point at hidden categories and articles.

use std::sync::LazyLock;

use scraper::Selector;
use tracing::debug;

use super::document::{selector, PageDocument};
use crate::filters::FilterLists;
use crate::site::{LinkRemoval, LINK_REMOVALS};
use crate::utils::normalize_ident;

static REMOVALS: LazyLock<Vec<(LinkRemoval, Selector)>> = LazyLock::new(|| {
    LINK_REMOVALS
        .iter()
        .map(|removal| (*removal, selector(removal.selector)))
        .collect()
});

static LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

#[derive(Debug, PartialEq, Eq)]
enum LinkTarget {
    Category(String),
    Article(String),
}

/// Crawl identity behind an already rewritten archive-relative link.
fn link_target(href: &str, to_root: &str, prefix: &str) -> Option<LinkTarget> {
    let rest = href.strip_prefix(to_root)?;
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    let rest = normalize_ident(&rest[..end]);
    if rest.is_empty() {
        return None;
    }
    match rest.strip_prefix(&format!("{}:", prefix)) {
        Some(category) => {
            let ident = category.split('/').next().unwrap_or_default();
            if ident.is_empty() {
                None
            } else {
                Some(LinkTarget::Category(ident.to_string()))
            }
        }
        None => Some(LinkTarget::Article(rest)),
    }
}

fn is_hidden(target: &LinkTarget, filters: &FilterLists) -> bool {
    match target {
        LinkTarget::Category(ident) => filters.hide_category(ident),
        LinkTarget::Article(ident) => filters.hide_article(ident),
    }
}

/// Remove links to hidden content.
///
/// Links inside known structures (related articles, thumbnails, category
/// lists, breadcrumbs) take their enclosing block with them. Any other link to
/// hidden content only loses its `href`.
pub(super) fn remove_links_for_excludes(
    doc: &mut PageDocument,
    to_root: &str,
    prefix: &str,
    filters: &FilterLists,
) {
    if !filters.filters_links() {
        return;
    }

    for (removal, sel) in REMOVALS.iter() {
        for link in doc.select(sel) {
            if doc.is_detached(link) {
                continue;
            }
            let Some(href) = doc.attr(link, "href") else {
                continue;
            };
            let target = match link_target(&href, to_root, prefix) {
                Some(target @ LinkTarget::Category(_)) if removal.for_category => target,
                Some(target @ LinkTarget::Article(_)) if !removal.for_category => target,
                _ => continue,
            };
            if is_hidden(&target, filters) {
                debug!("Removing link to hidden {:?}", target);
                remove_link(doc, link, removal);
            }
        }
    }

    for link in doc.select(&LINKS) {
        if doc.is_detached(link) {
            continue;
        }
        let Some(href) = doc.attr(link, "href") else {
            continue;
        };
        if link_target(&href, to_root, prefix).is_some_and(|target| is_hidden(&target, filters)) {
            doc.remove_attr(link, "href");
        }
    }
}

fn remove_link(doc: &mut PageDocument, link: ego_tree::NodeId, removal: &LinkRemoval) {
    let mut target = link;
    if removal.target_is_parent {
        if let Some(parent) = doc.parent(link) {
            if !matches!(doc.tag_name(parent), Some("html" | "body") | None) {
                target = parent;
            }
        }
    }
    if removal.clear_parent_previous_sibling {
        if let Some(previous) = doc.prev_sibling(target) {
            doc.remove(previous);
        }
    }
    doc.remove(target);
}

//! Inclusion and exclusion lists.
//!
//! List files are newline-delimited. Lines starting with `#` are comments,
//! `Category:`-prefixed entries (or the site's own category namespace) name
//! categories, anything else names an article. Entries may be identities or
//! full source-site URLs.

use std::collections::HashSet;
use std::path::Path;

use tracing::info;

use crate::config::{expand_path, is_remote};
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::utils::normalize_ident;

/// Entries parsed from one list file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListEntries {
    pub categories: HashSet<String>,
    pub articles: HashSet<String>,
}

impl ListEntries {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.articles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.categories.len() + self.articles.len()
    }
}

/// Parse a list file.
pub fn parse_list(text: &str, category_prefix: &str) -> ListEntries {
    let mut entries = ListEntries::default();
    let prefixes = [format!("{}:", category_prefix), "Category:".to_string()];

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let ident = strip_origin(line).trim_matches('/');
        let ident = normalize_ident(ident);

        match prefixes.iter().find_map(|p| ident.strip_prefix(p.as_str())) {
            Some(category) => {
                let category = category.trim_matches('/');
                if !category.is_empty() {
                    entries.categories.insert(category.replace(' ', "-"));
                }
            }
            None => {
                if !ident.is_empty() {
                    entries.articles.insert(ident.replace(' ', "-"));
                }
            }
        }
    }
    entries
}

/// Path part of a full URL entry.
fn strip_origin(entry: &str) -> &str {
    for scheme in ["https://", "http://"] {
        if let Some(rest) = entry.strip_prefix(scheme) {
            return rest.find('/').map(|pos| &rest[pos..]).unwrap_or("");
        }
    }
    entry
}

/// Filter sets for one run. Read-only once the crawl starts.
#[derive(Debug, Clone, Default)]
pub struct FilterLists {
    pub exclusion: ListEntries,
    pub inclusion: ListEntries,
}

impl FilterLists {
    pub fn new(exclusion: ListEntries, inclusion: ListEntries) -> Self {
        Self {
            exclusion,
            inclusion,
        }
    }

    /// Inclusion is authoritative as soon as it lists anything.
    pub fn whitelist_mode(&self) -> bool {
        !self.inclusion.is_empty()
    }

    /// Whether links may need removing at rewrite time.
    pub fn filters_links(&self) -> bool {
        self.whitelist_mode() || !self.exclusion.is_empty()
    }

    /// Whether the crawl must not visit this category.
    pub fn skip_category(&self, ident: &str) -> bool {
        if self.whitelist_mode() {
            !self.inclusion.categories.contains(ident)
        } else {
            self.exclusion.categories.contains(ident)
        }
    }

    /// Whether the crawl must not visit this article.
    pub fn skip_article(&self, ident: &str) -> bool {
        if self.whitelist_mode() {
            !self.inclusion.articles.contains(ident)
        } else {
            self.exclusion.articles.contains(ident)
        }
    }

    /// Whether links to this category are removed from pages.
    pub fn hide_category(&self, ident: &str) -> bool {
        self.skip_category(ident) || self.exclusion.categories.contains(ident)
    }

    /// Whether links to this article are removed from pages.
    pub fn hide_article(&self, ident: &str) -> bool {
        self.skip_article(ident) || self.exclusion.articles.contains(ident)
    }

    /// Keep an article reachable in whitelist mode (footer pages, members
    /// of included categories).
    pub fn allow_article(&mut self, ident: &str) {
        if self.whitelist_mode() {
            self.inclusion.articles.insert(ident.to_string());
        }
    }

    /// Keep a category reachable in whitelist mode (subcategories of
    /// included categories).
    pub fn allow_category(&mut self, ident: &str) {
        if self.whitelist_mode() {
            self.inclusion.categories.insert(ident.to_string());
        }
    }
}

/// Read a list from a local path or an HTTP(S) URL and keep a copy at `copy_to`.
pub async fn load_list(
    fetcher: &dyn Fetcher,
    source: &str,
    copy_to: &Path,
    category_prefix: &str,
) -> Result<ListEntries> {
    let text = if is_remote(source) {
        let bytes = fetcher.get_bytes(source).await?;
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        tokio::fs::read_to_string(expand_path(source)).await?
    };
    tokio::fs::write(copy_to, &text).await?;
    let entries = parse_list(&text, category_prefix);
    info!(
        "Loaded {} categories and {} articles from {}",
        entries.categories.len(),
        entries.articles.len(),
        source
    );
    Ok(entries)
}

//! Crawl identities and archive-relative path helpers.

use url::Url;

/// URL-decoded identifier. Invalid escapes leave the input untouched.
pub fn normalize_ident(ident: &str) -> String {
    urlencoding::decode(ident)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| ident.to_string())
}

/// Strip query string and fragment from a link target.
fn strip_suffixes(href: &str) -> &str {
    let end = href.find(['?', '#']).unwrap_or(href.len());
    &href[..end]
}

/// Decoded category identity from a link target such as `/Category:Arts-and-Crafts`.
///
/// `prefix` is the site's category namespace (`Category` on the English site).
/// Returns `None` when the target is not in that namespace.
pub fn cat_ident_for(href: &str, prefix: &str) -> Option<String> {
    let href = strip_suffixes(href.trim());
    let marker = format!("{prefix}:");
    let decoded = normalize_ident(href);
    let start = decoded.find(&marker)? + marker.len();
    let ident = decoded[start..].trim_matches('/');
    if ident.is_empty() {
        None
    } else {
        Some(ident.to_string())
    }
}

/// Decoded article identity from a link target on the source site.
///
/// Relative targets are resolved against `base`. Targets on another host, or
/// pointing at the site root, yield `None`.
pub fn article_ident_for(href: &str, base: &Url) -> Option<String> {
    let resolved = base.join(href.trim()).ok()?;
    if resolved.host_str() != base.host_str() {
        return None;
    }
    let ident = normalize_ident(resolved.path().trim_start_matches('/'));
    if ident.is_empty() {
        None
    } else {
        Some(ident)
    }
}

/// Absolute URL for an in-source link target.
pub fn to_url(value: &str, base: &Url) -> String {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        return value.to_string();
    }
    if let Some(rest) = value.strip_prefix("//") {
        return format!("{}://{}", base.scheme(), rest);
    }
    base.join(value)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| value.to_string())
}

/// Relative path from an archive entry back to the archive root.
///
/// Top-level entries get `./` (so that `Category:Foo` is never read as a URL
/// scheme); each extra path segment adds one `../`.
pub fn to_root_for(path: &str) -> String {
    let depth = path.trim_start_matches('/').matches('/').count();
    format!("./{}", "../".repeat(depth))
}

/// Readable, archive-safe slug from the last segment of a URL path, without extension.
pub fn slugify_stem(url_path: &str) -> String {
    let last = url_path.rsplit('/').next().unwrap_or_default();
    let decoded = normalize_ident(last);
    let stem = match decoded.rfind('.') {
        Some(pos) if pos > 0 => &decoded[..pos],
        _ => decoded.as_str(),
    };
    stem.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(80)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.wikihow.com/").unwrap()
    }

    #[test]
    fn test_normalize_ident() {
        assert_eq!(normalize_ident("Caf%C3%A9-Au-Lait"), "Café-Au-Lait");
        assert_eq!(normalize_ident("Plain"), "Plain");
        assert_eq!(normalize_ident("bad%ZZescape"), "bad%ZZescape");
    }

    #[test]
    fn test_cat_ident_for() {
        assert_eq!(
            cat_ident_for("/Category:Arts-and-Entertainment", "Category"),
            Some("Arts-and-Entertainment".to_string())
        );
        assert_eq!(
            cat_ident_for("https://www.wikihow.com/Category:Food?pg=2", "Category"),
            Some("Food".to_string())
        );
        assert_eq!(
            cat_ident_for("/Cat%C3%A9gorie:Cuisine", "Catégorie"),
            Some("Cuisine".to_string())
        );
        assert_eq!(cat_ident_for("/Tie-a-Tie", "Category"), None);
        assert_eq!(cat_ident_for("/Category:", "Category"), None);
    }

    #[test]
    fn test_article_ident_for() {
        assert_eq!(
            article_ident_for("/Tie-a-Tie", &base()),
            Some("Tie-a-Tie".to_string())
        );
        assert_eq!(
            article_ident_for("https://www.wikihow.com/Make-Caf%C3%A9#step", &base()),
            Some("Make-Café".to_string())
        );
        assert_eq!(article_ident_for("https://example.com/Tie", &base()), None);
        assert_eq!(article_ident_for("/", &base()), None);
    }

    #[test]
    fn test_to_url() {
        assert_eq!(
            to_url("/images/a.png", &base()),
            "https://www.wikihow.com/images/a.png"
        );
        assert_eq!(
            to_url("//pad1.whstatic.com/a.png", &base()),
            "https://pad1.whstatic.com/a.png"
        );
        assert_eq!(to_url("http://x.org/a", &base()), "http://x.org/a");
    }

    #[test]
    fn test_to_root_for() {
        assert_eq!(to_root_for("Tie-a-Tie"), "./");
        assert_eq!(to_root_for("Category:Food/2"), "./../");
        assert_eq!(to_root_for("a/b/c"), "./../../");
    }

    #[test]
    fn test_slugify_stem() {
        assert_eq!(slugify_stem("/images/thumb/Tie-Step-1.jpg"), "Tie-Step-1");
        assert_eq!(slugify_stem("/video/My%20Clip.mp4"), "My_Clip");
        assert_eq!(slugify_stem("/watch"), "watch");
        assert_eq!(slugify_stem(""), "");
    }
}
